//! Watch preferences example
//!
//! Seeds an in-memory preference service, prints the new tab preferences
//! matched by a glob pattern, then writes one of them through a
//! `use_pref` hook and waits for the service to push it back.

use prefsync::{query_preferences, use_pref, MemoryBridge, PrefHookManager, PrefListener};
use serde_json::json;
use std::sync::Arc;

const SHOW_CLOCK: &str = "brave.new_tab_page.show_clock";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bridge = Arc::new(MemoryBridge::with_prefs([
        (SHOW_CLOCK, json!(true)),
        ("brave.new_tab_page.show_stats", json!(false)),
        ("brave.rewards.enabled", json!(true)),
    ]));
    let manager = PrefHookManager::new(bridge);
    manager.ready().await?;

    if let Some(snapshot) = manager.snapshot() {
        println!("New tab preferences:");
        println!("{:-<60}", "");
        for (key, value) in query_preferences(&snapshot, &["brave.new_tab_page.*"])? {
            println!("{key:<45} {value}");
        }
        println!();
    }

    let listener: PrefListener = Arc::new(|key, new, old| {
        println!("listener: {key} changed from {old:?} to {new}");
    });
    manager.add_pref_listener(SHOW_CLOCK, listener.clone());

    let mut show_clock = use_pref(&manager, SHOW_CLOCK);
    println!("hook value before save: {:?}", show_clock.value());

    show_clock.set(json!(false)).await?;
    let pushed = show_clock.changed().await?;
    println!("hook value after push:  {pushed:?}");

    manager.remove_pref_listener(SHOW_CLOCK, &listener);
    manager.teardown();
    Ok(())
}
