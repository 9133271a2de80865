//! # prefsync - Preference and Page-State Sync Library
//!
//! This library keeps UI-side views of externally owned state in sync:
//! preferences pushed by a preference service, entity collections fetched
//! from a remote controller, and per-page view state persisted to a local
//! string store.
//!
//! ## Features
//!
//! - Cache the preference snapshot and fan changes out per key ([`PrefHookManager`])
//! - Bind a single preference to a reactive read/write cell ([`use_pref`])
//! - Cache whole entity collections with optimistic updates that roll back
//!   on failure ([`CachingWrapper`])
//! - Follow news publishers and subscribe channels on top of the cache
//!   ([`PublisherCache`], [`ChannelCache`])
//! - Trailing-edge debounce with explicit flush ([`debounce`])
//! - Lazily hydrated page state saved through a debounced store ([`PageStore`])
//! - Query preference snapshots using glob patterns (e.g., `"brave.new_tab_page.*"`)
//!
//! ## Quick Start
//!
//! ### Observing Preferences
//!
//! ```rust
//! use prefsync::{MemoryBridge, PrefHookManager, PrefListener};
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> prefsync::Result<()> {
//! let bridge = Arc::new(MemoryBridge::with_prefs([("brave.show_clock", json!(false))]));
//! let manager = PrefHookManager::new(bridge.clone());
//! manager.ready().await?;
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let listener: PrefListener = Arc::new(move |key, new, _old| {
//!     sink.lock().unwrap().push(format!("{key}={new}"));
//! });
//! manager.add_pref_listener("brave.show_clock", listener);
//!
//! // Writes go to the service; the cache follows its push
//! manager.save_pref("brave.show_clock", json!(true)).await?;
//! # for _ in 0..8 { tokio::task::yield_now().await; }
//! assert_eq!(manager.get_pref("brave.show_clock"), Some(json!(true)));
//! assert_eq!(*seen.lock().unwrap(), vec!["brave.show_clock=true"]);
//! # Ok(())
//! # }
//! ```
//!
//! ### Persisting Page State
//!
//! ```rust
//! use prefsync::pages::new_tab::{ClockFormat, NewTabAction, NewTabState};
//! use prefsync::{load_state, MemoryStore, PageStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> prefsync::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let mut page = PageStore::<NewTabState>::new(store.clone(), Duration::from_millis(100));
//!
//! page.dispatch(NewTabAction::SetClockFormat(ClockFormat::H24));
//! page.shutdown().await?;
//!
//! let reloaded: NewTabState = load_state(&*store);
//! assert_eq!(reloaded.clock_format, ClockFormat::H24);
//! # Ok(())
//! # }
//! ```
//!
//! ### Querying Preferences
//!
//! ```rust
//! use prefsync::{query_preferences, PrefSnapshot};
//! use serde_json::json;
//!
//! let mut snapshot = PrefSnapshot::new();
//! snapshot.insert("brave.wallet.default_wallet".to_string(), json!(2));
//! snapshot.insert("brave.wallet.show_balances".to_string(), json!(true));
//! snapshot.insert("browser.search.region".to_string(), json!("US"));
//!
//! let wallet_prefs = query_preferences(&snapshot, &["brave.wallet.*"])?;
//! assert_eq!(wallet_prefs.len(), 2);
//! # Ok::<(), prefsync::Error>(())
//! ```

// Internal modules
mod bridge;
mod caching;
mod config;
mod debounce;
mod error;
mod hook;
mod listeners;
mod manager;
mod query;
mod reducer;
mod storage;
mod types;

pub mod news;
pub mod pages;

// Public API exports
pub use bridge::{JsonFileBridge, MemoryBridge, PreferenceBridge};
pub use caching::{CacheListener, CachingWrapper, EntitySource};
pub use config::SyncConfig;
pub use debounce::{debounce, Debouncer};
pub use error::{Error, Result};
pub use hook::{use_pref, PrefHook};
pub use manager::{PrefHookManager, PrefListener};
pub use news::{ChannelCache, NewsController, PublisherCache};
pub use pages::PageKind;
pub use query::query_preferences;
pub use reducer::{PageState, PageStore};
pub use storage::{
    clear_state, load_state, save_state, DebouncedStore, FileStore, LocalStore, MemoryStore,
    PersistedState,
};
pub use types::{EntityMap, LoadState, PrefSnapshot, PrefValue};
