use anyhow::{anyhow, bail, Context};
use prefsync::{
    query_preferences, use_pref, FileStore, JsonFileBridge, PageKind, PrefHookManager,
    PrefListener, PrefSnapshot, PreferenceBridge, PrefValue, SyncConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Longest wait for a saved preference to come back from the file
const SET_ECHO_TIMEOUT: Duration = Duration::from_secs(5);

/// Print preferences, optionally filtered by glob patterns
pub async fn list_prefs(config: &SyncConfig, query_patterns: &[&str]) -> anyhow::Result<()> {
    let snapshot = read_prefs(config).await?;

    let output = if query_patterns.is_empty() {
        snapshot
    } else {
        query_preferences(&snapshot, query_patterns).context("Failed to apply query")?
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Print a single preference in raw format
pub async fn get_pref(config: &SyncConfig, key: &str) -> anyhow::Result<()> {
    let snapshot = read_prefs(config).await?;
    match snapshot.get(key) {
        Some(value) => {
            output_raw_value(value);
            Ok(())
        }
        None => Err(anyhow!("Preference '{}' not found", key)),
    }
}

/// Write a preference and wait until the synced cache reports it
pub async fn set_pref(config: &SyncConfig, key: &str, raw_value: &str) -> anyhow::Result<()> {
    let value = parse_value(raw_value);
    let manager = open_manager(config).await?;

    let mut hook = use_pref(&manager, key);
    if hook.value().as_ref() == Some(&value) {
        debug!(key, "preference already has this value");
        output_raw_value(&value);
        return Ok(());
    }

    hook.set(value)
        .await
        .with_context(|| format!("Failed to save preference '{}'", key))?;
    let synced = tokio::time::timeout(SET_ECHO_TIMEOUT, hook.changed())
        .await
        .map_err(|_| anyhow!("Timed out waiting for '{}' to sync", key))??;

    match synced {
        Some(value) => output_raw_value(&value),
        None => bail!("Preference '{}' disappeared after saving", key),
    }
    Ok(())
}

/// Print changes of the matching preferences until Ctrl-C
///
/// The set of watched keys is fixed when the command starts.
pub async fn watch_prefs(config: &SyncConfig, query_patterns: &[&str]) -> anyhow::Result<()> {
    let bridge = Arc::new(JsonFileBridge::new(&config.prefs_file));
    let watcher = bridge.spawn_watcher(config.poll_interval());
    let manager = PrefHookManager::new(bridge);
    manager
        .ready()
        .await
        .with_context(|| format!("Failed to read {}", config.prefs_file.display()))?;

    let snapshot = manager.snapshot().unwrap_or_default();
    let watched = if query_patterns.is_empty() {
        snapshot
    } else {
        query_preferences(&snapshot, query_patterns).context("Failed to apply query")?
    };
    if watched.is_empty() {
        watcher.abort();
        bail!("No preferences match the query");
    }

    let listener: PrefListener = Arc::new(|key, new, old| {
        let old = old.map_or_else(|| "unset".to_string(), PrefValue::to_string);
        println!("{key}: {old} -> {new}");
    });
    for key in watched.keys() {
        manager.add_pref_listener(key, Arc::clone(&listener));
    }
    info!(
        keys = watched.len(),
        path = %config.prefs_file.display(),
        "watching preferences"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    watcher.abort();
    manager.teardown();
    Ok(())
}

/// Print a page's hydrated state
pub fn show_state(config: &SyncConfig, page: PageKind) -> anyhow::Result<()> {
    let store = FileStore::new(&config.storage_dir);
    let state = page
        .load_json(&store)
        .with_context(|| format!("Failed to load {} state", page))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Delete a page's stored state
pub fn reset_state(config: &SyncConfig, page: PageKind) -> anyhow::Result<()> {
    let store = FileStore::new(&config.storage_dir);
    page.reset(&store).with_context(|| {
        format!(
            "Failed to reset {} state in {}",
            page,
            config.storage_dir.display()
        )
    })?;
    println!("Reset {} state ({})", page, page.storage_key());
    Ok(())
}

async fn read_prefs(config: &SyncConfig) -> anyhow::Result<PrefSnapshot> {
    JsonFileBridge::new(&config.prefs_file)
        .get_all()
        .await
        .with_context(|| {
            format!(
                "Failed to read preferences from {}. The file must hold a JSON object.",
                config.prefs_file.display()
            )
        })
}

async fn open_manager(config: &SyncConfig) -> anyhow::Result<Arc<PrefHookManager>> {
    let manager = PrefHookManager::new(Arc::new(JsonFileBridge::new(&config.prefs_file)));
    manager
        .ready()
        .await
        .with_context(|| format!("Failed to read {}", config.prefs_file.display()))?;
    Ok(manager)
}

/// JSON if it parses, a plain string otherwise
fn parse_value(raw: &str) -> PrefValue {
    serde_json::from_str(raw).unwrap_or_else(|_| PrefValue::String(raw.to_string()))
}

/// Output a single preference value in raw format (no JSON wrapping)
fn output_raw_value(value: &PrefValue) {
    match value {
        PrefValue::String(s) => println!("{}", s),
        PrefValue::Bool(b) => println!("{}", b),
        PrefValue::Number(n) => println!("{}", n),
        PrefValue::Null => println!("null"),
        PrefValue::Array(_) | PrefValue::Object(_) => {
            // Complex types still output as JSON
            println!("{}", value);
        }
    }
}
