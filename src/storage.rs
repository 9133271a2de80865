//! Local string store and persisted page state
//!
//! [`LocalStore`] is the `localStorage`-shaped boundary: string values
//! under string keys. On top of it, a [`PersistedState`] is hydrated by
//! shallow-merging the stored JSON object over the page's default state,
//! and saved as its pruned, persistable subset, either immediately
//! ([`save_state`]) or through a [`DebouncedStore`].

use crate::debounce::{debounce, Debouncer};
use crate::error::{Error, Result};
use crate::types::lock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Browser-local key/value store of strings
pub trait LocalStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

/// Store kept in memory; contents are lost with the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.items).get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.items).insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        lock(&self.items).remove(key);
        Ok(())
    }
}

/// Store that keeps each item in `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// The directory is created on the first write
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn item_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidStorageKey(key.to_string()))
    }
}

impl LocalStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let path = self.item_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let path = self.item_path(key)?;
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so readers never see a half-written item.
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let path = self.item_path(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Page state persisted as JSON under a fixed key
pub trait PersistedState: Serialize + DeserializeOwned + Default + 'static {
    /// Key of this page in the local store
    const STORAGE_KEY: &'static str;

    /// The subset of the state written to storage
    ///
    /// Defaults to the whole state; pages with transient fields override it.
    fn persistable(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Load page state: stored JSON shallow-merged over the default
///
/// A missing item yields the default. Unreadable or malformed data is
/// logged and also yields the default; this never fails.
pub fn load_state<S: PersistedState>(store: &dyn LocalStore) -> S {
    let raw = match store.get_item(S::STORAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return S::default(),
        Err(e) => {
            warn!(key = S::STORAGE_KEY, error = %e, "failed to read stored state, using defaults");
            return S::default();
        }
    };

    match hydrate::<S>(&raw) {
        Ok(state) => state,
        Err(e) => {
            warn!(key = S::STORAGE_KEY, error = %e, "stored state is malformed, using defaults");
            S::default()
        }
    }
}

fn hydrate<S: PersistedState>(raw: &str) -> Result<S> {
    let stored: Value = serde_json::from_str(raw)?;
    let mut merged = serde_json::to_value(S::default())?;

    match (&mut merged, stored) {
        (Value::Object(defaults), Value::Object(overrides)) => {
            for (key, value) in overrides {
                defaults.insert(key, value);
            }
        }
        (_, other) => {
            return Err(Error::InvalidState(format!(
                "{} holds {} instead of an object",
                S::STORAGE_KEY,
                json_kind(&other)
            )));
        }
    }

    Ok(serde_json::from_value(merged)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Write the persistable subset of `state` now
pub fn save_state<S: PersistedState>(store: &dyn LocalStore, state: &S) -> Result<()> {
    let value = state.persistable()?;
    store.set_item(S::STORAGE_KEY, &serde_json::to_string(&value)?)
}

/// Remove the stored page state
pub fn clear_state<S: PersistedState>(store: &dyn LocalStore) -> Result<()> {
    store.remove_item(S::STORAGE_KEY)
}

/// Debounced writer of one page's persistable state
pub struct DebouncedStore<S> {
    debouncer: Debouncer<Value>,
    _state: PhantomData<fn(&S)>,
}

impl<S: PersistedState> DebouncedStore<S> {
    /// Must be created inside a tokio runtime
    pub fn new(store: Arc<dyn LocalStore>, interval: Duration) -> Self {
        let key = S::STORAGE_KEY;
        let debouncer = debounce(
            move |value: Value| write_value(store.as_ref(), key, &value),
            interval,
        );
        Self {
            debouncer,
            _state: PhantomData,
        }
    }

    /// Queue the persistable subset of `state` for writing
    pub fn save(&self, state: &S) {
        match state.persistable() {
            Ok(value) => self.debouncer.call(value),
            Err(e) => warn!(key = S::STORAGE_KEY, error = %e, "failed to prune state for saving"),
        }
    }

    /// Write the pending state now; `true` if there was one
    pub async fn flush_now(&self) -> bool {
        self.debouncer.flush_now().await
    }

    /// Write the pending state and stop the writer
    pub async fn shutdown(self) -> Result<()> {
        self.debouncer.shutdown().await
    }
}

fn write_value(store: &dyn LocalStore, key: &str, value: &Value) {
    let result = serde_json::to_string(value)
        .map_err(Error::from)
        .and_then(|json| store.set_item(key, &json));
    match result {
        Ok(()) => debug!(key, "persisted page state"),
        Err(e) => warn!(key, error = %e, "failed to persist page state"),
    }
}
