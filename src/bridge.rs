//! Preference bridge
//!
//! A two-way channel to the service that owns preferences: read the full
//! snapshot, write one key, and receive the full snapshot again whenever
//! anything changes. [`MemoryBridge`] keeps the preferences in process;
//! [`JsonFileBridge`] keeps them in a JSON object file and can poll it for
//! edits made by other processes.

use crate::error::{Error, Result};
use crate::types::{lock, PrefSnapshot, PrefValue};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the push channel. Each message is a full snapshot, so a
/// lagging subscriber only needs the newest one.
const PUSH_CHANNEL_CAPACITY: usize = 64;

/// Access to an external preference service
#[async_trait]
pub trait PreferenceBridge: Send + Sync {
    /// Fetch the complete current preference snapshot
    async fn get_all(&self) -> Result<PrefSnapshot>;

    /// Write one preference; the change comes back through [`subscribe`](Self::subscribe)
    async fn save(&self, key: &str, value: PrefValue) -> Result<()>;

    /// Register for change pushes; every message is the entire new snapshot
    fn subscribe(&self) -> broadcast::Receiver<PrefSnapshot>;
}

/// In-process preference service
///
/// # Example
///
/// ```rust
/// use prefsync::{MemoryBridge, PreferenceBridge};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> prefsync::Result<()> {
/// let bridge = MemoryBridge::with_prefs([("search.suggest", json!(true))]);
/// let mut pushes = bridge.subscribe();
///
/// bridge.save("search.suggest", json!(false)).await?;
/// let snapshot = pushes.recv().await.unwrap();
/// assert_eq!(snapshot["search.suggest"], json!(false));
/// # Ok(())
/// # }
/// ```
pub struct MemoryBridge {
    prefs: Mutex<PrefSnapshot>,
    fail_next_get_all: Mutex<Option<String>>,
    tx: broadcast::Sender<PrefSnapshot>,
}

impl MemoryBridge {
    pub fn new() -> Self {
        Self::from_snapshot(PrefSnapshot::new())
    }

    pub fn from_snapshot(snapshot: PrefSnapshot) -> Self {
        let (tx, _rx) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            prefs: Mutex::new(snapshot),
            fail_next_get_all: Mutex::new(None),
            tx,
        }
    }

    pub fn with_prefs<K, I>(prefs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PrefValue)>,
    {
        Self::from_snapshot(prefs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Replace the whole preference state as if another client changed it,
    /// and push it to subscribers
    pub fn push(&self, snapshot: PrefSnapshot) {
        *lock(&self.prefs) = snapshot.clone();
        self.broadcast(snapshot);
    }

    /// Make the next [`get_all`](PreferenceBridge::get_all) fail with `message`
    pub fn fail_next_get_all(&self, message: impl Into<String>) {
        *lock(&self.fail_next_get_all) = Some(message.into());
    }

    /// Current service-side state
    pub fn current(&self) -> PrefSnapshot {
        lock(&self.prefs).clone()
    }

    fn broadcast(&self, snapshot: PrefSnapshot) {
        // No subscribers is not an error for the service.
        let receivers = self.tx.send(snapshot).unwrap_or(0);
        debug!(receivers, "pushed preference snapshot");
    }
}

impl Default for MemoryBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreferenceBridge for MemoryBridge {
    async fn get_all(&self) -> Result<PrefSnapshot> {
        if let Some(message) = lock(&self.fail_next_get_all).take() {
            return Err(Error::Bridge(message));
        }
        Ok(self.current())
    }

    async fn save(&self, key: &str, value: PrefValue) -> Result<()> {
        let snapshot = {
            let mut prefs = lock(&self.prefs);
            prefs.insert(key.to_string(), value);
            prefs.clone()
        };
        self.broadcast(snapshot);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PrefSnapshot> {
        self.tx.subscribe()
    }
}

/// Preference service backed by a JSON object file
///
/// A missing file reads as an empty snapshot. Writes are read-modify-write
/// of the whole file.
pub struct JsonFileBridge {
    inner: Arc<FileInner>,
}

struct FileInner {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
    last_seen: Mutex<Option<PrefSnapshot>>,
    tx: broadcast::Sender<PrefSnapshot>,
}

impl JsonFileBridge {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (tx, _rx) = broadcast::channel(PUSH_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(FileInner {
                path: path.into(),
                write_lock: tokio::sync::Mutex::new(()),
                last_seen: Mutex::new(None),
                tx,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Poll the file every `interval` and push a snapshot whenever its
    /// content differs from the last one seen. Unreadable or malformed
    /// content is logged and skipped.
    pub fn spawn_watcher(&self, interval: Duration) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match read_snapshot(&inner.path).await {
                    Ok(snapshot) => inner.publish_if_changed(snapshot),
                    Err(e) => {
                        warn!(
                            path = %inner.path.display(),
                            error = %e,
                            "failed to poll preferences file"
                        )
                    }
                }
            }
        })
    }
}

impl FileInner {
    fn publish_if_changed(&self, snapshot: PrefSnapshot) {
        let changed = {
            let mut last_seen = lock(&self.last_seen);
            if last_seen.as_ref() == Some(&snapshot) {
                false
            } else {
                *last_seen = Some(snapshot.clone());
                true
            }
        };
        if changed {
            let receivers = self.tx.send(snapshot).unwrap_or(0);
            debug!(path = %self.path.display(), receivers, "preferences file changed");
        }
    }
}

async fn read_snapshot(path: &Path) -> Result<PrefSnapshot> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(PrefSnapshot::new()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PrefSnapshot::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl PreferenceBridge for JsonFileBridge {
    async fn get_all(&self) -> Result<PrefSnapshot> {
        let snapshot = read_snapshot(&self.inner.path).await?;
        *lock(&self.inner.last_seen) = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn save(&self, key: &str, value: PrefValue) -> Result<()> {
        let snapshot = {
            let _guard = self.inner.write_lock.lock().await;
            let mut snapshot = read_snapshot(&self.inner.path).await?;
            snapshot.insert(key.to_string(), value);

            if let Some(parent) = self.inner.path.parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
            let json = serde_json::to_string_pretty(&snapshot)?;
            tokio::fs::write(&self.inner.path, json).await?;
            snapshot
        };

        debug!(key, path = %self.inner.path.display(), "saved preference");
        self.inner.publish_if_changed(snapshot);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PrefSnapshot> {
        self.inner.tx.subscribe()
    }
}
