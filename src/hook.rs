//! Reactive single-preference cell
//!
//! [`use_pref`] binds one key of a [`PrefHookManager`] to a [`PrefHook`]:
//! a readable value that follows change notifications and a setter that
//! writes through the manager. The hook unregisters its listener when it
//! is dropped or rebound to another key.

use crate::error::{Error, Result};
use crate::manager::{PrefHookManager, PrefListener};
use crate::types::PrefValue;
use std::sync::Arc;
use tokio::sync::watch;

/// Read/write handle on one preference
pub struct PrefHook {
    manager: Arc<PrefHookManager>,
    key: String,
    current: Arc<watch::Sender<Option<PrefValue>>>,
    rx: watch::Receiver<Option<PrefValue>>,
    listener: PrefListener,
}

/// Bind `key` of `manager` to a reactive cell
///
/// # Example
///
/// ```rust
/// use prefsync::{use_pref, MemoryBridge, PrefHookManager};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> prefsync::Result<()> {
/// let bridge = Arc::new(MemoryBridge::with_prefs([("show_clock", json!(false))]));
/// let manager = PrefHookManager::new(bridge);
/// manager.ready().await?;
///
/// let mut show_clock = use_pref(&manager, "show_clock");
/// assert_eq!(show_clock.value(), Some(json!(false)));
///
/// show_clock.set(json!(true)).await?;
/// // The value only changes once the service echoes the write back
/// assert_eq!(show_clock.changed().await?, Some(json!(true)));
/// # Ok(())
/// # }
/// ```
pub fn use_pref(manager: &Arc<PrefHookManager>, key: &str) -> PrefHook {
    let (tx, rx) = watch::channel(None);
    let current = Arc::new(tx);

    let sink = Arc::clone(&current);
    let listener: PrefListener = Arc::new(move |_key, new, _old| {
        sink.send_replace(Some(new.clone()));
    });

    let mut hook = PrefHook {
        manager: Arc::clone(manager),
        key: key.to_string(),
        current,
        rx,
        listener,
    };
    hook.bind();
    hook
}

impl PrefHook {
    /// Current value; `None` means not loaded yet, not an unset preference
    pub fn value(&self) -> Option<PrefValue> {
        self.rx.borrow().clone()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Save through the manager. [`value`](Self::value) is unchanged until
    /// the service pushes the write back.
    pub async fn set(&self, value: PrefValue) -> Result<()> {
        self.manager.save_pref(&self.key, value).await
    }

    /// Wait for the next change notification and return the new value
    pub async fn changed(&mut self) -> Result<Option<PrefValue>> {
        self.rx
            .changed()
            .await
            .map_err(|_| Error::TaskStopped("preference hook sender dropped".to_string()))?;
        Ok(self.rx.borrow_and_update().clone())
    }

    /// Move the hook to another key
    pub fn set_key(&mut self, key: &str) {
        if key == self.key {
            return;
        }
        self.unbind();
        self.key = key.to_string();
        self.bind();
    }

    fn bind(&mut self) {
        let value = self
            .manager
            .subscribe_with_current(&self.key, Arc::clone(&self.listener));
        self.current.send_replace(value);
        let _ = self.rx.borrow_and_update();
    }

    fn unbind(&self) {
        self.manager.remove_pref_listener(&self.key, &self.listener);
    }
}

impl Drop for PrefHook {
    fn drop(&mut self) {
        self.unbind();
    }
}
