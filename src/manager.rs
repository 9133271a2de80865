//! Preference snapshot cache with per-key change fan-out
//!
//! [`PrefHookManager`] holds the last snapshot pushed by a
//! [`PreferenceBridge`], diffs each new snapshot against it and notifies
//! the listeners registered for the keys that changed. Only keys with at
//! least one listener are compared, so the cost of a push is bounded by
//! the number of observed keys rather than the size of the snapshot.
//!
//! Writes go straight to the bridge. The cache is updated only when the
//! service pushes the new state back, so a saved value shows up in
//! [`PrefHookManager::get_pref`] one round-trip later.
//!
//! # Example
//!
//! ```rust
//! use prefsync::{MemoryBridge, PrefHookManager, PrefListener};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> prefsync::Result<()> {
//! let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1)), ("b", json!(2))]));
//! let manager = PrefHookManager::new(bridge.clone());
//!
//! // The seeding fetch has not resolved yet
//! assert_eq!(manager.get_pref("a"), None);
//! manager.ready().await?;
//! assert_eq!(manager.get_pref("a"), Some(json!(1)));
//!
//! let listener: PrefListener = Arc::new(|key, new, old| {
//!     println!("{key}: {old:?} -> {new}");
//! });
//! manager.add_pref_listener("a", listener.clone());
//! assert!(manager.remove_pref_listener("a", &listener));
//! # Ok(())
//! # }
//! ```

use crate::bridge::PreferenceBridge;
use crate::error::{Error, Result};
use crate::listeners::ListenerSet;
use crate::types::{lock, LoadState, PrefSnapshot, PrefValue, Readiness};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Callback invoked with `(key, new_value, old_value)`
///
/// `old_value` is `None` when the key had no value in the previous
/// snapshot (or no snapshot had arrived yet).
pub type PrefListener = Arc<dyn Fn(&str, &PrefValue, Option<&PrefValue>) + Send + Sync>;

type ListenerFn = dyn Fn(&str, &PrefValue, Option<&PrefValue>) + Send + Sync;

/// Last-known preference snapshot plus per-key listener registry
pub struct PrefHookManager {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Shared {
    bridge: Arc<dyn PreferenceBridge>,
    state: Mutex<CacheState>,
    readiness: Readiness,
}

#[derive(Default)]
struct CacheState {
    last: Option<PrefSnapshot>,
    pushed: bool,
    listeners: HashMap<String, ListenerSet<ListenerFn>>,
}

struct Notification {
    key: String,
    new: PrefValue,
    old: Option<PrefValue>,
    listeners: Vec<PrefListener>,
}

impl PrefHookManager {
    /// Subscribe to `bridge` and start the one-time seeding fetch.
    ///
    /// Must be called from within a tokio runtime. The constructor returns
    /// immediately; use [`ready`](Self::ready) to wait for (and observe the
    /// outcome of) the seeding fetch.
    pub fn new(bridge: Arc<dyn PreferenceBridge>) -> Arc<Self> {
        let shared = Arc::new(Shared {
            bridge,
            state: Mutex::new(CacheState::default()),
            readiness: Readiness::new(),
        });

        // Subscribe before seeding so no push between the two is missed.
        let pushes = shared.bridge.subscribe();
        let push_task = tokio::spawn(run_push_loop(Arc::clone(&shared), pushes));
        let seed_task = tokio::spawn(seed(Arc::clone(&shared)));

        Arc::new(Self {
            shared,
            tasks: Mutex::new(vec![push_task, seed_task]),
        })
    }

    /// Write one preference through to the service.
    ///
    /// The local cache is not touched; the new value becomes visible after
    /// the service pushes it back.
    pub async fn save_pref(&self, key: &str, value: PrefValue) -> Result<()> {
        debug!(key, "saving preference");
        self.shared.bridge.save(key, value).await
    }

    /// Value from the last received snapshot, `None` before the first one
    pub fn get_pref(&self, key: &str) -> Option<PrefValue> {
        lock(&self.shared.state)
            .last
            .as_ref()
            .and_then(|snapshot| snapshot.get(key).cloned())
    }

    /// The whole last received snapshot
    pub fn snapshot(&self) -> Option<PrefSnapshot> {
        lock(&self.shared.state).last.clone()
    }

    pub fn add_pref_listener(&self, key: &str, listener: PrefListener) {
        lock(&self.shared.state)
            .listeners
            .entry(key.to_string())
            .or_default()
            .add(listener);
    }

    /// Remove `listener` from `key`; `true` iff it was registered there
    pub fn remove_pref_listener(&self, key: &str, listener: &PrefListener) -> bool {
        let mut state = lock(&self.shared.state);
        let Some(set) = state.listeners.get_mut(key) else {
            return false;
        };
        let removed = set.remove(listener);
        if set.is_empty() {
            state.listeners.remove(key);
        }
        removed
    }

    pub fn listener_count(&self, key: &str) -> usize {
        lock(&self.shared.state)
            .listeners
            .get(key)
            .map_or(0, ListenerSet::len)
    }

    /// Register a listener and read the current value under the same lock,
    /// so no change can slip in between the read and the registration.
    pub(crate) fn subscribe_with_current(
        &self,
        key: &str,
        listener: PrefListener,
    ) -> Option<PrefValue> {
        let mut state = lock(&self.shared.state);
        state
            .listeners
            .entry(key.to_string())
            .or_default()
            .add(listener);
        state
            .last
            .as_ref()
            .and_then(|snapshot| snapshot.get(key).cloned())
    }

    /// Wait for the seeding fetch.
    ///
    /// Returns [`Error::Seed`] if it failed and no push has arrived since,
    /// or [`Error::TaskStopped`] if the manager was torn down first.
    pub async fn ready(&self) -> Result<()> {
        match self.shared.readiness.settled().await {
            LoadState::Failed(message) => Err(Error::Seed(message)),
            LoadState::Stopped => Err(Error::TaskStopped(
                "preference manager torn down before seeding".to_string(),
            )),
            LoadState::Ready | LoadState::Pending => Ok(()),
        }
    }

    pub fn load_state(&self) -> LoadState {
        self.shared.readiness.state()
    }

    /// Stop receiving pushes. The cached snapshot stays readable.
    ///
    /// A seeding fetch still in flight is cancelled and [`ready`](Self::ready)
    /// resolves with [`Error::TaskStopped`].
    pub fn teardown(&self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        self.shared.readiness.mark_stopped();
    }
}

impl Drop for PrefHookManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn seed(shared: Arc<Shared>) {
    match shared.bridge.get_all().await {
        Ok(snapshot) => {
            debug!(prefs = snapshot.len(), "seeded preference snapshot");
            shared.apply(snapshot, false);
        }
        Err(e) => {
            error!(error = %e, "initial preference fetch failed");
            shared.readiness.mark_failed(e.to_string());
        }
    }
}

async fn run_push_loop(shared: Arc<Shared>, mut pushes: broadcast::Receiver<PrefSnapshot>) {
    loop {
        match pushes.recv().await {
            Ok(snapshot) => shared.apply(snapshot, true),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // The next message is a newer full snapshot.
                warn!(skipped, "preference push channel lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("preference push channel closed");
                break;
            }
        }
    }
}

impl Shared {
    fn apply(&self, snapshot: PrefSnapshot, from_push: bool) {
        let notifications = {
            let mut state = lock(&self.state);
            if !from_push && state.pushed {
                // A push already delivered newer state than the seed.
                debug!("discarding stale seed snapshot");
                self.readiness.mark_ready();
                return;
            }
            state.pushed |= from_push;

            let notifications = diff_listened_keys(&state, &snapshot);
            state.last = Some(snapshot);
            notifications
        };

        self.readiness.mark_ready();

        for notification in notifications {
            for listener in &notification.listeners {
                listener(
                    &notification.key,
                    &notification.new,
                    notification.old.as_ref(),
                );
            }
        }
    }
}

fn diff_listened_keys(state: &CacheState, snapshot: &PrefSnapshot) -> Vec<Notification> {
    let previous = state.last.as_ref();
    state
        .listeners
        .iter()
        .filter_map(|(key, listeners)| {
            // Keys missing from the new snapshot count as unchanged.
            let new = snapshot.get(key)?;
            let old = previous.and_then(|last| last.get(key));
            if old == Some(new) {
                return None;
            }
            Some(Notification {
                key: key.clone(),
                new: new.clone(),
                old: old.cloned(),
                listeners: listeners.snapshot(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryBridge;
    use serde_json::json;
    use std::time::Duration;

    type Calls = Arc<Mutex<Vec<(String, PrefValue, Option<PrefValue>)>>>;

    fn recording_listener() -> (PrefListener, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let listener: PrefListener = Arc::new(move |key, new, old| {
            sink.lock()
                .unwrap()
                .push((key.to_string(), new.clone(), old.cloned()));
        });
        (listener, calls)
    }

    fn snapshot(pairs: &[(&str, PrefValue)]) -> PrefSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Let the push task drain the broadcast channel
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_get_pref_before_and_after_seed() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1)), ("b", json!(2))]));
        let manager = PrefHookManager::new(bridge);

        assert_eq!(manager.get_pref("a"), None);
        assert_eq!(manager.load_state(), LoadState::Pending);

        manager.ready().await.unwrap();
        assert_eq!(manager.get_pref("a"), Some(json!(1)));
        assert_eq!(manager.get_pref("b"), Some(json!(2)));
        assert_eq!(manager.get_pref("missing"), None);
    }

    #[tokio::test]
    async fn test_seed_failure_is_observable() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        bridge.fail_next_get_all("service unavailable");
        let manager = PrefHookManager::new(bridge);

        let err = manager.ready().await.unwrap_err();
        assert!(matches!(err, Error::Seed(ref m) if m.contains("service unavailable")));
        assert_eq!(manager.get_pref("a"), None);
    }

    #[tokio::test]
    async fn test_ready_returns_after_teardown_before_seed() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        let manager = PrefHookManager::new(bridge);
        manager.teardown();

        let outcome = tokio::time::timeout(Duration::from_secs(2), manager.ready())
            .await
            .expect("ready() must not hang after teardown");
        assert!(matches!(outcome, Err(Error::TaskStopped(_))));
        assert_eq!(manager.load_state(), LoadState::Stopped);
        assert_eq!(manager.get_pref("a"), None);
    }

    #[tokio::test]
    async fn test_teardown_after_seed_keeps_ready() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        let manager = PrefHookManager::new(bridge);
        manager.ready().await.unwrap();

        manager.teardown();
        manager.ready().await.unwrap();
        assert_eq!(manager.get_pref("a"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_push_after_failed_seed_recovers() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        bridge.fail_next_get_all("offline");
        let manager = PrefHookManager::new(bridge.clone());
        assert!(manager.ready().await.is_err());

        bridge.push(snapshot(&[("a", json!(5))]));
        settle().await;

        assert_eq!(manager.get_pref("a"), Some(json!(5)));
        manager.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_unlistened_keys_never_notify() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1)), ("b", json!(2))]));
        let manager = PrefHookManager::new(bridge.clone());
        manager.ready().await.unwrap();

        let (listener, calls) = recording_listener();
        manager.add_pref_listener("a", listener);

        bridge.push(snapshot(&[("a", json!(1)), ("b", json!(20))]));
        settle().await;

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(manager.get_pref("b"), Some(json!(20)));
    }

    #[tokio::test]
    async fn test_changed_key_notifies_with_new_and_old() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        let manager = PrefHookManager::new(bridge.clone());
        manager.ready().await.unwrap();

        let (listener, calls) = recording_listener();
        manager.add_pref_listener("a", listener);

        bridge.push(snapshot(&[("a", json!(2))]));
        settle().await;

        let calls = calls.lock().unwrap();
        assert_eq!(*calls, vec![("a".to_string(), json!(2), Some(json!(1)))]);
    }

    #[tokio::test]
    async fn test_structurally_equal_object_is_unchanged() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("o", json!({"x": [1, 2]}))]));
        let manager = PrefHookManager::new(bridge.clone());
        manager.ready().await.unwrap();

        let (listener, calls) = recording_listener();
        manager.add_pref_listener("o", listener);

        bridge.push(snapshot(&[("o", json!({"x": [1, 2]}))]));
        settle().await;
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_key_absent_from_new_snapshot_is_unchanged() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1)), ("b", json!(2))]));
        let manager = PrefHookManager::new(bridge.clone());
        manager.ready().await.unwrap();

        let (listener, calls) = recording_listener();
        manager.add_pref_listener("a", listener);

        bridge.push(snapshot(&[("b", json!(3))]));
        settle().await;

        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listener_registered_before_seed_sees_initial_values() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        let manager = PrefHookManager::new(bridge);

        let (listener, calls) = recording_listener();
        manager.add_pref_listener("a", listener);
        manager.ready().await.unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![("a".to_string(), json!(1), None)]
        );
    }

    #[tokio::test]
    async fn test_listeners_called_in_registration_order() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        let manager = PrefHookManager::new(bridge.clone());
        manager.ready().await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = order.clone();
            manager.add_pref_listener(
                "a",
                Arc::new(move |_, _, _| order.lock().unwrap().push(name)),
            );
        }

        bridge.push(snapshot(&[("a", json!(2))]));
        settle().await;
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_save_pref_has_no_synchronous_echo() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        let manager = PrefHookManager::new(bridge);
        manager.ready().await.unwrap();

        manager.save_pref("a", json!(9)).await.unwrap();
        assert_eq!(manager.get_pref("a"), Some(json!(1)));

        settle().await;
        assert_eq!(manager.get_pref("a"), Some(json!(9)));
    }

    #[tokio::test]
    async fn test_remove_listener_true_then_false() {
        let bridge = Arc::new(MemoryBridge::new());
        let manager = PrefHookManager::new(bridge);
        let (listener, _) = recording_listener();

        manager.add_pref_listener("a", listener.clone());
        assert_eq!(manager.listener_count("a"), 1);
        assert!(!manager.remove_pref_listener("b", &listener));
        assert!(manager.remove_pref_listener("a", &listener));
        assert!(!manager.remove_pref_listener("a", &listener));
        assert_eq!(manager.listener_count("a"), 0);
    }

    #[tokio::test]
    async fn test_listener_may_reenter_manager() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        let manager = PrefHookManager::new(bridge.clone());
        manager.ready().await.unwrap();

        let seen = Arc::new(Mutex::new(None));
        let weak = Arc::downgrade(&manager);
        let sink = seen.clone();
        manager.add_pref_listener(
            "a",
            Arc::new(move |key, _, _| {
                if let Some(manager) = weak.upgrade() {
                    *sink.lock().unwrap() = manager.get_pref(key);
                }
            }),
        );

        bridge.push(snapshot(&[("a", json!(3))]));
        settle().await;
        assert_eq!(*seen.lock().unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_teardown_stops_pushes() {
        let bridge = Arc::new(MemoryBridge::with_prefs([("a", json!(1))]));
        let manager = PrefHookManager::new(bridge.clone());
        manager.ready().await.unwrap();

        manager.teardown();
        settle().await;
        bridge.push(snapshot(&[("a", json!(2))]));
        settle().await;

        assert_eq!(manager.get_pref("a"), Some(json!(1)));
    }
}
