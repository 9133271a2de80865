use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// A single preference value (bool, string, number or a small object)
pub type PrefValue = serde_json::Value;

/// Full preference state as pushed by the preference service
///
/// Immutable by convention: every push replaces the previous snapshot.
pub type PrefSnapshot = BTreeMap<String, PrefValue>;

/// Cached entity collection keyed by entity id
pub type EntityMap<E> = HashMap<String, E>;

/// Outcome of a component's construction-time fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum LoadState {
    /// The fetch has not resolved yet
    Pending,
    /// At least one fetch succeeded
    Ready,
    /// The fetch failed and nothing has been loaded since
    Failed(String),
    /// The component was torn down before the fetch resolved
    Stopped,
}

/// Observable load state shared between a component and its background
/// fetch task
#[derive(Debug)]
pub(crate) struct Readiness {
    tx: watch::Sender<LoadState>,
}

impl Readiness {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(LoadState::Pending);
        Self { tx }
    }

    pub(crate) fn mark_ready(&self) {
        self.tx.send_if_modified(|state| {
            if *state == LoadState::Ready {
                false
            } else {
                *state = LoadState::Ready;
                true
            }
        });
    }

    /// A failure never downgrades a component that already loaded.
    pub(crate) fn mark_failed(&self, message: String) {
        self.tx.send_if_modified(|state| {
            if *state == LoadState::Ready {
                false
            } else {
                *state = LoadState::Failed(message);
                true
            }
        });
    }

    /// Settle a still-pending state after the fetch task was cancelled
    pub(crate) fn mark_stopped(&self) {
        self.tx.send_if_modified(|state| {
            if *state == LoadState::Pending {
                *state = LoadState::Stopped;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn state(&self) -> LoadState {
        self.tx.borrow().clone()
    }

    /// Wait until the state leaves `Pending`
    pub(crate) async fn settled(&self) -> LoadState {
        let mut rx = self.tx.subscribe();
        let state = match rx.wait_for(|state| *state != LoadState::Pending).await {
            Ok(state) => state.clone(),
            Err(_) => LoadState::Failed("load state channel closed".to_string()),
        };
        state
    }
}

/// Lock a std mutex, recovering the data if a listener panicked while
/// another thread held it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
