//! Page state containers pairing a reducer with debounced storage
//!
//! A [`PageStore`] touches storage only when it is first used: the first
//! [`dispatch`](PageStore::dispatch) or [`state`](PageStore::state) call
//! hydrates the page from its stored item. Every action is followed by a
//! debounced save of the page's persistable subset.

use crate::error::Result;
use crate::storage::{load_state, DebouncedStore, LocalStore, PersistedState};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Page state with a reducer
pub trait PageState: PersistedState {
    type Action;

    fn reduce(&mut self, action: Self::Action);
}

/// Lazily hydrated page state that saves itself after every action
pub struct PageStore<S: PageState> {
    store: Arc<dyn LocalStore>,
    saver: DebouncedStore<S>,
    state: Option<S>,
}

impl<S: PageState> PageStore<S> {
    /// Must be created inside a tokio runtime. Does not read storage.
    pub fn new(store: Arc<dyn LocalStore>, interval: Duration) -> Self {
        let saver = DebouncedStore::new(Arc::clone(&store), interval);
        Self {
            store,
            saver,
            state: None,
        }
    }

    /// Apply `action` and queue a save
    pub fn dispatch(&mut self, action: S::Action) -> &S {
        let state = hydrate(&mut self.state, self.store.as_ref());
        state.reduce(action);
        self.saver.save(state);
        state
    }

    /// Current state, hydrating it on first use
    pub fn state(&mut self) -> &S {
        hydrate(&mut self.state, self.store.as_ref())
    }

    pub fn is_hydrated(&self) -> bool {
        self.state.is_some()
    }

    /// Write a pending save now; `true` if there was one
    pub async fn flush_now(&self) -> bool {
        self.saver.flush_now().await
    }

    /// Write a pending save and stop the writer
    pub async fn shutdown(self) -> Result<()> {
        self.saver.shutdown().await
    }
}

fn hydrate<'a, S: PersistedState>(slot: &'a mut Option<S>, store: &dyn LocalStore) -> &'a mut S {
    slot.get_or_insert_with(|| {
        debug!(key = S::STORAGE_KEY, "hydrating page state");
        load_state::<S>(store)
    })
}
