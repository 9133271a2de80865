//! Whole-collection entity cache with optimistic updates
//!
//! [`CachingWrapper`] loads an entire entity collection from a remote
//! [`EntitySource`], answers reads synchronously from memory and tells
//! listeners about every new version of the collection. Domain caches
//! (see [`crate::news`]) build their mutations on
//! [`CachingWrapper::update_optimistic`], which applies a change locally,
//! broadcasts it, and rolls it back if the remote write fails.

use crate::error::{Error, Result};
use crate::listeners::ListenerSet;
use crate::types::{lock, EntityMap, LoadState, Readiness};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Remote "fetch the whole collection" endpoint
#[async_trait]
pub trait EntitySource<E>: Send + Sync {
    async fn fetch_all(&self) -> Result<EntityMap<E>>;
}

/// Callback receiving the full collection after every change
pub type CacheListener<E> = Arc<dyn Fn(&EntityMap<E>) + Send + Sync>;

/// Cached copy of a remote entity collection
///
/// Cloning shares the same cache.
pub struct CachingWrapper<E> {
    shared: Arc<Shared<E>>,
}

struct Shared<E> {
    source: Arc<dyn EntitySource<E>>,
    state: Mutex<CacheState<E>>,
    readiness: Readiness,
}

struct CacheState<E> {
    entities: EntityMap<E>,
    issued: u64,
    applied: u64,
    /// Sequence number of the last local write to each entity; cleared
    /// when a fetch replaces the collection
    writes: HashMap<String, u64>,
    write_seq: u64,
    listeners: ListenerSet<dyn Fn(&EntityMap<E>) + Send + Sync>,
}

impl<E: Clone> CacheState<E> {
    fn store(&mut self, id: &str, entity: E) -> u64 {
        self.write_seq += 1;
        self.entities.insert(id.to_string(), entity);
        self.writes.insert(id.to_string(), self.write_seq);
        self.write_seq
    }

    fn last_write(&self, id: &str) -> Option<u64> {
        self.writes.get(id).copied()
    }

    fn publish(&self) -> (Vec<CacheListener<E>>, EntityMap<E>) {
        (self.listeners.snapshot(), self.entities.clone())
    }
}

impl<E> Clone for CachingWrapper<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> CachingWrapper<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Start loading the collection in the background.
    ///
    /// Must be called inside a tokio runtime. Reads return nothing until
    /// the fetch resolves; [`ready`](Self::ready) waits for it.
    pub fn new(source: Arc<dyn EntitySource<E>>) -> Self {
        let wrapper = Self {
            shared: Arc::new(Shared {
                source,
                state: Mutex::new(CacheState {
                    entities: EntityMap::new(),
                    issued: 0,
                    applied: 0,
                    writes: HashMap::new(),
                    write_seq: 0,
                    listeners: ListenerSet::new(),
                }),
                readiness: Readiness::new(),
            }),
        };
        wrapper.spawn_refresh();
        wrapper
    }

    /// Cached entity, `None` if unknown or not loaded yet
    pub fn get(&self, id: &str) -> Option<E> {
        lock(&self.shared.state).entities.get(id).cloned()
    }

    /// Current collection, plus a background refetch.
    ///
    /// The returned map is whatever is cached right now; it does not
    /// reflect the refetch this call starts. Use [`refresh`](Self::refresh)
    /// to wait for fresh data.
    pub fn get_all(&self) -> EntityMap<E> {
        self.spawn_refresh();
        self.entities()
    }

    /// Current collection without triggering a fetch
    pub fn entities(&self) -> EntityMap<E> {
        lock(&self.shared.state).entities.clone()
    }

    /// Refetch and wait for the result
    pub async fn refresh(&self) -> Result<EntityMap<E>> {
        self.shared.fetch().await
    }

    /// Wait for the initial fetch; the error is the fetch failure, if any
    pub async fn ready(&self) -> Result<()> {
        match self.shared.readiness.settled().await {
            LoadState::Failed(message) => Err(Error::Remote(message)),
            LoadState::Stopped => Err(Error::TaskStopped("entity cache stopped".to_string())),
            LoadState::Ready | LoadState::Pending => Ok(()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.readiness.state() == LoadState::Ready
    }

    pub fn add_listener(&self, listener: CacheListener<E>) {
        lock(&self.shared.state).listeners.add(listener);
    }

    /// `true` iff `listener` was registered
    pub fn remove_listener(&self, listener: &CacheListener<E>) -> bool {
        lock(&self.shared.state).listeners.remove(listener)
    }

    /// Replace one entity locally and notify listeners
    pub fn replace(&self, id: &str, entity: E) {
        let (listeners, entities) = {
            let mut state = lock(&self.shared.state);
            state.store(id, entity);
            state.publish()
        };
        notify(&listeners, &entities);
    }

    /// Store `entity` only if the last write to `id` is still `seq`
    fn replace_if_unchanged(&self, id: &str, seq: u64, entity: E) -> bool {
        let (listeners, entities) = {
            let mut state = lock(&self.shared.state);
            if state.last_write(id) != Some(seq) {
                return false;
            }
            state.store(id, entity);
            state.publish()
        };
        notify(&listeners, &entities);
        true
    }

    /// Two-phase update of one entity.
    ///
    /// 1. `mutate` is applied to a copy of the cached entity, the copy is
    ///    stored and listeners are notified.
    /// 2. `remote` is awaited. On success, a confirmed entity it returns
    ///    replaces the optimistic one. On failure the previous entity is
    ///    restored, listeners are notified again and the error is returned.
    ///
    /// Step 2 only writes if the cached entity is still the optimistic copy
    /// from step 1. A later update or a refetch of the same entity is never
    /// overwritten by this call's confirmation or rollback.
    pub async fn update_optimistic<F, Fut>(&self, id: &str, mutate: F, remote: Fut) -> Result<E>
    where
        F: FnOnce(&mut E),
        Fut: Future<Output = Result<Option<E>>>,
    {
        let previous = self
            .get(id)
            .ok_or_else(|| Error::UnknownEntity(id.to_string()))?;
        let mut optimistic = previous.clone();
        mutate(&mut optimistic);
        let (seq, listeners, entities) = {
            let mut state = lock(&self.shared.state);
            let seq = state.store(id, optimistic.clone());
            let (listeners, entities) = state.publish();
            (seq, listeners, entities)
        };
        notify(&listeners, &entities);

        match remote.await {
            Ok(Some(confirmed)) => {
                if !self.replace_if_unchanged(id, seq, confirmed.clone()) {
                    debug!(id, "entity changed while update was in flight, keeping newer value");
                }
                Ok(confirmed)
            }
            Ok(None) => Ok(optimistic),
            Err(e) => {
                if self.replace_if_unchanged(id, seq, previous) {
                    error!(id, error = %e, "remote update failed, rolled back");
                } else {
                    error!(id, error = %e, "remote update failed, newer value kept");
                }
                Err(e)
            }
        }
    }

    fn spawn_refresh(&self) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Err(e) = shared.fetch().await {
                error!(error = %e, "entity collection fetch failed");
            }
        });
    }
}

impl<E: Clone> Shared<E> {
    async fn fetch(&self) -> Result<EntityMap<E>> {
        let generation = {
            let mut state = lock(&self.state);
            state.issued += 1;
            state.issued
        };

        let fetched = match self.source.fetch_all().await {
            Ok(entities) => entities,
            Err(e) => {
                self.readiness.mark_failed(e.to_string());
                return Err(e);
            }
        };

        let (listeners, entities) = {
            let mut state = lock(&self.state);
            if generation < state.applied {
                // A fetch issued later has already landed.
                debug!(generation, applied = state.applied, "dropping stale fetch result");
                return Ok(state.entities.clone());
            }
            state.applied = generation;
            state.entities = fetched;
            state.writes.clear();
            state.publish()
        };

        debug!(generation, entities = entities.len(), "entity collection refreshed");
        self.readiness.mark_ready();
        notify(&listeners, &entities);
        Ok(entities)
    }
}

fn notify<E>(listeners: &[CacheListener<E>], entities: &EntityMap<E>) {
    for listener in listeners {
        listener(entities);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: String,
    }

    fn item(name: &str) -> Item {
        Item {
            name: name.to_string(),
        }
    }

    fn map(pairs: &[(&str, &str)]) -> EntityMap<Item> {
        pairs
            .iter()
            .map(|(id, name)| (id.to_string(), item(name)))
            .collect()
    }

    /// Each fetch waits for the next queued response
    struct ScriptedSource {
        responses: Mutex<VecDeque<oneshot::Receiver<Result<EntityMap<Item>>>>>,
    }

    impl ScriptedSource {
        fn new() -> (Arc<Self>, ScriptHandle) {
            let source = Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
            });
            let handle = ScriptHandle {
                source: source.clone(),
            };
            (source, handle)
        }
    }

    struct ScriptHandle {
        source: Arc<ScriptedSource>,
    }

    impl ScriptHandle {
        fn expect_fetch(&self) -> oneshot::Sender<Result<EntityMap<Item>>> {
            let (tx, rx) = oneshot::channel();
            self.source.responses.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl EntitySource<Item> for ScriptedSource {
        async fn fetch_all(&self) -> Result<EntityMap<Item>> {
            let rx = self.responses.lock().unwrap().pop_front();
            match rx {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(Error::Remote("script dropped".to_string()))),
                None => Err(Error::Remote("unexpected fetch".to_string())),
            }
        }
    }

    struct StaticSource(EntityMap<Item>);

    #[async_trait]
    impl EntitySource<Item> for StaticSource {
        async fn fetch_all(&self) -> Result<EntityMap<Item>> {
            Ok(self.0.clone())
        }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_get_before_and_after_first_fetch() {
        let (source, script) = ScriptedSource::new();
        let first = script.expect_fetch();
        let cache: CachingWrapper<Item> = CachingWrapper::new(source);

        assert_eq!(cache.get("p1"), None);
        assert!(!cache.is_loaded());

        first.send(Ok(map(&[("p1", "x")]))).unwrap();
        cache.ready().await.unwrap();

        assert_eq!(cache.get("p1"), Some(item("x")));
        assert!(cache.is_loaded());
    }

    #[tokio::test]
    async fn test_initial_fetch_failure_is_reported() {
        let (source, script) = ScriptedSource::new();
        let first = script.expect_fetch();
        let cache: CachingWrapper<Item> = CachingWrapper::new(source);

        first.send(Err(Error::Remote("offline".to_string()))).unwrap();
        let err = cache.ready().await.unwrap_err();
        assert!(matches!(err, Error::Remote(ref m) if m.contains("offline")));
        assert!(cache.entities().is_empty());
    }

    #[tokio::test]
    async fn test_get_all_returns_stale_and_refetches() {
        let (source, script) = ScriptedSource::new();
        script.expect_fetch().send(Ok(map(&[("a", "old")]))).unwrap();
        let cache: CachingWrapper<Item> = CachingWrapper::new(source);
        cache.ready().await.unwrap();

        let second = script.expect_fetch();
        let returned = cache.get_all();
        assert_eq!(returned["a"], item("old"));

        second.send(Ok(map(&[("a", "new")]))).unwrap();
        settle().await;
        assert_eq!(cache.get("a"), Some(item("new")));
    }

    #[tokio::test]
    async fn test_older_fetch_resolving_last_is_dropped() {
        let (source, script) = ScriptedSource::new();
        script.expect_fetch().send(Ok(map(&[("a", "v0")]))).unwrap();
        let cache: CachingWrapper<Item> = CachingWrapper::new(source);
        cache.ready().await.unwrap();

        let slow = script.expect_fetch();
        let fast = script.expect_fetch();
        let first_refresh = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh().await }
        });
        settle().await;
        let second_refresh = tokio::spawn({
            let cache = cache.clone();
            async move { cache.refresh().await }
        });
        settle().await;

        fast.send(Ok(map(&[("a", "v2")]))).unwrap();
        second_refresh.await.unwrap().unwrap();
        slow.send(Ok(map(&[("a", "v1")]))).unwrap();
        let result = first_refresh.await.unwrap().unwrap();

        assert_eq!(result["a"], item("v2"));
        assert_eq!(cache.get("a"), Some(item("v2")));
    }

    #[tokio::test]
    async fn test_listeners_receive_each_version() {
        let cache: CachingWrapper<Item> =
            CachingWrapper::new(Arc::new(StaticSource(map(&[("a", "x")]))));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: CacheListener<Item> = Arc::new(move |entities| {
            sink.lock().unwrap().push(entities.len());
        });
        cache.add_listener(listener.clone());

        cache.ready().await.unwrap();
        settle().await;
        cache.replace("b", item("y"));

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert!(cache.remove_listener(&listener));
        assert!(!cache.remove_listener(&listener));
    }

    #[tokio::test]
    async fn test_optimistic_update_applies_before_remote_confirms() {
        let cache: CachingWrapper<Item> =
            CachingWrapper::new(Arc::new(StaticSource(map(&[("a", "x")]))));
        cache.ready().await.unwrap();

        let (confirm_tx, confirm_rx) = oneshot::channel::<()>();
        let update = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .update_optimistic(
                        "a",
                        |entity| entity.name = "renamed".to_string(),
                        async move {
                            let _ = confirm_rx.await;
                            Ok::<Option<Item>, Error>(None)
                        },
                    )
                    .await
            })
        };
        settle().await;
        assert_eq!(cache.get("a"), Some(item("renamed")));

        confirm_tx.send(()).unwrap();
        assert_eq!(update.await.unwrap().unwrap(), item("renamed"));
    }

    #[tokio::test]
    async fn test_optimistic_update_rolls_back_on_failure() {
        let cache: CachingWrapper<Item> =
            CachingWrapper::new(Arc::new(StaticSource(map(&[("a", "x")]))));
        cache.ready().await.unwrap();

        let versions = Arc::new(Mutex::new(Vec::new()));
        let sink = versions.clone();
        cache.add_listener(Arc::new(move |entities: &EntityMap<Item>| {
            sink.lock().unwrap().push(entities["a"].name.clone());
        }));

        let result = cache
            .update_optimistic(
                "a",
                |entity| entity.name = "broken".to_string(),
                async { Err::<Option<Item>, Error>(Error::Remote("rejected".to_string())) },
            )
            .await;

        assert!(matches!(result, Err(Error::Remote(_))));
        assert_eq!(cache.get("a"), Some(item("x")));
        assert_eq!(*versions.lock().unwrap(), vec!["broken", "x"]);
    }

    /// Start an update whose remote call waits for `outcome`
    fn held_update(
        cache: &CachingWrapper<Item>,
        name: &'static str,
    ) -> (
        oneshot::Sender<Result<Option<Item>>>,
        tokio::task::JoinHandle<Result<Item>>,
    ) {
        let (outcome_tx, outcome_rx) = oneshot::channel::<Result<Option<Item>>>();
        let cache = cache.clone();
        let update = tokio::spawn(async move {
            cache
                .update_optimistic("a", |entity| entity.name = name.to_string(), async move {
                    outcome_rx
                        .await
                        .unwrap_or_else(|_| Err(Error::Remote("outcome dropped".to_string())))
                })
                .await
        });
        (outcome_tx, update)
    }

    #[tokio::test]
    async fn test_failed_update_keeps_later_successful_update() {
        let cache: CachingWrapper<Item> =
            CachingWrapper::new(Arc::new(StaticSource(map(&[("a", "x")]))));
        cache.ready().await.unwrap();

        let (first_outcome, first) = held_update(&cache, "A");
        settle().await;
        assert_eq!(cache.get("a"), Some(item("A")));

        cache
            .update_optimistic(
                "a",
                |entity| entity.name = "B".to_string(),
                async { Ok::<Option<Item>, Error>(None) },
            )
            .await
            .unwrap();
        assert_eq!(cache.get("a"), Some(item("B")));

        first_outcome
            .send(Err(Error::Remote("rejected".to_string())))
            .unwrap();
        assert!(matches!(first.await.unwrap(), Err(Error::Remote(_))));
        assert_eq!(cache.get("a"), Some(item("B")));
    }

    #[tokio::test]
    async fn test_late_confirmation_does_not_overwrite_newer_update() {
        let cache: CachingWrapper<Item> =
            CachingWrapper::new(Arc::new(StaticSource(map(&[("a", "x")]))));
        cache.ready().await.unwrap();

        let (first_outcome, first) = held_update(&cache, "A");
        settle().await;
        let (second_outcome, second) = held_update(&cache, "B");
        settle().await;
        assert_eq!(cache.get("a"), Some(item("B")));

        second_outcome.send(Ok(Some(item("B-server")))).unwrap();
        assert_eq!(second.await.unwrap().unwrap(), item("B-server"));

        first_outcome.send(Ok(Some(item("A-server")))).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), item("A-server"));
        assert_eq!(cache.get("a"), Some(item("B-server")));
    }

    #[tokio::test]
    async fn test_rollback_skipped_after_refetch() {
        let (source, script) = ScriptedSource::new();
        script.expect_fetch().send(Ok(map(&[("a", "x")]))).unwrap();
        let cache: CachingWrapper<Item> = CachingWrapper::new(source);
        cache.ready().await.unwrap();

        let (outcome, update) = held_update(&cache, "A");
        settle().await;
        script.expect_fetch().send(Ok(map(&[("a", "fresh")]))).unwrap();
        cache.refresh().await.unwrap();

        outcome
            .send(Err(Error::Remote("rejected".to_string())))
            .unwrap();
        assert!(update.await.unwrap().is_err());
        assert_eq!(cache.get("a"), Some(item("fresh")));
    }

    #[tokio::test]
    async fn test_optimistic_update_takes_confirmed_value() {
        let cache: CachingWrapper<Item> =
            CachingWrapper::new(Arc::new(StaticSource(map(&[("a", "x")]))));
        cache.ready().await.unwrap();

        let confirmed = cache
            .update_optimistic(
                "a",
                |entity| entity.name = "local".to_string(),
                async { Ok::<Option<Item>, Error>(Some(item("server"))) },
            )
            .await
            .unwrap();

        assert_eq!(confirmed, item("server"));
        assert_eq!(cache.get("a"), Some(item("server")));
    }

    #[tokio::test]
    async fn test_optimistic_update_unknown_entity() {
        let cache: CachingWrapper<Item> =
            CachingWrapper::new(Arc::new(StaticSource(EntityMap::new())));
        cache.ready().await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            cache.update_optimistic("ghost", |_| {}, async { Ok::<Option<Item>, Error>(None) }),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(Error::UnknownEntity(ref id)) if id == "ghost"));
    }
}
