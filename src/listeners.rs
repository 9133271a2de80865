//! Ordered listener registry
//!
//! Listeners are stored as `Arc`s and identified by allocation, so the
//! same callback handle that was registered is the one that removes it.

use std::sync::Arc;

/// Listeners in registration order
pub(crate) struct ListenerSet<L: ?Sized> {
    entries: Vec<Arc<L>>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, listener: Arc<L>) {
        self.entries.push(listener);
    }

    /// Remove the first registration of `listener`; `false` if it was not registered
    pub(crate) fn remove(&mut self, listener: &Arc<L>) -> bool {
        let position = self
            .entries
            .iter()
            .position(|entry| std::ptr::addr_eq(Arc::as_ptr(entry), Arc::as_ptr(listener)));

        match position {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Clone out the current listeners so they can be called without holding a lock
    pub(crate) fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries.clone()
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Callback = dyn Fn(&mut Vec<&'static str>) + Send + Sync;

    #[test]
    fn test_invocation_follows_registration_order() {
        let mut set: ListenerSet<Callback> = ListenerSet::new();
        set.add(Arc::new(|log: &mut Vec<&'static str>| log.push("first")));
        set.add(Arc::new(|log: &mut Vec<&'static str>| log.push("second")));

        let mut log = Vec::new();
        for listener in set.snapshot() {
            listener(&mut log);
        }
        assert_eq!(log, vec!["first", "second"]);
    }

    #[test]
    fn test_remove_twice_reports_true_then_false() {
        let mut set: ListenerSet<Callback> = ListenerSet::new();
        let listener: Arc<Callback> = Arc::new(|_: &mut Vec<&'static str>| {});
        set.add(listener.clone());

        assert!(set.remove(&listener));
        assert!(!set.remove(&listener));
        assert!(set.is_empty());
    }

    #[test]
    fn test_remove_uses_identity_not_behavior() {
        let hits = Arc::new(Mutex::new(0));
        let make = |hits: Arc<Mutex<i32>>| -> Arc<dyn Fn() + Send + Sync> {
            Arc::new(move || *hits.lock().unwrap() += 1)
        };
        let a = make(hits.clone());
        let b = make(hits.clone());

        let mut set: ListenerSet<dyn Fn() + Send + Sync> = ListenerSet::new();
        set.add(a.clone());

        assert!(!set.remove(&b));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&a));
    }

    #[test]
    fn test_duplicate_registration_removed_one_at_a_time() {
        let mut set: ListenerSet<dyn Fn() + Send + Sync> = ListenerSet::new();
        let listener: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});
        set.add(listener.clone());
        set.add(listener.clone());

        assert!(set.remove(&listener));
        assert_eq!(set.len(), 1);
        assert!(set.remove(&listener));
        assert!(!set.remove(&listener));
    }
}
