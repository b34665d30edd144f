//! Identity-keyed state guarded by the controller's single mutex.
//!
//! Pure bookkeeping: nothing here calls into tasks or observers, so the lock
//! is never held across user code.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use super::observer::{ObserverId, Observe};
use crate::tasks::TaskHandle;

pub(super) struct Registry<V> {
    /// Current task per identity.
    slots: HashMap<Arc<str>, TaskHandle>,
    /// Observers per identity, independent of whether a task exists.
    observers: HashMap<Arc<str>, HashMap<ObserverId, Weak<dyn Observe<V>>>>,
}

impl<V> Registry<V> {
    pub(super) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            observers: HashMap::new(),
        }
    }

    /// Registers `task` under `id`, returning the task it replaces.
    pub(super) fn admit(&mut self, id: Arc<str>, task: TaskHandle) -> Option<TaskHandle> {
        self.slots.insert(id, task)
    }

    /// Removes the entry for `id` only if it still holds `task`.
    pub(super) fn evict(&mut self, id: &str, task: &TaskHandle) -> bool {
        if self.slots.get(id).is_some_and(|current| current == task) {
            self.slots.remove(id);
            return true;
        }
        false
    }

    pub(super) fn get(&self, id: &str) -> Option<&TaskHandle> {
        self.slots.get(id)
    }

    pub(super) fn tasks(&self) -> Vec<TaskHandle> {
        self.slots.values().cloned().collect()
    }

    pub(super) fn ids(&self) -> Vec<Arc<str>> {
        self.slots.keys().cloned().collect()
    }

    pub(super) fn drain_tasks(&mut self) -> Vec<TaskHandle> {
        self.slots.drain().map(|(_, task)| task).collect()
    }

    pub(super) fn add_observer(&mut self, id: Arc<str>, key: ObserverId, observer: Weak<dyn Observe<V>>) {
        self.observers.entry(id).or_default().insert(key, observer);
    }

    pub(super) fn remove_observer(&mut self, id: &str, key: ObserverId) -> bool {
        let Some(map) = self.observers.get_mut(id) else {
            return false;
        };
        let removed = map.remove(&key).is_some();
        if map.is_empty() {
            self.observers.remove(id);
        }
        removed
    }

    pub(super) fn remove_observers_for(&mut self, id: &str) {
        self.observers.remove(id);
    }

    pub(super) fn clear_observers(&mut self) {
        self.observers.clear();
    }

    /// Alive observers of `id`; dead registrations are pruned on the way.
    pub(super) fn observers_of(&mut self, id: &str) -> Vec<Arc<dyn Observe<V>>> {
        let Some(map) = self.observers.get_mut(id) else {
            return Vec::new();
        };
        let mut alive = Vec::with_capacity(map.len());
        map.retain(|_, weak| match weak.upgrade() {
            Some(observer) => {
                alive.push(observer);
                true
            }
            None => false,
        });
        if map.is_empty() {
            self.observers.remove(id);
        }
        alive
    }

    #[cfg(test)]
    pub(super) fn observer_count(&self, id: &str) -> usize {
        self.observers.get(id).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskResult;

    struct Quiet(ObserverId);

    impl Observe<u8> for Quiet {
        fn observer_id(&self) -> ObserverId {
            self.0
        }

        fn on_completed(&self, _task: &TaskHandle, _result: &TaskResult<u8>) {}
    }

    fn weak(observer: &Arc<Quiet>) -> Weak<dyn Observe<u8>> {
        let weak: Weak<Quiet> = Arc::downgrade(observer);
        weak
    }

    #[test]
    fn admit_returns_replaced_task() {
        let mut reg = Registry::<u8>::new();
        let first = TaskHandle::new();
        let second = TaskHandle::new();
        assert!(reg.admit("a".into(), first.clone()).is_none());
        assert_eq!(reg.admit("a".into(), second.clone()), Some(first.clone()));

        assert!(!reg.evict("a", &first), "stale task must not evict its successor");
        assert!(reg.evict("a", &second));
        assert!(reg.get("a").is_none());
    }

    #[test]
    fn dead_observers_are_pruned() {
        let mut reg = Registry::<u8>::new();
        let kept = Arc::new(Quiet(ObserverId::new(1)));
        let gone = Arc::new(Quiet(ObserverId::new(2)));
        reg.add_observer("a".into(), kept.0, weak(&kept));
        reg.add_observer("a".into(), gone.0, weak(&gone));
        drop(gone);

        assert_eq!(reg.observers_of("a").len(), 1);
        assert_eq!(reg.observer_count("a"), 1);
        assert!(reg.remove_observer("a", ObserverId::new(1)));
        assert_eq!(reg.observer_count("a"), 0);
    }
}
