//! Keyed live sets

use super::handler::SubscriptionTag;
use super::live_set::{LiveElement, LiveSet};
use super::scheduler::Scheduler;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::hash::Hash;
use std::sync::Arc;

/// A map from keys to [`LiveSet`]s, created on first access so handlers can
/// subscribe to a key before anything is known about it.
pub struct LiveMap<K, V, I> {
    scheduler: Arc<Scheduler>,
    backing: Mutex<FxHashMap<K, Arc<LiveSet<V, I>>>>,
}

impl<K, V, I> LiveMap<K, V, I>
where
    K: Clone + Eq + Hash,
    V: LiveElement,
    I: SubscriptionTag,
{
    pub fn create(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            backing: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn put(&self, key: K, value: V) -> bool {
        self.get(key).add(value)
    }

    /// The live set for `key`, created empty if absent.
    pub fn get(&self, key: K) -> Arc<LiveSet<V, I>> {
        self.backing
            .lock()
            .entry(key)
            .or_insert_with(|| LiveSet::create(self.scheduler.clone()))
            .clone()
    }

    pub fn values(&self) -> Vec<Arc<LiveSet<V, I>>> {
        self.backing.lock().values().cloned().collect()
    }
}

impl<K, V, I> std::fmt::Debug for LiveMap<K, V, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMap").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_before_first_put() {
        let scheduler = Arc::new(Scheduler::new());
        let map: LiveMap<&'static str, u32, u8> = LiveMap::create(scheduler.clone());
        let set = map.get("k");
        map.put("k", 42);
        scheduler.run_to_quiescence();
        assert!(set.contains(&42));
        assert_eq!(map.get("k").current_size(), 1);
    }
}
