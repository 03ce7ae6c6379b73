//! Live-collection views
//!
//! Read-side abstraction over live sets plus lazy `filter`/`map` adapters.
//! Adapters forward subscriptions to their source, so the replay-then-live
//! guarantee carries through a whole adapter chain.

use super::handler::{SubscriptionTag, TaggedHandler};
use super::live_set::{LiveElement, LiveSet};
use std::sync::Arc;

/// Anything that can deliver elements to tagged handlers.
pub trait LiveCollection<T, I>: Send + Sync {
    fn subscribe(&self, handler: TaggedHandler<T, I>);
}

impl<T: LiveElement, I: SubscriptionTag> LiveCollection<T, I> for LiveSet<T, I> {
    fn subscribe(&self, handler: TaggedHandler<T, I>) {
        self.on_add(handler);
    }
}

/// A lazily filtered/mapped view of another collection.
pub struct FilterMapped<S, T, I> {
    source: Arc<dyn LiveCollection<S, I>>,
    transform: Arc<dyn Fn(&S) -> Option<T> + Send + Sync>,
}

impl<S, T, I> LiveCollection<T, I> for FilterMapped<S, T, I>
where
    S: LiveElement,
    T: LiveElement,
    I: SubscriptionTag,
{
    fn subscribe(&self, handler: TaggedHandler<T, I>) {
        let transform = self.transform.clone();
        let callback = handler.callback();
        self.source.subscribe(TaggedHandler::new(handler.tag, move |item: &S| {
            if let Some(mapped) = transform(item) {
                callback(&mapped);
            }
        }));
    }
}

/// Build a filtered/mapped view over `source`.
pub fn filter_map<S, T, I>(
    source: Arc<dyn LiveCollection<S, I>>,
    transform: impl Fn(&S) -> Option<T> + Send + Sync + 'static,
) -> Arc<dyn LiveCollection<T, I>>
where
    S: LiveElement,
    T: LiveElement,
    I: SubscriptionTag,
{
    Arc::new(FilterMapped {
        source,
        transform: Arc::new(transform),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::live_collections::scheduler::Scheduler;
    use parking_lot::Mutex;

    #[test]
    fn test_filter_map_view_sees_replay_and_live() {
        let scheduler = Arc::new(Scheduler::new());
        let set: Arc<LiveSet<u32, &'static str>> = LiveSet::create(scheduler.clone());
        set.add(1);
        set.add(2);
        set.add(3);

        let evens_doubled = filter_map(set.clone() as Arc<dyn LiveCollection<u32, _>>, |n| {
            (n % 2 == 0).then_some(n * 2)
        });
        let sink = Arc::new(Mutex::new(Vec::new()));
        let sink2 = sink.clone();
        evens_doubled.subscribe(TaggedHandler::new("t", move |n: &u32| sink2.lock().push(*n)));
        scheduler.run_to_quiescence();
        assert_eq!(*sink.lock(), vec![4]);

        set.add(4);
        scheduler.run_to_quiescence();
        assert_eq!(*sink.lock(), vec![4, 8]);
    }
}
