//! Append-only reactive set
//!
//! The backbone of sub-query result delivery. Elements are deduplicated and
//! kept in discovery order. A handler registered after N elements exist is
//! delivered each of the N exactly once, then exactly once per subsequent
//! addition (replay-then-live). Deliveries run as scheduler jobs, never
//! inline, so adding to a set from inside a handler cannot recurse.

use super::handler::{SubscriptionTag, TaggedHandler};
use super::scheduler::Scheduler;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::hash::Hash;
use std::sync::Arc;

/// Element requirements: cheap to clone, hashable, shareable across jobs.
pub trait LiveElement: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> LiveElement for T {}

struct LiveSetInner<T, I> {
    items: Vec<T>,
    seen: FxHashSet<T>,
    handlers: Vec<TaggedHandler<T, I>>,
    tags: FxHashSet<I>,
}

/// An incrementally populated, append-only set with replay-then-live
/// subscription.
pub struct LiveSet<T, I> {
    scheduler: Arc<Scheduler>,
    inner: Mutex<LiveSetInner<T, I>>,
}

impl<T: LiveElement, I: SubscriptionTag> LiveSet<T, I> {
    pub fn create(scheduler: Arc<Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            scheduler,
            inner: Mutex::new(LiveSetInner {
                items: Vec::new(),
                seen: FxHashSet::default(),
                handlers: Vec::new(),
                tags: FxHashSet::default(),
            }),
        })
    }

    /// Add an element; returns whether it was new. Every registered handler
    /// is scheduled exactly once for a new element.
    pub fn add(&self, item: T) -> bool {
        let handlers: Vec<TaggedHandler<T, I>> = {
            let mut inner = self.inner.lock();
            if !inner.seen.insert(item.clone()) {
                return false;
            }
            inner.items.push(item.clone());
            inner.handlers.clone()
        };
        for handler in handlers {
            self.schedule(handler, item.clone());
        }
        true
    }

    /// Register a handler. Prior elements are replayed in discovery order;
    /// a handler whose tag is already registered is dropped.
    pub fn on_add(&self, handler: TaggedHandler<T, I>) {
        let replay: Vec<T> = {
            let mut inner = self.inner.lock();
            if !inner.tags.insert(handler.tag.clone()) {
                return;
            }
            inner.handlers.push(handler.clone());
            inner.items.clone()
        };
        for item in replay {
            self.schedule(handler.clone(), item);
        }
    }

    /// Snapshot of the current contents, in discovery order.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().items.clone()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.inner.lock().seen.contains(item)
    }

    pub fn current_size(&self) -> usize {
        self.inner.lock().items.len()
    }

    fn schedule(&self, handler: TaggedHandler<T, I>, item: T) {
        let callback = handler.callback();
        self.scheduler.enqueue(move || callback(&item));
    }
}

impl<T, I> std::fmt::Debug for LiveSet<T, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSet").finish_non_exhaustive()
    }
}
