//! Tagged subscription handlers
//!
//! A handler's tag identifies the (query, sub-query, origin) combination
//! that registered it. Registering a second handler with an equal tag on
//! the same collection is a no-op, which is what keeps structurally
//! identical sub-queries raised from different program points from
//! multiplying deliveries.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// Requirements on handler tags.
pub trait SubscriptionTag: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> SubscriptionTag for T {}

/// A callback paired with its identifying tag.
pub struct TaggedHandler<T, I> {
    pub tag: I,
    run: Arc<dyn Fn(&T) + Send + Sync>,
}

impl<T, I: SubscriptionTag> TaggedHandler<T, I> {
    pub fn new(tag: I, run: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self { tag, run: Arc::new(run) }
    }

    #[inline]
    pub fn call(&self, item: &T) {
        (self.run)(item)
    }

    /// The raw callback, shareable across scheduled deliveries.
    #[inline]
    pub(crate) fn callback(&self) -> Arc<dyn Fn(&T) + Send + Sync> {
        self.run.clone()
    }
}

impl<T, I: Clone> Clone for TaggedHandler<T, I> {
    fn clone(&self) -> Self {
        Self { tag: self.tag.clone(), run: self.run.clone() }
    }
}

impl<T, I: fmt::Debug> fmt::Debug for TaggedHandler<T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedHandler").field("tag", &self.tag).finish()
    }
}
