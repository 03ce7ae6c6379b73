//! Reactive, append-only containers
//!
//! The substrate that lets queries depend on each other (including
//! cyclically) without deadlock: results are delivered into live sets and
//! handlers fire exactly once per (tag, element), for elements added both
//! before and after registration.

pub mod collection;
pub mod handler;
pub mod live_map;
pub mod live_set;
pub mod scheduler;

pub use collection::{filter_map, FilterMapped, LiveCollection};
pub use handler::{SubscriptionTag, TaggedHandler};
pub use live_map::LiveMap;
pub use live_set::{LiveElement, LiveSet};
pub use scheduler::Scheduler;
