//! Materialized analysis results
//!
//! Append-only points-to store and call graph, shared across all queries.

pub mod call_graph;
pub mod points_to_graph;

pub use call_graph::{CallGraph, Edge};
pub use points_to_graph::{PointsToGraph, PointsToLocation};
