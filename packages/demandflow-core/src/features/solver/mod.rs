//! Query orchestration
//!
//! Queries, their memoizing manager, per-query solvers and the dependency
//! graph used for error attribution.

pub mod context;
pub mod dependency_graph;
pub mod query;
#[allow(clippy::module_inception)]
pub mod solver;

pub use context::AnalysisContext;
pub use dependency_graph::QueryDependencyGraph;
pub use query::{Direction, Query, QueryId};
pub use solver::Solver;
