//! demandflow-core: demand-driven points-to and call-graph analysis
//!
//! Given a query (a program location, a value of interest and a direction)
//! the engine computes the least-fixpoint answer on demand: the allocation
//! sites a value may refer to, or the call sites that may invoke a
//! procedure. Results are memoized per query, accumulated monotonically in
//! shared stores, and sub-queries (including mutually recursive ones)
//! are answered through a reactive live-collection substrate instead of
//! blocking.
//!
//! The core consumes a flow-graph abstraction (see
//! [`features::flow_graph`]) produced by a front end; parsing, export and
//! command-line concerns live outside this crate.
//!
//! # Example
//!
//! ```
//! use demandflow_core::{AnalysisConfig, AnalysisContext, FlowGraphBuilder, NodeKind, Register};
//! use std::sync::Arc;
//!
//! // var x = {};  (desugared: r2 = new object; x = r2)
//! let mut b = FlowGraphBuilder::new();
//! let main = b.main_id();
//! b.declare_vars(main, &["x"]);
//! let r2 = Register::new(2, main);
//! let alloc = b.append(main, NodeKind::NewObject { result: r2 });
//! b.append(main, NodeKind::WriteVariable { name: "x".into(), value: r2 });
//! let read = b.append(
//!     main,
//!     NodeKind::ReadVariable { name: "x".into(), result: Register::new(3, main), result_base: None },
//! );
//!
//! let graph = Arc::new(b.build().unwrap());
//! let ctx = AnalysisContext::new(graph, AnalysisConfig::default());
//! let solver = ctx.solve_backward(read, Register::new(3, main)).unwrap();
//! let points_to = solver.points_to_snapshot();
//! assert!(points_to.iter().any(|a| a.site == alloc));
//! ```

pub mod config;
pub mod errors;
pub mod features;

pub use config::AnalysisConfig;
pub use errors::{DemandflowError, Result};
pub use features::automaton::{Rule, SyncPds, UnbalancedPop};
pub use features::facts::{AllocKind, Allocation, Property, SolverNode, Value, Variable};
pub use features::flow_graph::{
    CallSite, FlowGraph, FlowGraphBuilder, FlowNode, FuncId, Function, NodeId, NodeKind,
    PropertyKey, Register,
};
pub use features::live_collections::{LiveCollection, LiveMap, LiveSet, Scheduler, TaggedHandler};
pub use features::points_to::{CallGraph, Edge, PointsToGraph, PointsToLocation};
pub use features::solver::{AnalysisContext, Direction, Query, QueryDependencyGraph, QueryId, Solver};
