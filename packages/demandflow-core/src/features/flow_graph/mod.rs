//! Flow-graph abstraction consumed by the analysis
//!
//! Per function: entry/exit points, parameter and declared-variable names,
//! an instruction kind per program point, and predecessor/successor
//! adjacency (successors explicit, predecessors derived and memoized).

pub mod domain;
pub mod infrastructure;

pub use domain::{
    CallSite, FlowGraph, FlowNode, FuncId, Function, NodeId, NodeKind, PropertyKey, Register,
};
pub use infrastructure::{
    declaring_scope, CapturedVariables, FlowGraphBuilder, SyntacticRefs,
};
