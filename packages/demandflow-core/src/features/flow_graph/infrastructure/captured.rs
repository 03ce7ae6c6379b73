//! Captured-variable analysis
//!
//! Computes, per function, the set of free variable names (used directly or
//! by transitively nested functions without a local binding). A variable
//! written in a scope and free in a nested function is captured by that
//! function's closures, which matters for interprocedural propagation.

use crate::features::flow_graph::domain::{FlowGraph, FuncId, NodeId, NodeKind};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Memoized free-variable sets over one flow graph.
#[derive(Debug)]
pub struct CapturedVariables {
    graph: Arc<FlowGraph>,
    cache: Mutex<FxHashMap<FuncId, Arc<FxHashSet<String>>>>,
}

impl CapturedVariables {
    pub fn new(graph: Arc<FlowGraph>) -> Self {
        Self {
            graph,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Function declarations in `context` whose functions capture `name`.
    pub fn functions_capturing_var_in(&self, context: FuncId, name: &str) -> Vec<NodeId> {
        self.graph
            .nodes_of(context)
            .filter_map(|node| match &node.kind {
                NodeKind::DeclareFunction { function, .. }
                    if self.free_variables_in(*function).contains(name) =>
                {
                    Some(node.id)
                }
                _ => None,
            })
            .collect()
    }

    /// Whether `name` occurs free in `func`.
    pub fn variable_used_in(&self, name: &str, func: FuncId) -> bool {
        self.free_variables_in(func).contains(name)
    }

    /// Free variable names of `func`, including those of nested functions.
    pub fn free_variables_in(&self, func: FuncId) -> Arc<FxHashSet<String>> {
        if let Some(cached) = self.cache.lock().get(&func) {
            return cached.clone();
        }
        let computed = Arc::new(self.compute_free_variables(func));
        self.cache.lock().insert(func, computed.clone());
        computed
    }

    fn compute_free_variables(&self, func: FuncId) -> FxHashSet<String> {
        let bound = self.bound_variables_in(func);
        let mut free = FxHashSet::default();
        for node in self.graph.nodes_of(func) {
            match &node.kind {
                NodeKind::ReadVariable { name, .. }
                | NodeKind::WriteVariable { name, .. }
                | NodeKind::Catch { name } => {
                    if !bound.contains(name.as_str()) {
                        free.insert(name.clone());
                    }
                }
                // Names free in a nested function body are free here too,
                // unless bound by this scope.
                NodeKind::DeclareFunction { function, .. } => {
                    for name in self.free_variables_in(*function).iter() {
                        if !bound.contains(name.as_str()) {
                            free.insert(name.clone());
                        }
                    }
                }
                _ => {}
            }
        }
        free
    }

    fn bound_variables_in(&self, func: FuncId) -> FxHashSet<String> {
        let function = self.graph.function(func);
        let mut bound: FxHashSet<String> = function.params.iter().cloned().collect();
        bound.extend(function.declared_vars.iter().cloned());
        if let Some(name) = &function.name {
            bound.insert(name.clone());
        }
        bound
    }
}
