//! Syntactic shortcuts
//!
//! Two purely syntactic searches that let the demand-driven engine skip
//! data-flow exploration: discovery of reads referring to a named function,
//! and static resolution of a variable read to function declarations when
//! the name is provably never reassigned.

use crate::features::flow_graph::domain::{FlowGraph, FuncId, NodeId, NodeKind};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::warn;

/// Memoized syntactic searches over one flow graph.
#[derive(Debug)]
pub struct SyntacticRefs {
    graph: Arc<FlowGraph>,
    max_visited: usize,
    reference_cache: Mutex<FxHashMap<FuncId, Arc<Vec<NodeId>>>>,
    assigned_names: Mutex<Option<Arc<FxHashSet<String>>>>,
}

impl SyntacticRefs {
    pub fn new(graph: Arc<FlowGraph>, max_visited: usize) -> Self {
        Self {
            graph,
            max_visited,
            reference_cache: Mutex::new(FxHashMap::default()),
            assigned_names: Mutex::new(None),
        }
    }

    /// Variable reads that refer to the given named function, found by a
    /// forward walk from the declaring scope's entry. Nested functions are
    /// descended into unless a parameter shadows the name.
    pub fn references_to_function_name(&self, func: FuncId) -> Arc<Vec<NodeId>> {
        if let Some(cached) = self.reference_cache.lock().get(&func) {
            return cached.clone();
        }
        let computed = Arc::new(self.collect_references(func));
        self.reference_cache.lock().insert(func, computed.clone());
        computed
    }

    fn collect_references(&self, func: FuncId) -> Vec<NodeId> {
        let Some(name) = self.graph.function(func).name.clone() else {
            return Vec::new(); // unnamed function expression
        };
        let Some(decl) = self.graph.function(func).decl_site else {
            return Vec::new();
        };
        let mut references = Vec::new();
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(self.graph.function_of(decl).entry);
        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if visited.len() > self.max_visited {
                warn!(function = %func, "reference search aborted: node budget exhausted");
                break;
            }
            let node = self.graph.node(node_id);
            match &node.kind {
                NodeKind::ReadVariable { name: read, .. } if *read == name => {
                    references.push(node_id);
                }
                NodeKind::DeclareFunction { function, .. } => {
                    let nested = self.graph.function(*function);
                    if !nested.params.iter().any(|p| *p == name) {
                        queue.push_back(nested.entry);
                    }
                }
                _ => {}
            }
            queue.extend(self.graph.successors_of(node_id));
        }
        references
    }

    /// Statically resolve a variable read to function declarations.
    ///
    /// Sound only when the name is never the target of a variable write
    /// anywhere in the program; otherwise resolution is left to the
    /// data-flow engine and this returns nothing.
    pub fn read_var_to_functions(&self, read: NodeId) -> Vec<FuncId> {
        let node = self.graph.node(read);
        let NodeKind::ReadVariable { name, .. } = &node.kind else {
            return Vec::new();
        };
        if self.assigned_names().contains(name.as_str()) {
            return Vec::new();
        }
        let mut scope = Some(node.func);
        while let Some(func_id) = scope {
            let function = self.graph.function(func_id);
            if function.binds(name) {
                return Vec::new(); // bound as a parameter or plain variable
            }
            let declared: Vec<FuncId> = self
                .graph
                .nodes_of(func_id)
                .filter_map(|n| match &n.kind {
                    NodeKind::DeclareFunction { function, .. }
                        if self.graph.function(*function).name.as_deref() == Some(name) =>
                    {
                        Some(*function)
                    }
                    _ => None,
                })
                .collect();
            if !declared.is_empty() {
                return declared;
            }
            scope = function.outer;
        }
        Vec::new()
    }

    fn assigned_names(&self) -> Arc<FxHashSet<String>> {
        let mut guard = self.assigned_names.lock();
        guard
            .get_or_insert_with(|| {
                let names = self
                    .graph
                    .nodes()
                    .filter_map(|n| match &n.kind {
                        NodeKind::WriteVariable { name, .. } => Some(name.clone()),
                        _ => None,
                    })
                    .collect();
                Arc::new(names)
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::domain::Register;
    use crate::features::flow_graph::infrastructure::builder::FlowGraphBuilder;

    fn graph_with_named_function() -> (Arc<FlowGraph>, FuncId, NodeId) {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        let f = b.begin_function(Some("f"), &[], main);
        b.append(main, NodeKind::DeclareFunction { function: f, result: None });
        let read = b.append(
            main,
            NodeKind::ReadVariable {
                name: "f".into(),
                result: Register::new(3, main),
                result_base: None,
            },
        );
        (Arc::new(b.build().unwrap()), f, read)
    }

    #[test]
    fn test_references_to_function_name() {
        let (graph, f, read) = graph_with_named_function();
        let refs = SyntacticRefs::new(graph, 10_000);
        assert_eq!(refs.references_to_function_name(f).as_slice(), &[read]);
    }

    #[test]
    fn test_read_var_resolves_to_unassigned_function() {
        let (graph, f, read) = graph_with_named_function();
        let refs = SyntacticRefs::new(graph, 10_000);
        assert_eq!(refs.read_var_to_functions(read), vec![f]);
    }

    #[test]
    fn test_reassigned_name_is_not_resolved() {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        let f = b.begin_function(Some("f"), &[], main);
        b.append(main, NodeKind::DeclareFunction { function: f, result: None });
        b.append(
            main,
            NodeKind::WriteVariable { name: "f".into(), value: Register::new(4, main) },
        );
        let read = b.append(
            main,
            NodeKind::ReadVariable {
                name: "f".into(),
                result: Register::new(5, main),
                result_base: None,
            },
        );
        let graph = Arc::new(b.build().unwrap());
        let refs = SyntacticRefs::new(graph, 10_000);
        assert!(refs.read_var_to_functions(read).is_empty());
    }
}
