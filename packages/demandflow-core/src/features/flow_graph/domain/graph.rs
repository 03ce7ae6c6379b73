//! The flow graph consumed by the analysis
//!
//! Front ends provide functions, program points and successor edges; the
//! predecessor relation is derived by inversion and memoized per function,
//! so demand-driven queries only ever pay for the functions they visit.

use super::function::Function;
use super::node::{FlowNode, FuncId, NodeId, NodeKind};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Immutable program representation plus lazily derived adjacency.
#[derive(Debug)]
pub struct FlowGraph {
    functions: Vec<Function>,
    nodes: Vec<FlowNode>,
    successors: FxHashMap<NodeId, Vec<NodeId>>,
    /// Per-function predecessor maps, inverted from `successors` on first use.
    predecessor_cache: Mutex<FxHashMap<FuncId, Arc<FxHashMap<NodeId, Vec<NodeId>>>>>,
}

impl FlowGraph {
    pub(crate) fn from_parts(
        functions: Vec<Function>,
        nodes: Vec<FlowNode>,
        successors: FxHashMap<NodeId, Vec<NodeId>>,
    ) -> Self {
        Self {
            functions,
            nodes,
            successors,
            predecessor_cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// The outermost (top-level) function.
    pub fn main(&self) -> &Function {
        // Function 0 is always the top level, enforced by the builder.
        &self.functions[0]
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &FlowNode {
        &self.nodes[id.0 as usize]
    }

    #[inline]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    #[inline]
    pub fn function_of(&self, id: NodeId) -> &Function {
        self.function(self.node(id).func)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.iter()
    }

    pub fn nodes_of(&self, func: FuncId) -> impl Iterator<Item = &FlowNode> + '_ {
        self.function(func).nodes.iter().map(|id| self.node(*id))
    }

    /// All call sites of the program.
    pub fn call_nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Call(_)))
    }

    /// All property-access points (reads, writes and unresolved method
    /// calls), the sites where alias queries may be raised.
    pub fn property_access_nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.iter().filter(|n| match &n.kind {
            NodeKind::ReadProperty { .. } | NodeKind::WriteProperty { .. } => true,
            NodeKind::Call(call) => call.function_register.is_none() && call.host_hook.is_none(),
            _ => false,
        })
    }

    pub fn successors_of(&self, id: NodeId) -> Vec<NodeId> {
        self.successors.get(&id).cloned().unwrap_or_default()
    }

    pub fn predecessors_of(&self, id: NodeId) -> Vec<NodeId> {
        let func = self.node(id).func;
        let map = self.predecessor_map(func);
        map.get(&id).cloned().unwrap_or_default()
    }

    /// The inverted successor relation of one function, built once.
    fn predecessor_map(&self, func: FuncId) -> Arc<FxHashMap<NodeId, Vec<NodeId>>> {
        let mut cache = self.predecessor_cache.lock();
        cache
            .entry(func)
            .or_insert_with(|| {
                let mut inverse: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
                for node_id in &self.function(func).nodes {
                    if let Some(succs) = self.successors.get(node_id) {
                        for succ in succs {
                            inverse.entry(*succ).or_default().push(*node_id);
                        }
                    }
                }
                Arc::new(inverse)
            })
            .clone()
    }

    /// Find a function by its source-level name.
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
    }
}

#[cfg(test)]
mod tests {
    use crate::features::flow_graph::infrastructure::builder::FlowGraphBuilder;
    use crate::features::flow_graph::domain::node::{NodeKind, Register};

    #[test]
    fn test_predecessors_are_inverted_successors() {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        let r0 = Register::new(0, main);
        let n1 = b.append(main, NodeKind::Constant { result: r0 });
        let n2 = b.append(main, NodeKind::Nop);
        let n3 = b.append(main, NodeKind::Nop);
        b.edge(n1, n3); // diamond shortcut
        let graph = b.build().unwrap();

        assert_eq!(graph.successors_of(n1), vec![n2, n3]);
        let mut preds = graph.predecessors_of(n3);
        preds.sort();
        assert_eq!(preds, vec![n1, n2]);
    }

    #[test]
    fn test_main_has_no_outer_scope() {
        let b = FlowGraphBuilder::new();
        let graph = b.build().unwrap();
        assert!(graph.main().is_main());
        assert!(graph.main().decl_site.is_none());
    }
}
