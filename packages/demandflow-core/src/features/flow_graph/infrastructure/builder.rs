//! Programmatic flow-graph construction
//!
//! Used by front ends after desugaring, and by tests to assemble small
//! programs directly. Nodes appended to a function are chained sequentially;
//! branches are wired with explicit `edge` calls.

use crate::errors::{DemandflowError, Result};
use crate::features::flow_graph::domain::{
    FlowGraph, FlowNode, Function, FuncId, NodeId, NodeKind,
};
use rustc_hash::{FxHashMap, FxHashSet};

/// Builder for [`FlowGraph`].
///
/// The top-level function is created implicitly as function 0.
#[derive(Debug)]
pub struct FlowGraphBuilder {
    functions: Vec<Function>,
    nodes: Vec<FlowNode>,
    successors: FxHashMap<NodeId, Vec<NodeId>>,
    edge_set: FxHashSet<(NodeId, NodeId)>,
    /// Last appended node per function, the source of the next implicit edge.
    tails: FxHashMap<FuncId, NodeId>,
    returns: FxHashMap<FuncId, Vec<NodeId>>,
}

impl Default for FlowGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowGraphBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            functions: Vec::new(),
            nodes: Vec::new(),
            successors: FxHashMap::default(),
            edge_set: FxHashSet::default(),
            tails: FxHashMap::default(),
            returns: FxHashMap::default(),
        };
        builder.push_function(None, &[], None);
        builder
    }

    /// The implicit top-level function.
    #[inline]
    pub fn main_id(&self) -> FuncId {
        FuncId(0)
    }

    /// Start a new function lexically nested in `outer`. The entry point is
    /// created immediately; the exit point is added by [`Self::build`].
    pub fn begin_function(&mut self, name: Option<&str>, params: &[&str], outer: FuncId) -> FuncId {
        self.push_function(name, params, Some(outer))
    }

    /// Record `var`-declared names of a function.
    pub fn declare_vars(&mut self, func: FuncId, names: &[&str]) {
        let function = &mut self.functions[func.0 as usize];
        for name in names {
            if !function.declared_vars.iter().any(|v| v == name) {
                function.declared_vars.push((*name).to_string());
            }
        }
    }

    /// Append a node to `func`, chained after the previously appended one.
    pub fn append(&mut self, func: FuncId, kind: NodeKind) -> NodeId {
        let id = self.append_detached(func, kind);
        if let Some(tail) = self.tails.insert(func, id) {
            self.add_edge(tail, id);
        }
        id
    }

    /// Append a node without wiring it; callers connect it with [`Self::edge`].
    pub fn append_detached(&mut self, func: FuncId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        match &kind {
            NodeKind::DeclareFunction { function, .. } => {
                self.functions[function.0 as usize].decl_site = Some(id);
            }
            NodeKind::Return { value } => {
                self.returns.entry(func).or_default().push(id);
                let function = &mut self.functions[func.0 as usize];
                if function.return_register.is_none() {
                    function.return_register = *value;
                }
            }
            _ => {}
        }
        self.nodes.push(FlowNode { id, func, kind });
        self.functions[func.0 as usize].nodes.push(id);
        id
    }

    /// Add an explicit control-flow edge.
    pub fn edge(&mut self, from: NodeId, to: NodeId) {
        self.add_edge(from, to);
    }

    /// Seal every function with its exit point and validate the graph.
    pub fn build(mut self) -> Result<FlowGraph> {
        for idx in 0..self.functions.len() {
            let func = FuncId(idx as u32);
            let exit = self.append_detached(func, NodeKind::Exit);
            self.functions[idx].exit = exit;
            if let Some(tail) = self.tails.get(&func).copied() {
                self.add_edge(tail, exit);
            } else {
                let entry = self.functions[idx].entry;
                self.add_edge(entry, exit);
            }
            for ret in self.returns.remove(&func).unwrap_or_default() {
                self.add_edge(ret, exit);
            }
        }
        self.validate()?;
        Ok(FlowGraph::from_parts(self.functions, self.nodes, self.successors))
    }

    fn push_function(&mut self, name: Option<&str>, params: &[&str], outer: Option<FuncId>) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Function {
            id,
            name: name.map(str::to_string),
            params: params.iter().map(|p| p.to_string()).collect(),
            declared_vars: Vec::new(),
            outer,
            entry: NodeId(0),  // patched right below
            exit: NodeId(0),   // patched in build()
            nodes: Vec::new(),
            decl_site: None,
            return_register: None,
        });
        let entry = self.append_detached(id, NodeKind::Entry);
        self.functions[id.0 as usize].entry = entry;
        self.tails.insert(id, entry);
        id
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if self.edge_set.insert((from, to)) {
            self.successors.entry(from).or_default().push(to);
        }
    }

    fn validate(&self) -> Result<()> {
        for (from, to) in &self.edge_set {
            let (from_node, to_node) = (&self.nodes[from.0 as usize], &self.nodes[to.0 as usize]);
            if from_node.func != to_node.func {
                return Err(DemandflowError::unknown_entity(format!(
                    "control-flow edge {from} -> {to} crosses function boundaries"
                )));
            }
        }
        for function in &self.functions {
            if let Some(outer) = function.outer {
                if outer.0 as usize >= self.functions.len() {
                    return Err(DemandflowError::unknown_entity(format!(
                        "function {} has dangling outer scope {outer}",
                        function.id
                    )));
                }
            }
            if function.decl_site.is_none() && !function.is_main() {
                return Err(DemandflowError::unknown_entity(format!(
                    "function {} is never declared",
                    function.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::domain::Register;

    #[test]
    fn test_sequential_chaining() {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        let n1 = b.append(main, NodeKind::Nop);
        let n2 = b.append(main, NodeKind::Nop);
        let graph = b.build().unwrap();
        assert_eq!(graph.successors_of(n1), vec![n2]);
        assert_eq!(graph.successors_of(n2), vec![graph.main().exit]);
    }

    #[test]
    fn test_returns_flow_to_exit() {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        let f = b.begin_function(Some("f"), &["a"], main);
        let r2 = Register::new(2, f);
        b.append(
            f,
            NodeKind::ReadVariable {
                name: "a".into(),
                result: r2,
                result_base: None,
            },
        );
        let ret = b.append(f, NodeKind::Return { value: Some(r2) });
        b.append(
            main,
            NodeKind::DeclareFunction {
                function: f,
                result: None,
            },
        );
        let graph = b.build().unwrap();
        let exit = graph.function(f).exit;
        assert!(graph.successors_of(ret).contains(&exit));
        assert_eq!(graph.function(f).return_register, Some(r2));
    }

    #[test]
    fn test_undeclared_function_rejected() {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        b.begin_function(Some("ghost"), &[], main);
        assert!(b.build().is_err());
    }
}
