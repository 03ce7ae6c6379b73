//! Lexical scope resolution
//!
//! Statically determines which function declares a given name, walking the
//! scope chain through parameters, declared variables and named function
//! declarations.

use crate::features::flow_graph::domain::{FlowGraph, FuncId, NodeKind};
use tracing::warn;

/// The name of the host-provided process binding, always declared by the
/// runtime in the outermost scope.
const HOST_PROCESS_BINDING: &str = "process";

/// Given a variable name and the function in which it is used, determine the
/// function that declares it. `None` when the name is not visible anywhere
/// on the chain.
pub fn try_declaring_scope(graph: &FlowGraph, name: &str, usage_scope: FuncId) -> Option<FuncId> {
    if name == HOST_PROCESS_BINDING {
        let mut current = usage_scope;
        while let Some(outer) = graph.function(current).outer {
            current = outer;
        }
        return Some(current);
    }
    let mut current = Some(usage_scope);
    while let Some(func_id) = current {
        let function = graph.function(func_id);
        if function.binds(name) || scope_declares_function_named(graph, func_id, name) {
            return Some(func_id);
        }
        current = function.outer;
    }
    None
}

/// Like [`try_declaring_scope`], falling back to the usage scope when the
/// name is not visible anywhere. Ill-scoped programs keep analyzing on a
/// best-effort basis.
pub fn declaring_scope(graph: &FlowGraph, name: &str, usage_scope: FuncId) -> FuncId {
    try_declaring_scope(graph, name, usage_scope).unwrap_or_else(|| {
        warn!(
            name,
            scope = %usage_scope,
            "name is not visible in this scope; falling back to the usage scope"
        );
        usage_scope
    })
}

/// Whether `scope` contains a function declaration with the given name.
pub fn scope_declares_function_named(graph: &FlowGraph, scope: FuncId, name: &str) -> bool {
    graph.nodes_of(scope).any(|node| {
        if let NodeKind::DeclareFunction { function, .. } = &node.kind {
            graph.function(*function).name.as_deref() == Some(name)
        } else {
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::infrastructure::builder::FlowGraphBuilder;

    #[test]
    fn test_declaring_scope_walks_outer_chain() {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        b.declare_vars(main, &["x"]);
        let f = b.begin_function(Some("f"), &["a"], main);
        let g = b.begin_function(None, &[], f);
        b.append(main, NodeKind::DeclareFunction { function: f, result: None });
        b.append(f, NodeKind::DeclareFunction { function: g, result: None });
        let graph = b.build().unwrap();

        assert_eq!(declaring_scope(&graph, "x", g), main);
        assert_eq!(declaring_scope(&graph, "a", g), f);
        // A named declaration binds its own name in the declaring scope.
        assert_eq!(declaring_scope(&graph, "f", g), main);
    }

    #[test]
    fn test_shadowing_parameter_wins() {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        b.declare_vars(main, &["x"]);
        let f = b.begin_function(None, &["x"], main);
        b.append(main, NodeKind::DeclareFunction { function: f, result: None });
        let graph = b.build().unwrap();
        assert_eq!(declaring_scope(&graph, "x", f), f);
    }

    #[test]
    fn test_process_resolves_to_outermost_scope() {
        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        let f = b.begin_function(None, &["process"], main);
        b.append(main, NodeKind::DeclareFunction { function: f, result: None });
        let graph = b.build().unwrap();
        assert_eq!(declaring_scope(&graph, "process", f), main);
    }
}
