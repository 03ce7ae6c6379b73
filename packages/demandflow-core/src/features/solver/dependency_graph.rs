//! Query dependency graph
//!
//! Tracks which queries were consulted to answer which. After quiescence,
//! errors recorded anywhere in a query's reachable dependency cone mean its
//! answer is approximate, and callers can attribute exactly which
//! sub-queries failed.

use super::query::Query;
use crate::errors::DemandflowError;
use parking_lot::Mutex;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;

/// Per-query metadata: the accumulated errors of answering it.
#[derive(Debug, Default)]
struct QueryNode {
    errors: Vec<DemandflowError>,
    error_keys: FxHashSet<String>,
}

#[derive(Debug, Default)]
struct DependencyInner {
    graph: DiGraph<QueryNode, ()>,
    index: FxHashMap<Query, NodeIndex>,
}

/// Directed graph over queries; an edge means "answering the source
/// required answering the target".
#[derive(Debug, Default)]
pub struct QueryDependencyGraph {
    inner: Mutex<DependencyInner>,
}

impl QueryDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure `query` has a vertex.
    pub fn ensure_vertex(&self, query: &Query) {
        let mut inner = self.inner.lock();
        Self::index_of(&mut inner, query);
    }

    /// Record that answering `from` required answering `to`.
    pub fn add_dependency(&self, from: &Query, to: &Query) {
        let mut inner = self.inner.lock();
        let source = Self::index_of(&mut inner, from);
        let target = Self::index_of(&mut inner, to);
        if !inner.graph.contains_edge(source, target) {
            inner.graph.add_edge(source, target, ());
        }
    }

    /// Attribute an error to `query`'s vertex.
    pub fn record_error(&self, query: &Query, error: DemandflowError) {
        let mut inner = self.inner.lock();
        let index = Self::index_of(&mut inner, query);
        let node = &mut inner.graph[index];
        if node.error_keys.insert(error.to_string()) {
            node.errors.push(error);
        }
    }

    /// Every query reachable from `query` that recorded errors, with its
    /// errors. Empty iff the answer is complete with respect to failures.
    pub fn errors_impacting_query(&self, query: &Query) -> FxHashMap<Query, Vec<DemandflowError>> {
        let inner = self.inner.lock();
        let mut impacted = FxHashMap::default();
        let Some(start) = inner.index.get(query) else {
            return impacted;
        };
        let by_index: FxHashMap<NodeIndex, &Query> =
            inner.index.iter().map(|(q, i)| (*i, q)).collect();
        let mut bfs = Bfs::new(&inner.graph, *start);
        while let Some(index) = bfs.next(&inner.graph) {
            let node = &inner.graph[index];
            if !node.errors.is_empty() {
                if let Some(query) = by_index.get(&index) {
                    impacted.insert((*query).clone(), node.errors.clone());
                }
            }
        }
        impacted
    }

    /// Queries `query` directly depends on.
    pub fn direct_dependencies_of(&self, query: &Query) -> Vec<Query> {
        let inner = self.inner.lock();
        let Some(index) = inner.index.get(query) else {
            return Vec::new();
        };
        let by_index: FxHashMap<NodeIndex, &Query> =
            inner.index.iter().map(|(q, i)| (*i, q)).collect();
        inner
            .graph
            .neighbors(*index)
            .filter_map(|n| by_index.get(&n).map(|q| (*q).clone()))
            .collect()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.lock().graph.edge_count()
    }

    fn index_of(inner: &mut DependencyInner, query: &Query) -> NodeIndex {
        if let Some(index) = inner.index.get(query) {
            return *index;
        }
        let index = inner.graph.add_node(QueryNode::default());
        inner.index.insert(query.clone(), index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::facts::SolverNode;
    use crate::features::flow_graph::domain::{FuncId, NodeId, Register};

    fn query(point: u32) -> Query {
        Query::forward(SolverNode::new(NodeId(point), Register::new(1, FuncId(0)))).unwrap()
    }

    #[test]
    fn test_errors_attribute_transitively() {
        let deps = QueryDependencyGraph::new();
        let (a, b, c) = (query(1), query(2), query(3));
        deps.add_dependency(&a, &b);
        deps.add_dependency(&b, &c);
        deps.record_error(&c, DemandflowError::sub_query("callee unresolved"));

        let impacted = deps.errors_impacting_query(&a);
        assert_eq!(impacted.len(), 1);
        assert!(impacted.contains_key(&c));
        assert!(deps.errors_impacting_query(&c).contains_key(&c));
        // unrelated query sees nothing
        assert!(deps.errors_impacting_query(&query(9)).is_empty());
    }

    #[test]
    fn test_duplicate_errors_collapse() {
        let deps = QueryDependencyGraph::new();
        let q = query(1);
        deps.record_error(&q, DemandflowError::sub_query("x"));
        deps.record_error(&q, DemandflowError::sub_query("x"));
        assert_eq!(deps.errors_impacting_query(&q)[&q].len(), 1);
    }

    #[test]
    fn test_cyclic_dependencies_terminate() {
        let deps = QueryDependencyGraph::new();
        let (a, b) = (query(1), query(2));
        deps.add_dependency(&a, &b);
        deps.add_dependency(&b, &a);
        deps.record_error(&b, DemandflowError::sub_query("partial"));
        assert!(deps.errors_impacting_query(&a).contains_key(&b));
        assert_eq!(deps.direct_dependencies_of(&a), vec![b]);
    }
}
