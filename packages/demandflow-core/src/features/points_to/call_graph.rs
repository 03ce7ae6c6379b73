//! Call graph
//!
//! Append-only edge set between call sites and callees, dual-indexed for
//! amortized O(1) caller/callee lookup. Both directions are live, which is
//! what lets "callers of f" sub-queries deliver results discovered later.

use crate::features::flow_graph::domain::{FuncId, NodeId};
use crate::features::live_collections::{LiveMap, LiveSet, Scheduler};
use crate::features::solver::query::QueryId;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One resolved invocation: the call site may invoke the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub call_site: NodeId,
    pub callee: FuncId,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --> {}", self.call_site, self.callee)
    }
}

/// Deduplicated, dual-indexed call graph.
#[derive(Debug)]
pub struct CallGraph {
    edges: Mutex<EdgeSet>,
    callees: LiveMap<NodeId, FuncId, QueryId>,
    callers: LiveMap<FuncId, NodeId, QueryId>,
}

#[derive(Debug, Default)]
struct EdgeSet {
    seen: FxHashSet<Edge>,
    ordered: Vec<Edge>,
}

impl CallGraph {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            edges: Mutex::new(EdgeSet::default()),
            callees: LiveMap::create(scheduler.clone()),
            callers: LiveMap::create(scheduler),
        }
    }

    /// Add an edge; returns whether it was new.
    pub fn add_edge(&self, call_site: NodeId, callee: FuncId) -> bool {
        let edge = Edge { call_site, callee };
        {
            let mut edges = self.edges.lock();
            if !edges.seen.insert(edge) {
                return false;
            }
            edges.ordered.push(edge);
        }
        debug!(%edge, "call graph edge");
        self.callees.put(call_site, callee);
        self.callers.put(callee, call_site);
        true
    }

    /// Functions the given call site may invoke (live).
    pub fn callees_of(&self, call_site: NodeId) -> Arc<LiveSet<FuncId, QueryId>> {
        self.callees.get(call_site)
    }

    /// Call sites that may invoke the given function (live).
    pub fn invocations_of(&self, callee: FuncId) -> Arc<LiveSet<NodeId, QueryId>> {
        self.callers.get(callee)
    }

    /// Alias for [`Self::invocations_of`].
    #[inline]
    pub fn callers_of(&self, callee: FuncId) -> Arc<LiveSet<NodeId, QueryId>> {
        self.invocations_of(callee)
    }

    pub fn contains(&self, call_site: NodeId, callee: FuncId) -> bool {
        self.edges.lock().seen.contains(&Edge { call_site, callee })
    }

    /// Snapshot of all edges, in discovery order.
    pub fn edges(&self) -> Vec<Edge> {
        self.edges.lock().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.edges.lock().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_deduplicate_and_dual_index() {
        let scheduler = Arc::new(Scheduler::new());
        let cg = CallGraph::new(scheduler);
        assert!(cg.add_edge(NodeId(1), FuncId(2)));
        assert!(!cg.add_edge(NodeId(1), FuncId(2)));
        assert!(cg.add_edge(NodeId(3), FuncId(2)));

        assert_eq!(cg.len(), 2);
        assert!(cg.contains(NodeId(1), FuncId(2)));
        assert!(cg.callees_of(NodeId(1)).contains(&FuncId(2)));
        let callers = cg.invocations_of(FuncId(2)).snapshot();
        assert_eq!(callers, vec![NodeId(1), NodeId(3)]);
    }
}
