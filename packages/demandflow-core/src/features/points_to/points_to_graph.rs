//! Points-to store
//!
//! Append-only, bidirectionally indexed record of every points-to fact the
//! analysis has discovered. Both indices are live maps, so a solver can
//! subscribe to a (location, fact) key before anything is known about it.

use crate::features::facts::{Allocation, Value};
use crate::features::flow_graph::domain::{FlowGraph, NodeId, NodeKind};
use crate::features::live_collections::{filter_map, LiveCollection, LiveMap, LiveSet, Scheduler};
use crate::features::solver::query::QueryId;
use rustc_hash::FxHashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A (program point, fact) pair: the indexing unit of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointsToLocation {
    pub point: NodeId,
    pub fact: Value,
}

impl PointsToLocation {
    #[inline]
    pub fn new(point: NodeId, fact: impl Into<Value>) -> Self {
        Self { point, fact: fact.into() }
    }
}

impl fmt::Display for PointsToLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.fact, self.point)
    }
}

/// The points-to relation accumulated across all queries.
#[derive(Debug)]
pub struct PointsToGraph {
    points_to: LiveMap<PointsToLocation, Allocation, QueryId>,
    by_allocation: LiveMap<Allocation, PointsToLocation, QueryId>,
}

impl PointsToGraph {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            points_to: LiveMap::create(scheduler.clone()),
            by_allocation: LiveMap::create(scheduler),
        }
    }

    /// Record that the value at `location` may refer to `allocation`.
    /// Idempotent; returns whether the fact was new.
    pub fn add(&self, location: PointsToLocation, allocation: Allocation) -> bool {
        let new = self.points_to.put(location.clone(), allocation.clone());
        if new {
            debug!(%location, %allocation, "points-to fact");
            self.by_allocation.put(allocation, location);
        }
        new
    }

    /// Live set of allocations the given location may refer to.
    pub fn points_to_set(&self, point: NodeId, fact: Value) -> Arc<LiveSet<Allocation, QueryId>> {
        self.points_to.get(PointsToLocation { point, fact })
    }

    /// Synchronous snapshot of a points-to set; possibly incomplete before
    /// quiescence.
    pub fn get_points_to_set(&self, point: NodeId, fact: Value) -> FxHashSet<Allocation> {
        self.points_to_set(point, fact).snapshot().into_iter().collect()
    }

    /// Live set of locations known to refer to `allocation`.
    pub fn known_values_pointing_to(
        &self,
        allocation: Allocation,
    ) -> Arc<LiveSet<PointsToLocation, QueryId>> {
        self.by_allocation.get(allocation)
    }

    /// Call sites whose callee value is known to be `allocation`: locations
    /// pointing to it whose point is a call carrying the matching callee
    /// register or method-call marker.
    pub fn known_function_invocations(
        &self,
        allocation: &Allocation,
        graph: &Arc<FlowGraph>,
    ) -> Arc<dyn LiveCollection<NodeId, QueryId>> {
        let graph = graph.clone();
        filter_map(
            self.known_values_pointing_to(allocation.clone()),
            move |location: &PointsToLocation| {
                let node = graph.node(location.point);
                let NodeKind::Call(call) = &node.kind else {
                    return None;
                };
                let is_callee_value = match &location.fact {
                    Value::Reg(reg) => call.function_register == Some(*reg),
                    Value::MethodCall(site) => *site == location.point,
                    _ => false,
                };
                is_callee_value.then_some(location.point)
            },
        )
    }

    /// Total number of recorded (location, fact) → allocation entries.
    pub fn allocation_count(&self) -> usize {
        self.points_to.values().iter().map(|set| set.current_size()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::facts::AllocKind;
    use crate::features::flow_graph::domain::{FuncId, Register};
    use crate::features::live_collections::TaggedHandler;
    use crate::features::solver::query::Query;
    use parking_lot::Mutex;

    fn alloc(site: u32) -> Allocation {
        Allocation {
            site: NodeId(site),
            kind: AllocKind::Object,
            result: Register::new(2, FuncId(0)),
        }
    }

    #[test]
    fn test_dual_index_stays_consistent() {
        let scheduler = Arc::new(Scheduler::new());
        let graph = PointsToGraph::new(scheduler);
        let location = PointsToLocation::new(NodeId(5), Register::new(3, FuncId(0)));

        assert!(graph.add(location.clone(), alloc(1)));
        assert!(!graph.add(location.clone(), alloc(1)));
        assert!(graph.add(location.clone(), alloc(2)));

        let pts = graph.get_points_to_set(NodeId(5), Value::Reg(Register::new(3, FuncId(0))));
        assert_eq!(pts.len(), 2);
        assert!(graph.known_values_pointing_to(alloc(1)).contains(&location));
        assert_eq!(graph.allocation_count(), 2);
    }

    #[test]
    fn test_known_function_invocations_filters_callee_confirmations() {
        use crate::features::flow_graph::domain::{CallSite, NodeKind};
        use crate::features::flow_graph::infrastructure::builder::FlowGraphBuilder;

        let mut b = FlowGraphBuilder::new();
        let main = b.main_id();
        let callee = b.begin_function(Some("f"), &[], main);
        let decl = b.append(main, NodeKind::DeclareFunction { function: callee, result: None });
        let func_reg = Register::new(3, main);
        let call = b.append(
            main,
            NodeKind::Call(CallSite {
                function_register: Some(func_reg),
                base: None,
                method: None,
                args: vec![],
                result: Some(Register::new(4, main)),
                constructor: false,
                host_hook: None,
            }),
        );
        let flow_graph = Arc::new(b.build().unwrap());
        let func_alloc = Allocation::at(&flow_graph, decl).unwrap();

        let scheduler = Arc::new(Scheduler::new());
        let store = PointsToGraph::new(scheduler.clone());
        let invocations = store.known_function_invocations(&func_alloc, &flow_graph);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let tag = QueryId::CallTarget {
            query: Query::forward(crate::features::facts::SolverNode::new(decl, func_alloc.clone()))
                .unwrap(),
            call_site: call,
        };
        invocations.subscribe(TaggedHandler::new(tag, move |site: &NodeId| {
            sink.lock().push(*site);
        }));

        // A fact at a non-call location is filtered out; a callee-register
        // confirmation at the call site passes through.
        store.add(PointsToLocation::new(decl, func_reg), func_alloc.clone());
        store.add(PointsToLocation::new(call, func_reg), func_alloc);
        scheduler.run_to_quiescence();
        assert_eq!(*seen.lock(), vec![call]);
    }
}
