//! Shared analysis context
//!
//! The reference-counted root object every solver and query hangs off:
//! flow graph, configuration, scheduler, the shared stores and the query
//! memo table. Queries are memoized here: a structurally equal query
//! always maps to the same solver. Sub-query issuance is non-blocking:
//! starting a query enqueues its seeding instead of running it inline.

use super::dependency_graph::QueryDependencyGraph;
use super::query::{Direction, Query, QueryId};
use super::solver::Solver;
use crate::config::AnalysisConfig;
use crate::errors::{DemandflowError, Result};
use crate::features::facts::{Allocation, SolverNode, Value};
use crate::features::flow_graph::domain::{FlowGraph, NodeId, NodeKind};
use crate::features::flow_graph::infrastructure::{CapturedVariables, SyntacticRefs};
use crate::features::live_collections::{Scheduler, TaggedHandler};
use crate::features::points_to::{CallGraph, PointsToGraph, PointsToLocation};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Shared state of one analysis run.
pub struct AnalysisContext {
    graph: Arc<FlowGraph>,
    config: AnalysisConfig,
    scheduler: Arc<Scheduler>,
    points_to: PointsToGraph,
    call_graph: CallGraph,
    dependencies: QueryDependencyGraph,
    captured: CapturedVariables,
    syntactic: SyntacticRefs,
    solvers: DashMap<Query, Arc<Solver>>,
    /// Property-access points for which alias queries have been raised.
    property_access_queries: Mutex<FxHashSet<NodeId>>,
}

impl AnalysisContext {
    pub fn new(graph: Arc<FlowGraph>, config: AnalysisConfig) -> Arc<Self> {
        let scheduler = Arc::new(Scheduler::new());
        Arc::new(Self {
            points_to: PointsToGraph::new(scheduler.clone()),
            call_graph: CallGraph::new(scheduler.clone()),
            dependencies: QueryDependencyGraph::new(),
            captured: CapturedVariables::new(graph.clone()),
            syntactic: SyntacticRefs::new(graph.clone(), config.max_syntactic_search_nodes),
            solvers: DashMap::new(),
            property_access_queries: Mutex::new(FxHashSet::default()),
            graph,
            config,
            scheduler,
        })
    }

    #[inline]
    pub fn graph(&self) -> &Arc<FlowGraph> {
        &self.graph
    }

    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    #[inline]
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    #[inline]
    pub fn points_to(&self) -> &PointsToGraph {
        &self.points_to
    }

    #[inline]
    pub fn call_graph(&self) -> &CallGraph {
        &self.call_graph
    }

    #[inline]
    pub fn dependencies(&self) -> &QueryDependencyGraph {
        &self.dependencies
    }

    #[inline]
    pub fn captured(&self) -> &CapturedVariables {
        &self.captured
    }

    #[inline]
    pub fn syntactic(&self) -> &SyntacticRefs {
        &self.syntactic
    }

    /// Get or start the forward query rooted at `node`.
    pub fn get_or_start_forward_query(self: &Arc<Self>, node: SolverNode) -> Arc<Solver> {
        self.get_or_start(Query { node, direction: Direction::Forward })
    }

    /// Get or start the backward query rooted at `node`. When the query
    /// resolves the callee of `call_site`, every function allocation it
    /// discovers becomes a call-graph edge from that site.
    pub fn get_or_start_backward_query(
        self: &Arc<Self>,
        node: SolverNode,
        call_site: Option<NodeId>,
    ) -> Arc<Solver> {
        let query = Query { node: node.clone(), direction: Direction::Backward };
        let solver = self.get_or_start(query.clone());
        if let Some(call_site) = call_site {
            let tag = QueryId::CallTarget { query, call_site };
            let ctx: Weak<AnalysisContext> = Arc::downgrade(self);
            self.points_to
                .points_to_set(node.point, node.fact)
                .on_add(TaggedHandler::new(tag, move |allocation: &Allocation| {
                    if let (Some(ctx), Some(callee)) = (ctx.upgrade(), allocation.function()) {
                        ctx.call_graph.add_edge(call_site, callee);
                    }
                }));
        }
        solver
    }

    /// Memoized query → solver mapping. A new solver is seeded through the
    /// scheduler, so issuing a sub-query never blocks the issuer.
    fn get_or_start(self: &Arc<Self>, query: Query) -> Arc<Solver> {
        match self.solvers.entry(query.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!(%query, "starting solver");
                let solver = Solver::create(self, query.clone());
                entry.insert(solver.clone());
                self.dependencies.ensure_vertex(&query);
                let seeded = solver.clone();
                self.scheduler.enqueue(move || seeded.seed());
                solver
            }
        }
    }

    /// Validate and run a query to quiescence. Idempotent: re-solving an
    /// already quiescent query performs no work.
    pub fn solve(self: &Arc<Self>, query: Query) -> Arc<Solver> {
        let solver = self.get_or_start(query);
        self.scheduler.run_to_quiescence();
        solver
    }

    /// Convenience wrapper: forward query on (point, fact).
    pub fn solve_forward(self: &Arc<Self>, point: NodeId, fact: impl Into<Value>) -> Result<Arc<Solver>> {
        let query = Query::forward(SolverNode::new(point, fact))?;
        Ok(self.solve(query))
    }

    /// Convenience wrapper: backward query on (point, fact).
    pub fn solve_backward(self: &Arc<Self>, point: NodeId, fact: impl Into<Value>) -> Result<Arc<Solver>> {
        let query = Query::backward(SolverNode::new(point, fact))?;
        Ok(self.solve(query))
    }

    /// Record a points-to fact; a fact confirming a call site's callee
    /// value is also materialized as a call-graph edge.
    pub fn add_points_to_fact(&self, point: NodeId, fact: Value, allocation: Allocation) {
        let new = self
            .points_to
            .add(PointsToLocation { point, fact: fact.clone() }, allocation.clone());
        if !new {
            return;
        }
        if let NodeKind::Call(call) = &self.graph.node(point).kind {
            let confirms_callee = match &fact {
                Value::Reg(reg) => call.function_register == Some(*reg),
                Value::MethodCall(site) => *site == point,
                _ => false,
            };
            if confirms_callee {
                if let Some(callee) = allocation.function() {
                    self.call_graph.add_edge(point, callee);
                }
            }
        }
    }

    pub fn register_query_dependency(&self, from: &Query, to: &Query) {
        self.dependencies.add_dependency(from, to);
    }

    /// Attribute a recoverable failure to `query`; the query still runs to
    /// quiescence on partial information.
    pub fn record_query_error(&self, query: &Query, error: DemandflowError) {
        debug!(%query, %error, "recorded query error");
        self.dependencies.record_error(query, error);
    }

    /// Errors reachable through `query`'s dependency cone.
    pub fn errors_impacting_query(&self, query: &Query) -> FxHashMap<Query, Vec<DemandflowError>> {
        self.dependencies.errors_impacting_query(query)
    }

    /// Note that an alias query was raised at a property-access point.
    pub fn register_property_access_query(&self, point: NodeId) -> bool {
        self.property_access_queries.lock().insert(point)
    }

    /// Property-access points alias queries were raised at so far.
    pub fn property_access_query_count(&self) -> usize {
        self.property_access_queries.lock().len()
    }

    /// Number of distinct queries started.
    pub fn query_count(&self) -> usize {
        self.solvers.len()
    }
}

impl std::fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("queries", &self.query_count())
            .field("call_graph_edges", &self.call_graph.len())
            .finish_non_exhaustive()
    }
}
