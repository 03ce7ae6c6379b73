//! Shared flow-function machinery
//!
//! Behavior common to both directions: normal-flow emission, sub-query
//! issuance with continuation registration, callee resolution and alias
//! resolution at property accesses. A `FlowOps` instance is the state of
//! one transfer-function application; continuations delivered later run
//! against a fresh instance rebuilt at the same (point, fact).

use crate::features::automaton::Rule;
use crate::features::facts::{Allocation, SolverNode, Value};
use crate::features::flow_graph::domain::{FlowGraph, FuncId, NodeId, Register};
use crate::features::live_collections::{LiveElement, LiveSet, TaggedHandler};
use crate::features::solver::context::AnalysisContext;
use crate::features::solver::query::{Direction, Query, QueryId};
use crate::features::solver::solver::Solver;
use std::sync::Arc;
use tracing::warn;

/// Find call sites where the given function may be called, by issuing (or
/// reusing) a forward query on the function's allocation. Returns the live
/// collection of call sites plus the issued query, or `None` for the top
/// level, which is never called.
pub(crate) fn find_invocations_of_function_with_query(
    ctx: &Arc<AnalysisContext>,
    func: FuncId,
) -> Option<(Arc<LiveSet<NodeId, QueryId>>, Query)> {
    let graph = ctx.graph();
    let decl = graph.function(func).decl_site?;
    let alloc = Allocation::at(graph, decl)?;
    let root = SolverNode::new(decl, alloc);
    ctx.get_or_start_forward_query(root.clone());
    let query = Query { node: root, direction: Direction::Forward };
    Some((ctx.call_graph().invocations_of(func), query))
}

/// One transfer-function application at `curr`.
pub(crate) struct FlowOps {
    pub solver: Arc<Solver>,
    pub ctx: Arc<AnalysisContext>,
    pub curr: SolverNode,
}

impl FlowOps {
    pub fn new(solver: Arc<Solver>, ctx: Arc<AnalysisContext>, curr: SolverNode) -> Self {
        Self { solver, ctx, curr }
    }

    #[inline]
    pub fn graph(&self) -> &Arc<FlowGraph> {
        self.ctx.graph()
    }

    #[inline]
    pub fn fact(&self) -> &Value {
        &self.curr.fact
    }

    #[inline]
    pub fn point(&self) -> NodeId {
        self.curr.point
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.solver.query().direction
    }

    /// Flow-direction successors of a point: control-flow successors
    /// forward, predecessors backward.
    pub fn next_nodes(&self, point: NodeId) -> Vec<NodeId> {
        match self.direction() {
            Direction::Forward => self.graph().successors_of(point),
            Direction::Backward => self.graph().predecessors_of(point),
        }
    }

    /// Propagate the current fact unchanged to all next points.
    pub fn treat_as_nop(&self) {
        let fact = self.curr.fact.clone();
        for next in self.next_nodes(self.curr.point) {
            self.propagate(Rule::Normal(SolverNode::new(next, fact.clone())));
        }
    }

    /// Generate flow for `fact` at all next points.
    pub fn gen_normal(&self, fact: impl Into<Value>) {
        let fact = fact.into();
        for next in self.next_nodes(self.curr.point) {
            self.propagate(Rule::Normal(SolverNode::new(next, fact.clone())));
        }
    }

    /// Insert a rule at the current node.
    pub fn propagate(&self, rule: Rule) {
        self.solver.propagate(&self.curr, rule);
    }

    /// Insert a rule at an explicit source node.
    pub fn propagate_from(&self, source: &SolverNode, rule: Rule) {
        self.solver.propagate(source, rule);
    }

    /// Record an approximated construct.
    pub fn log_unsoundness(&self, what: &str) {
        if self.ctx.config().log_unsoundness {
            warn!(point = %self.curr.point, what, "unsound approximation of unhandled construct");
        }
    }

    /// Resolve the scope declaring `name`, attributing an error to the
    /// owning query (and falling back to the usage scope) when the program
    /// is ill-scoped. The query still runs to quiescence; callers read the
    /// error off the dependency graph.
    pub fn declaring_scope_or_record(&self, name: &str, usage_scope: FuncId) -> FuncId {
        use crate::errors::DemandflowError;
        use crate::features::flow_graph::infrastructure::try_declaring_scope;

        match try_declaring_scope(self.graph(), name, usage_scope) {
            Some(scope) => scope,
            None => {
                self.ctx.record_query_error(
                    self.solver.query(),
                    DemandflowError::sub_query(format!(
                        "'{name}' is not visible in {usage_scope}"
                    )),
                );
                usage_scope
            }
        }
    }

    /// Correlation key for a sub-query raised at the current node.
    pub fn query_id(&self, sub_forward: bool, in_unbalanced_pop: bool) -> QueryId {
        QueryId::Standard {
            initial: self.solver.query().clone(),
            sub: Query {
                node: self.curr.clone(),
                direction: if sub_forward { Direction::Forward } else { Direction::Backward },
            },
            in_unbalanced_pop,
            resolves_aliasing: false,
        }
    }

    /// Register `handler` for every result `collection` ever delivers,
    /// including results that arrive later (replay-then-live). The handler
    /// runs against a fresh `FlowOps` rebuilt at the current node, so no
    /// mutable state leaks across deliveries.
    pub fn continue_with_subquery_result<T: LiveElement>(
        &self,
        collection: &Arc<LiveSet<T, QueryId>>,
        tag: QueryId,
        handler: impl Fn(&FlowOps, &T) + Send + Sync + 'static,
    ) {
        let solver = Arc::downgrade(&self.solver);
        let curr = self.curr.clone();
        collection.on_add(TaggedHandler::new(tag, move |item: &T| {
            let Some(solver) = solver.upgrade() else { return };
            let Some(ctx) = solver.ctx() else { return };
            let ops = FlowOps::new(solver, ctx, curr.clone());
            handler(&ops, item);
        }));
    }

    /// Resolve the callees of the call at the current point. Backward
    /// sub-queries are started on the callee value; results arrive through
    /// the call graph's live callee set. Returns `None` when the callee is
    /// dynamically computed and cannot be queried.
    pub fn resolve_call_with_queries(
        &self,
    ) -> Option<(Arc<LiveSet<FuncId, QueryId>>, Vec<Query>)> {
        let graph = self.graph();
        let point = self.curr.point;
        let call = graph.node(point).as_call()?;
        if call.host_hook.is_some() {
            // Host intrinsics are opaque; hand back a collection that will
            // never be populated.
            return Some((LiveSet::create(self.ctx.scheduler().clone()), Vec::new()));
        }
        if let Some(func_reg) = call.function_register {
            let mut queries = Vec::new();
            for pred in graph.predecessors_of(point) {
                let root = SolverNode::new(pred, func_reg);
                self.ctx.get_or_start_backward_query(root.clone(), Some(point));
                queries.push(Query { node: root, direction: Direction::Backward });
            }
            Some((self.ctx.call_graph().callees_of(point), queries))
        } else if call.method.is_some() {
            let root = SolverNode::new(point, Value::MethodCall(point));
            self.ctx.get_or_start_backward_query(root.clone(), Some(point));
            let query = Query { node: root, direction: Direction::Backward };
            Some((self.ctx.call_graph().callees_of(point), vec![query]))
        } else {
            None
        }
    }

    /// See [`find_invocations_of_function_with_query`].
    pub fn find_invocations_with_query(
        &self,
        func: FuncId,
    ) -> Option<(Arc<LiveSet<NodeId, QueryId>>, Query)> {
        find_invocations_of_function_with_query(&self.ctx, func)
    }

    /// Resolve the allocation sites `base` may refer to at `location` and
    /// run `handler` on each. One backward alias sub-query per predecessor;
    /// deliveries are keyed by the fact currently being resolved so the
    /// same access can be re-resolved for different facts.
    pub fn with_allocation_sites_of(
        &self,
        location: NodeId,
        base: Register,
        handler: impl Fn(&FlowOps, &Allocation) + Send + Sync + Clone + 'static,
    ) {
        let graph = self.graph();
        self.ctx.register_property_access_query(location);
        for pred in graph.predecessors_of(location) {
            let root = SolverNode::new(pred, base);
            self.ctx.get_or_start_backward_query(root.clone(), None);
            let sub = Query { node: root, direction: Direction::Backward };
            self.ctx.register_query_dependency(self.solver.query(), &sub);
            let tag = QueryId::Alias {
                initial: self.solver.query().clone(),
                sub,
                query_value: self.curr.fact.clone(),
            };
            let points_to = self.ctx.points_to().points_to_set(pred, Value::Reg(base));
            self.continue_with_subquery_result(&points_to, tag, handler.clone());
        }
    }
}
