//! Per-query solver
//!
//! Exactly one solver exists per distinct query (enforced by the context's
//! memo table). A solver owns its synchronized automaton pair exclusively;
//! everything it shares with other solvers goes through the context's
//! lock-guarded stores and the live-collection substrate.

use super::context::AnalysisContext;
use super::query::{Direction, Query, QueryId};
use crate::errors::DemandflowError;
use crate::features::automaton::{FieldState, Rule, SyncPds, UnbalancedPop};
use crate::features::facts::{AllocKind, Allocation, SolverNode, Value};
use crate::features::flow_graph::domain::NodeKind;
use crate::features::flow_functions::{backward, forward, ops};
use crate::features::live_collections::TaggedHandler;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Solver for one (root point, root fact, direction) query.
pub struct Solver {
    query: Query,
    pds: Arc<SyncPds>,
    ctx: Weak<AnalysisContext>,
    seeded: AtomicBool,
}

impl Solver {
    pub(crate) fn create(ctx: &Arc<AnalysisContext>, query: Query) -> Arc<Self> {
        debug!(%query, "creating solver");
        let solver = Arc::new(Self {
            query,
            pds: SyncPds::new(),
            ctx: Arc::downgrade(ctx),
            seeded: AtomicBool::new(false),
        });
        Self::install_listeners(&solver);
        solver
    }

    /// Begin exploration from the query root. Idempotent; repeated seeding
    /// after quiescence inserts nothing and triggers nothing.
    pub fn seed(&self) {
        if self.seeded.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pds.seed(&self.query.node);
    }

    #[inline]
    pub fn query(&self) -> &Query {
        &self.query
    }

    #[inline]
    pub fn initial_node(&self) -> &SolverNode {
        &self.query.node
    }

    pub(crate) fn ctx(&self) -> Option<Arc<AnalysisContext>> {
        self.ctx.upgrade()
    }

    /// The automaton pair, exposed for inspection in tests and tooling.
    pub fn pds(&self) -> &Arc<SyncPds> {
        &self.pds
    }

    /// Insert a rule at `curr`. Push rules that enter another function from
    /// a call site are also materialized as call-graph edges.
    pub fn propagate(&self, curr: &SolverNode, rule: Rule) -> bool {
        if let Rule::CallPush { target, .. } = &rule {
            if let Some(ctx) = self.ctx() {
                let graph = ctx.graph();
                let curr_node = graph.node(curr.point);
                let target_func = graph.node(target.point).func;
                if matches!(curr_node.kind, NodeKind::Call(_)) && target_func != curr_node.func {
                    ctx.call_graph().add_edge(curr.point, target_func);
                }
            }
        }
        self.pds.propagate(curr, rule)
    }

    /// Snapshot of the allocations discovered for the query root so far.
    pub fn points_to_snapshot(&self) -> FxHashSet<Allocation> {
        match self.ctx() {
            Some(ctx) => ctx
                .points_to()
                .get_points_to_set(self.query.node.point, self.query.node.fact.clone()),
            None => FxHashSet::default(),
        }
    }

    /// Errors attributed to this query's dependency cone.
    pub fn errors_impacting(&self) -> FxHashMap<Query, Vec<DemandflowError>> {
        match self.ctx() {
            Some(ctx) => ctx.errors_impacting_query(&self.query),
            None => FxHashMap::default(),
        }
    }

    pub fn is_reached(&self, node: &SolverNode) -> bool {
        self.pds.is_reached(node)
    }

    pub fn reached_count(&self) -> usize {
        self.pds.reached_count()
    }

    fn install_listeners(solver: &Arc<Self>) {
        let weak = Arc::downgrade(solver);
        solver.pds.set_node_handler(Arc::new(move |node| {
            if let Some(solver) = weak.upgrade() {
                solver.on_node_reached(node);
            }
        }));

        // Acceptance: a transition into the field automaton's root from a
        // plain node state means that node is reachable from the query root
        // with an empty field stack.
        let weak = Arc::downgrade(solver);
        solver.pds.field_automaton().on_in_transition(
            FieldState::Root,
            Arc::new(move |transition| {
                if let FieldState::Node(node) = &transition.source {
                    if let Some(solver) = weak.upgrade() {
                        solver.on_empty_stack_reachable(node);
                    }
                }
            }),
        );

        let weak = Arc::downgrade(solver);
        solver.pds.on_unbalanced_pop(Arc::new(move |pop| {
            if let Some(solver) = weak.upgrade() {
                solver.on_unbalanced_pop(pop);
            }
        }));
    }

    /// Re-enter the flow-function layer on a newly discovered node.
    fn on_node_reached(self: Arc<Self>, node: SolverNode) {
        let Some(ctx) = self.ctx() else { return };
        let direction = self.query.direction;
        let ops = ops::FlowOps::new(self.clone(), ctx, node);
        let applied = match direction {
            Direction::Forward => forward::apply(&ops),
            Direction::Backward => backward::apply(&ops),
        };
        if let Err(error) = applied {
            if let Some(ctx) = self.ctx() {
                ctx.record_query_error(&self.query, error);
            }
        }
    }

    /// A node reached the acceptance condition: record what it tells us
    /// about the query root.
    fn on_empty_stack_reachable(&self, node: &SolverNode) {
        let Some(ctx) = self.ctx() else { return };
        match self.query.direction {
            // Forward solvers on an allocation track where that allocation
            // flows: every accepted node holds the root allocation.
            Direction::Forward => {
                if let Value::Alloc(root_alloc) = &self.query.node.fact {
                    ctx.add_points_to_fact(node.point, node.fact.clone(), root_alloc.clone());
                }
            }
            // Backward solvers terminate when the accepted node is an
            // allocation site materializing the tracked fact.
            Direction::Backward => {
                let graph = ctx.graph();
                let Some(alloc) = Allocation::at(graph, node.point) else {
                    return;
                };
                let matches = match (&alloc.kind, &node.fact) {
                    (AllocKind::Function(func), Value::Var(var)) => {
                        graph.function(*func).name.as_deref() == Some(var.name.as_ref())
                    }
                    (_, Value::Reg(reg)) => alloc.result == *reg,
                    _ => false,
                };
                if matches {
                    ctx.add_points_to_fact(
                        self.query.node.point,
                        self.query.node.fact.clone(),
                        alloc,
                    );
                }
            }
        }
    }

    /// Flow escaped the explored call stack: it is live in every caller of
    /// the function whose boundary was crossed, so continue it at each of
    /// that function's call sites (and only those).
    fn on_unbalanced_pop(self: Arc<Self>, pop: &UnbalancedPop) {
        let Some(ctx) = self.ctx() else { return };
        let graph = ctx.graph();
        let exited_func = graph.node(pop.exited_point).func;
        let Some((call_sites, invocations_query)) =
            ops::find_invocations_of_function_with_query(&ctx, exited_func)
        else {
            return; // top level has no callers
        };
        ctx.register_query_dependency(&self.query, &invocations_query);
        let tag = QueryId::Standard {
            initial: self.query.clone(),
            sub: Query { node: pop.curr.clone(), direction: Direction::Forward },
            in_unbalanced_pop: true,
            resolves_aliasing: false,
        };
        let weak = Arc::downgrade(&self);
        let curr = pop.curr.clone();
        let fact = pop.fact.clone();
        call_sites.on_add(TaggedHandler::new(tag, move |call_site| {
            if let Some(solver) = weak.upgrade() {
                solver.propagate(&curr, Rule::Normal(SolverNode::new(*call_site, fact.clone())));
            }
        }));
    }
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("query", &self.query.to_string())
            .field("reached", &self.reached_count())
            .finish_non_exhaustive()
    }
}
