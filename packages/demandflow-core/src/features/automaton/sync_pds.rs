//! Synchronized pushdown systems
//!
//! One instance per query: a call automaton (frames pushed at call entries,
//! popped at returns) and a field automaton (symbols pushed at property
//! writes, popped at reads), saturated together. Rules are inserted on
//! demand by the flow-function layer; saturation is incremental and each
//! (state, incoming-label) pair is handed to the flow functions at most
//! once, which bounds the work on a finite fact universe.

use super::p_automaton::{PAutomaton, Transition};
use super::states::{CallLabel, CallState, FieldState};
use crate::features::facts::{Property, SolverNode, Value};
use crate::features::flow_graph::domain::NodeId;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Weak};
use tracing::debug;

/// A transition rule emitted by a flow function for the node it was applied
/// at. Every rule also keeps the two automata synchronized: push/pop rules
/// of one system act as normal flow on the other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Plain flow to another node; both stacks unchanged.
    Normal(SolverNode),
    /// Enter `target` pushing a frame for `call_site` onto the call stack.
    CallPush { target: SolverNode, call_site: NodeId },
    /// Leave the current procedure, resuming with `fact` at `return_site`
    /// if a matching frame exists.
    CallPop { fact: Value, return_site: NodeId },
    /// Flow into `target` pushing `property` onto the field stack.
    FieldPush { target: SolverNode, property: Property },
    /// Read `property` off the field stack, continuing with `fact` at
    /// `read_site`.
    FieldPop {
        fact: Value,
        read_site: NodeId,
        property: Property,
    },
}

/// A pop that found no matching frame: flow has crossed the boundary of the
/// explored call stack. Recorded first-class and replayed to listeners.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnbalancedPop {
    /// The node the pop was applied at.
    pub curr: SolverNode,
    /// The fact the pop resumes with.
    pub fact: Value,
    /// Program point labeling the consumed transition; its function is the
    /// procedure whose boundary was crossed.
    pub exited_point: NodeId,
}

pub type NodeHandler = Arc<dyn Fn(SolverNode) + Send + Sync>;
pub type UnbalancedPopListener = Arc<dyn Fn(&UnbalancedPop) + Send + Sync>;

struct SyncInner {
    rules: FxHashMap<SolverNode, Vec<Rule>>,
    rule_set: FxHashSet<(SolverNode, Rule)>,
    /// Nodes witnessed by the call automaton / the field automaton. A node
    /// is reached only once both systems witness it; flow that dies in one
    /// system (a mismatched field pop) never re-enters the flow functions.
    call_witnessed: FxHashSet<SolverNode>,
    field_witnessed: FxHashSet<SolverNode>,
    reached: FxHashSet<SolverNode>,
    node_handler: Option<NodeHandler>,
    unbalanced: Vec<UnbalancedPop>,
    unbalanced_seen: FxHashSet<UnbalancedPop>,
    unbalanced_listeners: Vec<UnbalancedPopListener>,
}

/// The synchronized automaton pair of one solver.
pub struct SyncPds {
    call: PAutomaton<CallLabel, CallState>,
    field: PAutomaton<Property, FieldState>,
    inner: Mutex<SyncInner>,
}

impl SyncPds {
    /// Create the pair and wire saturation callbacks.
    pub fn new() -> Arc<Self> {
        let pds = Arc::new(Self {
            call: PAutomaton::new(),
            field: PAutomaton::new(),
            inner: Mutex::new(SyncInner {
                rules: FxHashMap::default(),
                rule_set: FxHashSet::default(),
                call_witnessed: FxHashSet::default(),
                field_witnessed: FxHashSet::default(),
                reached: FxHashSet::default(),
                node_handler: None,
                unbalanced: Vec::new(),
                unbalanced_seen: FxHashSet::default(),
                unbalanced_listeners: Vec::new(),
            }),
        });

        let weak: Weak<SyncPds> = Arc::downgrade(&pds);
        pds.call.on_any_transition(Arc::new(move |transition| {
            if let Some(pds) = weak.upgrade() {
                pds.on_call_transition(transition);
            }
        }));
        let weak: Weak<SyncPds> = Arc::downgrade(&pds);
        pds.field.on_any_transition(Arc::new(move |transition| {
            if let Some(pds) = weak.upgrade() {
                pds.on_field_transition(transition);
            }
        }));
        pds
    }

    /// The flow-function entry point: invoked exactly once per discovered
    /// (point, fact) pair.
    pub fn set_node_handler(&self, handler: NodeHandler) {
        self.inner.lock().node_handler = Some(handler);
    }

    /// Subscribe to unbalanced pops, replay-then-live.
    pub fn on_unbalanced_pop(&self, listener: UnbalancedPopListener) {
        let replay = {
            let mut inner = self.inner.lock();
            inner.unbalanced_listeners.push(listener.clone());
            inner.unbalanced.clone()
        };
        for pop in replay {
            listener(&pop);
        }
    }

    /// Start exploration from the query root: the call stack consists of
    /// the root statement over the unexplored `Root`, the field stack is at
    /// its starting height.
    pub fn seed(&self, root: &SolverNode) {
        self.call.add_transition(Transition {
            source: CallState::Fact(root.fact.clone()),
            label: CallLabel::Stmt(root.point),
            target: CallState::Root,
        });
        self.field.add_transition(Transition {
            source: FieldState::Node(root.clone()),
            label: Property::Empty,
            target: FieldState::Root,
        });
    }

    /// Insert `rule` at `curr`. Re-insertion is a no-op; a genuinely new
    /// rule is applied against everything already known about `curr` and
    /// re-applied automatically as more becomes known.
    pub fn propagate(&self, curr: &SolverNode, rule: Rule) -> bool {
        {
            let mut inner = self.inner.lock();
            if !inner.rule_set.insert((curr.clone(), rule.clone())) {
                return false;
            }
            inner.rules.entry(curr.clone()).or_default().push(rule.clone());
        }
        debug!(node = %curr, ?rule, "propagate");
        let call_source = CallState::Fact(curr.fact.clone());
        for transition in self.call.outgoing_of(&call_source) {
            if transition.label == CallLabel::Stmt(curr.point) {
                self.apply_call_side(curr, &rule, &transition);
            }
        }
        let field_source = FieldState::Node(curr.clone());
        for transition in self.field.outgoing_of(&field_source) {
            self.apply_field_side(curr, &rule, &transition);
        }
        true
    }

    /// Field automaton of this pair; the acceptance condition is observed
    /// through listeners on its `Root` state.
    pub fn field_automaton(&self) -> &PAutomaton<Property, FieldState> {
        &self.field
    }

    /// Call automaton of this pair.
    pub fn call_automaton(&self) -> &PAutomaton<CallLabel, CallState> {
        &self.call
    }

    pub fn is_reached(&self, node: &SolverNode) -> bool {
        self.inner.lock().reached.contains(node)
    }

    pub fn reached_count(&self) -> usize {
        self.inner.lock().reached.len()
    }

    fn on_call_transition(&self, transition: &Transition<CallLabel, CallState>) {
        let (CallState::Fact(fact), CallLabel::Stmt(point)) = (&transition.source, &transition.label)
        else {
            return;
        };
        let node = SolverNode { point: *point, fact: fact.clone() };
        let (newly_reached, handler, rules) = {
            let mut inner = self.inner.lock();
            inner.call_witnessed.insert(node.clone());
            let newly_reached =
                inner.field_witnessed.contains(&node) && inner.reached.insert(node.clone());
            let handler = inner.node_handler.clone();
            let rules = inner.rules.get(&node).cloned().unwrap_or_default();
            (newly_reached, handler, rules)
        };
        for rule in &rules {
            self.apply_call_side(&node, rule, transition);
        }
        if newly_reached {
            debug!(node = %node, "reached");
            if let Some(handler) = handler {
                handler(node);
            }
        }
    }

    fn on_field_transition(&self, transition: &Transition<Property, FieldState>) {
        let FieldState::Node(node) = &transition.source else {
            return;
        };
        let (newly_reached, handler, rules) = {
            let mut inner = self.inner.lock();
            inner.field_witnessed.insert(node.clone());
            let newly_reached =
                inner.call_witnessed.contains(node) && inner.reached.insert(node.clone());
            let handler = inner.node_handler.clone();
            let rules = inner.rules.get(node).cloned().unwrap_or_default();
            (newly_reached, handler, rules)
        };
        for rule in &rules {
            self.apply_field_side(node, rule, transition);
        }
        if newly_reached {
            debug!(node = %node, "reached");
            if let Some(handler) = handler {
                handler(node.clone());
            }
        }
    }

    /// Call-automaton effect of `rule`, applied against one transition of
    /// `curr`. Push/pop rules of the field system are call-normal here.
    fn apply_call_side(
        &self,
        curr: &SolverNode,
        rule: &Rule,
        transition: &Transition<CallLabel, CallState>,
    ) {
        match rule {
            Rule::Normal(next) | Rule::FieldPush { target: next, .. } => {
                self.call.add_transition(Transition {
                    source: CallState::Fact(next.fact.clone()),
                    label: CallLabel::Stmt(next.point),
                    target: transition.target.clone(),
                });
            }
            Rule::FieldPop { fact, read_site, .. } => {
                self.call.add_transition(Transition {
                    source: CallState::Fact(fact.clone()),
                    label: CallLabel::Stmt(*read_site),
                    target: transition.target.clone(),
                });
            }
            Rule::CallPush { target, call_site } => {
                let generated = CallState::Gen(target.clone());
                self.call.add_transition(Transition {
                    source: generated.clone(),
                    label: CallLabel::Stmt(*call_site),
                    target: transition.target.clone(),
                });
                self.call.add_transition(Transition {
                    source: CallState::Fact(target.fact.clone()),
                    label: CallLabel::Stmt(target.point),
                    target: generated,
                });
            }
            Rule::CallPop { fact, .. } => {
                if transition.target == CallState::Root {
                    self.record_unbalanced(UnbalancedPop {
                        curr: curr.clone(),
                        fact: fact.clone(),
                        exited_point: curr.point,
                    });
                } else {
                    self.call.add_transition(Transition {
                        source: CallState::Fact(fact.clone()),
                        label: CallLabel::Epsilon,
                        target: transition.target.clone(),
                    });
                }
            }
        }
    }

    /// Field-automaton effect of `rule`, applied against one transition of
    /// `curr`. Push/pop rules of the call system are field-normal here.
    fn apply_field_side(
        &self,
        _curr: &SolverNode,
        rule: &Rule,
        transition: &Transition<Property, FieldState>,
    ) {
        match rule {
            Rule::Normal(next) | Rule::CallPush { target: next, .. } => {
                self.field.add_transition(Transition {
                    source: FieldState::Node(next.clone()),
                    label: transition.label.clone(),
                    target: transition.target.clone(),
                });
            }
            Rule::CallPop { fact, return_site } => {
                self.field.add_transition(Transition {
                    source: FieldState::Node(SolverNode::new(*return_site, fact.clone())),
                    label: transition.label.clone(),
                    target: transition.target.clone(),
                });
            }
            Rule::FieldPush { target, property } => {
                let generated = FieldState::Gen(target.clone(), property.clone());
                self.field.add_transition(Transition {
                    source: generated.clone(),
                    label: transition.label.clone(),
                    target: transition.target.clone(),
                });
                self.field.add_transition(Transition {
                    source: FieldState::Node(target.clone()),
                    label: property.clone(),
                    target: generated,
                });
            }
            Rule::FieldPop { fact, read_site, property } => {
                // The wildcard property stands for the transitive
                // has-property closure: it consumes any named symbol.
                let matches = transition.label == *property
                    || (*property == Property::Wildcard
                        && matches!(transition.label, Property::Named(_)));
                if matches {
                    self.field.add_transition(Transition {
                        source: FieldState::Node(SolverNode::new(*read_site, fact.clone())),
                        label: Property::Epsilon,
                        target: transition.target.clone(),
                    });
                }
            }
        }
    }

    fn record_unbalanced(&self, pop: UnbalancedPop) {
        let listeners = {
            let mut inner = self.inner.lock();
            if !inner.unbalanced_seen.insert(pop.clone()) {
                return;
            }
            inner.unbalanced.push(pop.clone());
            inner.unbalanced_listeners.clone()
        };
        debug!(curr = %pop.curr, fact = %pop.fact, "unbalanced pop");
        for listener in listeners {
            listener(&pop);
        }
    }
}

impl std::fmt::Debug for SyncPds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncPds")
            .field("reached", &self.reached_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::domain::{FuncId, Register};
    use parking_lot::Mutex as PlMutex;

    fn reg(id: i32) -> Value {
        Value::Reg(Register::new(id, FuncId(0)))
    }

    fn node(point: u32, fact_id: i32) -> SolverNode {
        SolverNode { point: NodeId(point), fact: reg(fact_id) }
    }

    fn collecting_pds() -> (Arc<SyncPds>, Arc<PlMutex<Vec<SolverNode>>>) {
        let pds = SyncPds::new();
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        pds.set_node_handler(Arc::new(move |n| sink.lock().push(n)));
        (pds, seen)
    }

    #[test]
    fn test_seed_reaches_root_once() {
        let (pds, seen) = collecting_pds();
        let root = node(0, 1);
        pds.seed(&root);
        pds.seed(&root);
        assert_eq!(seen.lock().as_slice(), &[root]);
    }

    #[test]
    fn test_propagate_is_idempotent() {
        let (pds, seen) = collecting_pds();
        let root = node(0, 1);
        pds.seed(&root);
        assert!(pds.propagate(&root, Rule::Normal(node(1, 1))));
        assert!(!pds.propagate(&root, Rule::Normal(node(1, 1))));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_matched_pop_resumes_at_saved_frame() {
        let (pds, seen) = collecting_pds();
        let root = node(0, 1);
        pds.seed(&root);
        // call site 0 pushes into a callee at point 10 carrying fact 2
        pds.propagate(
            &root,
            Rule::CallPush { target: node(10, 2), call_site: NodeId(0) },
        );
        // the callee returns fact 3 to the call site
        pds.propagate(
            &node(10, 2),
            Rule::CallPop { fact: reg(3), return_site: NodeId(0) },
        );
        assert!(pds.is_reached(&node(0, 3)));
        assert!(seen.lock().contains(&node(0, 3)));
    }

    #[test]
    fn test_unmatched_pop_is_recorded_not_resumed() {
        let (pds, _seen) = collecting_pds();
        let root = node(0, 1);
        pds.seed(&root);
        pds.propagate(&root, Rule::CallPop { fact: reg(3), return_site: NodeId(7) });
        let pops = Arc::new(PlMutex::new(Vec::new()));
        let sink = pops.clone();
        pds.on_unbalanced_pop(Arc::new(move |p: &UnbalancedPop| sink.lock().push(p.clone())));
        let recorded = pops.lock().clone();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].fact, reg(3));
        assert_eq!(recorded[0].exited_point, NodeId(0));
        assert!(!pds.is_reached(&node(7, 3)));
    }

    #[test]
    fn test_field_push_then_pop_restores_stack_height() {
        let (pds, _seen) = collecting_pds();
        let root = node(0, 1);
        pds.seed(&root);
        let alloc_node = node(1, 9);
        // write: push property "p", switching to the alias fact 9
        pds.propagate(
            &root,
            Rule::FieldPush { target: alloc_node.clone(), property: Property::named("p") },
        );
        // read: pop property "p" back off, continuing with fact 5
        pds.propagate(
            &alloc_node,
            Rule::FieldPop {
                fact: reg(5),
                read_site: NodeId(2),
                property: Property::named("p"),
            },
        );
        // the read result is at the starting stack height again
        let accepted = Arc::new(PlMutex::new(Vec::new()));
        let sink = accepted.clone();
        pds.field_automaton().on_in_transition(
            FieldState::Root,
            Arc::new(move |t: &Transition<Property, FieldState>| {
                if let FieldState::Node(n) = &t.source {
                    sink.lock().push(n.clone());
                }
            }),
        );
        assert!(accepted.lock().contains(&node(2, 5)));
    }

    #[test]
    fn test_wildcard_pop_consumes_any_named_property() {
        let (pds, _seen) = collecting_pds();
        let root = node(0, 1);
        pds.seed(&root);
        let alloc_node = node(1, 9);
        pds.propagate(
            &root,
            Rule::FieldPush { target: alloc_node.clone(), property: Property::named("p") },
        );
        pds.propagate(
            &alloc_node,
            Rule::FieldPop {
                fact: reg(5),
                read_site: NodeId(2),
                property: Property::Wildcard,
            },
        );
        assert!(pds.is_reached(&node(2, 5)));
    }

    #[test]
    fn test_mismatched_property_pop_goes_nowhere() {
        let (pds, _seen) = collecting_pds();
        let root = node(0, 1);
        pds.seed(&root);
        let alloc_node = node(1, 9);
        pds.propagate(
            &root,
            Rule::FieldPush { target: alloc_node.clone(), property: Property::named("p") },
        );
        pds.propagate(
            &alloc_node,
            Rule::FieldPop {
                fact: reg(5),
                read_site: NodeId(2),
                property: Property::named("q"),
            },
        );
        assert!(!pds.is_reached(&node(2, 5)));
    }
}
