//! Forward transfer functions
//!
//! One rule per instruction kind, following the kill/gen discipline: an
//! instruction defining a value kills flow of whatever it overwrites and
//! generates flow for what it introduces. Interprocedural steps never
//! block: callee sets, invocation sets and alias sets are sub-query results
//! delivered through live collections.

use super::ops::FlowOps;
use crate::errors::Result;
use crate::features::automaton::Rule;
use crate::features::facts::{Allocation, Property, SolverNode, Value, Variable};
use crate::features::flow_graph::domain::{CallSite, FuncId, NodeId, NodeKind, Register};
use crate::features::solver::query::{Direction, Query, QueryId};
use tracing::debug;

pub(crate) fn apply(ops: &FlowOps) -> Result<()> {
    let graph = ops.graph().clone();
    let node = graph.node(ops.point()).clone();
    let fact = ops.fact().clone();
    debug!(node = %node, fact = %fact, "fwd transfer");
    match &node.kind {
        NodeKind::Entry => {
            // A value bound in this function may be captured by a closure
            // declared here; propagate it along the capture edges as well.
            if let Value::Var(var) = &fact {
                if var.scope == node.func {
                    for decl in ops.ctx.captured().functions_capturing_var_in(node.func, &var.name)
                    {
                        flow_to_closure_var(ops, var.clone(), decl);
                    }
                }
            }
            ops.treat_as_nop();
        }
        NodeKind::Exit => {}
        NodeKind::Constant { result } => {
            if fact.as_allocation().is_some_and(|a| a.site == node.id) {
                ops.gen_normal(*result);
            }
            ops.treat_as_nop();
        }
        NodeKind::NewObject { .. } => ops.treat_as_nop(),
        NodeKind::DeclareFunction { function, result } => {
            let alloc = Value::Alloc(
                Allocation::at(&graph, node.id).expect("declare-function is an allocation site"),
            );
            if let Some(result) = result {
                if fact == alloc {
                    // Invocation discovery starts from declaration sites, so
                    // the declared function also flows into its register.
                    ops.gen_normal(*result);
                } else if !fact.is_register(*result) {
                    ops.treat_as_nop();
                }
            }
            match graph.function(*function).name.clone() {
                Some(name) if !name.is_empty() => {
                    let func_var = Variable::new(&name, node.func);
                    if fact == alloc {
                        // Short-circuit data flow through the binding: jump
                        // straight to every syntactic read of the name.
                        for reference in
                            ops.ctx.syntactic().references_to_function_name(*function).iter()
                        {
                            if let NodeKind::ReadVariable { result, .. } =
                                &graph.node(*reference).kind
                            {
                                for succ in graph.successors_of(*reference) {
                                    ops.propagate(Rule::Normal(SolverNode::new(succ, *result)));
                                }
                            }
                        }
                    } else if fact != Value::Var(func_var) {
                        ops.treat_as_nop();
                    }
                }
                _ => {
                    if result.is_none() {
                        ops.treat_as_nop();
                    }
                }
            }
        }
        NodeKind::ReadVariable { name, result, .. } => {
            let read = Variable::new(name, ops.declaring_scope_or_record(name, node.func));
            if !fact.is_register(*result) {
                ops.treat_as_nop();
            }
            if fact == Value::Var(read) {
                ops.gen_normal(*result);
            }
        }
        NodeKind::WriteVariable { name, value } => {
            let write = Variable::new(name, ops.declaring_scope_or_record(name, node.func));
            if fact != Value::Var(write.clone()) {
                ops.treat_as_nop();
            }
            let defines = fact.is_register(*value)
                || fact
                    .as_allocation()
                    .is_some_and(|alloc| alloc.is_object() && alloc.result == *value);
            if defines {
                ops.gen_normal(write);
                // The written binding may be captured by closures declared
                // in this scope.
                let captured = Variable::new(name, node.func);
                for decl in ops.ctx.captured().functions_capturing_var_in(node.func, name) {
                    flow_to_closure_var(ops, captured.clone(), decl);
                }
            }
        }
        NodeKind::ReadProperty { base, property, result } => match property.fixed() {
            Some(prop_name) => {
                let property = Property::named(prop_name);
                if !fact.is_register(*result) {
                    ops.treat_as_nop();
                }
                if fact.is_object_allocation() {
                    let result = *result;
                    let query_value = fact.clone();
                    let read_site = node.id;
                    ops.with_allocation_sites_of(node.id, *base, move |ops, alloc| {
                        if Value::Alloc(alloc.clone()) != query_value {
                            return;
                        }
                        // The tracked allocation is the base: the read pops
                        // the property off its field stack.
                        let source = SolverNode::new(read_site, alloc.clone());
                        for succ in ops.graph().successors_of(read_site) {
                            ops.propagate_from(
                                &source,
                                Rule::FieldPop {
                                    fact: Value::Reg(result),
                                    read_site: succ,
                                    property: property.clone(),
                                },
                            );
                        }
                    });
                }
            }
            None => {
                ops.log_unsoundness("property read through computed key");
                ops.treat_as_nop();
            }
        },
        NodeKind::WriteProperty { base, property, value } => match property.fixed() {
            Some(prop_name) => {
                let property = Property::named(prop_name);
                ops.treat_as_nop();
                if fact.is_register(*value) {
                    let write_site = node.id;
                    ops.with_allocation_sites_of(node.id, *base, move |ops, alloc| {
                        // The written value is reachable through the
                        // property on every alias of the base.
                        for succ in ops.graph().successors_of(write_site) {
                            ops.propagate(Rule::FieldPush {
                                target: SolverNode::new(succ, alloc.clone()),
                                property: property.clone(),
                            });
                        }
                    });
                }
            }
            None => {
                ops.log_unsoundness("property write through computed key");
                ops.treat_as_nop();
            }
        },
        NodeKind::Call(call) => {
            if call.host_hook.is_some() {
                ops.treat_as_nop();
                return Ok(());
            }
            let passed_as_argument = call.args.iter().any(|arg| fact.is_register(*arg));
            let should_analyze_callee = fact.is_object_allocation()
                || passed_as_argument
                || matches!(fact, Value::Var(_));
            if should_analyze_callee {
                match ops.resolve_call_with_queries() {
                    Some((targets, queries)) => {
                        for query in &queries {
                            ops.ctx.register_query_dependency(ops.solver.query(), query);
                        }
                        let tag = ops.query_id(false, false);
                        let call = call.clone();
                        ops.continue_with_subquery_result(&targets, tag, move |ops, callee| {
                            if let Value::Var(var) = ops.fact() {
                                if !var.is_visible_in(*callee, ops.graph()) {
                                    return;
                                }
                            }
                            flow_to_callee(ops, &call, *callee);
                        });
                    }
                    None => {
                        ops.log_unsoundness("call through dynamically computed callee");
                        handle_unresolved_call(ops, call);
                    }
                }
            }
            // Values also flow across the call site.
            ops.treat_as_nop();
        }
        NodeKind::Return { value } => flow_to_return(ops, *value),
        NodeKind::BinaryOp { lhs, rhs, .. } => {
            if !fact.is_register(*lhs) && !fact.is_register(*rhs) {
                ops.treat_as_nop();
            }
        }
        NodeKind::UnaryOp { arg, .. } => {
            if !fact.is_register(*arg) {
                ops.treat_as_nop();
            }
        }
        NodeKind::BeginWith { .. } | NodeKind::EndWith => {
            ops.treat_as_nop();
            ops.log_unsoundness("with statement");
        }
        NodeKind::EventDispatch => {
            ops.treat_as_nop();
            ops.log_unsoundness("event dispatch");
        }
        NodeKind::If { .. }
        | NodeKind::Nop
        | NodeKind::BeginForIn { .. }
        | NodeKind::NextProperty { .. }
        | NodeKind::HasNextProperty { .. }
        | NodeKind::Throw { .. }
        | NodeKind::Catch { .. } => ops.treat_as_nop(),
    }
    Ok(())
}

/// Bind the tracked value into a resolved callee: visible variables and
/// allocations enter whole; argument registers enter as the corresponding
/// formal parameter. Either way a call frame for this site is pushed.
fn flow_to_callee(ops: &FlowOps, call: &CallSite, callee: FuncId) {
    let graph = ops.graph();
    let entry = graph.function(callee).entry;
    let call_site = ops.point();
    let fact = ops.fact().clone();
    debug!(%fact, %callee, "fwd flow into callee");
    let enters_whole = fact.is_object_allocation()
        || matches!(&fact, Value::Var(var) if var.is_visible_in(callee, graph));
    if enters_whole {
        ops.propagate(Rule::CallPush {
            target: SolverNode::new(entry, fact),
            call_site,
        });
        return;
    }
    for (index, arg) in call.args.iter().enumerate() {
        if !fact.is_register(*arg) {
            continue;
        }
        // An extra argument with no matching formal simply does not enter.
        let Some(param) = graph.function(callee).params.get(index) else {
            continue;
        };
        let param = Variable::new(param, callee);
        ops.propagate(Rule::CallPush {
            target: SolverNode::new(entry, param),
            call_site,
        });
    }
}

/// Return flow: pop to each caller's result register, hand formal
/// parameters back to the actual argument registers, and let visible
/// variables and allocations survive the call site.
fn flow_to_return(ops: &FlowOps, value: Option<Register>) {
    let graph = ops.graph();
    let node = graph.node(ops.point()).clone();
    let function = graph.function(node.func);
    if function.is_main() {
        return;
    }
    let fact = ops.fact().clone();
    // A register of this function that is not returned dies here.
    if let Value::Reg(reg) = &fact {
        if reg.func == node.func && value != Some(*reg) {
            return;
        }
    }
    let Some((invocations, invocations_query)) = ops.find_invocations_with_query(node.func)
    else {
        return;
    };
    ops.ctx.register_query_dependency(ops.solver.query(), &invocations_query);
    let tag = ops.query_id(true, false);
    let params = function.params.clone();
    let func = node.func;
    ops.continue_with_subquery_result(&invocations, tag, move |ops, return_site| {
        let graph = ops.graph();
        let Some(call) = graph.node(*return_site).as_call().cloned() else {
            return;
        };
        let fact = ops.fact().clone();
        if let Some(value) = value {
            if fact.is_register(value) {
                if let Some(result) = call.result {
                    ops.propagate(Rule::CallPop {
                        fact: Value::Reg(result),
                        return_site: *return_site,
                    });
                }
            }
        }
        // Formal parameters flow back into the actual argument registers.
        for (index, param) in params.iter().enumerate() {
            if fact == Value::Var(Variable::new(param, func)) {
                if let Some(arg) = call.args.get(index) {
                    for succ in graph.successors_of(*return_site) {
                        ops.propagate(Rule::Normal(SolverNode::new(succ, *arg)));
                    }
                }
            }
        }
        let survives = matches!(fact, Value::Alloc(_))
            || matches!(&fact, Value::Var(var)
                if var.is_visible_in(graph.node(*return_site).func, graph));
        if survives {
            for succ in graph.successors_of(*return_site) {
                ops.propagate(Rule::Normal(SolverNode::new(succ, fact.clone())));
            }
        }
    });
}

/// A binding captured by a closure is live wherever the closure is called:
/// route it to every call site of the capturing function and from there
/// into the function body.
fn flow_to_closure_var(ops: &FlowOps, captured: Variable, capturing_decl: NodeId) {
    let graph = ops.graph();
    let NodeKind::DeclareFunction { function, .. } = &graph.node(capturing_decl).kind else {
        return;
    };
    let function = *function;
    let Some((call_sites, invocations_query)) = ops.find_invocations_with_query(function) else {
        return;
    };
    let tag = QueryId::CapturedVar {
        at: Query { node: ops.curr.clone(), direction: Direction::Forward },
        sub: invocations_query.clone(),
    };
    ops.ctx.register_query_dependency(ops.solver.query(), &invocations_query);
    let entry = graph.function(function).entry;
    ops.continue_with_subquery_result(&call_sites, tag, move |ops, call_site| {
        let call_state = SolverNode::new(*call_site, captured.clone());
        let root = ops.solver.initial_node().clone();
        // The binding reaches the call site through the lexical
        // environment, not the stack, hence plain flow from the root.
        ops.propagate_from(&root, Rule::Normal(call_state.clone()));
        ops.propagate_from(&call_state, Rule::Normal(SolverNode::new(entry, captured.clone())));
    });
}

/// The callee is unknown: conservatively let every argument flow into the
/// call's result so data dependencies are not lost.
fn handle_unresolved_call(ops: &FlowOps, call: &CallSite) {
    let Some(result) = call.result else { return };
    let fact = ops.fact();
    if call.args.iter().any(|arg| fact.is_register(*arg)) {
        for succ in ops.graph().successors_of(ops.point()) {
            ops.propagate(Rule::Normal(SolverNode::new(succ, result)));
        }
    }
}
