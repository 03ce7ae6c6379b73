//! Backward transfer functions
//!
//! Role-reversed counterparts of the forward rules: flow moves along
//! predecessors, call pushes descend into callee exits, and function
//! entries hand flow back to the argument registers of discovered call
//! sites. Backward queries terminate at allocation sites.

use super::ops::FlowOps;
use crate::errors::Result;
use crate::features::automaton::Rule;
use crate::features::facts::{Property, SolverNode, Value, Variable};
use crate::features::flow_graph::domain::{CallSite, NodeId, NodeKind, Register};
use tracing::debug;

pub(crate) fn apply(ops: &FlowOps) -> Result<()> {
    let graph = ops.graph().clone();
    let node = graph.node(ops.point()).clone();
    let fact = ops.fact().clone();
    debug!(node = %node, fact = %fact, "bwd transfer");
    match &node.kind {
        NodeKind::Entry => {
            // Reaching the entry backwards leaves the procedure. Only
            // variables and object allocations survive the boundary.
            if matches!(fact, Value::Var(_)) || fact.is_object_allocation() {
                flow_to_function_entry(ops);
            }
        }
        NodeKind::Exit => ops.treat_as_nop(),
        NodeKind::Constant { result } => {
            if !fact.is_register(*result) {
                ops.treat_as_nop();
            }
        }
        NodeKind::NewObject { result } => {
            if !fact.is_register(*result) {
                ops.treat_as_nop();
            }
        }
        NodeKind::DeclareFunction { function, result } => match result {
            None => {
                // A top-level declaration binds the function's name; the
                // binding's flow ends at its declaration.
                let name = graph.function(*function).name.clone().unwrap_or_default();
                let declared =
                    Variable::new(&name, ops.declaring_scope_or_record(&name, node.func));
                if fact != Value::Var(declared) {
                    ops.treat_as_nop();
                }
            }
            Some(result) => {
                if !fact.is_register(*result) {
                    ops.treat_as_nop();
                }
            }
        },
        NodeKind::ReadVariable { name, result, result_base } => {
            let killed = fact.is_register(*result)
                || result_base.is_some_and(|base| fact.is_register(base));
            if !killed {
                ops.treat_as_nop();
            }
            let read = || Variable::new(name, ops.declaring_scope_or_record(name, node.func));
            if fact.is_register(*result) {
                // A name provably bound to function declarations resolves
                // without further data-flow exploration.
                let resolved = ops.ctx.syntactic().read_var_to_functions(node.id);
                if resolved.is_empty() {
                    ops.gen_normal(read());
                } else {
                    let root = ops.solver.initial_node().clone();
                    for func in resolved {
                        if let Some(decl) = graph.function(func).decl_site {
                            if let Some(alloc) =
                                crate::features::facts::Allocation::at(&graph, decl)
                            {
                                ops.ctx.add_points_to_fact(root.point, root.fact.clone(), alloc);
                            }
                        }
                    }
                }
            } else if result_base.is_some_and(|base| fact.is_register(base)) {
                ops.gen_normal(read());
            }
        }
        NodeKind::WriteVariable { name, value } => {
            let written = Variable::new(name, ops.declaring_scope_or_record(name, node.func));
            if fact == Value::Var(written) {
                ops.gen_normal(*value);
            } else {
                ops.treat_as_nop();
            }
        }
        NodeKind::ReadProperty { base, property, result } => match property.fixed() {
            Some(prop_name) => {
                if !fact.is_register(*result) {
                    ops.treat_as_nop();
                } else {
                    flow_to_field_read(
                        ops,
                        node.id,
                        *base,
                        Property::named(prop_name),
                        ops.curr.clone(),
                    );
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
                if fact.is_object_allocation() {
                    let query_value = fact.clone();
                    let value = *value;
                    let write_site = node.id;
                    ops.with_allocation_sites_of(node.id, *base, move |ops, alloc| {
                        if Value::Alloc(alloc.clone()) != query_value {
                            return;
                        }
                        // The tracked allocation is the base: the write is
                        // where the stored value entered the property.
                        let source = SolverNode::new(write_site, alloc.clone());
                        for pred in ops.graph().predecessors_of(write_site) {
                            ops.propagate_from(
                                &source,
                                Rule::FieldPop {
                                    fact: Value::Reg(value),
                                    read_site: pred,
                                    property: property.clone(),
                                },
                            );
                        }
                    });
                }
            }
            None => {
                ops.log_unsoundness("property write through computed key");
                ops.treat_as_nop();
            }
        },
        NodeKind::Call(call) => handle_call(ops, call),
        NodeKind::Return { .. } => ops.treat_as_nop(),
        NodeKind::BinaryOp { lhs, rhs, result } => {
            if fact.is_register(*result) {
                // Operator semantics are not modeled; over-approximate by
                // flowing the result into both operands.
                ops.gen_normal(*lhs);
                ops.gen_normal(*rhs);
            } else {
                ops.treat_as_nop();
            }
        }
        NodeKind::UnaryOp { arg, result } => {
            if fact.is_register(*result) {
                ops.gen_normal(*arg);
            } else {
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

fn handle_call(ops: &FlowOps, call: &CallSite) {
    let graph = ops.graph().clone();
    let point = ops.point();
    let fact = ops.fact().clone();

    // A method-call marker is resolved right here: it stands for the value
    // read off the base object's property, so desugar it into a synthetic
    // register fed by that property read.
    if let Value::MethodCall(site) = &fact {
        debug_assert_eq!(*site, point);
        let func = graph.node(point).func;
        let synthetic = Register::synthetic_for(point, func);
        let synthetic_state = SolverNode::new(point, synthetic);
        ops.propagate(Rule::Normal(synthetic_state.clone()));
        if let (Some(base), Some(method)) = (call.base, call.method.clone()) {
            flow_to_field_read(ops, point, base, Property::named(&method), synthetic_state);
        }
        return;
    }

    let is_result = call.result.is_some_and(|result| fact.is_register(result));
    if !is_result {
        ops.treat_as_nop();
    }
    if call.host_hook.is_some() {
        return;
    }
    // The object created by a constructor call does not exist before it.
    if call.constructor && is_result {
        return;
    }
    if is_result || fact.is_object_allocation() {
        match ops.resolve_call_with_queries() {
            Some((targets, queries)) => {
                for query in &queries {
                    ops.ctx.register_query_dependency(ops.solver.query(), query);
                }
                let tag = ops.query_id(false, false);
                ops.continue_with_subquery_result(&targets, tag, move |ops, callee| {
                    let graph = ops.graph();
                    let function = graph.function(*callee);
                    debug!(callee = %callee, "bwd flow into callee");
                    let fact = ops.fact().clone();
                    let value = if fact.is_object_allocation() {
                        fact
                    } else {
                        // Continue from whatever the callee returns.
                        let ret = function
                            .return_register
                            .unwrap_or(Register::new(1, *callee));
                        Value::Reg(ret)
                    };
                    ops.propagate(Rule::CallPush {
                        target: SolverNode::new(function.exit, value),
                        call_site: ops.point(),
                    });
                });
            }
            None => {
                ops.log_unsoundness("call through dynamically computed callee");
                handle_unresolved_call(ops, call);
            }
        }
    }
}

/// The tracked value was read off a property: push the property onto the
/// field stack of every allocation the base may refer to, and continue
/// tracking those allocations backwards.
fn flow_to_field_read(
    ops: &FlowOps,
    location: NodeId,
    base: Register,
    property: Property,
    source: SolverNode,
) {
    ops.with_allocation_sites_of(location, base, move |ops, alloc| {
        for pred in ops.graph().predecessors_of(location) {
            ops.propagate_from(
                &source,
                Rule::FieldPush {
                    target: SolverNode::new(pred, alloc.clone()),
                    property: property.clone(),
                },
            );
        }
    });
}

/// Backward flow reached a function entry: hand the value back to every
/// discovered call site: parameters to the matching argument register,
/// captured bindings to the end of the declaring scope.
fn flow_to_function_entry(ops: &FlowOps) {
    let graph = ops.graph().clone();
    let node = graph.node(ops.point()).clone();
    let containing = graph.function(node.func).clone();
    if containing.is_main() {
        return;
    }
    let fact = ops.fact().clone();
    debug!(func = %node.func, %fact, "bwd flow reached function entry");
    let Some((invocations, invocations_query)) = ops.find_invocations_with_query(node.func)
    else {
        return;
    };
    ops.ctx.register_query_dependency(ops.solver.query(), &invocations_query);
    let tag = ops.query_id(true, false);

    // The exit of the scope this function was declared in; a captured
    // binding is reachable there via the lexical environment.
    let declaring_exit = containing
        .decl_site
        .map(|decl| graph.function(graph.node(decl).func).exit);

    match fact {
        Value::Var(var) => {
            if let Some(param_index) = containing.param_index(&var.name) {
                ops.continue_with_subquery_result(&invocations, tag, move |ops, invoke| {
                    let graph = ops.graph();
                    let Some(call) = graph.node(*invoke).as_call() else { return };
                    // Callers passing too few arguments contribute nothing.
                    let Some(arg) = call.args.get(param_index) else { return };
                    ops.propagate(Rule::Normal(SolverNode::new(*invoke, *arg)));
                });
            } else {
                ops.continue_with_subquery_result(&invocations, tag, move |ops, invoke| {
                    let graph = ops.graph();
                    let invoke_scope = graph.node(*invoke).func;
                    if !var.is_visible_in(invoke_scope, graph) {
                        // Not visible at the call site: it was captured, so
                        // it lives at the end of its defining scope.
                        if let Some(exit) = declaring_exit {
                            ops.propagate(Rule::Normal(SolverNode::new(
                                exit,
                                Value::Var(var.clone()),
                            )));
                        }
                    } else {
                        ops.propagate(Rule::CallPop {
                            fact: Value::Var(var.clone()),
                            return_site: *invoke,
                        });
                    }
                });
            }
        }
        Value::Alloc(alloc) => {
            // For an allocation we cannot tell whether it arrived through
            // the call stack or the lexical environment; follow both.
            ops.continue_with_subquery_result(&invocations, tag, move |ops, invoke| {
                let graph = ops.graph();
                if let Some(exit) = declaring_exit {
                    ops.propagate(Rule::Normal(SolverNode::new(
                        exit,
                        Value::Alloc(alloc.clone()),
                    )));
                }
                for pred in graph.predecessors_of(*invoke) {
                    ops.propagate(Rule::CallPop {
                        fact: Value::Alloc(alloc.clone()),
                        return_site: pred,
                    });
                }
            });
        }
        _ => {}
    }
}

/// Unknown callee: the result may depend on any argument (and, for method
/// calls, on the base object).
fn handle_unresolved_call(ops: &FlowOps, call: &CallSite) {
    let graph = ops.graph();
    for arg in &call.args {
        for pred in graph.predecessors_of(ops.point()) {
            ops.propagate(Rule::Normal(SolverNode::new(pred, *arg)));
        }
    }
    if call.is_method_call() {
        if let Some(base) = call.base {
            for pred in graph.predecessors_of(ops.point()) {
                ops.propagate(Rule::Normal(SolverNode::new(pred, base)));
            }
        }
    }
}
