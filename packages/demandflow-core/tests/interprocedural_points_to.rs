//! Interprocedural behavior: call/return binding, unbalanced pops, and
//! heap flow through properties.

mod common;

use common::*;
use demandflow_core::{FlowGraphBuilder, Register, SolverNode, Value, Variable};
use pretty_assertions::assert_eq;

/// function f(a){ return a; }  var x = {};  var y = f(x);
/// A backward query on y resolves to the allocation of {}.
#[test]
fn backward_query_through_call_and_return() {
    let mut b = FlowGraphBuilder::new();
    let main = b.main_id();
    b.declare_vars(main, &["x", "y"]);
    let f = b.begin_function(Some("f"), &["a"], main);

    let fr2 = Register::new(2, f);
    read_var(&mut b, f, "a", fr2);
    ret(&mut b, f, fr2);

    let r2 = Register::new(2, main);
    let r3 = Register::new(3, main);
    let r4 = Register::new(4, main);
    let r5 = Register::new(5, main);
    let r6 = Register::new(6, main);

    declare(&mut b, main, f, None);
    let alloc = new_object(&mut b, main, r2);
    write_var(&mut b, main, "x", r2);
    read_var(&mut b, main, "f", r3);
    read_var(&mut b, main, "x", r4);
    let call_site = call(&mut b, main, r3, &[r4], r5);
    write_var(&mut b, main, "y", r5);
    let read_y = read_var(&mut b, main, "y", r6);

    let ctx = context(b.build().unwrap());
    let solver = ctx.solve_backward(read_y, r6).unwrap();

    let points_to = solver.points_to_snapshot();
    assert!(points_to.iter().any(|a| a.site == alloc), "{points_to:?}");
    assert!(ctx.call_graph().contains(call_site, f));
    assert!(solver.errors_impacting().is_empty());
}

/// function f(a){ return a; }  f(1); f({});
/// A forward query on the returned register inside f reports both call
/// sites as return-flow origins, and the call graph carries both edges.
#[test]
fn forward_return_flow_reaches_every_call_site() {
    let mut b = FlowGraphBuilder::new();
    let main = b.main_id();
    let f = b.begin_function(Some("f"), &["a"], main);

    let fr2 = Register::new(2, f);
    read_var(&mut b, f, "a", fr2);
    let ret_site = ret(&mut b, f, fr2);

    declare(&mut b, main, f, None);
    let r10 = Register::new(10, main);
    let r11 = Register::new(11, main);
    let r12 = Register::new(12, main);
    read_var(&mut b, main, "f", r10);
    constant(&mut b, main, r11);
    let call_one = call(&mut b, main, r10, &[r11], r12);
    let r20 = Register::new(20, main);
    let r21 = Register::new(21, main);
    let r22 = Register::new(22, main);
    read_var(&mut b, main, "f", r20);
    new_object(&mut b, main, r21);
    let call_two = call(&mut b, main, r20, &[r21], r22);

    let ctx = context(b.build().unwrap());
    let solver = ctx.solve_forward(ret_site, fr2).unwrap();

    assert!(solver.is_reached(&SolverNode::new(call_one, r12)));
    assert!(solver.is_reached(&SolverNode::new(call_two, r22)));
    assert!(ctx.call_graph().contains(call_one, f));
    assert!(ctx.call_graph().contains(call_two, f));
    assert_eq!(ctx.call_graph().invocations_of(f).current_size(), 2);
}

/// Two structurally identical functions each reading an outer variable. A
/// query started inside one of them escapes through its entry into exactly
/// its own call sites, never the other function's.
#[test]
fn unbalanced_pop_is_confined_to_own_call_sites() {
    let mut b = FlowGraphBuilder::new();
    let main = b.main_id();
    b.declare_vars(main, &["s", "t"]);
    let take = b.begin_function(Some("take"), &[], main);
    let other = b.begin_function(Some("other"), &[], main);

    let tr2 = Register::new(2, take);
    read_var(&mut b, take, "s", tr2);
    let take_ret = ret(&mut b, take, tr2);

    let or2 = Register::new(2, other);
    read_var(&mut b, other, "t", or2);
    ret(&mut b, other, or2);

    declare(&mut b, main, take, None);
    declare(&mut b, main, other, None);
    let r2 = Register::new(2, main);
    let r3 = Register::new(3, main);
    let alloc_s = new_object(&mut b, main, r2);
    write_var(&mut b, main, "s", r2);
    let alloc_t = new_object(&mut b, main, r3);
    write_var(&mut b, main, "t", r3);
    let r5 = Register::new(5, main);
    let r6 = Register::new(6, main);
    read_var(&mut b, main, "take", r5);
    let call_take = call(&mut b, main, r5, &[], r6);
    let r7 = Register::new(7, main);
    let r8 = Register::new(8, main);
    read_var(&mut b, main, "other", r7);
    let call_other = call(&mut b, main, r7, &[], r8);

    let ctx = context(b.build().unwrap());
    let solver = ctx.solve_backward(take_ret, tr2).unwrap();

    let points_to = solver.points_to_snapshot();
    assert!(points_to.iter().any(|a| a.site == alloc_s), "{points_to:?}");
    assert!(!points_to.iter().any(|a| a.site == alloc_t));

    // The escaped flow resumed at take's call site, not other's.
    let s = Variable::new("s", main);
    assert!(solver.is_reached(&SolverNode::new(call_take, s.clone())));
    assert!(!solver.is_reached(&SolverNode::new(call_other, s)));
}

/// obj.p = value; r = obj.p: the backward query on the read resolves the
/// written value's allocation through the field stack.
#[test]
fn property_write_then_read_resolves_through_field_stack() {
    let mut b = FlowGraphBuilder::new();
    let main = b.main_id();
    b.declare_vars(main, &["o"]);
    let r2 = Register::new(2, main);
    let r4 = Register::new(4, main);
    let r5 = Register::new(5, main);
    let r6 = Register::new(6, main);
    let r7 = Register::new(7, main);

    let base_alloc = new_object(&mut b, main, r2);
    write_var(&mut b, main, "o", r2);
    let value_alloc = new_object(&mut b, main, r4);
    read_var(&mut b, main, "o", r5);
    write_property(&mut b, main, r5, "p", r4);
    read_var(&mut b, main, "o", r6);
    let read = read_property(&mut b, main, r6, "p", r7);

    let ctx = context(b.build().unwrap());
    let solver = ctx.solve_backward(read, r7).unwrap();

    let points_to = solver.points_to_snapshot();
    assert!(
        points_to.iter().any(|a| a.site == value_alloc),
        "{points_to:?}"
    );
    assert!(!points_to.iter().any(|a| a.site == base_alloc));
    // Alias queries were raised at both property accesses.
    assert_eq!(ctx.property_access_query_count(), 2);
}

/// Reading a property nothing ever wrote yields no allocations.
#[test]
fn mismatched_property_read_finds_nothing() {
    let mut b = FlowGraphBuilder::new();
    let main = b.main_id();
    b.declare_vars(main, &["o"]);
    let r2 = Register::new(2, main);
    let r4 = Register::new(4, main);
    let r5 = Register::new(5, main);
    let r6 = Register::new(6, main);
    let r7 = Register::new(7, main);

    new_object(&mut b, main, r2);
    write_var(&mut b, main, "o", r2);
    new_object(&mut b, main, r4);
    read_var(&mut b, main, "o", r5);
    write_property(&mut b, main, r5, "p", r4);
    read_var(&mut b, main, "o", r6);
    let read = read_property(&mut b, main, r6, "q", r7);

    let ctx = context(b.build().unwrap());
    let solver = ctx.solve_backward(read, r7).unwrap();
    assert!(solver.points_to_snapshot().is_empty());
}

/// Arguments flow into the result of a call whose callee is a dynamically
/// computed property, instead of being dropped.
#[test]
fn unresolved_dynamic_call_preserves_argument_dependency() {
    use demandflow_core::{CallSite, NodeKind, PropertyKey};

    let mut b = FlowGraphBuilder::new();
    let main = b.main_id();
    b.declare_vars(main, &["x"]);
    let r2 = Register::new(2, main);
    let r3 = Register::new(3, main);
    let r4 = Register::new(4, main);
    let r9 = Register::new(9, main);

    let alloc = new_object(&mut b, main, r2);
    write_var(&mut b, main, "x", r2);
    read_var(&mut b, main, "x", r3);
    // r4 = receiver[computed](r3)
    b.append(
        main,
        NodeKind::ReadProperty {
            base: r9,
            property: PropertyKey::Dynamic(Register::new(8, main)),
            result: r9,
        },
    );
    let dynamic_call = b.append(
        main,
        NodeKind::Call(CallSite {
            function_register: None,
            base: Some(r9),
            method: None,
            args: vec![r3],
            result: Some(r4),
            constructor: false,
            host_hook: None,
        }),
    );

    let ctx = context(b.build().unwrap());
    let solver = ctx.solve_backward(dynamic_call, r4).unwrap();
    let points_to = solver.points_to_snapshot();
    assert!(points_to.iter().any(|a| a.site == alloc), "{points_to:?}");
}

/// Values not involved in a call pass across the call site unchanged.
#[test]
fn uninvolved_values_cross_call_sites() {
    let mut b = FlowGraphBuilder::new();
    let main = b.main_id();
    b.declare_vars(main, &["x"]);
    let f = b.begin_function(Some("f"), &[], main);
    let fr = Register::new(2, f);
    constant(&mut b, f, fr);
    ret(&mut b, f, fr);

    declare(&mut b, main, f, None);
    let r2 = Register::new(2, main);
    let r3 = Register::new(3, main);
    let r4 = Register::new(4, main);
    let r5 = Register::new(5, main);
    new_object(&mut b, main, r2);
    write_var(&mut b, main, "x", r2);
    read_var(&mut b, main, "f", r3);
    call(&mut b, main, r3, &[], r4);
    let read_x = read_var(&mut b, main, "x", r5);

    let ctx = context(b.build().unwrap());
    let solver = ctx.solve_backward(read_x, r5).unwrap();
    assert_eq!(solver.points_to_snapshot().len(), 1);
}
