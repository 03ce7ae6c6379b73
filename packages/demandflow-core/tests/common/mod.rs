//! Shared helpers for integration tests: thin wrappers that keep desugared
//! test programs readable.

#![allow(dead_code)]

use demandflow_core::{
    AnalysisConfig, AnalysisContext, CallSite, FlowGraph, FlowGraphBuilder, FuncId, NodeId,
    NodeKind, PropertyKey, Register,
};
use std::sync::Arc;

pub fn context(graph: FlowGraph) -> Arc<AnalysisContext> {
    AnalysisContext::new(Arc::new(graph), AnalysisConfig::default())
}

pub fn read_var(b: &mut FlowGraphBuilder, f: FuncId, name: &str, result: Register) -> NodeId {
    b.append(
        f,
        NodeKind::ReadVariable { name: name.into(), result, result_base: None },
    )
}

pub fn write_var(b: &mut FlowGraphBuilder, f: FuncId, name: &str, value: Register) -> NodeId {
    b.append(f, NodeKind::WriteVariable { name: name.into(), value })
}

pub fn new_object(b: &mut FlowGraphBuilder, f: FuncId, result: Register) -> NodeId {
    b.append(f, NodeKind::NewObject { result })
}

pub fn constant(b: &mut FlowGraphBuilder, f: FuncId, result: Register) -> NodeId {
    b.append(f, NodeKind::Constant { result })
}

pub fn declare(b: &mut FlowGraphBuilder, f: FuncId, function: FuncId, result: Option<Register>) -> NodeId {
    b.append(f, NodeKind::DeclareFunction { function, result })
}

pub fn ret(b: &mut FlowGraphBuilder, f: FuncId, value: Register) -> NodeId {
    b.append(f, NodeKind::Return { value: Some(value) })
}

/// `result = callee(args...)` through a function register.
pub fn call(
    b: &mut FlowGraphBuilder,
    f: FuncId,
    function_register: Register,
    args: &[Register],
    result: Register,
) -> NodeId {
    b.append(
        f,
        NodeKind::Call(CallSite {
            function_register: Some(function_register),
            base: None,
            method: None,
            args: args.to_vec(),
            result: Some(result),
            constructor: false,
            host_hook: None,
        }),
    )
}

pub fn read_property(
    b: &mut FlowGraphBuilder,
    f: FuncId,
    base: Register,
    property: &str,
    result: Register,
) -> NodeId {
    b.append(
        f,
        NodeKind::ReadProperty {
            base,
            property: PropertyKey::Fixed(property.into()),
            result,
        },
    )
}

pub fn write_property(
    b: &mut FlowGraphBuilder,
    f: FuncId,
    base: Register,
    property: &str,
    value: Register,
) -> NodeId {
    b.append(
        f,
        NodeKind::WriteProperty {
            base,
            property: PropertyKey::Fixed(property.into()),
            value,
        },
    )
}
