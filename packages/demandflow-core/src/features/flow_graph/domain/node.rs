//! Program points and instruction kinds
//!
//! A `FlowNode` is an immutable program point inside one function's flow
//! graph. The instruction kinds cover the desugared surface of a dynamic,
//! higher-order scripting language: register/variable moves, property
//! reads/writes, calls, returns and a handful of constructs the analysis
//! deliberately approximates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a function in a [`FlowGraph`](super::FlowGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

/// Unique identifier of a program point in a [`FlowGraph`](super::FlowGraph)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// An integer-numbered virtual register, scoped to its containing function.
///
/// Negative ids are synthetic registers introduced by the analysis itself
/// (desugared method-call reads); front ends only ever emit non-negative ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Register {
    pub id: i32,
    pub func: FuncId,
}

impl Register {
    #[inline]
    pub fn new(id: i32, func: FuncId) -> Self {
        Self { id, func }
    }

    /// Synthetic register for the desugared property read of a method call.
    /// The id space below -100 is reserved so synthetic registers can never
    /// collide with front-end registers.
    #[inline]
    pub fn synthetic_for(call: NodeId, func: FuncId) -> Self {
        Self {
            id: -100 - call.0 as i32,
            func,
        }
    }

    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.id < 0
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} in {}", self.id, self.func)
    }
}

/// Property key of a property access: a fixed string or a register holding
/// a computed key. Computed keys are an approximated construct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    Fixed(String),
    Dynamic(Register),
}

impl PropertyKey {
    #[inline]
    pub fn fixed(&self) -> Option<&str> {
        match self {
            PropertyKey::Fixed(name) => Some(name),
            PropertyKey::Dynamic(_) => None,
        }
    }
}

/// Everything the analysis needs to know about one call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSite {
    /// Register holding the callee, when the call is `f(...)`.
    pub function_register: Option<Register>,
    /// Base register for method calls `o.m(...)`.
    pub base: Option<Register>,
    /// Method name for method calls with a fixed property.
    pub method: Option<String>,
    /// Argument registers, in positional order.
    pub args: Vec<Register>,
    /// Result register, absent when the result is discarded.
    pub result: Option<Register>,
    /// Whether this is a constructor invocation (`new`).
    pub constructor: bool,
    /// Name of a host/runtime intrinsic. Such calls are never resolved.
    pub host_hook: Option<String>,
}

impl CallSite {
    /// A method call with a statically known property name and no callee
    /// register. These are resolved through a desugared property read.
    #[inline]
    pub fn is_method_call(&self) -> bool {
        self.function_register.is_none() && self.method.is_some()
    }
}

/// Instruction kind of a program point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Function entry marker; first node of every function.
    Entry,
    /// Ordinary function exit; all returns flow here.
    Exit,
    /// Constant materialization into a register (a constant allocation site).
    Constant { result: Register },
    /// Object literal / `new Object` allocation site.
    NewObject { result: Register },
    /// Function declaration or function expression (a function allocation
    /// site). `result` is present for expressions assigned to a register.
    DeclareFunction { function: FuncId, result: Option<Register> },
    /// `result = name`, with `result_base` set when the read feeds a
    /// method-call base.
    ReadVariable {
        name: String,
        result: Register,
        result_base: Option<Register>,
    },
    /// `name = value`
    WriteVariable { name: String, value: Register },
    /// `result = base[property]`
    ReadProperty {
        base: Register,
        property: PropertyKey,
        result: Register,
    },
    /// `base[property] = value`
    WriteProperty {
        base: Register,
        property: PropertyKey,
        value: Register,
    },
    /// Function or method invocation.
    Call(CallSite),
    /// `return value`; `None` for a bare return.
    Return { value: Option<Register> },
    BinaryOp {
        lhs: Register,
        rhs: Register,
        result: Register,
    },
    UnaryOp { arg: Register, result: Register },
    /// Conditional branch; branching itself is encoded in the edges.
    If { condition: Register },
    Nop,
    // Constructs below are deliberately approximated: they propagate all
    // values unchanged and raise an unsoundness event where applicable.
    BeginWith { object: Register },
    EndWith,
    BeginForIn { object: Register, result: Register },
    NextProperty { result: Register },
    HasNextProperty { result: Register },
    Throw { value: Register },
    Catch { name: String },
    EventDispatch,
}

impl NodeKind {
    /// Result register defined by this instruction, if any.
    pub fn result_register(&self) -> Option<Register> {
        match self {
            NodeKind::Constant { result }
            | NodeKind::NewObject { result }
            | NodeKind::ReadVariable { result, .. }
            | NodeKind::ReadProperty { result, .. }
            | NodeKind::BinaryOp { result, .. }
            | NodeKind::UnaryOp { result, .. }
            | NodeKind::BeginForIn { result, .. }
            | NodeKind::NextProperty { result }
            | NodeKind::HasNextProperty { result } => Some(*result),
            NodeKind::DeclareFunction { result, .. } => *result,
            NodeKind::Call(call) => call.result,
            _ => None,
        }
    }
}

/// An immutable program point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: NodeId,
    pub func: FuncId,
    pub kind: NodeKind,
}

impl FlowNode {
    #[inline]
    pub fn as_call(&self) -> Option<&CallSite> {
        match &self.kind {
            NodeKind::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Whether this point allocates (object, function or constant).
    pub fn is_allocation_site(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::NewObject { .. }
                | NodeKind::Constant { .. }
                | NodeKind::DeclareFunction { .. }
        ) || matches!(&self.kind, NodeKind::Call(call) if call.constructor)
    }
}

impl fmt::Display for FlowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.func)
    }
}
