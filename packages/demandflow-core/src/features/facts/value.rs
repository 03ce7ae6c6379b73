//! Data-flow facts
//!
//! A `Value` is what the engine propagates: registers, lexically scoped
//! variables, allocation sites and the short-lived method-call marker.
//! Facts compare structurally; allocations compare by allocation site.

use crate::features::flow_graph::domain::{FlowGraph, FuncId, NodeId, NodeKind, Register};
use std::fmt;
use std::sync::Arc;

/// A named variable, identified by its name and declaring scope. Two
/// variables with the same name in different scopes are distinct facts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: Arc<str>,
    pub scope: FuncId,
}

impl Variable {
    #[inline]
    pub fn new(name: &str, scope: FuncId) -> Self {
        Self { name: Arc::from(name), scope }
    }

    /// Whether this variable is visible (not shadowed by a binding of the
    /// same name) inside `func`.
    pub fn is_visible_in(&self, func: FuncId, graph: &FlowGraph) -> bool {
        let mut current = Some(func);
        while let Some(func_id) = current {
            if func_id == self.scope {
                return true;
            }
            let function = graph.function(func_id);
            if function.binds(&self.name) {
                return false; // shadowed in an inner scope
            }
            current = function.outer;
        }
        // Walked past the outermost scope without meeting the declaring one.
        false
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}.{}'", self.scope, self.name)
    }
}

/// What kind of value an allocation site produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocKind {
    Object,
    Function(FuncId),
    Constant,
}

/// An allocation site: the terminal answer of a points-to query. Each
/// allocation also carries the register its value is materialized into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Allocation {
    pub site: NodeId,
    pub kind: AllocKind,
    pub result: Register,
}

impl Allocation {
    /// Classify a program point as an allocation site, if it is one.
    pub fn at(graph: &FlowGraph, site: NodeId) -> Option<Allocation> {
        let node = graph.node(site);
        match &node.kind {
            NodeKind::NewObject { result } => Some(Allocation {
                site,
                kind: AllocKind::Object,
                result: *result,
            }),
            NodeKind::Call(call) if call.constructor => Some(Allocation {
                site,
                kind: AllocKind::Object,
                result: call.result?,
            }),
            NodeKind::Constant { result } => Some(Allocation {
                site,
                kind: AllocKind::Constant,
                result: *result,
            }),
            NodeKind::DeclareFunction { function, result } => Some(Allocation {
                site,
                kind: AllocKind::Function(*function),
                result: result.unwrap_or(Register::new(-1, node.func)),
            }),
            _ => None,
        }
    }

    /// The function allocated here, for function allocations.
    #[inline]
    pub fn function(&self) -> Option<FuncId> {
        match self.kind {
            AllocKind::Function(func) => Some(func),
            _ => None,
        }
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self.kind, AllocKind::Object)
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            AllocKind::Object => write!(f, "ObjAlloc@{}", self.site),
            AllocKind::Function(func) => write!(f, "FnAlloc@{}({})", self.site, func),
            AllocKind::Constant => write!(f, "ConstAlloc@{}", self.site),
        }
    }
}

/// The fact tagged union propagated by the engine.
///
/// `MethodCall(site)` denotes the yet-unresolved callee of a method call.
/// It is legal only at its own call site and is translated into a property
/// read within a single transfer-function application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Reg(Register),
    Var(Variable),
    Alloc(Allocation),
    MethodCall(NodeId),
}

impl Value {
    #[inline]
    pub fn as_register(&self) -> Option<Register> {
        match self {
            Value::Reg(reg) => Some(*reg),
            _ => None,
        }
    }

    #[inline]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Value::Var(var) => Some(var),
            _ => None,
        }
    }

    #[inline]
    pub fn as_allocation(&self) -> Option<&Allocation> {
        match self {
            Value::Alloc(alloc) => Some(alloc),
            _ => None,
        }
    }

    /// Whether this fact is an object allocation (introduced by alias
    /// resolution at property accesses).
    #[inline]
    pub fn is_object_allocation(&self) -> bool {
        matches!(self, Value::Alloc(alloc) if alloc.is_object())
    }

    #[inline]
    pub fn is_register(&self, reg: Register) -> bool {
        matches!(self, Value::Reg(r) if *r == reg)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Reg(reg) => write!(f, "{reg}"),
            Value::Var(var) => write!(f, "{var}"),
            Value::Alloc(alloc) => write!(f, "{alloc}"),
            Value::MethodCall(site) => write!(f, "MethodCall@{site}"),
        }
    }
}

impl From<Register> for Value {
    fn from(reg: Register) -> Self {
        Value::Reg(reg)
    }
}

impl From<Variable> for Value {
    fn from(var: Variable) -> Self {
        Value::Var(var)
    }
}

impl From<Allocation> for Value {
    fn from(alloc: Allocation) -> Self {
        Value::Alloc(alloc)
    }
}

/// A (program point, fact) pair: the state unit of both pushdown systems.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SolverNode {
    pub point: NodeId,
    pub fact: Value,
}

impl SolverNode {
    #[inline]
    pub fn new(point: NodeId, fact: impl Into<Value>) -> Self {
        Self { point, fact: fact.into() }
    }
}

impl fmt::Display for SolverNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} @ {})", self.fact, self.point)
    }
}
