//! Function metadata

use super::node::{FuncId, NodeId, Register};
use serde::{Deserialize, Serialize};

/// One function of the analyzed program.
///
/// The outermost function (the script top level) has no `outer` scope and
/// no declaration site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: FuncId,
    /// Source-level name; `None` for anonymous function expressions and
    /// the top level.
    pub name: Option<String>,
    /// Parameter names in positional order.
    pub params: Vec<String>,
    /// Names declared with `var`/`let` directly in this function body.
    pub declared_vars: Vec<String>,
    /// Lexically enclosing function.
    pub outer: Option<FuncId>,
    /// Entry program point (always a [`NodeKind::Entry`](super::NodeKind)).
    pub entry: NodeId,
    /// Ordinary exit program point.
    pub exit: NodeId,
    /// All program points of this function, in creation order.
    pub nodes: Vec<NodeId>,
    /// The `DeclareFunction` point that allocated this function, absent for
    /// the top level.
    pub decl_site: Option<NodeId>,
    /// Register carrying the return value at the exit, fixed by the first
    /// return statement.
    pub return_register: Option<Register>,
}

impl Function {
    /// Whether this is the outermost (top-level) function.
    #[inline]
    pub fn is_main(&self) -> bool {
        self.outer.is_none()
    }

    /// Index of `name` among the parameters, if it is one.
    #[inline]
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p == name)
    }

    /// Whether `name` is bound directly by this function (as a parameter
    /// or a declared variable).
    pub fn binds(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name) || self.declared_vars.iter().any(|v| v == name)
    }
}
