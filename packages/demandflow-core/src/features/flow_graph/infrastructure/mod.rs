//! Flow-graph construction and syntactic analyses

pub mod builder;
pub mod captured;
pub mod scopes;
pub mod syntactic;

pub use builder::FlowGraphBuilder;
pub use captured::CapturedVariables;
pub use scopes::{declaring_scope, scope_declares_function_named, try_declaring_scope};
pub use syntactic::SyntacticRefs;
