//! The fact model
//!
//! Tagged-union values used as automaton states and stack symbols.

pub mod property;
pub mod value;

pub use property::Property;
pub use value::{AllocKind, Allocation, SolverNode, Value, Variable};
