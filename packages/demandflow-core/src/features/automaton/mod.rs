//! Pushdown-automaton reachability engine
//!
//! Per-query synchronized call/field automaton pair with incremental post*
//! saturation, state listeners and first-class unbalanced-pop handling.

pub mod p_automaton;
pub mod states;
pub mod sync_pds;

pub use p_automaton::{PAutomaton, Transition, TransitionListener};
pub use states::{CallLabel, CallState, FieldState, StackSymbol};
pub use sync_pds::{NodeHandler, Rule, SyncPds, UnbalancedPop, UnbalancedPopListener};
