//! Automaton states and stack alphabets
//!
//! The call system's states are facts and its stack symbols are program
//! points (a frame per call site). The field system's states are whole
//! (point, fact) nodes and its stack symbols are properties. Generated
//! states are the intermediates post* introduces for push rules; `Root`
//! stands for the unexplored stack below the query's starting point.

use crate::features::facts::{Property, SolverNode, Value};
use crate::features::flow_graph::domain::NodeId;
use std::fmt;

/// Stack alphabet requirements shared by both systems.
pub trait StackSymbol: Clone + Eq + std::hash::Hash + Send + Sync + 'static {
    fn epsilon() -> Self;
    fn is_epsilon(&self) -> bool;
}

/// Stack symbols of the call system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallLabel {
    Stmt(NodeId),
    Epsilon,
}

impl StackSymbol for CallLabel {
    #[inline]
    fn epsilon() -> Self {
        CallLabel::Epsilon
    }

    #[inline]
    fn is_epsilon(&self) -> bool {
        matches!(self, CallLabel::Epsilon)
    }
}

impl StackSymbol for Property {
    #[inline]
    fn epsilon() -> Self {
        Property::Epsilon
    }

    #[inline]
    fn is_epsilon(&self) -> bool {
        matches!(self, Property::Epsilon)
    }
}

impl fmt::Display for CallLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallLabel::Stmt(point) => write!(f, "{point}"),
            CallLabel::Epsilon => write!(f, "eps"),
        }
    }
}

/// States of the call automaton.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallState {
    Fact(Value),
    /// Intermediate introduced by a call push; identified by the pushed-to
    /// node so re-pushing is canonical.
    Gen(SolverNode),
    Root,
}

/// States of the field automaton.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldState {
    Node(SolverNode),
    /// Intermediate introduced by a field push of `Property` at a node.
    Gen(SolverNode, Property),
    Root,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Fact(value) => write!(f, "{value}"),
            CallState::Gen(node) => write!(f, "gen{node}"),
            CallState::Root => write!(f, "<root>"),
        }
    }
}

impl fmt::Display for FieldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldState::Node(node) => write!(f, "{node}"),
            FieldState::Gen(node, property) => write!(f, "gen{node}{property}"),
            FieldState::Root => write!(f, "<root>"),
        }
    }
}
