//! Queries and sub-query correlation keys

use crate::errors::{DemandflowError, Result};
use crate::features::facts::{SolverNode, Value};
use crate::features::flow_graph::domain::NodeId;
use std::fmt;

/// Direction of a demand-driven query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    #[inline]
    pub fn is_forward(&self) -> bool {
        matches!(self, Direction::Forward)
    }
}

/// One analysis task: (root program point, root fact, direction).
/// Structural equality; exactly one solver exists per distinct query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    pub node: SolverNode,
    pub direction: Direction,
}

impl Query {
    /// Construct a query, rejecting ill-formed roots: a method-call fact is
    /// only meaningful at the call site it refers to.
    pub fn new(node: SolverNode, direction: Direction) -> Result<Self> {
        if let Value::MethodCall(site) = &node.fact {
            if *site != node.point {
                return Err(DemandflowError::malformed_query(format!(
                    "method-call fact of {site} rooted at {}",
                    node.point
                )));
            }
        }
        Ok(Self { node, direction })
    }

    pub fn forward(node: SolverNode) -> Result<Self> {
        Self::new(node, Direction::Forward)
    }

    pub fn backward(node: SolverNode) -> Result<Self> {
        Self::new(node, Direction::Backward)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Forward => "Forward",
            Direction::Backward => "Backward",
        };
        write!(f, "{direction}: {}", self.node)
    }
}

/// Correlates asynchronous sub-query results back to the flow-function
/// invocation that requested them. The key distinguishes the initiating
/// query, the sub-query, and the origin context, so structurally identical
/// sub-queries raised from different places register distinct handlers
/// while re-raising from the same place registers none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryId {
    Standard {
        initial: Query,
        sub: Query,
        /// Raised from an unbalanced-pop listener, which can produce
        /// sub-queries identical to those of ordinary flow functions.
        in_unbalanced_pop: bool,
        resolves_aliasing: bool,
    },
    /// An alias sub-query raised at a property access, additionally keyed
    /// by the fact the access was being resolved for.
    Alias {
        initial: Query,
        sub: Query,
        query_value: Value,
    },
    /// A capture-aware continuation at a closure-creating function.
    CapturedVar { at: Query, sub: Query },
    /// Confirmation of a call site's target register.
    CallTarget { query: Query, call_site: NodeId },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::flow_graph::domain::{FuncId, Register};

    #[test]
    fn test_method_call_fact_must_sit_at_its_call_site() {
        let fact = Value::MethodCall(NodeId(4));
        assert!(Query::backward(SolverNode::new(NodeId(4), fact.clone())).is_ok());
        assert!(matches!(
            Query::backward(SolverNode::new(NodeId(5), fact)),
            Err(DemandflowError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_queries_compare_structurally() {
        let node = SolverNode::new(NodeId(1), Register::new(2, FuncId(0)));
        let a = Query::forward(node.clone()).unwrap();
        let b = Query::forward(node.clone()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, Query::backward(node).unwrap());
    }
}
