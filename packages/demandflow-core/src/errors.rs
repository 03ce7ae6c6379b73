//! Error types for demandflow-core
//!
//! Provides unified error handling across the crate.

use thiserror::Error;

/// Main error type for demandflow-core operations
#[derive(Debug, Clone, Error, PartialEq, Eq, Hash)]
pub enum DemandflowError {
    /// A query that is ill-formed by construction, e.g. a method-call fact
    /// rooted away from its own call site. These are the only errors that
    /// propagate synchronously out of `solve`.
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// A flow graph referenced an entity that does not exist (dangling node
    /// or function id, edge across function boundaries).
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// A recoverable failure while answering a sub-query. Recorded on the
    /// query dependency graph and attributed to the affected queries; never
    /// thrown across a `solve` boundary.
    #[error("Sub-query failure: {0}")]
    SubQuery(String),

    /// The analysis context was dropped while a solver was still running.
    #[error("Analysis context dropped")]
    ContextDropped,
}

impl DemandflowError {
    /// Create a malformed-query error
    pub fn malformed_query(msg: impl Into<String>) -> Self {
        DemandflowError::MalformedQuery(msg.into())
    }

    /// Create an unknown-entity error
    pub fn unknown_entity(msg: impl Into<String>) -> Self {
        DemandflowError::UnknownEntity(msg.into())
    }

    /// Create a sub-query failure
    pub fn sub_query(msg: impl Into<String>) -> Self {
        DemandflowError::SubQuery(msg.into())
    }
}

/// Result type alias for demandflow operations
pub type Result<T> = std::result::Result<T, DemandflowError>;
