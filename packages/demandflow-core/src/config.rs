//! Analysis configuration
//!
//! Plain-data knobs passed into the analysis context. No global state.

use serde::{Deserialize, Serialize};

/// Configuration for a demand-driven analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Emit `warn!` events for approximated language constructs
    /// (dynamic property keys, `with`, exception flow, enumeration).
    pub log_unsoundness: bool,

    /// Upper bound on nodes visited by syntactic searches
    /// (function-name reference discovery). Guards against degenerate
    /// graphs; searches stop and log when the bound is hit.
    pub max_syntactic_search_nodes: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            log_unsoundness: true,
            max_syntactic_search_nodes: 100_000,
        }
    }
}
