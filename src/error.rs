// SPDX-License-Identifier: MIT
//! Error taxonomy for check execution.
//!
//! Every variant surfaces as an UNKNOWN verdict for the check that hit it;
//! in compound mode an UNKNOWN sub-result taints the combined verdict.
//! Nothing here is retried — re-polling is the monitoring system's job.

use crate::verdict::Verdict;

/// A failure while running a check.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// Bad or missing configuration (thresholds, unknown operation).
    #[error("configuration error: {0}")]
    Config(String),

    /// A required cluster tool binary is absent.
    #[error("required tool missing: {0}")]
    ToolMissing(String),

    /// A collaborator query failed: non-zero exit, timeout, or unparseable
    /// output.
    #[error("{tool} query failed: {detail}")]
    Query { tool: String, detail: String },

    /// The sequence-state document could not be locked, read, or written.
    /// The check must report UNKNOWN rather than fabricate a duration.
    #[error("state store failure: {0}")]
    State(String),
}

impl CheckError {
    pub fn query(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        CheckError::Query {
            tool: tool.into(),
            detail: detail.into(),
        }
    }

    /// Every failure maps to UNKNOWN — a check that cannot be evaluated is
    /// never guessed at.
    pub fn verdict(&self) -> Verdict {
        Verdict::Unknown
    }
}
