// SPDX-License-Identifier: MIT
//! Individual cluster check implementations.
//!
//! Each check implements [`ClusterCheck`]: a pure evaluation of the typed
//! facts against the invocation's configuration. Checks never shell out and
//! never print — they return a [`CheckOutcome`] and the dispatcher handles
//! aggregation and output.
//!
//! # Included checks
//! - [`MountCheck`] — filesystem mounted, fencing active, capacity thresholds
//! - [`ServiceCheck`] — the ScoutAM service unit is active
//! - [`SchedulerCheck`] — no scheduler queue is idled
//! - [`GatewayCheck`] — configured S3 gateway instances are running
//! - [`SequencesCheck`] — arfind/stfind restart blockage durations

pub mod gateway;
pub mod mount;
pub mod scheduler;
pub mod sequences;
pub mod service;

use async_trait::async_trait;

use crate::config::CheckConfig;
use crate::error::CheckError;
use crate::facts::FactsSource;
use crate::verdict::{combine, Verdict};

// Convenience re-exports.
pub use gateway::GatewayCheck;
pub use mount::MountCheck;
pub use scheduler::SchedulerCheck;
pub use sequences::SequencesCheck;
pub use service::ServiceCheck;

/// Result of running a single check: one verdict plus labeled message lines.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub verdict: Verdict,
    /// One line per evaluated item, each prefixed with its own severity
    /// label (e.g. `"CRITICAL: ..."`), in evaluation order.
    pub messages: Vec<String>,
}

impl CheckOutcome {
    /// Outcome with a single message line.
    pub fn single(verdict: Verdict, message: impl std::fmt::Display) -> Self {
        Self {
            verdict,
            messages: vec![format!("{}: {message}", verdict.label())],
        }
    }

    /// Fold per-item parts into one outcome with [`combine`].
    pub fn from_parts(parts: Vec<(Verdict, String)>) -> Result<Self, CheckError> {
        let verdicts: Vec<Verdict> = parts.iter().map(|(v, _)| *v).collect();
        let verdict = combine(&verdicts)?;
        let messages = parts
            .into_iter()
            .map(|(v, m)| format!("{}: {m}", v.label()))
            .collect();
        Ok(Self { verdict, messages })
    }

    /// First message line that is not an OK line, if any.
    pub fn first_problem(&self) -> Option<&str> {
        self.messages
            .iter()
            .map(String::as_str)
            .find(|m| !m.starts_with("OK:"))
    }
}

/// A named health check over the cluster facts.
///
/// Implementations must be side-effect free except for the sequence check,
/// which owns its persisted state behind the state store's lock.
#[async_trait]
pub trait ClusterCheck: Send + Sync {
    /// Machine-readable check name (matches the CLI operation).
    fn name(&self) -> &'static str;

    /// Evaluate the check. Errors surface as UNKNOWN in the dispatcher.
    async fn run(
        &self,
        facts: &dyn FactsSource,
        config: &CheckConfig,
    ) -> Result<CheckOutcome, CheckError>;
}
