// SPDX-License-Identifier: MIT
//! Shared severity vocabulary for all checks.
//!
//! Every check reduces to a [`Verdict`] plus human-readable message lines.
//! Compound operations fold their sub-verdicts with [`combine`], which is the
//! single aggregation rule in the crate — no check keeps its own pass/fail
//! counters.

use serde::{Deserialize, Serialize};

/// Tri-state check result plus the "could not tell" case.
///
/// `Ok < Warning < Critical` by severity. `Unknown` is outside that order:
/// it means a collaborator query failed and the check could not be evaluated,
/// and it always taints a compound result (see [`combine`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Verdict {
    /// NRPE exit code for this verdict: 0 OK, 1 WARNING, 2 CRITICAL, 3 UNKNOWN.
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Ok => 0,
            Verdict::Warning => 1,
            Verdict::Critical => 2,
            Verdict::Unknown => 3,
        }
    }

    /// Message prefix used in check output lines.
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::Warning => "WARN",
            Verdict::Critical => "CRITICAL",
            Verdict::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Fold a sequence of sub-verdicts into one.
///
/// Any `Unknown` wins outright — a failed sub-query is never silently
/// dropped. Otherwise the highest severity wins. An empty input is a caller
/// bug: a compound check must run at least one sub-check.
pub fn combine(verdicts: &[Verdict]) -> Result<Verdict, crate::error::CheckError> {
    if verdicts.is_empty() {
        return Err(crate::error::CheckError::Config(
            "no sub-checks produced a verdict".into(),
        ));
    }
    if verdicts.contains(&Verdict::Unknown) {
        return Ok(Verdict::Unknown);
    }
    Ok(verdicts.iter().copied().max().unwrap_or(Verdict::Ok))
}

/// Classify a measured value against an inclusive warn/crit pair.
///
/// `value >= crit` → Critical, else `value >= warn` → Warning, else Ok.
/// Used identically by the capacity and sequence-duration checks.
pub fn classify(value: u64, warn: u64, crit: u64) -> Verdict {
    if value >= crit {
        Verdict::Critical
    } else if value >= warn {
        Verdict::Warning
    } else {
        Verdict::Ok
    }
}
