// SPDX-License-Identifier: MIT
//! Check dispatcher.
//!
//! Resolves an operation name to its checks, runs them in a fixed order
//! against one facts provider, folds the verdicts with
//! [`combine`](crate::verdict::combine), and maps the result to the NRPE
//! exit code. A check that errors contributes an UNKNOWN line instead of
//! aborting the run — in compound mode that taints the combined verdict.

use clap::ValueEnum;
use tracing::debug;

use crate::checks::{
    ClusterCheck, GatewayCheck, MountCheck, SchedulerCheck, SequencesCheck, ServiceCheck,
};
use crate::config::CheckConfig;
use crate::facts::{FactsSource, GatewayFlavor};
use crate::state::StateStore;
use crate::verdict::{combine, Verdict};

/// The check operations exposed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    /// Filesystems mounted, fencing active, capacity under thresholds.
    Mount,
    /// ScoutAM service unit is active.
    Service,
    /// No scheduler queue is idled.
    Scheduler,
    /// Arfind/stfind restart blockage durations (scheduler node only).
    Sequences,
    /// Configured ScoutGW S3 gateway instances are running.
    Gateway,
    /// Configured VersityGW S3 gateway instances are running.
    GatewayAlt,
    /// mount + service + scheduler.
    Scoutam,
    /// scoutam + both gateway flavors.
    All,
}

impl Operation {
    /// Whether this operation aggregates more than one check.
    pub fn is_compound(self) -> bool {
        matches!(self, Operation::Scoutam | Operation::All)
    }

    /// Resolve the checks to run, in fixed execution order: mount, service,
    /// scheduler, then gateway flavors.
    fn checks(self, store: StateStore) -> Vec<Box<dyn ClusterCheck>> {
        match self {
            Operation::Mount => vec![Box::new(MountCheck)],
            Operation::Service => vec![Box::new(ServiceCheck)],
            Operation::Scheduler => vec![Box::new(SchedulerCheck)],
            Operation::Sequences => vec![Box::new(SequencesCheck::new(store))],
            Operation::Gateway => vec![Box::new(GatewayCheck::new(GatewayFlavor::Scoutgw))],
            Operation::GatewayAlt => vec![Box::new(GatewayCheck::new(GatewayFlavor::Versitygw))],
            Operation::Scoutam => vec![
                Box::new(MountCheck),
                Box::new(ServiceCheck),
                Box::new(SchedulerCheck),
            ],
            Operation::All => vec![
                Box::new(MountCheck),
                Box::new(ServiceCheck),
                Box::new(SchedulerCheck),
                Box::new(GatewayCheck::new(GatewayFlavor::Scoutgw)),
                Box::new(GatewayCheck::new(GatewayFlavor::Versitygw)),
            ],
        }
    }
}

/// Outcome of one full invocation.
#[derive(Debug)]
pub struct RunReport {
    pub verdict: Verdict,
    /// Message lines to print, worst finding first for compound operations.
    pub lines: Vec<String>,
    /// Process exit code, after any `--passfail` remap.
    pub exit_code: i32,
}

/// Run the requested operation against one facts provider.
pub async fn run(
    operation: Operation,
    config: &CheckConfig,
    facts: &dyn FactsSource,
    store: StateStore,
) -> RunReport {
    let checks = operation.checks(store);
    let mut verdicts: Vec<Verdict> = Vec::with_capacity(checks.len());
    let mut lines: Vec<String> = Vec::new();
    let mut first_problem: Option<String> = None;

    for check in &checks {
        debug!(check = check.name(), "running check");
        match check.run(facts, config).await {
            Ok(outcome) => {
                if first_problem.is_none() {
                    first_problem = outcome.first_problem().map(str::to_string);
                }
                verdicts.push(outcome.verdict);
                lines.extend(outcome.messages);
            }
            Err(e) => {
                let line = format!("UNKNOWN: {} check failed: {e}", check.name());
                if first_problem.is_none() {
                    first_problem = Some(line.clone());
                }
                verdicts.push(e.verdict());
                lines.push(line);
            }
        }
    }

    let verdict = match combine(&verdicts) {
        Ok(v) => v,
        Err(e) => {
            lines.push(format!("UNKNOWN: {e}"));
            Verdict::Unknown
        }
    };

    // Compound operations lead with one summary line: the first non-OK
    // sub-message, or a generic all-clear.
    if operation.is_compound() {
        let summary = first_problem
            .unwrap_or_else(|| format!("OK: all {} checks passed", checks.len()));
        lines.insert(0, summary);
    }

    let exit_code = if config.passfail && verdict == Verdict::Warning {
        // Degraded-but-non-actionable maps to success for monitoring systems
        // that cannot distinguish it. CRITICAL and UNKNOWN never remap.
        Verdict::Ok.exit_code()
    } else {
        verdict.exit_code()
    };

    RunReport {
        verdict,
        lines,
        exit_code,
    }
}
