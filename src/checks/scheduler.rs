// SPDX-License-Identifier: MIT
//! Scheduler queue check.
//!
//! Maps the three logical queues (scheduler, archiving, staging) to
//! idle/running. Any idled queue degrades the node to WARNING; idle queue
//! names are listed comma-joined in fixed enumeration order regardless of
//! how the tool reported them.

use async_trait::async_trait;

use super::{CheckOutcome, ClusterCheck};
use crate::config::CheckConfig;
use crate::error::CheckError;
use crate::facts::{FactsSource, QueueKind};
use crate::verdict::Verdict;

pub struct SchedulerCheck;

#[async_trait]
impl ClusterCheck for SchedulerCheck {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn run(
        &self,
        facts: &dyn FactsSource,
        _config: &CheckConfig,
    ) -> Result<CheckOutcome, CheckError> {
        let idle = facts.idle_queues().await?;
        if idle.is_empty() {
            return Ok(CheckOutcome::single(
                Verdict::Ok,
                "all ScoutAM queues running (scheduler, archiving, staging)",
            ));
        }
        // Fixed enumeration order, not discovery order.
        let names: Vec<&str> = QueueKind::ALL
            .iter()
            .copied()
            .filter(|k| idle.contains(k))
            .map(|k| k.label())
            .collect();
        Ok(CheckOutcome::single(
            Verdict::Warning,
            format!("ScoutAM queues idled: {}", names.join(", ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::tests_support::StaticFacts;

    #[tokio::test]
    async fn all_running_is_ok() {
        let facts = StaticFacts::healthy();
        let outcome = SchedulerCheck
            .run(&facts, &CheckConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Ok);
    }

    #[tokio::test]
    async fn idle_queues_warn_in_fixed_order() {
        let mut facts = StaticFacts::healthy();
        facts.idle_queues = vec![QueueKind::Staging, QueueKind::Scheduler];
        let outcome = SchedulerCheck
            .run(&facts, &CheckConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.verdict, Verdict::Warning);
        assert!(outcome.messages[0].contains("scheduler, staging"));
    }
}
