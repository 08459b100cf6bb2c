// SPDX-License-Identifier: MIT
//! ScoutAM service check: a single process-manager query, no thresholds.

use async_trait::async_trait;

use super::{CheckOutcome, ClusterCheck};
use crate::config::CheckConfig;
use crate::error::CheckError;
use crate::facts::FactsSource;
use crate::verdict::Verdict;

/// Process-manager unit for the ScoutAM service.
const SCOUTAM_UNIT: &str = "scoutam";

pub struct ServiceCheck;

#[async_trait]
impl ClusterCheck for ServiceCheck {
    fn name(&self) -> &'static str {
        "service"
    }

    async fn run(
        &self,
        facts: &dyn FactsSource,
        _config: &CheckConfig,
    ) -> Result<CheckOutcome, CheckError> {
        if facts.service_active(SCOUTAM_UNIT).await? {
            Ok(CheckOutcome::single(
                Verdict::Ok,
                "ScoutAM service is running",
            ))
        } else {
            Ok(CheckOutcome::single(
                Verdict::Critical,
                "ScoutAM service is not running",
            ))
        }
    }
}
