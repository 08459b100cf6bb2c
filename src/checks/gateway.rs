// SPDX-License-Identifier: MIT
//! S3 gateway check, one instance per configured unit.
//!
//! Absence of configuration is not a failure: a flavor that is not installed
//! or has no configured instances reports OK. A total outage is CRITICAL; a
//! partial outage is WARNING listing offline and online instances separately,
//! in discovery order.

use async_trait::async_trait;

use super::{CheckOutcome, ClusterCheck};
use crate::config::CheckConfig;
use crate::error::CheckError;
use crate::facts::{FactsSource, GatewayFacts, GatewayFlavor};
use crate::verdict::Verdict;

pub struct GatewayCheck {
    flavor: GatewayFlavor,
}

impl GatewayCheck {
    pub fn new(flavor: GatewayFlavor) -> Self {
        Self { flavor }
    }
}

#[async_trait]
impl ClusterCheck for GatewayCheck {
    fn name(&self) -> &'static str {
        match self.flavor {
            GatewayFlavor::Scoutgw => "gateway",
            GatewayFlavor::Versitygw => "gateway-alt",
        }
    }

    async fn run(
        &self,
        facts: &dyn FactsSource,
        _config: &CheckConfig,
    ) -> Result<CheckOutcome, CheckError> {
        let label = self.flavor.label();
        let units = match facts.gateways(self.flavor).await? {
            GatewayFacts::NotInstalled => {
                return Ok(CheckOutcome::single(
                    Verdict::Ok,
                    format!("{label} is not installed, skipping check"),
                ));
            }
            GatewayFacts::Units(units) => units,
        };
        if units.is_empty() {
            return Ok(CheckOutcome::single(
                Verdict::Ok,
                format!("no {label} instances configured"),
            ));
        }

        // Discovery order is preserved in both lists.
        let offline: Vec<&str> = units
            .iter()
            .filter(|u| !u.running)
            .map(|u| u.name.as_str())
            .collect();
        let online: Vec<&str> = units
            .iter()
            .filter(|u| u.running)
            .map(|u| u.name.as_str())
            .collect();

        if offline.is_empty() {
            Ok(CheckOutcome::single(
                Verdict::Ok,
                format!("all {label} instances running: {}", online.join(", ")),
            ))
        } else if online.is_empty() {
            Ok(CheckOutcome::single(
                Verdict::Critical,
                format!("all {label} instances down: {}", offline.join(", ")),
            ))
        } else {
            Ok(CheckOutcome::single(
                Verdict::Warning,
                format!(
                    "{label} instances offline: {}; online: {}",
                    offline.join(", "),
                    online.join(", ")
                ),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::tests_support::StaticFacts;
    use crate::facts::GatewayUnit;

    fn units(states: &[(&str, bool)]) -> GatewayFacts {
        GatewayFacts::Units(
            states
                .iter()
                .map(|(name, running)| GatewayUnit {
                    name: (*name).into(),
                    running: *running,
                })
                .collect(),
        )
    }

    async fn run_with(gateway: Option<GatewayFacts>) -> CheckOutcome {
        let facts = StaticFacts {
            scoutgw: gateway,
            ..StaticFacts::healthy()
        };
        GatewayCheck::new(GatewayFlavor::Scoutgw)
            .run(&facts, &CheckConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn not_installed_is_ok() {
        let outcome = run_with(None).await;
        assert_eq!(outcome.verdict, Verdict::Ok);
        assert!(outcome.messages[0].contains("not installed"));
    }

    #[tokio::test]
    async fn zero_configured_is_ok() {
        let outcome = run_with(Some(units(&[]))).await;
        assert_eq!(outcome.verdict, Verdict::Ok);
        assert!(outcome.messages[0].contains("configured"));
    }

    #[tokio::test]
    async fn partial_outage_warns_and_lists_both_sides() {
        let outcome = run_with(Some(units(&[("s1", true), ("s2", false), ("s3", true)]))).await;
        assert_eq!(outcome.verdict, Verdict::Warning);
        assert!(outcome.messages[0].contains("offline: s2"));
        assert!(outcome.messages[0].contains("online: s1, s3"));
    }

    #[tokio::test]
    async fn total_outage_is_critical() {
        let outcome = run_with(Some(units(&[("s1", false), ("s2", false)]))).await;
        assert_eq!(outcome.verdict, Verdict::Critical);
    }
}
