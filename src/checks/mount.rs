// SPDX-License-Identifier: MIT
//! Mount and capacity check.
//!
//! Verifies that ScoutFS filesystems are mounted, that the fencing service is
//! active, and — on the leader only — that metadata and data usage are under
//! the configured thresholds. Followers lack the cluster-wide accounting, so
//! on a follower a mounted filesystem is simply reported OK.

use async_trait::async_trait;

use super::{CheckOutcome, ClusterCheck};
use crate::config::{CheckConfig, ThresholdPair};
use crate::error::CheckError;
use crate::facts::{FactsSource, FsUsage, Mount};
use crate::verdict::{classify, Verdict};

/// Process-manager unit for the ScoutFS fencing daemon.
const FENCED_UNIT: &str = "scoutfs-fenced";

pub struct MountCheck;

#[async_trait]
impl ClusterCheck for MountCheck {
    fn name(&self) -> &'static str {
        "mount"
    }

    async fn run(
        &self,
        facts: &dyn FactsSource,
        config: &CheckConfig,
    ) -> Result<CheckOutcome, CheckError> {
        let mut parts: Vec<(Verdict, String)> = Vec::new();

        if !facts.service_active(FENCED_UNIT).await? {
            parts.push((
                Verdict::Critical,
                "ScoutFS fencing service is not active".into(),
            ));
        }

        let mounts = facts.mounts().await?;
        if mounts.is_empty() {
            return Ok(CheckOutcome::single(
                Verdict::Critical,
                "No ScoutFS filesystems mounted",
            ));
        }

        if let Some(filter) = &config.mount_filter {
            if !mounts.iter().any(|m| &m.path == filter) {
                return Ok(CheckOutcome::single(
                    Verdict::Critical,
                    format!("ScoutFS filesystem {filter} not found or mounted"),
                ));
            }
        }

        for mount in &mounts {
            if let Some(filter) = &config.mount_filter {
                if &mount.path != filter {
                    continue;
                }
            }
            if !mount.is_leader {
                // Capacity accounting is only trustworthy cluster-wide from
                // the leader; followers report mounted and nothing else.
                parts.push((
                    Verdict::Ok,
                    format!("ScoutFS filesystem {} mounted", mount.path),
                ));
                continue;
            }
            let usage = facts.usage(&mount.path).await?;
            evaluate_capacity(mount, &usage, config.capacity, &mut parts);
        }

        CheckOutcome::from_parts(parts)
    }
}

/// Leader-side capacity evaluation: metadata before data, crit before warn,
/// inclusive comparison. Explicit thresholds win; otherwise the cluster
/// watermarks (low = warn, high = crit); with neither the result is UNKNOWN.
fn evaluate_capacity(
    mount: &Mount,
    usage: &FsUsage,
    explicit: Option<ThresholdPair>,
    parts: &mut Vec<(Verdict, String)>,
) {
    let pair = explicit.or_else(|| {
        match (usage.low_watermark_pct, usage.high_watermark_pct) {
            (Some(warn), Some(crit)) => ThresholdPair::new(warn, crit).ok(),
            _ => None,
        }
    });
    let Some(pair) = pair else {
        parts.push((
            Verdict::Unknown,
            format!(
                "ScoutFS filesystem {} thresholds unavailable (no explicit thresholds and watermarks unreadable)",
                mount.path
            ),
        ));
        return;
    };

    // Metadata first: a metadata-full filesystem is the more urgent failure.
    for (label, pct) in [
        ("metadata", usage.meta_used_pct),
        ("data", usage.data_used_pct),
    ] {
        let verdict = classify(pct, pair.warn, pair.crit);
        let msg = match verdict {
            Verdict::Critical => format!(
                "ScoutFS filesystem {} {label} usage {pct}% at or above critical threshold {}%",
                mount.path, pair.crit
            ),
            Verdict::Warning => format!(
                "ScoutFS filesystem {} {label} usage {pct}% at or above warning threshold {}%",
                mount.path, pair.warn
            ),
            _ => format!(
                "ScoutFS filesystem {} {label} usage {pct}% (warn {}%, crit {}%)",
                mount.path, pair.warn, pair.crit
            ),
        };
        parts.push((verdict, msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mount(path: &str, is_leader: bool) -> Mount {
        Mount {
            path: path.into(),
            is_leader,
            device: "/dev/sdb1".into(),
            fsid: "a1b2c3d4".into(),
        }
    }

    fn usage(meta: u64, data: u64) -> FsUsage {
        FsUsage {
            meta_used_pct: meta,
            data_used_pct: data,
            high_watermark_pct: Some(90),
            low_watermark_pct: Some(70),
        }
    }

    #[test]
    fn metadata_is_evaluated_before_data() {
        let mut parts = Vec::new();
        let pair = ThresholdPair::new(70, 90).unwrap();
        evaluate_capacity(&mount("/mnt/fs1", true), &usage(95, 50), Some(pair), &mut parts);
        assert_eq!(parts[0].0, Verdict::Critical);
        assert!(parts[0].1.contains("metadata"));
        assert_eq!(parts[1].0, Verdict::Ok);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let mut parts = Vec::new();
        let pair = ThresholdPair::new(70, 90).unwrap();
        evaluate_capacity(&mount("/mnt/fs1", true), &usage(90, 70), Some(pair), &mut parts);
        assert_eq!(parts[0].0, Verdict::Critical);
        assert_eq!(parts[1].0, Verdict::Warning);
    }

    #[test]
    fn watermarks_are_the_fallback_pair() {
        let mut parts = Vec::new();
        evaluate_capacity(&mount("/mnt/fs1", true), &usage(75, 10), None, &mut parts);
        assert_eq!(parts[0].0, Verdict::Warning);
    }

    #[test]
    fn missing_watermarks_without_explicit_pair_is_unknown() {
        let mut parts = Vec::new();
        let u = FsUsage {
            meta_used_pct: 10,
            data_used_pct: 10,
            high_watermark_pct: None,
            low_watermark_pct: None,
        };
        evaluate_capacity(&mount("/mnt/fs1", true), &u, None, &mut parts);
        assert_eq!(parts[0].0, Verdict::Unknown);
        assert!(parts[0].1.contains("thresholds unavailable"));
    }
}
