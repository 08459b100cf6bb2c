// SPDX-License-Identifier: MIT
//! End-to-end dispatcher tests over canned cluster facts.

use scoutam_check::config::{CheckConfig, ThresholdPair};
use scoutam_check::dispatch::{run, Operation};
use scoutam_check::facts::tests_support::StaticFacts;
use scoutam_check::facts::{FsUsage, GatewayFacts, GatewayUnit, QueueKind};
use scoutam_check::state::StateStore;
use scoutam_check::verdict::Verdict;
use tempfile::TempDir;

fn store(dir: &TempDir) -> StateStore {
    StateStore::new(dir.path().join("sequences.json"))
}

fn capacity_config(warn: u64, crit: u64) -> CheckConfig {
    CheckConfig {
        capacity: Some(ThresholdPair::new(warn, crit).unwrap()),
        ..CheckConfig::default()
    }
}

#[tokio::test]
async fn mount_on_follower_reports_mounted_without_percentages() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.mounts[0].is_leader = false;

    let report = run(Operation::Mount, &capacity_config(70, 90), &facts, store(&dir)).await;
    assert_eq!(report.verdict, Verdict::Ok);
    assert_eq!(report.exit_code, 0);
    assert_eq!(report.lines.len(), 1);
    assert!(report.lines[0].contains("mounted"));
    assert!(!report.lines[0].contains('%'));
}

#[tokio::test]
async fn mount_on_leader_reports_metadata_breach_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.usage.insert(
        "/mnt/fs1".into(),
        FsUsage {
            meta_used_pct: 95,
            data_used_pct: 50,
            high_watermark_pct: Some(90),
            low_watermark_pct: Some(70),
        },
    );

    let report = run(Operation::Mount, &capacity_config(70, 90), &facts, store(&dir)).await;
    assert_eq!(report.verdict, Verdict::Critical);
    assert_eq!(report.exit_code, 2);
    let first_problem = report
        .lines
        .iter()
        .find(|l| !l.starts_with("OK:"))
        .unwrap();
    assert!(first_problem.contains("metadata"));
    assert!(!first_problem.contains("50%"), "data figures must not appear");
}

#[tokio::test]
async fn mount_with_no_filesystems_is_critical() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.mounts.clear();

    let report = run(Operation::Mount, &capacity_config(70, 90), &facts, store(&dir)).await;
    assert_eq!(report.verdict, Verdict::Critical);
    assert!(report.lines[0].contains("No ScoutFS filesystems mounted"));
}

#[tokio::test]
async fn mount_filter_that_matches_nothing_is_critical() {
    let dir = tempfile::tempdir().unwrap();
    let facts = StaticFacts::healthy();
    let config = CheckConfig {
        mount_filter: Some("/mnt/nope".into()),
        ..capacity_config(70, 90)
    };

    let report = run(Operation::Mount, &config, &facts, store(&dir)).await;
    assert_eq!(report.verdict, Verdict::Critical);
    assert!(report.lines[0].contains("/mnt/nope"));
}

#[tokio::test]
async fn gateway_partial_outage_lists_offline_and_online() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.scoutgw = Some(GatewayFacts::Units(vec![
        GatewayUnit {
            name: "s1".into(),
            running: true,
        },
        GatewayUnit {
            name: "s2".into(),
            running: false,
        },
        GatewayUnit {
            name: "s3".into(),
            running: true,
        },
    ]));

    let report = run(
        Operation::Gateway,
        &CheckConfig::default(),
        &facts,
        store(&dir),
    )
    .await;
    assert_eq!(report.verdict, Verdict::Warning);
    assert_eq!(report.exit_code, 1);
    assert!(report.lines[0].contains("offline: s2;"));
    assert!(report.lines[0].contains("online: s1, s3"));
}

#[tokio::test]
async fn all_takes_the_max_severity_across_subchecks() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.active_units.remove("scoutam"); // service CRITICAL
    facts.idle_queues = vec![QueueKind::Archiving]; // scheduler WARNING

    let report = run(Operation::All, &capacity_config(70, 90), &facts, store(&dir)).await;
    assert_eq!(report.verdict, Verdict::Critical);
    assert_eq!(report.exit_code, 2);
    // Summary line is the first non-OK sub-message: the service failure.
    assert!(report.lines[0].contains("ScoutAM service is not running"));
}

#[tokio::test]
async fn compound_all_ok_gets_a_generic_summary() {
    let dir = tempfile::tempdir().unwrap();
    let facts = StaticFacts::healthy();

    let report = run(
        Operation::Scoutam,
        &capacity_config(70, 90),
        &facts,
        store(&dir),
    )
    .await;
    assert_eq!(report.verdict, Verdict::Ok);
    assert!(report.lines[0].contains("all 3 checks passed"));
}

#[tokio::test]
async fn failed_subquery_taints_the_compound_verdict() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.failing.insert("queues");

    let report = run(
        Operation::Scoutam,
        &capacity_config(70, 90),
        &facts,
        store(&dir),
    )
    .await;
    assert_eq!(report.verdict, Verdict::Unknown);
    assert_eq!(report.exit_code, 3);
    assert!(report.lines.iter().any(|l| l.starts_with("UNKNOWN:")));
}

#[tokio::test]
async fn passfail_remaps_warning_but_never_critical() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.idle_queues = vec![QueueKind::Staging];
    let config = CheckConfig {
        passfail: true,
        ..CheckConfig::default()
    };

    let report = run(Operation::Scheduler, &config, &facts, store(&dir)).await;
    assert_eq!(report.verdict, Verdict::Warning);
    assert_eq!(report.exit_code, 0);

    let mut facts = StaticFacts::healthy();
    facts.active_units.remove("scoutam");
    let report = run(Operation::Service, &config, &facts, store(&dir)).await;
    assert_eq!(report.verdict, Verdict::Critical);
    assert_eq!(report.exit_code, 2);
}

#[tokio::test]
async fn sequences_operation_runs_through_the_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.hostname = "node-b".into(); // follower

    let report = run(
        Operation::Sequences,
        &CheckConfig::default(),
        &facts,
        store(&dir),
    )
    .await;
    assert_eq!(report.verdict, Verdict::Ok);
    assert!(report.lines[0].contains("not scheduler node"));
    assert!(!dir.path().join("sequences.json").exists());
}

#[tokio::test]
async fn inactive_fencing_service_fails_the_mount_check() {
    let dir = tempfile::tempdir().unwrap();
    let mut facts = StaticFacts::healthy();
    facts.active_units.remove("scoutfs-fenced");

    let report = run(Operation::Mount, &capacity_config(70, 90), &facts, store(&dir)).await;
    assert_eq!(report.verdict, Verdict::Critical);
    assert!(report.lines[0].contains("fencing"));
}
