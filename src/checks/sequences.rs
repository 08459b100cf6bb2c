// SPDX-License-Identifier: MIT
//! Arfind/stfind sequence-blockage check.
//!
//! The only stateful check: it measures how long a restart-blocking inode has
//! existed by persisting the first-seen timestamp across invocations, so the
//! monitoring system can distinguish a transient blockage from a sustained
//! one.
//!
//! Only the scheduler (leader) node runs the evaluation. Leadership is
//! decided by comparing the short hostname (substring before the first `.`)
//! of the local node and of the reported scheduler address, case
//! insensitively. Two distinct nodes sharing a short name would defeat this
//! heuristic; the cluster tools define no behavior for that case and neither
//! do we. A follower reports OK and deletes any persisted state left over
//! from an earlier leadership period.
//!
//! State is read, recomputed, and rewritten exactly once per invocation,
//! under the store's exclusive lock.

use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::{CheckOutcome, ClusterCheck};
use crate::config::{CheckConfig, ThresholdPair};
use crate::error::CheckError;
use crate::facts::{BlockState, FactsSource, SequenceDiag};
use crate::state::{SequenceRecord, StateStore};
use crate::verdict::{classify, Verdict};

pub struct SequencesCheck {
    store: StateStore,
    /// Fixed clock for tests; `None` means wall clock.
    now_override: Option<u64>,
}

impl SequencesCheck {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            now_override: None,
        }
    }

    /// Pin the evaluation clock to a fixed epoch second (tests only).
    pub fn with_clock(store: StateStore, now: u64) -> Self {
        Self {
            store,
            now_override: Some(now),
        }
    }

    fn now(&self) -> u64 {
        self.now_override.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        })
    }
}

/// Case-insensitive short-hostname comparison (substring before first `.`).
fn same_short_host(a: &str, b: &str) -> bool {
    let short = |s: &str| s.split('.').next().unwrap_or(s).to_ascii_lowercase();
    short(a) == short(b)
}

/// Evaluate one kind (arfind or stfind) on one mount against its previous
/// record. Returns the record to persist, the verdict, and the message body.
fn evaluate_kind(
    kind: &str,
    mount: &str,
    previous: &SequenceRecord,
    observed: &BlockState,
    pair: ThresholdPair,
    now: u64,
) -> (SequenceRecord, Verdict, String) {
    match observed {
        BlockState::NotBlocked => (
            SequenceRecord {
                last_seen: now,
                ..SequenceRecord::default()
            },
            Verdict::Ok,
            format!("{kind} not blocked on {mount}"),
        ),
        BlockState::Blocked { inode, reason } => {
            // The timer survives only while the same inode stays blocked; a
            // different inode is a new blockage, not a continuation.
            let blocked_since = match (previous.blocked_since, previous.inode) {
                (Some(since), Some(prev_inode)) if prev_inode == *inode => since,
                _ => now,
            };
            let elapsed = now.saturating_sub(blocked_since);
            let record = SequenceRecord {
                blocked_since: Some(blocked_since),
                inode: Some(*inode),
                reason: Some(reason.clone()),
                last_seen: now,
            };
            let verdict = classify(elapsed, pair.warn, pair.crit);
            let message = match verdict {
                Verdict::Ok => {
                    format!("{kind} blocked for {elapsed}s on {mount} (under threshold)")
                }
                _ => format!("{kind} blocked for {elapsed}s on {mount} (inode {inode}: {reason})"),
            };
            (record, verdict, message)
        }
    }
}

#[async_trait]
impl ClusterCheck for SequencesCheck {
    fn name(&self) -> &'static str {
        "sequences"
    }

    async fn run(
        &self,
        facts: &dyn FactsSource,
        config: &CheckConfig,
    ) -> Result<CheckOutcome, CheckError> {
        let scheduler = facts.scheduler_address().await?;
        let hostname = facts.local_hostname()?;

        if !same_short_host(&hostname, &scheduler) {
            debug!(%scheduler, %hostname, "not the scheduler node, skipping");
            let removed = match self.store.remove() {
                Ok(removed) => removed,
                Err(e) => {
                    // Stale state on a follower is a cleanup concern, not a
                    // health failure; the node itself is fine.
                    warn!(error = %e, "could not remove stale sequence state");
                    false
                }
            };
            let suffix = if removed { ", removed stale state" } else { "" };
            return Ok(CheckOutcome::single(
                Verdict::Ok,
                format!("not scheduler node, skipping sequence check (scheduler: {scheduler}){suffix}"),
            ));
        }

        let diags: Vec<SequenceDiag> = facts
            .sequence_diagnostics()
            .await?
            .into_iter()
            .filter(|d| match &config.mount_filter {
                Some(filter) => &d.mount == filter,
                None => true,
            })
            .collect();
        if diags.is_empty() {
            return Ok(CheckOutcome::single(
                Verdict::Critical,
                "no filesystems found in sequence diagnostics",
            ));
        }

        let now = self.now();
        let arfind_pair = config.arfind;
        let stfind_pair = config.stfind;
        let mut parts: Vec<(Verdict, String)> = Vec::new();

        // Single read-modify-write for the whole invocation, exclusive lock
        // held across read, compute, and write.
        self.store.update(|mut state| {
            for diag in &diags {
                let entry = state.mounts.entry(diag.mount.clone()).or_default();

                let (record, verdict, message) = evaluate_kind(
                    "Arfind",
                    &diag.mount,
                    &entry.arfind,
                    &diag.arfind,
                    arfind_pair,
                    now,
                );
                entry.arfind = record;
                parts.push((verdict, message));

                let (record, verdict, message) = evaluate_kind(
                    "Stfind",
                    &diag.mount,
                    &entry.stfind,
                    &diag.stfind,
                    stfind_pair,
                    now,
                );
                entry.stfind = record;
                parts.push((verdict, message));
            }
            // Filesystems no longer reported are gone; drop their records.
            state
                .mounts
                .retain(|mount, _| diags.iter().any(|d| &d.mount == mount));
            state
        })?;

        CheckOutcome::from_parts(parts)
    }
}
