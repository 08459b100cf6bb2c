// SPDX-License-Identifier: MIT
//! scoutam-check — node-local health checks for ScoutAM/ScoutFS clusters.
//!
//! Invoked once per check by a remote monitoring daemon (NRPE-style), each
//! run answers a single question — "is X healthy?" — with an OK / WARNING /
//! CRITICAL / UNKNOWN verdict, a human-readable reason, and the matching
//! exit code, within a bounded time.
//!
//! Data flows strictly downward: the facts provider queries the cluster
//! tools once, the checks evaluate the typed facts, and the dispatcher
//! aggregates the verdicts. The only persistent state is the sequence
//! blockage document, owned by [`state::StateStore`] and touched exclusively
//! by the sequences check under a file lock.

pub mod checks;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod facts;
pub mod state;
pub mod verdict;

pub use config::{CheckConfig, ThresholdPair};
pub use dispatch::{run, Operation, RunReport};
pub use error::CheckError;
pub use verdict::{combine, Verdict};
