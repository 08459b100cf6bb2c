// SPDX-License-Identifier: MIT
//! Check configuration derived from the command line.
//!
//! The dispatcher builds one [`CheckConfig`] per invocation and hands it,
//! immutable, to every check. Threshold pairs are validated up front so a
//! compound operation never partially runs with bad configuration.

use crate::error::CheckError;

/// Default arfind/stfind warning threshold in seconds.
pub const DEFAULT_SEQ_WARN_SECS: u64 = 300;
/// Default arfind/stfind critical threshold in seconds.
pub const DEFAULT_SEQ_CRIT_SECS: u64 = 600;

/// An inclusive warn/crit threshold pair.
///
/// Percent for the capacity check, seconds for the sequence check.
/// Invariant: `warn <= crit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPair {
    pub warn: u64,
    pub crit: u64,
}

impl ThresholdPair {
    /// Build a pair, rejecting `warn > crit`.
    pub fn new(warn: u64, crit: u64) -> Result<Self, CheckError> {
        if warn > crit {
            return Err(CheckError::Config(format!(
                "warning threshold {warn} exceeds critical threshold {crit}"
            )));
        }
        Ok(Self { warn, crit })
    }
}

/// Immutable per-invocation configuration shared by all checks.
#[derive(Debug, Clone)]
pub struct CheckConfig {
    /// Restrict mount-based checks to this mount point.
    pub mount_filter: Option<String>,
    /// Remap the WARNING exit code to 0 for monitoring systems that cannot
    /// act on degraded states. CRITICAL and UNKNOWN are never remapped.
    pub passfail: bool,
    /// Explicit capacity thresholds (percent). `None` means fall back to the
    /// cluster watermarks; if those are also unavailable the mount check
    /// reports UNKNOWN.
    pub capacity: Option<ThresholdPair>,
    /// Arfind blocked-duration thresholds (seconds).
    pub arfind: ThresholdPair,
    /// Stfind blocked-duration thresholds (seconds).
    pub stfind: ThresholdPair,
}

impl CheckConfig {
    /// Validate raw CLI threshold values into a config.
    #[allow(clippy::too_many_arguments)]
    pub fn from_cli(
        mount_filter: Option<String>,
        passfail: bool,
        warn_thresh: Option<u64>,
        crit_thresh: Option<u64>,
        arfind_warn: u64,
        arfind_crit: u64,
        stfind_warn: u64,
        stfind_crit: u64,
    ) -> Result<Self, CheckError> {
        let capacity = match (warn_thresh, crit_thresh) {
            (None, None) => None,
            (Some(w), Some(c)) => Some(ThresholdPair::new(w, c)?),
            _ => {
                return Err(CheckError::Config(
                    "warn_thresh and crit_thresh must be given together".into(),
                ))
            }
        };
        Ok(Self {
            mount_filter,
            passfail,
            capacity,
            arfind: ThresholdPair::new(arfind_warn, arfind_crit)?,
            stfind: ThresholdPair::new(stfind_warn, stfind_crit)?,
        })
    }
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            mount_filter: None,
            passfail: false,
            capacity: None,
            arfind: ThresholdPair {
                warn: DEFAULT_SEQ_WARN_SECS,
                crit: DEFAULT_SEQ_CRIT_SECS,
            },
            stfind: ThresholdPair {
                warn: DEFAULT_SEQ_WARN_SECS,
                crit: DEFAULT_SEQ_CRIT_SECS,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_pair() {
        assert!(ThresholdPair::new(90, 70).is_err());
        assert!(ThresholdPair::new(70, 90).is_ok());
        assert!(ThresholdPair::new(90, 90).is_ok());
    }

    #[test]
    fn rejects_half_specified_capacity_pair() {
        let err = CheckConfig::from_cli(None, false, Some(70), None, 300, 600, 300, 600);
        assert!(err.is_err());
    }

    #[test]
    fn no_capacity_pair_means_watermark_defaults() {
        let cfg = CheckConfig::from_cli(None, false, None, None, 300, 600, 300, 600).unwrap();
        assert!(cfg.capacity.is_none());
    }
}
