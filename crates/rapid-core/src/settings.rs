//! Tuning parameters (§6) as one validated, overridable settings struct.
//!
//! Every field is plain, TOML-friendly data (durations are `_millis: u64`
//! rather than `std::time::Duration`, which has no `serde` impl without an
//! extra crate); accessors convert to `Duration` at the point of use. A
//! misconfigured cluster should fail at startup, not at the first
//! `aggregate()` — so every component that is built from a `RapidSettings`
//! calls [`RapidSettings::validate`] once, in its constructor, rather than
//! re-checking invariants on every call.

use crate::error::ValidityError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// §4.C: the cut detector requires at least this many rings to make its
/// watermark counting meaningful.
pub const K_MIN: u32 = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RapidSettings {
    /// Number of rings (and therefore observers per subject).
    pub k: u32,
    /// High watermark: reports needed before a destination becomes a proposal.
    pub h: u32,
    /// Low watermark: reports needed before a destination enters pre-proposal.
    pub l: u32,

    pub failure_detector_interval_millis: u64,
    /// Delay before the synthetic first heartbeat that stabilizes the
    /// interval distribution against connection-setup latency (§4.E).
    pub expect_first_heartbeat_after_millis: u64,
    pub failure_detector_threshold: f64,
    pub failure_detector_max_sample_size: u32,
    pub failure_detector_scaling_factor: f64,
    /// Bound on how many `BOOTSTRAPPING` probe responses keep a detector
    /// healthy, so a permanently-joining peer cannot stall failure detection
    /// forever (§4.E step 3).
    pub bootstrap_heartbeat_limit: u32,

    pub batching_window_millis: u64,

    pub join_attempts: u32,
    pub join_delay_millis: u64,
    /// How long a joining node waits for a `JoinResponse` before retrying.
    /// Not named in §6's tuning table; chosen here to comfortably exceed one
    /// `batching_window` plus one consensus round-trip under no contention.
    pub messaging_client_join_request_timeout_millis: u64,

    /// Base of the jittered delay before a Fast-Paxos proposer falls back to
    /// classic Paxos (§4.F).
    pub classic_paxos_fallback_base_millis: u64,
}

impl Default for RapidSettings {
    fn default() -> Self {
        Self {
            k: 10,
            h: 9,
            l: 4,
            failure_detector_interval_millis: 2_000,
            expect_first_heartbeat_after_millis: 2_000,
            failure_detector_threshold: 0.2,
            failure_detector_max_sample_size: 1_000,
            failure_detector_scaling_factor: 0.9,
            bootstrap_heartbeat_limit: 30,
            batching_window_millis: 200,
            join_attempts: 10,
            join_delay_millis: 5_000,
            messaging_client_join_request_timeout_millis: 5_000,
            classic_paxos_fallback_base_millis: 10_000,
        }
    }
}

impl RapidSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Overlays non-default fields present in `toml_overlay` onto `self`.
    /// Used for a deployment that ships baked-in defaults but allows an
    /// operator to override a handful of them without restating the rest.
    pub fn merge_toml(mut self, toml_overlay: &str) -> Result<Self, toml::de::Error> {
        let partial: toml::Value = toml::from_str(toml_overlay)?;
        let mut base = toml::Value::try_from(&self).expect("RapidSettings always serializes");
        if let (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) =
            (&mut base, partial)
        {
            for (k, v) in overlay_table {
                base_table.insert(k, v);
            }
        }
        self = base.try_into()?;
        Ok(self)
    }

    pub fn failure_detector_interval(&self) -> Duration {
        Duration::from_millis(self.failure_detector_interval_millis)
    }

    pub fn expect_first_heartbeat_after(&self) -> Duration {
        Duration::from_millis(self.expect_first_heartbeat_after_millis)
    }

    pub fn batching_window(&self) -> Duration {
        Duration::from_millis(self.batching_window_millis)
    }

    pub fn join_delay(&self) -> Duration {
        Duration::from_millis(self.join_delay_millis)
    }

    pub fn messaging_client_join_request_timeout(&self) -> Duration {
        Duration::from_millis(self.messaging_client_join_request_timeout_millis)
    }

    pub fn classic_paxos_fallback_base(&self) -> Duration {
        Duration::from_millis(self.classic_paxos_fallback_base_millis)
    }

    /// Enforces §3/§4.C/§4.D's cross-field invariants. Called once by every
    /// constructor that consumes `RapidSettings`.
    pub fn validate(&self) -> Result<(), ValidityError> {
        if self.k < K_MIN {
            return Err(ValidityError::RingCountTooSmall {
                min: K_MIN,
                actual: self.k,
            });
        }
        if self.h > self.k {
            return Err(ValidityError::HighWatermarkExceedsK {
                k: self.k,
                h: self.h,
            });
        }
        if self.l > self.h {
            return Err(ValidityError::LowWatermarkExceedsHigh {
                h: self.h,
                l: self.l,
            });
        }
        if self.l == 0 {
            return Err(ValidityError::LowWatermarkNotPositive);
        }
        if self.failure_detector_threshold <= 0.0 {
            return Err(ValidityError::FailureDetectorThresholdNotPositive);
        }
        if self.failure_detector_max_sample_size == 0 {
            return Err(ValidityError::FailureDetectorSampleSizeNotPositive);
        }
        if self.failure_detector_scaling_factor <= 0.0 {
            return Err(ValidityError::FailureDetectorScalingFactorNotPositive);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RapidSettings::default().validate().is_ok());
    }

    #[test]
    fn rejects_h_greater_than_k() {
        let mut s = RapidSettings::default();
        s.h = s.k + 1;
        assert!(matches!(
            s.validate(),
            Err(ValidityError::HighWatermarkExceedsK { .. })
        ));
    }

    #[test]
    fn rejects_l_greater_than_h() {
        let mut s = RapidSettings::default();
        s.l = s.h + 1;
        assert!(matches!(
            s.validate(),
            Err(ValidityError::LowWatermarkExceedsHigh { .. })
        ));
    }

    #[test]
    fn overlay_only_replaces_named_fields() {
        let base = RapidSettings::default();
        let overlaid = base.clone().merge_toml("h = 7\n").unwrap();
        assert_eq!(overlaid.h, 7);
        assert_eq!(overlaid.k, base.k);
        assert_eq!(overlaid.l, base.l);
    }

    #[test]
    fn from_file_reads_a_toml_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rapid.toml");
        std::fs::write(&path, "k = 12\nh = 10\nl = 5\n").unwrap();
        let settings = RapidSettings::from_file(&path).unwrap();
        assert_eq!(settings.k, 12);
        assert_eq!(settings.h, 10);
        assert_eq!(settings.l, 5);
    }
}
