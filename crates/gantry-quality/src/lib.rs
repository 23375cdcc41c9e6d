//! # Gantry Quality
//!
//! Network and system quality estimation for the gantry upload engine.
//!
//! This crate provides:
//! - Round-trip latency and upload-bandwidth probing with graceful fallbacks
//! - A coarse three-level tier derived from the measurements
//! - Device memory / logical-core inspection for a system tier
//! - Interval-gated caching so probes run at most every few tens of seconds
//!
//! Estimators own their caches as instance state, so callers can hold one
//! per backend and tests can seed fixed tiers deterministically.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod network;
pub mod system;

pub use network::{NetworkEstimator, NetworkProbeConfig, NetworkQuality, ProbeApi, ProbeError};
pub use system::{SystemEstimator, SystemProbeConfig, SystemProfile};

use std::fmt;

/// Coarse capability tier shared by the network and system estimators.
///
/// Drives chunk sizing, concurrency, and retry backoff scaling; the exact
/// thresholds live with each estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityTier {
    /// Plenty of headroom; sizing may be aggressive.
    Good,

    /// Typical conditions; no adjustment either way.
    Medium,

    /// Constrained link or device; back off sizes and parallelism.
    Poor,
}

impl QualityTier {
    /// Stable lowercase name, used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Good => "good",
            QualityTier::Medium => "medium",
            QualityTier::Poor => "poor",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_display() {
        assert_eq!(QualityTier::Good.to_string(), "good");
        assert_eq!(QualityTier::Medium.to_string(), "medium");
        assert_eq!(QualityTier::Poor.to_string(), "poor");
    }
}
