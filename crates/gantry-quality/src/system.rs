//! System performance estimation
//!
//! Derives a coarse device tier from total memory and logical core count.
//! Both readings come from the host (with conservative defaults when a
//! reading is unavailable), and the result is cached for a couple of
//! minutes since hardware does not change mid-transfer.

use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::QualityTier;

/// Memory assumed when the host total cannot be read (4 GiB).
pub const DEFAULT_MEMORY_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Logical cores assumed when parallelism cannot be read.
pub const DEFAULT_LOGICAL_CORES: usize = 4;

/// Memory at or above which the device counts as good (8 GiB).
const GOOD_MEMORY_BYTES: u64 = 8 * 1024 * 1024 * 1024;

/// Cores at or above which the device counts as good.
const GOOD_CORES: usize = 8;

/// Memory at or above which the device still counts as medium (4 GiB).
const MEDIUM_MEMORY_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Cores at or above which the device still counts as medium.
const MEDIUM_CORES: usize = 4;

/// One system measurement.
#[derive(Debug, Clone, Copy)]
pub struct SystemProfile {
    /// Tier derived from memory and core count.
    pub tier: QualityTier,

    /// Total device memory in bytes (default when unreadable).
    pub memory_bytes: u64,

    /// Logical core count (default when unreadable).
    pub logical_cores: usize,

    /// When the measurement was taken.
    pub measured_at: Instant,
}

/// Knobs for the system estimator.
#[derive(Debug, Clone)]
pub struct SystemProbeConfig {
    /// How long a measurement stays fresh before re-reading the host.
    pub refresh_interval: Duration,
}

impl Default for SystemProbeConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(120),
        }
    }
}

/// Interval-gated system performance estimator.
pub struct SystemEstimator {
    config: SystemProbeConfig,
    cached: RwLock<Option<SystemProfile>>,
}

impl SystemEstimator {
    /// Create an estimator with `config`.
    #[must_use]
    pub fn new(config: SystemProbeConfig) -> Self {
        Self {
            config,
            cached: RwLock::new(None),
        }
    }

    /// Current profile, reading the host if no fresh measurement exists.
    pub async fn current(&self) -> SystemProfile {
        {
            let cached = self.cached.read().await;
            if let Some(profile) =
                cached.filter(|p| p.measured_at.elapsed() < self.config.refresh_interval)
            {
                return profile;
            }
        }

        let profile = measure();
        debug!(
            memory_bytes = profile.memory_bytes,
            logical_cores = profile.logical_cores,
            tier = %profile.tier,
            "system probe complete"
        );
        *self.cached.write().await = Some(profile);
        profile
    }

    /// Inject a measurement, replacing the cache.
    ///
    /// Used by tests and by callers pinning a known device class.
    pub async fn seed(&self, profile: SystemProfile) {
        *self.cached.write().await = Some(profile);
    }
}

impl Default for SystemEstimator {
    fn default() -> Self {
        Self::new(SystemProbeConfig::default())
    }
}

/// Read the host and classify it.
fn measure() -> SystemProfile {
    let memory_bytes = detect_total_memory();
    let logical_cores = detect_logical_cores();

    SystemProfile {
        tier: classify_tier(memory_bytes, logical_cores),
        memory_bytes,
        logical_cores,
        measured_at: Instant::now(),
    }
}

/// Fold memory and core count into a tier.
#[must_use]
pub fn classify_tier(memory_bytes: u64, logical_cores: usize) -> QualityTier {
    if memory_bytes >= GOOD_MEMORY_BYTES && logical_cores >= GOOD_CORES {
        QualityTier::Good
    } else if memory_bytes >= MEDIUM_MEMORY_BYTES && logical_cores >= MEDIUM_CORES {
        QualityTier::Medium
    } else {
        QualityTier::Poor
    }
}

/// Total device memory in bytes, defaulting when unreadable.
fn detect_total_memory() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Some(bytes) = read_meminfo_total() {
            return bytes;
        }
    }

    DEFAULT_MEMORY_BYTES
}

/// Parse `MemTotal` out of /proc/meminfo.
#[cfg(target_os = "linux")]
fn read_meminfo_total() -> Option<u64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb = rest.split_whitespace().next()?.parse::<u64>().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/// Logical core count, defaulting when unreadable.
fn detect_logical_cores() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(DEFAULT_LOGICAL_CORES)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_classify_tier_thresholds() {
        assert_eq!(classify_tier(16 * GIB, 12), QualityTier::Good);
        assert_eq!(classify_tier(8 * GIB, 8), QualityTier::Good);

        // Either axis below the good bar drops to medium
        assert_eq!(classify_tier(16 * GIB, 4), QualityTier::Medium);
        assert_eq!(classify_tier(4 * GIB, 16), QualityTier::Medium);
        assert_eq!(classify_tier(4 * GIB, 4), QualityTier::Medium);

        assert_eq!(classify_tier(2 * GIB, 8), QualityTier::Poor);
        assert_eq!(classify_tier(8 * GIB, 2), QualityTier::Poor);
    }

    #[test]
    fn test_defaults_classify_as_medium() {
        assert_eq!(
            classify_tier(DEFAULT_MEMORY_BYTES, DEFAULT_LOGICAL_CORES),
            QualityTier::Medium
        );
    }

    #[test]
    fn test_measure_reads_something_plausible() {
        let profile = measure();
        assert!(profile.memory_bytes > 0);
        assert!(profile.logical_cores > 0);
    }

    #[tokio::test]
    async fn test_cached_profile_is_reused_within_interval() {
        let estimator = SystemEstimator::default();

        let first = estimator.current().await;
        let second = estimator.current().await;
        assert_eq!(first.measured_at, second.measured_at);
    }

    #[tokio::test]
    async fn test_seed_pins_the_tier() {
        let estimator = SystemEstimator::default();
        estimator
            .seed(SystemProfile {
                tier: QualityTier::Poor,
                memory_bytes: 2 * GIB,
                logical_cores: 2,
                measured_at: Instant::now(),
            })
            .await;

        assert_eq!(estimator.current().await.tier, QualityTier::Poor);
    }
}
