//! Network quality estimation
//!
//! Measures round-trip latency with a cheap liveness probe and effective
//! bandwidth by timing a small payload upload, then folds both into a
//! [`QualityTier`]. Measurements are cached and re-taken only after the
//! configured interval elapses, so callers can ask for the current quality
//! on every transfer without hammering the probe endpoints.
//!
//! No probe failure is fatal: a failed latency probe reports a pessimistic
//! fixed latency, and a failed bandwidth probe falls back to a
//! latency-derived estimate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::QualityTier;

/// Latency assumed when the liveness probe fails or times out, in ms.
pub const FAILED_PROBE_LATENCY_MS: f64 = 1000.0;

/// Lowest bandwidth the estimator ever reports, in Mbps.
pub const MIN_BANDWIDTH_MBPS: f64 = 0.1;

/// Default payload size for the bandwidth probe (100 KB).
pub const DEFAULT_PROBE_PAYLOAD_BYTES: usize = 100 * 1024;

/// Latency below which the link counts as good, in ms.
const GOOD_LATENCY_MS: f64 = 100.0;

/// Latency below which the link still counts as medium, in ms.
const MEDIUM_LATENCY_MS: f64 = 300.0;

/// Bandwidth above which the link counts as good, in Mbps.
const GOOD_BANDWIDTH_MBPS: f64 = 10.0;

/// Bandwidth above which the link still counts as medium, in Mbps.
const MEDIUM_BANDWIDTH_MBPS: f64 = 5.0;

/// Probe transport failure.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// The probe did not complete within its deadline.
    #[error("probe timed out")]
    Timeout,

    /// The probe request could not be carried out.
    #[error("probe transport failed: {0}")]
    Transport(String),
}

impl ProbeError {
    /// Transport-level probe failure with a message.
    pub fn transport(message: impl Into<String>) -> Self {
        ProbeError::Transport(message.into())
    }
}

/// Transport hooks the estimator probes through.
///
/// Implementors write plain `async fn`s; the returned futures must be `Send`
/// so an estimator can be shared across tasks.
pub trait ProbeApi {
    /// Cheap liveness round trip; elapsed wall time is the latency sample.
    fn ping(&self) -> impl Future<Output = Result<(), ProbeError>> + Send;

    /// Accepts a small payload; elapsed wall time yields the bandwidth sample.
    fn bandwidth_probe(
        &self,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

/// One network measurement.
#[derive(Debug, Clone, Copy)]
pub struct NetworkQuality {
    /// Tier derived from latency and bandwidth.
    pub tier: QualityTier,

    /// Measured (or estimated) upload bandwidth in Mbps.
    pub bandwidth_mbps: f64,

    /// Measured (or assumed) round-trip latency in ms.
    pub latency_ms: f64,

    /// When the measurement was taken.
    pub measured_at: Instant,
}

impl NetworkQuality {
    /// Build a measurement taken now from raw probe numbers.
    #[must_use]
    pub fn from_measurements(latency_ms: f64, bandwidth_mbps: f64) -> Self {
        Self {
            tier: classify_tier(latency_ms, bandwidth_mbps),
            bandwidth_mbps,
            latency_ms,
            measured_at: Instant::now(),
        }
    }
}

/// Knobs for the network estimator.
#[derive(Debug, Clone)]
pub struct NetworkProbeConfig {
    /// How long a measurement stays fresh before the next probe.
    pub check_interval: Duration,

    /// Deadline for the liveness probe.
    pub latency_timeout: Duration,

    /// Deadline for the bandwidth probe.
    pub bandwidth_timeout: Duration,

    /// Payload size for the bandwidth probe, in bytes.
    pub probe_payload_bytes: usize,
}

impl Default for NetworkProbeConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            latency_timeout: Duration::from_secs(5),
            bandwidth_timeout: Duration::from_secs(10),
            probe_payload_bytes: DEFAULT_PROBE_PAYLOAD_BYTES,
        }
    }
}

/// Interval-gated network quality estimator.
///
/// Owns the cached measurement; re-probes only when the cache is stale or a
/// refresh is forced. Tests can [`seed`](Self::seed) a fixed measurement to
/// pin the tier deterministically.
pub struct NetworkEstimator<A> {
    api: Arc<A>,
    config: NetworkProbeConfig,
    cached: RwLock<Option<NetworkQuality>>,
}

impl<A: ProbeApi> NetworkEstimator<A> {
    /// Create an estimator probing through `api`.
    pub fn new(api: Arc<A>, config: NetworkProbeConfig) -> Self {
        Self {
            api,
            config,
            cached: RwLock::new(None),
        }
    }

    /// Current quality, probing first if no fresh measurement exists.
    pub async fn current(&self) -> NetworkQuality {
        if let Some(quality) = self.fresh().await {
            return quality;
        }
        self.refresh().await
    }

    /// Last measurement regardless of age, without probing.
    pub async fn cached(&self) -> Option<NetworkQuality> {
        *self.cached.read().await
    }

    /// Inject a measurement, replacing the cache.
    ///
    /// Used by tests and by callers restoring a known-good reading.
    pub async fn seed(&self, quality: NetworkQuality) {
        *self.cached.write().await = Some(quality);
    }

    /// Probe now and replace the cache.
    pub async fn refresh(&self) -> NetworkQuality {
        let latency_ms = self.measure_latency().await;
        let bandwidth_mbps = self.measure_bandwidth(latency_ms).await;
        let quality = NetworkQuality::from_measurements(latency_ms, bandwidth_mbps);

        debug!(
            latency_ms,
            bandwidth_mbps,
            tier = %quality.tier,
            "network probe complete"
        );

        *self.cached.write().await = Some(quality);
        quality
    }

    async fn fresh(&self) -> Option<NetworkQuality> {
        let cached = self.cached.read().await;
        cached.filter(|quality| quality.measured_at.elapsed() < self.config.check_interval)
    }

    /// Round-trip latency in ms; probe failure reports
    /// [`FAILED_PROBE_LATENCY_MS`].
    async fn measure_latency(&self) -> f64 {
        let start = Instant::now();
        match tokio::time::timeout(self.config.latency_timeout, self.api.ping()).await {
            Ok(Ok(())) => start.elapsed().as_secs_f64() * 1000.0,
            Ok(Err(error)) => {
                warn!(%error, "latency probe failed, assuming high latency");
                FAILED_PROBE_LATENCY_MS
            }
            Err(_) => {
                warn!("latency probe timed out, assuming high latency");
                FAILED_PROBE_LATENCY_MS
            }
        }
    }

    /// Upload bandwidth in Mbps; probe failure falls back to a
    /// latency-derived estimate.
    async fn measure_bandwidth(&self, latency_ms: f64) -> f64 {
        let payload = vec![0u8; self.config.probe_payload_bytes];
        let bits_sent = (payload.len() * 8) as f64;

        let start = Instant::now();
        match tokio::time::timeout(self.config.bandwidth_timeout, self.api.bandwidth_probe(payload))
            .await
        {
            Ok(Ok(())) => {
                let seconds = start.elapsed().as_secs_f64().max(f64::EPSILON);
                let mbps = bits_sent / (1024.0 * 1024.0 * seconds);
                mbps.max(MIN_BANDWIDTH_MBPS)
            }
            Ok(Err(error)) => {
                warn!(%error, "bandwidth probe failed, estimating from latency");
                estimate_bandwidth_from_latency(latency_ms)
            }
            Err(_) => {
                warn!("bandwidth probe timed out, estimating from latency");
                estimate_bandwidth_from_latency(latency_ms)
            }
        }
    }
}

/// Fold latency and bandwidth into a tier.
#[must_use]
pub fn classify_tier(latency_ms: f64, bandwidth_mbps: f64) -> QualityTier {
    if latency_ms < GOOD_LATENCY_MS && bandwidth_mbps > GOOD_BANDWIDTH_MBPS {
        QualityTier::Good
    } else if latency_ms < MEDIUM_LATENCY_MS && bandwidth_mbps > MEDIUM_BANDWIDTH_MBPS {
        QualityTier::Medium
    } else {
        QualityTier::Poor
    }
}

/// Rough bandwidth guess when the probe itself cannot run.
fn estimate_bandwidth_from_latency(latency_ms: f64) -> f64 {
    if latency_ms < GOOD_LATENCY_MS {
        10.0
    } else if latency_ms < MEDIUM_LATENCY_MS {
        5.0
    } else {
        2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Configurable probe double: optional ping delay, switchable failures.
    struct ScriptedProbe {
        ping_delay: Duration,
        fail_ping: bool,
        fail_bandwidth: bool,
    }

    impl ScriptedProbe {
        fn healthy(ping_delay: Duration) -> Self {
            Self {
                ping_delay,
                fail_ping: false,
                fail_bandwidth: false,
            }
        }

        fn dead() -> Self {
            Self {
                ping_delay: Duration::ZERO,
                fail_ping: true,
                fail_bandwidth: true,
            }
        }
    }

    impl ProbeApi for ScriptedProbe {
        async fn ping(&self) -> Result<(), ProbeError> {
            if self.fail_ping {
                return Err(ProbeError::transport("probe endpoint unreachable"));
            }
            tokio::time::sleep(self.ping_delay).await;
            Ok(())
        }

        async fn bandwidth_probe(&self, _payload: Vec<u8>) -> Result<(), ProbeError> {
            if self.fail_bandwidth {
                return Err(ProbeError::transport("probe endpoint unreachable"));
            }
            Ok(())
        }
    }

    fn estimator(probe: ScriptedProbe) -> NetworkEstimator<ScriptedProbe> {
        NetworkEstimator::new(Arc::new(probe), NetworkProbeConfig::default())
    }

    #[test]
    fn test_classify_tier_thresholds() {
        assert_eq!(classify_tier(50.0, 20.0), QualityTier::Good);
        assert_eq!(classify_tier(99.9, 10.1), QualityTier::Good);

        // Low latency alone is not enough
        assert_eq!(classify_tier(50.0, 8.0), QualityTier::Medium);
        assert_eq!(classify_tier(200.0, 50.0), QualityTier::Medium);

        assert_eq!(classify_tier(200.0, 4.0), QualityTier::Poor);
        assert_eq!(classify_tier(500.0, 100.0), QualityTier::Poor);
        assert_eq!(classify_tier(1000.0, 2.0), QualityTier::Poor);
    }

    #[test]
    fn test_latency_fallback_estimates() {
        assert_eq!(estimate_bandwidth_from_latency(50.0), 10.0);
        assert_eq!(estimate_bandwidth_from_latency(150.0), 5.0);
        assert_eq!(estimate_bandwidth_from_latency(800.0), 2.0);
    }

    #[tokio::test]
    async fn test_refresh_measures_fast_link_as_good() {
        let estimator = estimator(ScriptedProbe::healthy(Duration::from_millis(5)));

        let quality = estimator.current().await;
        assert_eq!(quality.tier, QualityTier::Good);
        assert!(quality.latency_ms < GOOD_LATENCY_MS);
        assert!(quality.bandwidth_mbps > GOOD_BANDWIDTH_MBPS);
    }

    #[tokio::test]
    async fn test_slow_ping_degrades_tier() {
        let estimator = estimator(ScriptedProbe::healthy(Duration::from_millis(150)));

        let quality = estimator.current().await;
        assert_eq!(quality.tier, QualityTier::Medium);
        assert!(quality.latency_ms >= 150.0);
    }

    #[tokio::test]
    async fn test_dead_probe_degrades_through_fallbacks() {
        let estimator = estimator(ScriptedProbe::dead());

        let quality = estimator.current().await;
        assert_eq!(quality.latency_ms, FAILED_PROBE_LATENCY_MS);
        assert_eq!(quality.bandwidth_mbps, 2.0);
        assert_eq!(quality.tier, QualityTier::Poor);
    }

    #[tokio::test]
    async fn test_cached_measurement_is_reused_within_interval() {
        let estimator = estimator(ScriptedProbe::healthy(Duration::ZERO));

        let first = estimator.current().await;
        let second = estimator.current().await;
        assert_eq!(first.measured_at, second.measured_at);
    }

    #[tokio::test]
    async fn test_seed_pins_the_tier() {
        let estimator = estimator(ScriptedProbe::healthy(Duration::ZERO));

        estimator
            .seed(NetworkQuality {
                tier: QualityTier::Poor,
                bandwidth_mbps: 1.0,
                latency_ms: 600.0,
                measured_at: Instant::now(),
            })
            .await;

        let quality = estimator.current().await;
        assert_eq!(quality.tier, QualityTier::Poor);
        assert_eq!(quality.bandwidth_mbps, 1.0);
    }

    #[tokio::test]
    async fn test_forced_refresh_replaces_seeded_cache() {
        let estimator = estimator(ScriptedProbe::healthy(Duration::ZERO));

        estimator
            .seed(NetworkQuality {
                tier: QualityTier::Poor,
                bandwidth_mbps: 1.0,
                latency_ms: 600.0,
                measured_at: Instant::now(),
            })
            .await;

        let quality = estimator.refresh().await;
        assert_eq!(quality.tier, QualityTier::Good);
    }

    #[tokio::test]
    async fn test_cached_returns_none_before_first_probe() {
        let estimator = estimator(ScriptedProbe::healthy(Duration::ZERO));
        assert!(estimator.cached().await.is_none());
    }
}
