//! Uploader configuration

use std::time::Duration;

use gantry_quality::network::NetworkProbeConfig;
use gantry_quality::system::SystemProbeConfig;

use crate::progress::SPEED_WINDOW;
use crate::retry::RetryPolicy;

/// Tunables for an [`Uploader`](crate::uploader::Uploader).
///
/// The defaults suit interactive transfers to a nearby store; long-haul
/// links mostly want a larger `part_timeout`.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Wall-clock budget for a single part attempt (default: 120s).
    pub part_timeout: Duration,

    /// Smallest tail worth shipping as its own part (default: 5 MiB).
    /// Remainders under this merge into the previous part.
    pub min_chunk_floor: u64,

    /// Samples kept in the rolling speed window (default: 10).
    pub speed_window: usize,

    /// Consult and maintain recovery snapshots (default: false).
    ///
    /// Snapshots are written on failure regardless, so enabling this
    /// later still finds progress from earlier runs of the same process.
    pub enable_recovery: bool,

    /// Retry budgets and backoff shaping.
    pub retry: RetryPolicy,

    /// Network probing cadence and timeouts.
    pub network: NetworkProbeConfig,

    /// System profile refresh cadence.
    pub system: SystemProbeConfig,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            part_timeout: Duration::from_secs(120),
            min_chunk_floor: 5 * 1024 * 1024,
            speed_window: SPEED_WINDOW,
            enable_recovery: false,
            retry: RetryPolicy::default(),
            network: NetworkProbeConfig::default(),
            system: SystemProbeConfig::default(),
        }
    }
}
