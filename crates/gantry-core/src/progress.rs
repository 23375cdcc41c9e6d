//! Progress accounting
//!
//! Workers publish a [`ProgressUpdate`] after every finished part. Speed is
//! a rolling average over the last [`SPEED_WINDOW`] samples so a single
//! slow part does not crater the displayed rate, and the ETA is derived
//! from that average.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Number of speed samples kept in the rolling window.
pub const SPEED_WINDOW: usize = 10;

/// Snapshot of a transfer published after each completed part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Whole-number completion percentage, floored, never above 100.
    pub percent: u8,

    /// Parts confirmed so far.
    pub uploaded_chunks: usize,

    /// Parts planned in total.
    pub total_chunks: usize,

    /// Byte-level progress and rate estimates.
    pub detail: ProgressDetail,
}

/// Byte counts and rate estimates behind a [`ProgressUpdate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressDetail {
    /// Bytes confirmed so far.
    pub uploaded_bytes: u64,

    /// Bytes in the source.
    pub total_bytes: u64,

    /// Rolling average throughput in bytes per second.
    pub speed_bps: f64,

    /// Estimated seconds to completion, absent until a rate exists.
    pub eta_seconds: Option<u64>,

    /// Wall time the most recent part took, in milliseconds.
    pub chunk_upload_ms: u64,
}

impl ProgressDetail {
    /// Throughput as `"12.34 MB/s"`.
    #[must_use]
    pub fn speed_text(&self) -> String {
        format!("{:.2} MB/s", self.speed_bps / (1024.0 * 1024.0))
    }

    /// Remaining time as `"4:07"`, or `"--:--"` when no estimate exists.
    #[must_use]
    pub fn eta_text(&self) -> String {
        match self.eta_seconds {
            Some(secs) => format!("{}:{:02}", secs / 60, secs % 60),
            None => "--:--".to_string(),
        }
    }
}

/// Floored byte-ratio completion percentage, capped at 100.
///
/// Byte-based rather than part-based: a merged oversized tail part carries
/// more than one part's share of the file, and counting parts would
/// misreport it.
#[must_use]
pub fn percent(uploaded_bytes: u64, total_bytes: u64) -> u8 {
    if total_bytes == 0 {
        return 100;
    }
    let pct = u128::from(uploaded_bytes) * 100 / u128::from(total_bytes);
    pct.min(100) as u8
}

/// One speed/ETA estimate from [`SpeedTracker::record`].
#[derive(Debug, Clone, Copy)]
pub struct SpeedReading {
    /// Rolling average throughput in bytes per second.
    pub speed_bps: f64,

    /// Estimated seconds to completion, absent until a rate exists.
    pub eta_seconds: Option<u64>,
}

/// Rolling-window throughput estimator.
///
/// Feed it the cumulative uploaded byte count after each completed part;
/// it differentiates against the previous call to produce instantaneous
/// samples and averages them.
#[derive(Debug)]
pub struct SpeedTracker {
    samples: VecDeque<f64>,
    window: usize,
    last_bytes: u64,
    last_update: Instant,
}

impl SpeedTracker {
    /// Tracker with the given window, starting from `initial_bytes`
    /// already transferred. A nonzero start lets resumed transfers report
    /// speed over new bytes only.
    #[must_use]
    pub fn new(window: usize, initial_bytes: u64) -> Self {
        Self {
            samples: VecDeque::with_capacity(window),
            window: window.max(1),
            last_bytes: initial_bytes,
            last_update: Instant::now(),
        }
    }

    /// Records the new cumulative byte count and returns the current
    /// estimate.
    ///
    /// Calls with no elapsed time since the previous one contribute no
    /// sample; the previous average carries forward unchanged.
    pub fn record(&mut self, uploaded_bytes: u64, total_bytes: u64) -> SpeedReading {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        if elapsed > 0.0 {
            let delta = uploaded_bytes.saturating_sub(self.last_bytes) as f64;
            self.samples.push_back(delta / elapsed);
            while self.samples.len() > self.window {
                self.samples.pop_front();
            }
            self.last_bytes = uploaded_bytes;
            self.last_update = now;
        }

        let speed_bps = if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        };

        let eta_seconds = if speed_bps > 0.0 {
            let remaining = total_bytes.saturating_sub(uploaded_bytes) as f64;
            Some((remaining / speed_bps).ceil() as u64)
        } else {
            None
        };

        SpeedReading {
            speed_bps,
            eta_seconds,
        }
    }
}
