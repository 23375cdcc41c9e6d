//! Adaptive sizing policy
//!
//! Pure functions mapping file size and measured conditions to a chunk size
//! and a worker count. Both are deterministic for fixed inputs; the only
//! nondeterminism in the system enters through the live quality
//! measurements feeding them.

use gantry_quality::QualityTier;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Lower clamp for computed chunk sizes (2 MiB).
pub const MIN_CHUNK_SIZE: u64 = 2 * MIB;

/// Upper clamp for computed chunk sizes (200 MiB).
pub const MAX_CHUNK_SIZE: u64 = 200 * MIB;

/// Lower clamp for computed concurrency.
pub const MIN_CONCURRENCY: usize = 1;

/// Upper clamp for computed concurrency.
pub const MAX_CONCURRENCY: usize = 8;

/// Chunk size for a transfer, in bytes.
///
/// A base size chosen by file-size bracket is scaled by bandwidth and tier
/// multipliers, then clamped to [`MIN_CHUNK_SIZE`]..=[`MAX_CHUNK_SIZE`].
#[must_use]
pub fn chunk_size_for(file_size: u64, tier: QualityTier, bandwidth_mbps: f64) -> u64 {
    let base = base_chunk_size(file_size) as f64;
    let scaled = base * bandwidth_multiplier(bandwidth_mbps) * tier_multiplier(tier);
    (scaled.round() as u64).clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
}

/// Worker count for a transfer.
///
/// A base count chosen by file-size bracket is scaled by network and system
/// factors, rounded, then clamped to [`MIN_CONCURRENCY`]..=[`MAX_CONCURRENCY`].
#[must_use]
pub fn concurrency_for(file_size: u64, network: QualityTier, system: QualityTier) -> usize {
    let base = base_concurrency(file_size) as f64;
    let scaled = base * network_factor(network) * system_factor(system);
    (scaled.round() as usize).clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

fn base_chunk_size(file_size: u64) -> u64 {
    if file_size < 100 * MIB {
        5 * MIB
    } else if file_size < 500 * MIB {
        10 * MIB
    } else if file_size < GIB {
        20 * MIB
    } else if file_size < 3 * GIB {
        50 * MIB
    } else if file_size < 10 * GIB {
        100 * MIB
    } else {
        150 * MIB
    }
}

fn bandwidth_multiplier(bandwidth_mbps: f64) -> f64 {
    if bandwidth_mbps > 50.0 {
        1.8
    } else if bandwidth_mbps > 20.0 {
        1.4
    } else if bandwidth_mbps > 10.0 {
        1.2
    } else if bandwidth_mbps < 2.0 {
        0.4
    } else if bandwidth_mbps < 5.0 {
        0.7
    } else {
        1.0
    }
}

fn tier_multiplier(tier: QualityTier) -> f64 {
    match tier {
        QualityTier::Good => 1.2,
        QualityTier::Medium => 1.0,
        QualityTier::Poor => 0.6,
    }
}

fn base_concurrency(file_size: u64) -> usize {
    if file_size < 50 * MIB {
        4
    } else if file_size < 500 * MIB {
        3
    } else if file_size < 2 * GIB {
        2
    } else {
        1
    }
}

fn network_factor(tier: QualityTier) -> f64 {
    match tier {
        QualityTier::Good => 1.5,
        QualityTier::Medium => 1.0,
        QualityTier::Poor => 0.5,
    }
}

fn system_factor(tier: QualityTier) -> f64 {
    match tier {
        QualityTier::Good => 1.5,
        QualityTier::Medium => 1.0,
        QualityTier::Poor => 0.7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_chunk_size_brackets() {
        assert_eq!(base_chunk_size(10 * MIB), 5 * MIB);
        assert_eq!(base_chunk_size(100 * MIB), 10 * MIB);
        assert_eq!(base_chunk_size(499 * MIB), 10 * MIB);
        assert_eq!(base_chunk_size(500 * MIB), 20 * MIB);
        assert_eq!(base_chunk_size(GIB), 50 * MIB);
        assert_eq!(base_chunk_size(3 * GIB), 100 * MIB);
        assert_eq!(base_chunk_size(10 * GIB), 150 * MIB);
        assert_eq!(base_chunk_size(100 * GIB), 150 * MIB);
    }

    #[test]
    fn test_bandwidth_multiplier_brackets() {
        assert_eq!(bandwidth_multiplier(60.0), 1.8);
        assert_eq!(bandwidth_multiplier(30.0), 1.4);
        assert_eq!(bandwidth_multiplier(15.0), 1.2);
        assert_eq!(bandwidth_multiplier(7.0), 1.0);
        assert_eq!(bandwidth_multiplier(3.0), 0.7);
        assert_eq!(bandwidth_multiplier(1.0), 0.4);
    }

    #[test]
    fn test_chunk_size_good_network_scenario() {
        // 250 MB on a good 60 Mbps link: 10 MB base * 1.8 * 1.2 = 21.6 MB
        let size = chunk_size_for(250 * MIB, QualityTier::Good, 60.0);
        let expected = (10.0 * MIB as f64 * 1.8 * 1.2).round() as u64;
        assert_eq!(size, expected);
        assert!(size > MIN_CHUNK_SIZE && size < MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_chunk_size_clamps_low() {
        // 5 MB base * 0.4 * 0.6 = 1.2 MB, below the floor
        let size = chunk_size_for(10 * MIB, QualityTier::Poor, 1.0);
        assert_eq!(size, MIN_CHUNK_SIZE);
    }

    #[test]
    fn test_chunk_size_clamps_high() {
        // 150 MB base * 1.8 * 1.2 = 324 MB, above the ceiling
        let size = chunk_size_for(20 * GIB, QualityTier::Good, 100.0);
        assert_eq!(size, MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_chunk_size_is_deterministic() {
        let a = chunk_size_for(700 * MIB, QualityTier::Medium, 12.0);
        let b = chunk_size_for(700 * MIB, QualityTier::Medium, 12.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_base_concurrency_brackets() {
        assert_eq!(base_concurrency(10 * MIB), 4);
        assert_eq!(base_concurrency(50 * MIB), 3);
        assert_eq!(base_concurrency(499 * MIB), 3);
        assert_eq!(base_concurrency(GIB), 2);
        assert_eq!(base_concurrency(2 * GIB), 1);
        assert_eq!(base_concurrency(100 * GIB), 1);
    }

    #[test]
    fn test_concurrency_scaling() {
        // 3 * 1.5 * 1.5 = 6.75 -> 7
        assert_eq!(
            concurrency_for(250 * MIB, QualityTier::Good, QualityTier::Good),
            7
        );
        // 3 * 1.5 * 1.0 = 4.5 -> 5 (round half away from zero)
        assert_eq!(
            concurrency_for(250 * MIB, QualityTier::Good, QualityTier::Medium),
            5
        );
        // 3 * 1.0 * 1.0 = 3
        assert_eq!(
            concurrency_for(250 * MIB, QualityTier::Medium, QualityTier::Medium),
            3
        );
    }

    #[test]
    fn test_concurrency_clamps_low() {
        // 1 * 0.5 * 0.7 = 0.35 -> 0, clamped up to 1
        assert_eq!(
            concurrency_for(5 * GIB, QualityTier::Poor, QualityTier::Poor),
            1
        );
    }

    #[test]
    fn test_concurrency_clamps_high() {
        // 4 * 1.5 * 1.5 = 9 -> clamped to 8
        assert_eq!(
            concurrency_for(10 * MIB, QualityTier::Good, QualityTier::Good),
            MAX_CONCURRENCY
        );
    }
}
