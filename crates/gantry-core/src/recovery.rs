//! Transfer recovery
//!
//! A failed multipart transfer leaves server-side state worth keeping: the
//! upload id and every confirmed part. [`RecoveryState`] captures that
//! under a fingerprint of the source file, so a later attempt on the same
//! unchanged file can resume instead of restarting.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Persisted snapshot of an interrupted transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryState {
    /// Server-side multipart session id.
    pub upload_id: String,

    /// Part numbers the store has confirmed.
    pub completed_parts: BTreeSet<u32>,

    /// Chunk size the parts were planned with. A resume must reuse this
    /// even if current conditions would pick a different size, or the
    /// completed part numbers stop lining up with byte offsets.
    pub chunk_size: u64,

    /// Seconds since the epoch when the snapshot was written.
    pub saved_at: u64,
}

impl RecoveryState {
    /// Snapshot taken now.
    #[must_use]
    pub fn new(upload_id: String, completed_parts: BTreeSet<u32>, chunk_size: u64) -> Self {
        let saved_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            upload_id,
            completed_parts,
            chunk_size,
            saved_at,
        }
    }

    /// Age of the snapshot in seconds.
    #[must_use]
    pub fn age_secs(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now.saturating_sub(self.saved_at)
    }
}

/// Identity key for a source file: name, size and mtime.
///
/// Any of the three changing invalidates saved progress, since part
/// offsets would no longer match the bytes on disk.
#[must_use]
pub fn source_fingerprint(object_name: &str, file_size: u64, modified_secs: u64) -> String {
    format!("{object_name}_{file_size}_{modified_secs}")
}

/// Storage for recovery snapshots, keyed by source fingerprint.
///
/// Methods are synchronous; implementations are expected to be cheap
/// (in-memory, or a small local file) and are called from async workers
/// without suspension.
pub trait RecoveryStore: Send + Sync {
    /// Saves or replaces the snapshot for `fingerprint`.
    fn save(&self, fingerprint: &str, state: RecoveryState);

    /// Loads the snapshot for `fingerprint`, if any.
    fn load(&self, fingerprint: &str) -> Option<RecoveryState>;

    /// Removes the snapshot for `fingerprint`.
    fn clear(&self, fingerprint: &str);
}

/// Process-local recovery store backed by a concurrent map.
///
/// Survives across transfers within one process, which covers the common
/// retry-after-failure flow. Restart durability needs a persistent
/// implementation.
#[derive(Debug, Default)]
pub struct MemoryRecoveryStore {
    entries: DashMap<String, RecoveryState>,
}

impl MemoryRecoveryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of snapshots held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no snapshots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops snapshots older than `max_age_secs`, returning how many were
    /// removed.
    pub fn purge_older_than(&self, max_age_secs: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, state| state.age_secs() <= max_age_secs);
        before - self.entries.len()
    }
}

impl RecoveryStore for MemoryRecoveryStore {
    fn save(&self, fingerprint: &str, state: RecoveryState) {
        self.entries.insert(fingerprint.to_string(), state);
    }

    fn load(&self, fingerprint: &str) -> Option<RecoveryState> {
        self.entries.get(fingerprint).map(|entry| entry.clone())
    }

    fn clear(&self, fingerprint: &str) {
        self.entries.remove(fingerprint);
    }
}
