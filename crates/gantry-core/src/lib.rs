//! # Gantry Core
//!
//! Adaptive multipart upload engine. Drives large-file transfers to an
//! object store, adapting to measured conditions as it goes:
//!
//! - Latency and bandwidth probes feed a coarse network tier
//! - Chunk size and worker count derive from file size plus that tier
//! - Part failures are classified and retried with category-specific
//!   exponential backoff
//! - Interrupted transfers snapshot their confirmed parts and can resume
//!   the same server-side session later
//!
//! The engine owns orchestration only. The HTTP surface stays behind the
//! [`StorageApi`] trait supplied by the embedding application, which keeps
//! the whole crate testable against scripted backends.
//!
//! ```no_run
//! # use std::path::Path;
//! # use std::sync::Arc;
//! # async fn run(api: Arc<impl gantry_core::StorageApi + 'static>) -> gantry_core::Result<()> {
//! use gantry_core::{UploadOptions, Uploader, UploaderConfig};
//!
//! let uploader = Uploader::new(api, UploaderConfig::default());
//! let outcome = uploader
//!     .upload_file(Path::new("/data/video.mp4"), UploadOptions::new("media", "videos/intro.mp4"))
//!     .await?;
//! println!("uploaded: {:?}", outcome.upload_id);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod chunk;
pub mod config;
pub mod error;
pub mod progress;
pub mod recovery;
pub mod retry;
pub mod sizing;
mod task;
pub mod uploader;

pub use api::{
    AbortRequest, CompleteRequest, InitOutcome, InitRequest, PartReceipt, PartRequest, StorageApi,
    StoreError,
};
pub use chunk::{plan_parts, ChunkSpec};
pub use config::UploaderConfig;
pub use error::{Result, UploadError};
pub use progress::{ProgressDetail, ProgressUpdate, SpeedTracker};
pub use recovery::{
    source_fingerprint, MemoryRecoveryStore, RecoveryState, RecoveryStore,
};
pub use retry::{classify, ErrorCategory, RetryPolicy};
pub use sizing::{chunk_size_for, concurrency_for};
pub use uploader::{CancelHandle, ProgressFn, UploadIdFn, UploadOptions, UploadOutcome, Uploader};

pub use gantry_quality::{
    NetworkEstimator, NetworkQuality, ProbeApi, ProbeError, QualityTier, SystemEstimator,
    SystemProfile,
};
