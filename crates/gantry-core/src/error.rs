//! Upload error taxonomy

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::api::StoreError;
use crate::retry::ErrorCategory;

/// Result alias for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;

/// Terminal failure of an upload.
///
/// Retryable part failures are handled internally; by the time one of
/// these surfaces, the transfer has stopped.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The store refused to open a multipart session.
    #[error("failed to initialize multipart upload for {object}: {source}")]
    Init {
        /// Destination object name.
        object: String,
        /// Underlying store failure.
        source: StoreError,
    },

    /// Every part landed but the final assembly call failed.
    #[error("failed to complete multipart upload for {object}: {source}")]
    Complete {
        /// Destination object name.
        object: String,
        /// Underlying store failure.
        source: StoreError,
    },

    /// A part failed with a category that is never retried.
    #[error("part {part_number} rejected ({category}): {source}")]
    ChunkRejected {
        /// Part that failed.
        part_number: u32,
        /// Classification of the failure.
        category: ErrorCategory,
        /// Underlying store failure.
        source: StoreError,
    },

    /// A part kept failing until its retry budget ran out.
    #[error("part {part_number} failed after {attempts} attempts ({category}): {source}")]
    ChunkExhausted {
        /// Part that failed.
        part_number: u32,
        /// Attempts made, counting the first.
        attempts: u32,
        /// Classification of the final failure.
        category: ErrorCategory,
        /// Store failure from the final attempt.
        source: StoreError,
    },

    /// The transfer was cancelled through its [`CancelHandle`](crate::uploader::CancelHandle).
    #[error("upload cancelled")]
    Cancelled,

    /// The source file has no bytes; the store rejects empty multipart
    /// sessions.
    #[error("source file is empty: {}", .0.display())]
    EmptySource(PathBuf),

    /// Reading the source file failed.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),

    /// A worker task ended abnormally (panic or runtime shutdown).
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl UploadError {
    /// Failure category, for variants that carry one.
    #[must_use]
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            UploadError::ChunkRejected { category, .. }
            | UploadError::ChunkExhausted { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// Whether a recovery snapshot may remain after this failure.
    ///
    /// True for failures that strike mid-transfer, where confirmed parts
    /// and the upload id are worth keeping for a resume.
    #[must_use]
    pub fn preserves_recovery_state(&self) -> bool {
        !matches!(
            self,
            UploadError::Init { .. } | UploadError::EmptySource(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_is_carried_by_chunk_variants() {
        let rejected = UploadError::ChunkRejected {
            part_number: 3,
            category: ErrorCategory::Auth,
            source: StoreError::http(401, "expired"),
        };
        assert_eq!(rejected.category(), Some(ErrorCategory::Auth));

        let exhausted = UploadError::ChunkExhausted {
            part_number: 1,
            attempts: 6,
            category: ErrorCategory::Network,
            source: StoreError::transport("reset"),
        };
        assert_eq!(exhausted.category(), Some(ErrorCategory::Network));

        assert_eq!(UploadError::Cancelled.category(), None);
    }

    #[test]
    fn test_recovery_preservation_by_variant() {
        let init = UploadError::Init {
            object: "a".into(),
            source: StoreError::http(500, "boom"),
        };
        assert!(!init.preserves_recovery_state());
        assert!(!UploadError::EmptySource(PathBuf::from("/tmp/x")).preserves_recovery_state());

        assert!(UploadError::Cancelled.preserves_recovery_state());
        let complete = UploadError::Complete {
            object: "a".into(),
            source: StoreError::http(500, "boom"),
        };
        assert!(complete.preserves_recovery_state());
    }

    #[test]
    fn test_display_messages() {
        let err = UploadError::ChunkExhausted {
            part_number: 7,
            attempts: 6,
            category: ErrorCategory::ServerTemporary,
            source: StoreError::http(503, "unavailable"),
        };
        let text = err.to_string();
        assert!(text.contains("part 7"));
        assert!(text.contains("6 attempts"));
        assert!(text.contains("server_temporary"));
    }

    #[test]
    fn test_io_conversion() {
        let io = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: UploadError = io.into();
        assert!(matches!(err, UploadError::Io(_)));
    }
}
