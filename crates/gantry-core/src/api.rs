//! Storage backend contract
//!
//! The engine never talks HTTP itself; it drives a [`StorageApi`]
//! implementation supplied by the embedding application. The trait mirrors a
//! conventional multipart object-store surface (init / upload part /
//! complete / abort) plus the probe endpoints the quality estimator needs,
//! inherited from [`ProbeApi`].
//!
//! Implementors write plain `async fn`s; the declared futures are `Send` so
//! uploads can run on a multithreaded runtime.

use std::time::Duration;

use thiserror::Error;

use gantry_quality::ProbeApi;

/// Transport-level failure surfaced by a storage backend.
///
/// Carries enough shape (status code, message) for the retry policy to
/// classify the failure; backends map their native errors into these three
/// forms.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The request exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request never produced an HTTP status (DNS, connect, reset).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("http {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or status text.
        message: String,
    },
}

impl StoreError {
    /// Transport-level failure with a message.
    pub fn transport(message: impl Into<String>) -> Self {
        StoreError::Transport(message.into())
    }

    /// HTTP failure with a status and message.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        StoreError::Http {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code, when one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Parameters for opening a multipart session.
#[derive(Debug, Clone)]
pub struct InitRequest {
    /// Target bucket.
    pub bucket: String,

    /// Full object path (including file name) within the bucket.
    pub object_name: String,

    /// Source file size in bytes.
    pub file_size: u64,

    /// Original file name as the user sees it.
    pub original_file_name: String,

    /// Destination directory context shown to the backend.
    pub current_path: String,

    /// Replace an existing object instead of short-circuiting.
    pub overwrite: bool,

    /// Owning project, when the backend scopes objects.
    pub project_id: Option<String>,
}

/// Backend response to [`StorageApi::init_multipart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// A new multipart session was opened.
    Started {
        /// Backend-issued session id, referenced by every later call.
        upload_id: String,
    },

    /// The object is already present and the backend issued no session.
    /// The engine treats this as a successful no-op, not an error.
    AlreadyExists,
}

/// Parameters for uploading one part.
#[derive(Debug)]
pub struct PartRequest {
    /// Target bucket.
    pub bucket: String,

    /// Full object path within the bucket.
    pub object_name: String,

    /// Multipart session id.
    pub upload_id: String,

    /// Owning project, when the backend scopes objects.
    pub project_id: Option<String>,

    /// 1-based part number.
    pub part_number: u32,

    /// Part payload.
    pub body: Vec<u8>,
}

/// Acknowledgement for one uploaded part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartReceipt {
    /// Part number the backend acknowledged.
    pub part_number: u32,
}

/// Parameters for finalizing a multipart session.
#[derive(Debug, Clone)]
pub struct CompleteRequest {
    /// Target bucket.
    pub bucket: String,

    /// Full object path within the bucket.
    pub object_name: String,

    /// Multipart session id.
    pub upload_id: String,

    /// Owning project, when the backend scopes objects.
    pub project_id: Option<String>,

    /// Original file name as the user sees it.
    pub original_file_name: String,

    /// Source file size in bytes.
    pub file_size: u64,
}

/// Parameters for discarding a multipart session.
///
/// The engine never calls this on its own; it exists for callers that decide
/// to give up on a preserved session.
#[derive(Debug, Clone)]
pub struct AbortRequest {
    /// Target bucket.
    pub bucket: String,

    /// Full object path within the bucket.
    pub object_name: String,

    /// Multipart session id.
    pub upload_id: String,
}

/// Multipart storage backend driven by the upload engine.
///
/// No method retries internally; retry behavior is owned entirely by the
/// engine's retry policy so backends stay dumb pipes.
pub trait StorageApi: ProbeApi + Send + Sync {
    /// Open a multipart session, or report the object as already present.
    fn init_multipart(
        &self,
        request: InitRequest,
    ) -> impl Future<Output = Result<InitOutcome, StoreError>> + Send;

    /// Upload one part. Fails with a transport error on any non-2xx outcome.
    fn upload_part(
        &self,
        request: PartRequest,
    ) -> impl Future<Output = Result<PartReceipt, StoreError>> + Send;

    /// Finalize the session, assembling the object from its parts.
    fn complete_multipart(
        &self,
        request: CompleteRequest,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard the session and any stored parts.
    fn abort_multipart(
        &self,
        request: AbortRequest,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_status() {
        assert_eq!(StoreError::http(503, "unavailable").status(), Some(503));
        assert_eq!(StoreError::transport("reset").status(), None);
        assert_eq!(
            StoreError::Timeout(Duration::from_secs(120)).status(),
            None
        );
    }

    #[test]
    fn test_store_error_display() {
        let error = StoreError::http(429, "slow down");
        assert_eq!(error.to_string(), "http 429: slow down");

        let error = StoreError::transport("connection refused");
        assert_eq!(error.to_string(), "transport failure: connection refused");
    }
}
