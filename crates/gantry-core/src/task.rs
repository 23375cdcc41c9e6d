//! Single-part upload with retry
//!
//! One part attempt is a timed `upload_part` call. On failure the error is
//! classified, the budget for that category consulted, and the next attempt
//! scheduled after a tier-scaled backoff. Auth and client failures never
//! get a second attempt.

use std::time::{Duration, Instant};

use gantry_quality::{NetworkEstimator, QualityTier};
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::api::{PartRequest, StorageApi, StoreError};
use crate::chunk::ChunkSpec;
use crate::error::UploadError;
use crate::retry::{classify, ErrorCategory, RetryPolicy};

/// Session coordinates shared by every part of one transfer.
#[derive(Debug, Clone)]
pub(crate) struct PartTarget {
    pub bucket: String,
    pub object_name: String,
    pub upload_id: String,
    pub project_id: Option<String>,
}

/// Outcome of one successfully uploaded part.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PartUpload {
    pub part_number: u32,
    pub bytes: u64,
    /// Wall time of the successful attempt only.
    pub elapsed_ms: u64,
}

/// Uploads one part, retrying per `policy` until it lands or the budget
/// runs out.
///
/// The current network tier scales backoff delays; with no measurement
/// cached yet, medium is assumed.
pub(crate) async fn upload_part_with_retry<S: StorageApi>(
    api: &S,
    network: &NetworkEstimator<S>,
    policy: &RetryPolicy,
    part_timeout: Duration,
    target: &PartTarget,
    spec: ChunkSpec,
    body: Vec<u8>,
) -> Result<PartUpload, UploadError> {
    let mut attempt: u32 = 1;

    loop {
        let request = PartRequest {
            bucket: target.bucket.clone(),
            object_name: target.object_name.clone(),
            upload_id: target.upload_id.clone(),
            project_id: target.project_id.clone(),
            part_number: spec.part_number,
            body: body.clone(),
        };

        let attempt_started = Instant::now();
        let error = match timeout(part_timeout, api.upload_part(request)).await {
            Ok(Ok(receipt)) => {
                debug_assert_eq!(receipt.part_number, spec.part_number);
                return Ok(PartUpload {
                    part_number: spec.part_number,
                    bytes: spec.len,
                    elapsed_ms: attempt_started.elapsed().as_millis() as u64,
                });
            }
            Ok(Err(error)) => error,
            Err(_) => StoreError::Timeout(part_timeout),
        };

        let category = classify(&error);
        if !policy.is_retryable(category, attempt) {
            return Err(fatal_part_error(spec.part_number, attempt, category, error));
        }

        let tier = network
            .cached()
            .await
            .map(|quality| quality.tier)
            .unwrap_or(QualityTier::Medium);
        let delay_ms = policy.backoff_delay(category, attempt, tier);

        warn!(
            part_number = spec.part_number,
            attempt,
            category = %category,
            delay_ms,
            error = %error,
            "part attempt failed, backing off"
        );

        sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}

fn fatal_part_error(
    part_number: u32,
    attempts: u32,
    category: ErrorCategory,
    source: StoreError,
) -> UploadError {
    match category {
        ErrorCategory::Auth | ErrorCategory::Client => UploadError::ChunkRejected {
            part_number,
            category,
            source,
        },
        _ => UploadError::ChunkExhausted {
            part_number,
            attempts,
            category,
            source,
        },
    }
}
