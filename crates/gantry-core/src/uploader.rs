//! Upload orchestration
//!
//! [`Uploader`] owns the full transfer lifecycle: probe conditions, pick a
//! chunk size and worker count, open (or resume) a multipart session, fan
//! the parts out over a worker pool, and finalize. Workers pull parts from
//! a shared cursor, so a slow part never stalls its siblings.
//!
//! Failure handling is deliberately conservative: the first fatal error
//! stops the pool, progress is snapshotted for resume, and the server-side
//! session is left alive. Nothing is aborted automatically.

use std::collections::BTreeSet;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use gantry_quality::{NetworkEstimator, SystemEstimator};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{CompleteRequest, InitOutcome, InitRequest, StorageApi};
use crate::chunk::{plan_parts, ChunkSpec};
use crate::config::UploaderConfig;
use crate::error::{Result, UploadError};
use crate::progress::{percent, ProgressDetail, ProgressUpdate, SpeedTracker};
use crate::recovery::{source_fingerprint, MemoryRecoveryStore, RecoveryState, RecoveryStore};
use crate::retry::RetryPolicy;
use crate::sizing::{chunk_size_for, concurrency_for};
use crate::task::{upload_part_with_retry, PartTarget};

/// Callback invoked after every confirmed part.
pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Callback invoked as soon as the multipart session id is known, before
/// any part is sent. Lets callers persist the id for out-of-band cleanup.
pub type UploadIdFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Cooperative cancellation flag for one transfer.
///
/// Cancelling stops workers at the next part boundary; the part in flight
/// is allowed to finish so its receipt is not wasted.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Fresh, untripped handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-transfer parameters for [`Uploader::upload_file`].
pub struct UploadOptions {
    /// Target bucket.
    pub bucket: String,

    /// Full object path (including file name) within the bucket.
    pub object_name: String,

    /// Display name sent to the backend; defaults to the source file name.
    pub original_file_name: Option<String>,

    /// Destination directory context shown to the backend.
    pub current_path: String,

    /// Replace an existing object instead of skipping.
    pub overwrite: bool,

    /// Owning project, when the backend scopes objects.
    pub project_id: Option<String>,

    /// Invoked after every confirmed part.
    pub on_progress: Option<ProgressFn>,

    /// Invoked once with the session id, before parts start flowing.
    pub on_upload_id: Option<UploadIdFn>,

    /// External cancellation handle; one is created internally if absent.
    pub cancel: Option<CancelHandle>,
}

impl UploadOptions {
    /// Options for `bucket`/`object_name` with everything else defaulted.
    #[must_use]
    pub fn new(bucket: impl Into<String>, object_name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object_name: object_name.into(),
            original_file_name: None,
            current_path: "/".to_string(),
            overwrite: false,
            project_id: None,
            on_progress: None,
            on_upload_id: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("bucket", &self.bucket)
            .field("object_name", &self.object_name)
            .field("original_file_name", &self.original_file_name)
            .field("current_path", &self.current_path)
            .field("overwrite", &self.overwrite)
            .field("project_id", &self.project_id)
            .field("has_progress_callback", &self.on_progress.is_some())
            .field("has_upload_id_callback", &self.on_upload_id.is_some())
            .field("has_cancel_handle", &self.cancel.is_some())
            .finish_non_exhaustive()
    }
}

/// Result of a finished [`Uploader::upload_file`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Session id of the transfer, absent when the object already existed.
    pub upload_id: Option<String>,

    /// The backend reported the object as already present; no bytes moved.
    pub already_existed: bool,
}

impl UploadOutcome {
    /// Whether bytes were actually transferred.
    #[must_use]
    pub fn completed(&self) -> bool {
        !self.already_existed
    }

    /// Whether the transfer was skipped because the object existed.
    #[must_use]
    pub fn skipped(&self) -> bool {
        self.already_existed
    }
}

/// Adaptive multipart upload engine over a [`StorageApi`] backend.
pub struct Uploader<S: StorageApi + 'static> {
    api: Arc<S>,
    network: Arc<NetworkEstimator<S>>,
    system: Arc<SystemEstimator>,
    recovery: Arc<dyn RecoveryStore>,
    config: UploaderConfig,
}

impl<S: StorageApi + 'static> Uploader<S> {
    /// Engine over `api`, with an in-memory recovery store.
    #[must_use]
    pub fn new(api: Arc<S>, config: UploaderConfig) -> Self {
        let network = Arc::new(NetworkEstimator::new(api.clone(), config.network.clone()));
        let system = Arc::new(SystemEstimator::new(config.system.clone()));
        Self {
            api,
            network,
            system,
            recovery: Arc::new(MemoryRecoveryStore::new()),
            config,
        }
    }

    /// Replaces the recovery store, e.g. with a persistent implementation.
    #[must_use]
    pub fn with_recovery_store(mut self, store: Arc<dyn RecoveryStore>) -> Self {
        self.recovery = store;
        self
    }

    /// Network estimator backing this engine's sizing decisions.
    #[must_use]
    pub fn network(&self) -> &NetworkEstimator<S> {
        &self.network
    }

    /// System estimator backing this engine's concurrency decisions.
    #[must_use]
    pub fn system(&self) -> &SystemEstimator {
        &self.system
    }

    /// Saved progress for a source, if an interrupted transfer left any.
    #[must_use]
    pub fn recovery_state(
        &self,
        object_name: &str,
        file_size: u64,
        modified_secs: u64,
    ) -> Option<RecoveryState> {
        self.recovery
            .load(&source_fingerprint(object_name, file_size, modified_secs))
    }

    /// Uploads the file at `source` as one multipart transfer.
    ///
    /// Probes current conditions, plans parts, and runs them over a worker
    /// pool. Returns once the backend has assembled the object, the backend
    /// reported it as already present, or a fatal error stopped the pool.
    /// On failure the session is preserved for resume; nothing is aborted.
    pub async fn upload_file(&self, source: &Path, options: UploadOptions) -> Result<UploadOutcome> {
        let metadata = tokio::fs::metadata(source).await?;
        let file_size = metadata.len();
        if file_size == 0 {
            return Err(UploadError::EmptySource(source.to_path_buf()));
        }
        let modified_secs = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|age| age.as_secs())
            .unwrap_or(0);

        let quality = self.network.current().await;
        let profile = self.system.current().await;

        let fingerprint = source_fingerprint(&options.object_name, file_size, modified_secs);
        let original_file_name = options
            .original_file_name
            .clone()
            .unwrap_or_else(|| source_file_name(source, &options.object_name));

        let resume = if self.config.enable_recovery {
            self.recovery
                .load(&fingerprint)
                .filter(|state| state.chunk_size > 0)
        } else {
            None
        };

        let (upload_id, chunk_size, already_completed) = match resume {
            Some(state) => {
                info!(
                    object = %options.object_name,
                    upload_id = %state.upload_id,
                    completed_parts = state.completed_parts.len(),
                    age_secs = state.age_secs(),
                    "resuming interrupted upload"
                );
                (state.upload_id, state.chunk_size, state.completed_parts)
            }
            None => {
                let chunk_size = chunk_size_for(file_size, quality.tier, quality.bandwidth_mbps);
                let request = InitRequest {
                    bucket: options.bucket.clone(),
                    object_name: options.object_name.clone(),
                    file_size,
                    original_file_name: original_file_name.clone(),
                    current_path: options.current_path.clone(),
                    overwrite: options.overwrite,
                    project_id: options.project_id.clone(),
                };
                match self.api.init_multipart(request).await {
                    Ok(InitOutcome::Started { upload_id }) => {
                        (upload_id, chunk_size, BTreeSet::new())
                    }
                    Ok(InitOutcome::AlreadyExists) => {
                        info!(object = %options.object_name, "object already present, skipping");
                        return Ok(UploadOutcome {
                            upload_id: None,
                            already_existed: true,
                        });
                    }
                    Err(error) => {
                        return Err(UploadError::Init {
                            object: options.object_name.clone(),
                            source: error,
                        });
                    }
                }
            }
        };

        if let Some(on_upload_id) = &options.on_upload_id {
            on_upload_id(&upload_id);
        }

        let tasks = plan_parts(file_size, chunk_size, self.config.min_chunk_floor);
        let total_chunks = tasks.len();
        let completed_bytes: u64 = tasks
            .iter()
            .filter(|part| already_completed.contains(&part.part_number))
            .map(|part| part.len)
            .sum();
        let pending: Vec<ChunkSpec> = tasks
            .iter()
            .filter(|part| !already_completed.contains(&part.part_number))
            .copied()
            .collect();

        let concurrency = concurrency_for(file_size, quality.tier, profile.tier);
        let cancel = options.cancel.clone().unwrap_or_default();

        let shared = Arc::new(TransferShared {
            state: Mutex::new(TransferState {
                completed: already_completed,
                uploaded_bytes: completed_bytes,
                speed: SpeedTracker::new(self.config.speed_window, completed_bytes),
            }),
            cursor: AtomicUsize::new(0),
            tasks: pending,
            total_bytes: file_size,
            total_chunks,
        });

        let target = PartTarget {
            bucket: options.bucket.clone(),
            object_name: options.object_name.clone(),
            upload_id: upload_id.clone(),
            project_id: options.project_id.clone(),
        };
        let checkpoint = self.config.enable_recovery.then(|| RecoveryCheckpoint {
            store: self.recovery.clone(),
            fingerprint: fingerprint.clone(),
            upload_id: upload_id.clone(),
            chunk_size,
        });

        info!(
            object = %options.object_name,
            file_size,
            chunk_size,
            concurrency,
            total_chunks,
            pending_chunks = shared.tasks.len(),
            network_tier = %quality.tier,
            system_tier = %profile.tier,
            "starting multipart upload"
        );

        let workers = concurrency.min(shared.tasks.len()).max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let context = WorkerContext {
                worker_id,
                api: self.api.clone(),
                network: self.network.clone(),
                source: source.to_path_buf(),
                target: target.clone(),
                shared: shared.clone(),
                cancel: cancel.clone(),
                policy: self.config.retry.clone(),
                part_timeout: self.config.part_timeout,
                on_progress: options.on_progress.clone(),
                checkpoint: checkpoint.clone(),
            };
            handles.push(tokio::spawn(run_worker(context)));
        }

        let mut failure: Option<UploadError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    if failure.is_none() {
                        failure = Some(error);
                    }
                }
                Err(join_error) => {
                    cancel.cancel();
                    if failure.is_none() {
                        failure = Some(UploadError::Worker(join_error.to_string()));
                    }
                }
            }
        }

        if failure.is_none() && cancel.is_cancelled() {
            failure = Some(UploadError::Cancelled);
        }

        if let Some(error) = failure {
            self.preserve_progress(&fingerprint, &upload_id, chunk_size, &shared)
                .await;
            warn!(object = %options.object_name, error = %error, "upload stopped");
            return Err(error);
        }

        let complete = CompleteRequest {
            bucket: options.bucket.clone(),
            object_name: options.object_name.clone(),
            upload_id: upload_id.clone(),
            project_id: options.project_id.clone(),
            original_file_name,
            file_size,
        };
        if let Err(error) = self.api.complete_multipart(complete).await {
            self.preserve_progress(&fingerprint, &upload_id, chunk_size, &shared)
                .await;
            warn!(object = %options.object_name, error = %error, "completion failed");
            return Err(UploadError::Complete {
                object: options.object_name.clone(),
                source: error,
            });
        }

        self.recovery.clear(&fingerprint);
        info!(
            object = %options.object_name,
            upload_id = %upload_id,
            total_chunks,
            "upload complete"
        );

        Ok(UploadOutcome {
            upload_id: Some(upload_id),
            already_existed: false,
        })
    }

    /// Snapshots confirmed parts so a later run can resume this session.
    async fn preserve_progress(
        &self,
        fingerprint: &str,
        upload_id: &str,
        chunk_size: u64,
        shared: &TransferShared,
    ) {
        let state = shared.state.lock().await;
        if state.completed.is_empty() {
            return;
        }
        self.recovery.save(
            fingerprint,
            RecoveryState::new(upload_id.to_string(), state.completed.clone(), chunk_size),
        );
        debug!(
            completed_parts = state.completed.len(),
            "preserved progress for resume"
        );
    }
}

/// Mutable transfer bookkeeping, guarded by one lock.
struct TransferState {
    completed: BTreeSet<u32>,
    uploaded_bytes: u64,
    speed: SpeedTracker,
}

/// State shared by every worker of one transfer.
struct TransferShared {
    state: Mutex<TransferState>,
    cursor: AtomicUsize,
    /// Pending parts only; index claimed through `cursor`.
    tasks: Vec<ChunkSpec>,
    total_bytes: u64,
    total_chunks: usize,
}

/// Recovery store coordinates for per-part checkpointing.
#[derive(Clone)]
struct RecoveryCheckpoint {
    store: Arc<dyn RecoveryStore>,
    fingerprint: String,
    upload_id: String,
    chunk_size: u64,
}

struct WorkerContext<S: StorageApi + 'static> {
    worker_id: usize,
    api: Arc<S>,
    network: Arc<NetworkEstimator<S>>,
    source: PathBuf,
    target: PartTarget,
    shared: Arc<TransferShared>,
    cancel: CancelHandle,
    policy: RetryPolicy,
    part_timeout: Duration,
    on_progress: Option<ProgressFn>,
    checkpoint: Option<RecoveryCheckpoint>,
}

/// Worker entry point: on any fatal error, trip the cancel flag so
/// siblings stop claiming parts.
async fn run_worker<S: StorageApi>(context: WorkerContext<S>) -> Result<()> {
    let result = worker_loop(&context).await;
    if result.is_err() {
        context.cancel.cancel();
    }
    result
}

async fn worker_loop<S: StorageApi>(context: &WorkerContext<S>) -> Result<()> {
    let mut file = File::open(&context.source).await?;

    loop {
        if context.cancel.is_cancelled() {
            return Ok(());
        }
        let index = context.shared.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(spec) = context.shared.tasks.get(index).copied() else {
            return Ok(());
        };

        let mut body = vec![0u8; spec.len as usize];
        file.seek(SeekFrom::Start(spec.offset)).await?;
        file.read_exact(&mut body).await?;

        let upload = upload_part_with_retry(
            context.api.as_ref(),
            &context.network,
            &context.policy,
            context.part_timeout,
            &context.target,
            spec,
            body,
        )
        .await?;

        // Checkpoint and callback stay under the lock: a sibling finishing
        // a later part must not publish a higher byte count first, or the
        // sink would see uploaded_bytes go backwards.
        {
            let mut state = context.shared.state.lock().await;
            state.completed.insert(spec.part_number);
            state.uploaded_bytes += upload.bytes;

            let uploaded_bytes = state.uploaded_bytes;
            let uploaded_chunks = state.completed.len();
            let reading = state.speed.record(uploaded_bytes, context.shared.total_bytes);

            let update = ProgressUpdate {
                percent: percent(uploaded_bytes, context.shared.total_bytes),
                uploaded_chunks,
                total_chunks: context.shared.total_chunks,
                detail: ProgressDetail {
                    uploaded_bytes,
                    total_bytes: context.shared.total_bytes,
                    speed_bps: reading.speed_bps,
                    eta_seconds: reading.eta_seconds,
                    chunk_upload_ms: upload.elapsed_ms,
                },
            };

            if let Some(checkpoint) = &context.checkpoint {
                checkpoint.store.save(
                    &checkpoint.fingerprint,
                    RecoveryState::new(
                        checkpoint.upload_id.clone(),
                        state.completed.clone(),
                        checkpoint.chunk_size,
                    ),
                );
            }

            debug!(
                worker = context.worker_id,
                part_number = spec.part_number,
                percent = update.percent,
                chunk_ms = update.detail.chunk_upload_ms,
                "part confirmed"
            );

            if let Some(callback) = &context.on_progress {
                callback(update);
            }
        }
    }
}

/// File name shown to the backend: the source's, or the tail of the
/// object path when the source has no usable name.
fn source_file_name(source: &Path, object_name: &str) -> String {
    source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| {
            object_name
                .rsplit('/')
                .next()
                .unwrap_or(object_name)
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_handle_is_shared() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());

        handle.cancel();
        assert!(clone.is_cancelled());

        // Idempotent.
        clone.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_outcome_helpers() {
        let done = UploadOutcome {
            upload_id: Some("u1".into()),
            already_existed: false,
        };
        assert!(done.completed());
        assert!(!done.skipped());

        let skipped = UploadOutcome {
            upload_id: None,
            already_existed: true,
        };
        assert!(skipped.skipped());
        assert!(!skipped.completed());
    }

    #[test]
    fn test_source_file_name_fallback() {
        assert_eq!(
            source_file_name(Path::new("/tmp/data/report.pdf"), "docs/report.pdf"),
            "report.pdf"
        );
        assert_eq!(
            source_file_name(Path::new("/"), "docs/nested/archive.tar"),
            "archive.tar"
        );
    }

    #[test]
    fn test_options_default_shape() {
        let options = UploadOptions::new("media", "videos/intro.mp4");
        assert_eq!(options.bucket, "media");
        assert_eq!(options.current_path, "/");
        assert!(!options.overwrite);
        assert!(options.cancel.is_none());

        let text = format!("{options:?}");
        assert!(text.contains("has_progress_callback: false"));
    }
}
