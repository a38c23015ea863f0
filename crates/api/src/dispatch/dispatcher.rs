//! Background job dispatcher.
//!
//! Polls for pending jobs every `poll_interval` and runs them one at a
//! time against the backing engine. Claiming, engine load, the run
//! itself, result recording, and result delivery all happen under a
//! single gate, so at most one job is ever `processing` and the engine
//! is never touched concurrently. When a tick finds no work, the same
//! gate covers the idle-unload check instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use airlock_db::models::{CallbackMode, Job, ResultFormat};
use airlock_db::repositories::JobRepo;
use airlock_db::DbPool;
use airlock_delivery::{move_artifact, CallbackDelivery};
use airlock_engine::{EngineError, EngineLifecycle};
use axum::extract::ws::Message;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::ws::WsManager;

/// Default polling interval for the dispatcher loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A finished job on its way out to the caller.
enum Outcome {
    /// The engine produced an artifact; `artifact` is the final location
    /// (the caller's destination when one was requested).
    Completed { artifact: PathBuf },
    /// The run failed; `detail` is the full diagnostic recorded in the
    /// job row.
    Failed { detail: String },
}

/// Background job dispatcher.
///
/// A single long-lived Tokio task that drains the queue in FIFO order,
/// one job at a time.
pub struct JobDispatcher {
    pool: DbPool,
    lifecycle: Arc<EngineLifecycle>,
    ws_manager: Arc<WsManager>,
    delivery: Arc<CallbackDelivery>,
    /// Serializes claim -> load -> run -> record -> deliver. The loop is
    /// the only caller in production, so this is contention-free; it
    /// exists so the single-processing-job invariant survives even if a
    /// second loop is ever spawned.
    gate: Mutex<()>,
    poll_interval: Duration,
}

impl JobDispatcher {
    /// Create a new dispatcher with the default 1-second poll interval.
    pub fn new(
        pool: DbPool,
        lifecycle: Arc<EngineLifecycle>,
        ws_manager: Arc<WsManager>,
        delivery: Arc<CallbackDelivery>,
    ) -> Self {
        Self {
            pool,
            lifecycle,
            ws_manager,
            delivery,
            gate: Mutex::new(()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the polling interval (configured via `POLL_INTERVAL_MS`).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the dispatcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Job dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Job dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        // Store unreachable: nothing to do but try again
                        // on the next tick.
                        tracing::error!(error = %e, "Dispatch cycle failed");
                    }
                }
            }
        }
    }

    /// One dispatch cycle: claim the oldest pending job and run it to a
    /// terminal state, or check the idle-unload timer when the queue is
    /// empty. Public so tests can step the dispatcher deterministically.
    ///
    /// Only store errors propagate; every job-level failure is absorbed
    /// into the job's own terminal state.
    pub async fn run_cycle(&self) -> Result<(), sqlx::Error> {
        let _gate = self.gate.lock().await;

        match JobRepo::claim_next(&self.pool).await? {
            Some(job) => self.process_job(job).await,
            None => {
                self.lifecycle.maybe_unload().await;
                Ok(())
            }
        }
    }

    /// Run one claimed job to its terminal state and deliver the result.
    async fn process_job(&self, job: Job) -> Result<(), sqlx::Error> {
        tracing::info!(job_id = %job.id, "Job claimed");
        self.lifecycle.begin_job().await;

        let outcome = match self.run_engine(&job).await {
            Ok(artifact) => match self.finalize_artifact(&job, artifact).await {
                Ok(final_path) => Outcome::Completed {
                    artifact: final_path,
                },
                Err(detail) => Outcome::Failed { detail },
            },
            Err(e) => Outcome::Failed {
                detail: e.to_string(),
            },
        };

        // Terminal write happens before delivery: a poll observer must
        // never learn a result the store does not hold yet.
        match &outcome {
            Outcome::Completed { artifact } => {
                JobRepo::complete(&self.pool, &job.id, &success_result(artifact)).await?;
                tracing::info!(
                    job_id = %job.id,
                    artifact = %artifact.display(),
                    "Job completed",
                );
            }
            Outcome::Failed { detail } => {
                JobRepo::fail(&self.pool, &job.id, detail).await?;
                tracing::warn!(job_id = %job.id, error = %detail, "Job failed");
            }
        }

        self.deliver(&job, &outcome).await;
        self.lifecycle.touch().await;
        Ok(())
    }

    /// Load the engine if needed and run the job through it. A load
    /// failure fails this job; the engine stays unloaded and the next
    /// claimed job retries the load.
    async fn run_engine(&self, job: &Job) -> Result<PathBuf, EngineError> {
        self.lifecycle.ensure_loaded().await?;
        self.lifecycle.engine().process(&job.id, &job.payload).await
    }

    /// Move the artifact to the caller's destination when one was
    /// requested, and return the path the recorded result refers to.
    ///
    /// A failed move fails the whole job: completing with a path the
    /// artifact never reached would hand the caller a dead reference.
    async fn finalize_artifact(&self, job: &Job, artifact: PathBuf) -> Result<PathBuf, String> {
        match &job.destination {
            Some(dest) => {
                let dest_path = PathBuf::from(dest);
                move_artifact(&artifact, &dest_path)
                    .await
                    .map_err(|e| format!("Artifact move to {dest} failed: {e}"))?;
                Ok(dest_path)
            }
            None => Ok(artifact),
        }
    }

    /// Hand the result to the caller over the channel chosen at
    /// submission. Exactly one attempt, no retries; a missed delivery is
    /// logged and the job row remains the recovery path.
    async fn deliver(&self, job: &Job, outcome: &Outcome) {
        match job.callback_mode {
            CallbackMode::Push => self.deliver_push(job, outcome).await,
            CallbackMode::Callback => self.deliver_callback(job, outcome).await,
        }
    }

    async fn deliver_push(&self, job: &Job, outcome: &Outcome) {
        let frame = match outcome {
            Outcome::Completed { artifact } => success_result(artifact),
            Outcome::Failed { detail } => serde_json::json!({ "error": detail }),
        };

        let delivered = self
            .ws_manager
            .send_to_job(&job.id, Message::Text(frame.to_string().into()))
            .await;
        if delivered {
            tracing::debug!(job_id = %job.id, "Result pushed to subscriber");
        } else {
            tracing::debug!(job_id = %job.id, "No subscriber connected, result kept in store");
        }
    }

    async fn deliver_callback(&self, job: &Job, outcome: &Outcome) {
        let Some(url) = job.callback_target.as_deref() else {
            // Submission validation enforces a URL for callback mode, so
            // this only fires on rows edited behind the broker's back.
            tracing::error!(job_id = %job.id, "Callback job has no callback URL");
            return;
        };

        let sent = match outcome {
            Outcome::Failed { detail } => self.delivery.send_failure(url, detail).await,
            Outcome::Completed { artifact } => match job.result_format {
                ResultFormat::FilePath => self.delivery.send_file_path(url, artifact).await,
                ResultFormat::Binary => self.delivery.send_binary(url, artifact).await,
                ResultFormat::Base64 => self.delivery.send_base64(url, artifact).await,
            },
        };

        match sent {
            Ok(()) => {
                tracing::info!(job_id = %job.id, url, "Callback delivered");
                if let Outcome::Completed { artifact } = outcome {
                    self.cleanup_sent_artifact(job, artifact).await;
                }
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %job.id,
                    url,
                    error = %e,
                    "Callback delivery failed, result kept in store",
                );
            }
        }
    }

    /// Once the consumer has confirmed receipt of the bytes, the broker's
    /// parked copy is redundant and is removed. Path-reference results
    /// and artifacts at a caller destination are left alone, and so is
    /// everything after a failed delivery -- never delete the only copy.
    async fn cleanup_sent_artifact(&self, job: &Job, artifact: &Path) {
        let bytes_were_sent = matches!(
            job.result_format,
            ResultFormat::Binary | ResultFormat::Base64
        );
        if !bytes_were_sent || job.destination.is_some() {
            return;
        }

        match tokio::fs::remove_file(artifact).await {
            Ok(()) => {
                tracing::debug!(
                    job_id = %job.id,
                    artifact = %artifact.display(),
                    "Removed delivered temp artifact",
                );
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to remove delivered temp artifact");
            }
        }
    }
}

/// Success reference stored in the job row and pushed to subscribers.
fn success_result(artifact: &Path) -> serde_json::Value {
    serde_json::json!({ "filePath": artifact.display().to_string() })
}
