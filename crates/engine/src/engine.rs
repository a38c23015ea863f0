use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::EngineError;

/// The opaque compute backend behind the broker.
///
/// Implementations must keep the async runtime responsive while a job
/// runs: CPU/GPU-bound blocking work belongs on a blocking thread
/// (`tokio::task::spawn_blocking`) or in a child process, never directly
/// on the executor. The dispatch loop awaits [`Engine::process`] while
/// holding the processing gate, which is intentional -- engines are not
/// safe for concurrent invocation -- but other tasks (ingress, push
/// channels) must keep running.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Short engine name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Acquire the engine's resources (load weights, warm a runtime).
    /// May take minutes. Called by the lifecycle manager, never directly.
    async fn load(&self) -> Result<(), EngineError>;

    /// Release the engine's resources. Must leave the engine reloadable.
    async fn unload(&self);

    /// Run one job to completion and return the produced artifact path.
    ///
    /// The broker owns the returned file long enough to deliver it. Any
    /// error fails the job with the error's `Display` text as diagnostic.
    async fn process(
        &self,
        job_id: &str,
        payload: &serde_json::Value,
    ) -> Result<PathBuf, EngineError>;
}
