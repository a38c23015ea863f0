//! Lazy-load / idle-unload lifecycle around an [`Engine`].
//!
//! The policy mirrors how the broker actually runs: the engine loads when
//! the first job is claimed (cold start), stays resident across
//! back-to-back jobs, and is torn down after a quiet period so the device
//! memory it holds returns to the machine's shared pool. Reloading per job
//! would be far too slow; holding forever starves the other brokers on
//! the same host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::engine::Engine;
use crate::error::EngineError;

/// Process-wide engine handle state. Not persisted; rebuilt on restart.
///
/// State changes only happen on the dispatch loop, under its processing
/// gate. [`EngineLifecycle::is_loaded`] is the one reader outside the
/// gate (the status endpoint), which is why `loaded` is an atomic rather
/// than a field behind the mutex.
pub struct EngineLifecycle {
    engine: Arc<dyn Engine>,
    loaded: AtomicBool,
    /// `None` while a job is processing (cleared on claim); `Some(t)` once
    /// the last job finished at `t`. The idle-unload check keys off this,
    /// so an in-flight job can never look idle.
    last_activity: Mutex<Option<Instant>>,
    idle_timeout: Duration,
}

impl EngineLifecycle {
    pub fn new(engine: Arc<dyn Engine>, idle_timeout: Duration) -> Self {
        Self {
            engine,
            loaded: AtomicBool::new(false),
            last_activity: Mutex::new(None),
            idle_timeout,
        }
    }

    /// The wrapped engine, for invoking `process` after `ensure_loaded`.
    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    /// Whether the engine currently holds its resources.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Load the engine if it is not resident. A failed load leaves the
    /// engine unloaded and propagates; the caller fails the current job
    /// and the next claimed job retries the load.
    pub async fn ensure_loaded(&self) -> Result<(), EngineError> {
        if self.is_loaded() {
            return Ok(());
        }
        tracing::info!(engine = self.engine.name(), "Loading engine");
        self.engine.load().await?;
        self.loaded.store(true, Ordering::Release);
        tracing::info!(engine = self.engine.name(), "Engine loaded");
        Ok(())
    }

    /// Mark a job claim: clears the idle clock so the unload check stays
    /// quiet while the job runs.
    pub async fn begin_job(&self) {
        *self.last_activity.lock().await = None;
    }

    /// Record activity now. Called when a job finishes, success or
    /// failure; the idle period is measured from here.
    pub async fn touch(&self) {
        *self.last_activity.lock().await = Some(Instant::now());
    }

    /// Unload the engine if it is resident and has been idle longer than
    /// the configured timeout. Returns whether an unload happened.
    ///
    /// Only fires when `last_activity` is set, i.e. at least one job has
    /// finished and none is processing -- and at most once per idle
    /// period, because unloading clears the idle clock.
    pub async fn maybe_unload(&self) -> bool {
        if !self.is_loaded() {
            return false;
        }

        let mut last_activity = self.last_activity.lock().await;
        let Some(idle_since) = *last_activity else {
            return false;
        };
        if idle_since.elapsed() <= self.idle_timeout {
            return false;
        }

        tracing::info!(
            engine = self.engine.name(),
            idle_timeout_secs = self.idle_timeout.as_secs(),
            "Idle timeout reached, unloading engine",
        );
        self.engine.unload().await;
        self.loaded.store(false, Ordering::Release);
        *last_activity = None;
        true
    }

    /// Release resources at process shutdown, if still resident.
    pub async fn shutdown(&self) {
        if !self.is_loaded() {
            return;
        }
        tracing::info!(engine = self.engine.name(), "Unloading engine for shutdown");
        self.engine.unload().await;
        self.loaded.store(false, Ordering::Release);
        *self.last_activity.lock().await = None;
    }
}
