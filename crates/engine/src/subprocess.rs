//! Subprocess-backed [`Engine`] implementation.
//!
//! Each job run spawns the configured command with the job payload
//! written to a per-job JSON file, passed as the final argument. The
//! child prints a `[RESULT-PATH] <path>` line on stdout when it has
//! produced its artifact; the broker verifies the file and parks it in
//! the broker-owned output directory under the job id.
//!
//! `load`/`unload` are no-ops for this variant: every run carries its own
//! process, so there is nothing resident to manage between jobs.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::engine::Engine;
use crate::error::EngineError;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Output exceeding this limit is truncated to prevent memory exhaustion
/// from extremely verbose workers.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Stdout marker the worker prints in front of its artifact path.
pub const DEFAULT_RESULT_MARKER: &str = "[RESULT-PATH]";

/// Longest diagnostic slice kept from a failed run's output. The tail is
/// kept rather than the head because tracebacks end with the actual error.
const DIAGNOSTIC_TAIL_CHARS: usize = 2000;

/// Static configuration for a [`SubprocessEngine`].
#[derive(Debug, Clone)]
pub struct SubprocessConfig {
    /// Engine name reported in logs and status.
    pub name: String,
    /// Program and arguments; the per-job payload file path is appended
    /// as one extra trailing argument.
    pub command: Vec<String>,
    /// Working directory for the child, if it needs one.
    pub workdir: Option<PathBuf>,
    /// Extra environment variables for the child (inherits the rest).
    pub env: Vec<(String, String)>,
    /// Directory for per-job payload files.
    pub job_dir: PathBuf,
    /// Directory where finished artifacts are parked, keyed by job id.
    pub output_dir: PathBuf,
    /// Wall-clock budget for one run; the child is killed on expiry.
    pub timeout: Duration,
    /// Marker scanned for on stdout, normally [`DEFAULT_RESULT_MARKER`].
    pub result_marker: String,
}

pub struct SubprocessEngine {
    config: SubprocessConfig,
}

impl SubprocessEngine {
    pub fn new(config: SubprocessConfig) -> Self {
        Self { config }
    }

    /// Spawn the configured command for one job and wait for it, with
    /// piped output capture and the configured timeout.
    async fn run(&self, job_file: &Path) -> Result<(String, String), EngineError> {
        let program = self
            .config
            .command
            .first()
            .ok_or_else(|| EngineError::Execution("engine command is empty".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(&self.config.command[1..])
            .arg(job_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.config.workdir {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = cmd.spawn()?;

        // Take stdout/stderr handles and read them in spawned tasks so we
        // can still call `child.wait()` (which borrows `&mut child`).
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        // If the timeout fires, `child` is dropped here and
        // `kill_on_drop(true)` kills the process.
        let wait_result = tokio::time::timeout(self.config.timeout, child.wait()).await;

        match wait_result {
            Ok(Ok(status)) => {
                let stdout_bytes = stdout_task.await.unwrap_or_default();
                let stderr_bytes = stderr_task.await.unwrap_or_default();
                let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
                let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

                if !status.success() {
                    let code = status.code().unwrap_or(-1);
                    return Err(EngineError::Execution(format!(
                        "exit code {code}: {}",
                        diagnostic_tail(&stdout, &stderr),
                    )));
                }

                tracing::debug!(
                    engine = self.config.name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Engine run finished",
                );
                Ok((stdout, stderr))
            }
            Ok(Err(e)) => Err(EngineError::Io(e)),
            Err(_elapsed) => Err(EngineError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl Engine for SubprocessEngine {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn load(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn unload(&self) {}

    async fn process(
        &self,
        job_id: &str,
        payload: &serde_json::Value,
    ) -> Result<PathBuf, EngineError> {
        tokio::fs::create_dir_all(&self.config.job_dir).await?;
        let job_file = self.config.job_dir.join(format!("{job_id}.json"));
        let payload_bytes = serde_json::to_vec(payload)
            .map_err(|e| EngineError::Execution(format!("payload serialization failed: {e}")))?;
        tokio::fs::write(&job_file, payload_bytes).await?;

        let run_result = self.run(&job_file).await;

        // The payload file is per-run scratch; failures keep their
        // diagnostics in the job row, not on disk.
        let _ = tokio::fs::remove_file(&job_file).await;

        let (stdout, _stderr) = run_result?;
        let reported = parse_result_path(&stdout, &self.config.result_marker).ok_or_else(|| {
            EngineError::Execution(
                "engine exited successfully but printed no result path".to_string(),
            )
        })?;

        if tokio::fs::metadata(&reported).await.is_err() {
            return Err(EngineError::MissingArtifact(
                reported.display().to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let parked = self
            .config
            .output_dir
            .join(output_file_name(job_id, &reported));
        move_file(&reported, &parked).await?;
        Ok(parked)
    }
}

/// Extract the artifact path from the worker's stdout. The last marker
/// line wins; workers tend to be chatty and may echo progress lines that
/// resemble earlier attempts.
fn parse_result_path(stdout: &str, marker: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .find_map(|line| line.trim().strip_prefix(marker))
        .map(|rest| PathBuf::from(rest.trim()))
        .filter(|p| !p.as_os_str().is_empty())
}

/// Parked artifact name: the job id plus the reported file's extension.
fn output_file_name(job_id: &str, reported: &Path) -> String {
    match reported.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{job_id}.{ext}"),
        None => job_id.to_string(),
    }
}

/// Keep the most useful slice of a failed run's output: stderr if there
/// is any, stdout otherwise, truncated to the trailing portion.
fn diagnostic_tail(stdout: &str, stderr: &str) -> String {
    let source = if stderr.trim().is_empty() {
        stdout
    } else {
        stderr
    };
    let trimmed = source.trim();
    if trimmed.is_empty() {
        return "(no output)".to_string();
    }
    let tail_start = trimmed
        .char_indices()
        .rev()
        .nth(DIAGNOSTIC_TAIL_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[tail_start..].to_string()
}

/// Move a file, falling back to copy + remove when rename crosses a
/// filesystem boundary.
async fn move_file(from: &Path, to: &Path) -> Result<(), EngineError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await?;
    tokio::fs::remove_file(from).await?;
    Ok(())
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
