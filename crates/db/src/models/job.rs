//! Job row and DTO types.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use airlock_core::types::{JobId, Timestamp};

use super::status::{CallbackMode, JobStatus, ResultFormat};

/// A row from the `jobs` table.
///
/// `result` is raw TEXT: on success it holds the serialized JSON reference
/// `{"filePath": "..."}`, on failure the diagnostic text. Written exactly
/// once, by the dispatch loop, when the status becomes terminal.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub callback_mode: CallbackMode,
    pub callback_target: Option<String>,
    pub result_format: ResultFormat,
    pub destination: Option<String>,
    pub result: Option<String>,
    pub created_at: Timestamp,
}

impl Job {
    /// Extract the artifact path from a completed job's stored result.
    ///
    /// Returns `None` for jobs without a result or whose result is not the
    /// `{"filePath": ...}` success reference (i.e. failures).
    pub fn result_file_path(&self) -> Option<String> {
        let raw = self.result.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        value
            .get("filePath")
            .and_then(|p| p.as_str())
            .map(str::to_string)
    }
}

/// Fields for inserting a new job. The id and `created_at` are assigned at
/// insert; status always starts `pending`. Everything except the payload
/// is optional: the default is push mode with a path-reference result.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub payload: serde_json::Value,
    #[serde(default)]
    pub callback_mode: CallbackMode,
    /// Submitted as `callback_url`; stored as the delivery target.
    #[serde(rename = "callback_url", default)]
    pub callback_target: Option<String>,
    #[serde(default)]
    pub result_format: ResultFormat,
    #[serde(default)]
    pub destination: Option<String>,
}

/// Pending/processing totals for `GET /status`.
#[derive(Debug, Clone, Copy, FromRow, Serialize)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
}

/// Rows removed by the startup retention pass.
#[derive(Debug, Clone, Copy)]
pub struct PruneOutcome {
    /// Completed jobs older than the short window.
    pub completed_removed: u64,
    /// Jobs of any status older than the long window.
    pub expired_removed: u64,
}

impl PruneOutcome {
    pub fn total(self) -> u64 {
        self.completed_removed + self.expired_removed
    }
}
