//! Job lifecycle and callback enums, stored as TEXT in SQLite.
//!
//! The database CHECK constraints in the migration mirror these variants;
//! both sides must change together.

use serde::{Deserialize, Serialize};

/// Job lifecycle state. Transitions are monotonic:
/// `pending -> processing -> completed | failed`, and a job never
/// re-enters `pending` after leaving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a job's result leaves the broker: a live push over the WebSocket
/// channel keyed by job id, or an outbound HTTP POST to a caller URL.
/// Fixed at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum CallbackMode {
    #[default]
    Push,
    Callback,
}

impl CallbackMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackMode::Push => "push",
            CallbackMode::Callback => "callback",
        }
    }
}

impl std::fmt::Display for CallbackMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a `callback`-mode job wants its artifact materialized in the POST:
/// a JSON file-path reference, the raw bytes as a multipart attachment, or
/// base64-encoded inline bytes. Push delivery always sends the file-path
/// reference and ignores this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ResultFormat {
    /// Accepts `filePath` too; some existing callers spell it that way.
    #[default]
    #[serde(alias = "filePath")]
    FilePath,
    Binary,
    Base64,
}

impl ResultFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultFormat::FilePath => "file_path",
            ResultFormat::Binary => "binary",
            ResultFormat::Base64 => "base64",
        }
    }
}

impl std::fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
