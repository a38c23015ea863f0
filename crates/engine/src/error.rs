/// Errors from loading or running the backing engine.
///
/// Every variant's `Display` output ends up verbatim in the failed job's
/// `result` column and in the delivered `{"error": ...}` body, so the
/// messages carry the full diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Loading the engine's resources failed. The engine stays unloaded;
    /// the next claimed job retries the load.
    #[error("Engine load failed: {0}")]
    Load(String),

    /// The engine ran but could not produce an artifact.
    #[error("Engine execution failed: {0}")]
    Execution(String),

    /// The engine run exceeded its configured timeout and was killed.
    #[error("Engine run timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The engine reported success but the artifact is not on disk.
    #[error("Engine reported artifact {0} but it does not exist")]
    MissingArtifact(String),

    /// An I/O error while spawning or talking to the engine.
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}
