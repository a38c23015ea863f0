/// Error type for callback delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The consumer returned a non-2xx status code.
    #[error("Callback returned HTTP {0}")]
    HttpStatus(u16),

    /// Reading or moving the artifact on disk failed.
    #[error("Artifact I/O failed: {0}")]
    Artifact(#[from] std::io::Error),
}
