//! Error handling for camsentry

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stream open/read failure. Retried locally with bounded backoff by the
    /// camera worker; surfaced only after the retry budget is exhausted.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Recording process failed or produced invalid output. Not retried
    /// automatically; reported to the recording store as a failed job.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Camera missing, disabled, or malformed detection config. Fails fast;
    /// the worker never starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Recording exceeded its duration bound and was terminated.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Conflict (duplicate worker or recording already active)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Short machine-readable code, used in worker status snapshots.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Connection(_) => "CONNECTION_ERROR",
            Error::Encoding(_) => "ENCODING_ERROR",
            Error::Configuration(_) => "CONFIGURATION_ERROR",
            Error::Timeout(_) => "TIMEOUT",
            Error::Conflict(_) => "CONFLICT",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
