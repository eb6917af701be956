//! Error types for the query service

/// Query service errors
#[derive(Debug, thiserror::Error)]
pub enum QueryServiceError {
    #[error("Admission interrupted for {operation} unit")]
    AdmissionInterrupted { operation: &'static str },

    #[error("Interrupted while waiting for query result")]
    ResultInterrupted,

    #[error("Index '{name}' is not registered")]
    UnresolvedIndex { name: String },

    #[error("Malformed range descriptor: {0}")]
    MalformedRangeDescriptor(String),

    #[error("Failed to spawn query worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl QueryServiceError {
    /// Whether the error came from a cancelled enqueue or wait
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            QueryServiceError::AdmissionInterrupted { .. } | QueryServiceError::ResultInterrupted
        )
    }
}

pub type Result<T> = std::result::Result<T, QueryServiceError>;
