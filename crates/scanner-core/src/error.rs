use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScannerError>;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("Empty query: supply text, filters, a group field or sort keys")]
    EmptyQuery,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Worker '{0}' already running")]
    DuplicateWorker(String),

    #[error("Shutdown already in progress")]
    ShutdownInProgress,

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed request timed out")]
    FeedTimeout,

    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Unexpected feed response: {0}")]
    FeedResponse(String),
}

impl ScannerError {
    /// Errors that a caller fixes by re-entering the command.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ScannerError::EmptyQuery | ScannerError::InvalidQuery(_))
    }

    /// Feed errors worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScannerError::FeedTimeout | ScannerError::FeedUnavailable(_)
        )
    }
}
