use thiserror::Error;

/// Result type for notification delivery
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Failures while delivering a result payload
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("callback request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("callback {url} answered {status}")]
    Rejected { url: String, status: u16 },

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Several sinks failed; each message is kept
    #[error("{} sinks failed: {}", .0.len(), .0.join("; "))]
    Multiple(Vec<String>),
}
