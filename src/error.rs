use thiserror::Error;

/// Errors surfaced by the offline outbox.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// Store transaction failed (aborted transaction, quota, corrupt file).
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Transport-level failure talking to the submission endpoint.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// No background worker is running to serve the control channel.
    #[error("Worker unavailable: {0}")]
    ChannelUnavailable(String),

    /// The worker did not reply within the control-channel timeout.
    #[error("Timed out waiting for worker reply")]
    ChannelTimeout,

    #[error("Config error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, OutboxError>;
