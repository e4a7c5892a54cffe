use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the task backend.
///
/// These only escape the synchronization layer through the action calls
/// (`start_sync`, `download`, ...). Stream and poll paths log and swallow
/// them.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
