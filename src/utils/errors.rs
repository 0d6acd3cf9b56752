use thiserror::Error;

use crate::models::DownloadStatus;

/// Typed error for a single download attempt
///
/// The variants separate failures that a later attempt can fix from the ones
/// it cannot, so the executor can decide between requeueing and giving up.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Job record vanished from the store
    #[error("Download job not found: {0}")]
    JobNotFound(String),

    /// Only pending jobs are admitted to an attempt
    #[error("Download {id} is {status}, not pending")]
    NotPending { id: String, status: DownloadStatus },

    /// The job points at a media record that does not exist
    #[error("Media item not found: {0}")]
    MediaNotFound(String),

    /// No server URL or auth token stored
    #[error("Download failed: not authenticated")]
    NotAuthenticated,

    #[error("Insufficient storage: {required} bytes required, {available} bytes available")]
    InsufficientStorage { required: u64, available: u64 },

    /// Non-2xx response
    #[error("HTTP error: {status}")]
    Http { status: u16 },

    #[error("Empty response body (HTTP {status})")]
    EmptyBody { status: u16 },

    /// Body ended before or after the declared length
    #[error("Incomplete download: received {received} of {expected} bytes")]
    IncompleteBody { received: u64, expected: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection or stream failure while talking to the server
    #[error("Transfer error: {0}")]
    Transfer(String),

    /// Job or media store refused a write
    #[error("Store error: {0}")]
    Store(String),

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Check if another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::Io(_)
                | DownloadError::Transfer(_)
                | DownloadError::IncompleteBody { .. }
                | DownloadError::Store(_)
        )
    }

    pub fn store(error: anyhow::Error) -> Self {
        DownloadError::Store(format!("{:#}", error))
    }

    pub fn transfer(error: anyhow::Error) -> Self {
        DownloadError::Transfer(format!("{:#}", error))
    }
}
