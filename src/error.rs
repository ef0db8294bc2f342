//! Error types for the channel exporter

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Discord API error {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Request failed: {0}")]
    RequestError(String),

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Channel {id} is not a text channel (type {kind})")]
    NotTextChannel { id: String, kind: u8 },

    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Export directory is locked by another process")]
    ExportLocked,

    #[error("Failed to acquire export lock: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Whether the error means the configured channel cannot be exported.
    pub fn is_invalid_channel(&self) -> bool {
        matches!(self, Error::ChannelNotFound(_) | Error::NotTextChannel { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::RequestError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
