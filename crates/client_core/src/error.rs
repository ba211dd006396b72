use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid server url '{base}': {source}")]
    InvalidEndpoint {
        base: String,
        source: url::ParseError,
    },
    #[error("failed to read selected file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid mime type '{mime_type}' for selected file: {source}")]
    InvalidMimeType {
        mime_type: String,
        source: reqwest::Error,
    },
    #[error("request to {url} failed: {source}")]
    Transport { url: String, source: reqwest::Error },
    #[error("response from {url} (status {status}) is not valid JSON: {source}")]
    Decode {
        url: String,
        status: u16,
        source: serde_json::Error,
    },
}

impl SubmitError {
    /// True when the request never produced a response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ReadFile { .. })
    }
}
