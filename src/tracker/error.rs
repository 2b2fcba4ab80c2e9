//! Error type shared by the feed clients, the controller and the settings layer.

use thiserror::Error;

/// Errors raised while fetching, streaming or configuring price data
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid timestamp `{0}`")]
    Timestamp(String),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("Stream {0} is not connected")]
    NotConnected(u64),

    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid setting `{key}`: {reason}")]
    Setting { key: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocket(Box::new(e))
    }
}

impl FeedError {
    pub(crate) fn setting(key: &str, reason: impl Into<String>) -> Self {
        FeedError::Setting {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}
