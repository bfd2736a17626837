//! Error types for Nguru

use thiserror::Error;

/// Result type alias for Nguru operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Nguru
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, bad config file)
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone unavailable or permission denied
    #[error("device error: {0}")]
    Device(String),

    /// Remote session failed to open or dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed inbound audio chunk
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// Operation not valid in the current session state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Text generation error
    #[error("generation error: {0}")]
    Generation(String),

    /// Profile/history store error
    #[error("store error: {0}")]
    Store(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Websocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Human-readable message for the presentation layer
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => format!("Nguru isn't set up yet: {msg}"),
            Self::Device(_) => {
                "Microphone access is unavailable. Please allow microphone access and try again."
                    .to_string()
            }
            Self::Connection(_) | Self::WebSocket(_) => {
                "Connection lost. Please try again.".to_string()
            }
            Self::Decode(_) | Self::Audio(_) => {
                "Something went wrong with the audio. Please try again.".to_string()
            }
            Self::InvalidState(msg) => msg.clone(),
            Self::NotFound(what) => format!("Couldn't find {what}."),
            Self::Generation(_) | Self::Http(_) => {
                "Failed to reach Nguru. Please try again.".to_string()
            }
            Self::Store(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Toml(_)
            | Self::Database(_)
            | Self::Sqlite(_) => "Couldn't save or load your data. Please try again.".to_string(),
        }
    }
}
