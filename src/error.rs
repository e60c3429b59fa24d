//! Error types for Aura Sync

use thiserror::Error;

/// Result type alias for Aura operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in a live session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing or placeholder credential, bad values)
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone or camera access denied
    #[error("permission denied: {0}")]
    Permission(String),

    /// Connection to the backend failed or dropped
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed message on the wire
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Camera frame capture or encoding error
    #[error("video error: {0}")]
    Video(String),

    /// Tool invocation error
    #[error("tool error: {0}")]
    Tool(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Base64 decoding error
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}
