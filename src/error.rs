//! Error types for the voice session engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice session engine
///
/// Only permission and transport failures reach the session state machine;
/// codec and tool failures are recovered locally and the session continues.
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone access refused or no capture device available
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// The duplex connection to the remote service could not be opened
    #[error("transport open error: {0}")]
    TransportOpen(String),

    /// The duplex connection failed mid-session
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed audio payload
    #[error("codec error: {0}")]
    Codec(String),

    /// Tool handler failure
    #[error("tool error: {0}")]
    Tool(String),

    /// Audio device error (output device, stream construction)
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
