//! Error types for the synchronized playback coordinator.

use thiserror::Error;

/// Primary error type for all coordinator operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Send error: {0}")]
    Send(#[from] SendError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation timed out")]
    Timeout,
}

/// Errors while turning a source reference into a sample buffer.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("Failed to open source: {0}")]
    Open(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio tracks found")]
    NoAudioTrack,

    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Decoder failed: {0}")]
    Codec(String),
}

/// Errors while delivering a message to a single device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Device not connected: {0}")]
    NotConnected(String),

    #[error("Connection closed")]
    Closed,

    #[error("Send timed out")]
    Timeout,

    #[error("Outbound queue full")]
    Full,

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Errors while parsing or producing wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Rejected configuration values.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        let decode_err = Error::Decode(DecodeError::NotFound("song.wav".to_string()));
        assert!(decode_err.to_string().contains("Decode error"));
        assert!(decode_err.to_string().contains("song.wav"));

        let send_err = Error::Send(SendError::NotConnected("client_3".to_string()));
        assert!(send_err.to_string().contains("client_3"));

        let timeout_err = Error::Timeout;
        assert!(timeout_err.to_string().contains("timed out"));

        let config_err = ConfigError::InvalidValue {
            field: "chunk_bytes",
            reason: "must be positive".to_string(),
        };
        assert!(config_err.to_string().contains("chunk_bytes"));
    }

    #[test]
    fn error_source_chain() {
        use std::error::Error as StdError;

        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "test");
        let err = Error::Io(io_err);
        assert!(err.source().is_some());

        let err = Error::Protocol(ProtocolError::UnknownType("dance".to_string()));
        assert!(err.source().is_some());
    }

    #[test]
    fn error_conversions() {
        let err: Error = DecodeError::NoAudioTrack.into();
        assert!(matches!(err, Error::Decode(_)));

        let err: Error = SendError::Closed.into();
        assert!(matches!(err, Error::Send(_)));

        let err: Error = ProtocolError::Malformed("{".to_string()).into();
        assert!(matches!(err, Error::Protocol(_)));

        let err: Error = ConfigError::InvalidValue {
            field: "latency_window",
            reason: "zero".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
