//! # Error Types
//!
//! Custom error types for Drone Link using `thiserror`.

use thiserror::Error;

use crate::channel::ChannelKind;

/// Main error type for Drone Link
#[derive(Debug, Error)]
pub enum DroneLinkError {
    /// Command frame errors (bad verb or argument)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Telemetry packet decode errors
    #[error("Telemetry decode error: {0}")]
    Telemetry(String),

    /// Video framing or decoder errors
    #[error("Video error: {0}")]
    Video(String),

    /// Firmware version handshake errors
    #[error("Version handshake failed: {0}")]
    Handshake(String),

    /// Operation on a channel that has no open socket
    #[error("{0} channel is not open")]
    ChannelClosed(ChannelKind),

    /// Socket could not be bound or connected
    #[error("Failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// An I/O wait exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Flight log serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Drone Link
pub type Result<T> = std::result::Result<T, DroneLinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_closed_message() {
        let err = DroneLinkError::ChannelClosed(ChannelKind::Telemetry);
        assert_eq!(err.to_string(), "telemetry channel is not open");
    }

    #[test]
    fn test_connect_error_keeps_source() {
        use std::error::Error as _;

        let err = DroneLinkError::Connect {
            endpoint: "192.168.1.1:5556".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.to_string().contains("192.168.1.1:5556"));
        assert!(err.source().is_some(), "Connect error should expose the io::Error");
    }
}
