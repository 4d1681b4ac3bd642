//! Error types for the flock

use crate::ids::{ChannelId, ServerId};
use thiserror::Error;

/// Failures of a single voice-directory operation
///
/// These are transient from the engine's point of view: they are logged at
/// the boundary where they occur and never abort a tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    /// Session handshake has not completed
    #[error("Identity is not ready")]
    NotReady,

    /// Credential rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Server unknown to this identity
    #[error("Unknown server: {0}")]
    UnknownServer(ServerId),

    /// Channel deleted or never existed
    #[error("Channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// Permission to connect revoked
    #[error("Permission denied for {0}")]
    PermissionDenied(ChannelId),

    /// Already connected to the channel
    #[error("Already connected to {0}")]
    AlreadyConnected(ChannelId),

    /// Not connected to the channel
    #[error("Not connected to {0}")]
    NotConnected(ChannelId),

    /// Anything else the gateway reports
    #[error("Gateway error: {0}")]
    Gateway(String),
}

/// Engine-level errors
///
/// Only startup paths return these; tick and event handling never fail.
#[derive(Debug, Error)]
pub enum FlockError {
    /// No credentials to build birds from
    #[error("No bird credentials configured")]
    NoCredentials,

    /// Every connection attempt failed
    #[error("No bird could connect")]
    NoBirdConnected,

    /// No bird became ready in time
    #[error("No bird became ready within {0:?}")]
    ReadyTimeout(std::time::Duration),

    /// Policy constants out of range
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),
}

/// Result type alias for voice operations
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Result type alias for engine operations
pub type FlockResult<T> = Result<T, FlockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_entity() {
        assert_eq!(
            VoiceError::PermissionDenied(ChannelId::new(7)).to_string(),
            "Permission denied for channel:7"
        );
        assert_eq!(
            FlockError::ReadyTimeout(std::time::Duration::from_secs(2)).to_string(),
            "No bird became ready within 2s"
        );
    }
}
