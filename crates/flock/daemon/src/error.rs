//! Error types for flock-daemon

use flock_types::FlockError;
use thiserror::Error;

/// Daemon-level errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials file missing, malformed or empty
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Flock engine error
    #[error("Flock error: {0}")]
    Flock(#[from] FlockError),
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
