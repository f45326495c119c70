//! Crypto error types.

use clusreg_core::Status;

/// Errors that can occur during a provider round trip.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The provider reported a failure.
    #[error("{operation} failed: {status}")]
    Native {
        operation: &'static str,
        status: Status,
    },

    /// Resource, key and provider names may not contain NUL characters.
    #[error("invalid name {name:?}")]
    InvalidName { name: String },

    /// The native entry points could not be loaded.
    #[error("failed to load {library}: {detail}")]
    Load {
        library: &'static str,
        detail: String,
    },
}

impl CryptoError {
    pub fn status(&self) -> Option<Status> {
        match self {
            CryptoError::Native { status, .. } => Some(*status),
            CryptoError::InvalidName { .. } => Some(Status::INVALID_PARAMETER),
            CryptoError::Load { .. } => None,
        }
    }
}

/// Result type alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
