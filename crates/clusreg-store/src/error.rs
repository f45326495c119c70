//! Store error types.

use clusreg_core::{CoreError, Status};

use crate::batch::BatchFailure;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named key or value does not exist. Routine; callers usually
    /// fall back to a default.
    #[error("'{name}' not found")]
    NotFound { name: String },

    /// The handle lacks the rights for this operation.
    #[error("access denied: {operation} '{name}'")]
    AccessDenied {
        operation: &'static str,
        name: String,
    },

    /// Stored bytes do not match the type or length the caller expected.
    #[error("invalid data in '{name}': {detail}")]
    InvalidData { name: String, detail: String },

    /// Any other failure reported by the store, passed through verbatim.
    #[error("{operation} failed: {status}")]
    Native {
        operation: &'static str,
        status: Status,
    },

    /// A batch commit was rejected; nothing in it took effect.
    #[error("batch failed: {0}")]
    BatchFailed(BatchFailure),

    /// Key or value names may not contain NUL characters.
    #[error("invalid name {name:?}")]
    InvalidName { name: String },

    /// The store kept asking for a bigger buffer past the configured ceiling.
    #[error("{operation} '{name}' needs more than {limit} bytes")]
    BufferLimit {
        operation: &'static str,
        name: String,
        limit: usize,
    },

    /// The native entry points could not be loaded.
    #[error("failed to load {library}: {detail}")]
    Load {
        library: &'static str,
        detail: String,
    },

    /// Identifier or payload decoding error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Snapshot JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Map a native status from `operation` on `name` onto the taxonomy.
    pub fn from_status(operation: &'static str, name: &str, status: Status) -> Self {
        match status {
            Status::FILE_NOT_FOUND => StoreError::NotFound {
                name: name.to_string(),
            },
            Status::ACCESS_DENIED => StoreError::AccessDenied {
                operation,
                name: name.to_string(),
            },
            Status::INVALID_DATA => StoreError::InvalidData {
                name: name.to_string(),
                detail: format!("{operation} reported {status}"),
            },
            status => StoreError::Native { operation, status },
        }
    }

    /// The native status behind this error, where there is one.
    pub fn status(&self) -> Option<Status> {
        match self {
            StoreError::NotFound { .. } => Some(Status::FILE_NOT_FOUND),
            StoreError::AccessDenied { .. } => Some(Status::ACCESS_DENIED),
            StoreError::InvalidData { .. } => Some(Status::INVALID_DATA),
            StoreError::Native { status, .. } => Some(*status),
            StoreError::BatchFailed(failure) => Some(failure.status),
            StoreError::InvalidName { .. } => Some(Status::INVALID_PARAMETER),
            StoreError::BufferLimit { .. } => Some(Status::NOT_ENOUGH_MEMORY),
            StoreError::Core(_) => Some(Status::INVALID_DATA),
            StoreError::Load { .. } | StoreError::Json(_) | StoreError::Io(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(StoreError::from_status("query", "v", Status::FILE_NOT_FOUND).is_not_found());
        assert!(matches!(
            StoreError::from_status("set", "v", Status::ACCESS_DENIED),
            StoreError::AccessDenied { operation: "set", .. }
        ));
        assert!(matches!(
            StoreError::from_status("query", "v", Status::INVALID_DATA),
            StoreError::InvalidData { .. }
        ));
        let err = StoreError::from_status("query", "v", Status::RPC_SERVER_UNAVAILABLE);
        assert_eq!(err.status(), Some(Status::RPC_SERVER_UNAVAILABLE));
        assert_eq!(
            err.to_string(),
            "query failed: RPC_S_SERVER_UNAVAILABLE (1722)"
        );
    }
}
