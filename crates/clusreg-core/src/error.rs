//! Core error types.

/// Errors raised while decoding identifiers and value payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// GUID text was not in `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX` form.
    #[error("invalid GUID text '{text}'")]
    InvalidGuid { text: String },

    /// A fixed-size encoding received the wrong number of bytes.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A payload did not decode as the requested representation.
    #[error("invalid {kind} payload: {detail}")]
    InvalidEncoding { kind: &'static str, detail: String },

    /// A value type name or code could not be parsed.
    #[error("unknown value type '{name}'")]
    UnknownValueType { name: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
