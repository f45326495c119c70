//! Shared building blocks for the clustered registry client.
//!
//! Everything here is independent of any particular store backend:
//!
//! - [`guid`] — 16-byte GUID codec and canonical text form
//! - [`status`] — native status codes returned by the cluster APIs
//! - [`value`] — registry value type codes and payload encodings
//! - [`error`] — errors raised while decoding the above

pub mod error;
pub mod guid;
pub mod status;
pub mod value;

pub use error::{CoreError, Result};
pub use guid::Guid;
pub use status::Status;
pub use value::{Value, ValueType};
