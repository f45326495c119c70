//! Native status codes.
//!
//! The cluster registry and crypto entry points report failures as 32-bit
//! system error codes. [`Status`] keeps the raw code so it can be logged or
//! mapped to a user-facing message without loss.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A native system error code. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub u32);

impl Status {
    pub const SUCCESS: Status = Status(0);
    pub const FILE_NOT_FOUND: Status = Status(2);
    pub const ACCESS_DENIED: Status = Status(5);
    pub const INVALID_HANDLE: Status = Status(6);
    pub const NOT_ENOUGH_MEMORY: Status = Status(8);
    pub const INVALID_DATA: Status = Status(13);
    pub const INVALID_PARAMETER: Status = Status(87);
    pub const ALREADY_EXISTS: Status = Status(183);
    pub const MORE_DATA: Status = Status(234);
    pub const NO_MORE_ITEMS: Status = Status(259);
    pub const IO_PENDING: Status = Status(997);
    pub const KEY_DELETED: Status = Status(1018);
    pub const REVISION_MISMATCH: Status = Status(1306);
    pub const RPC_SERVER_UNAVAILABLE: Status = Status(1722);
    pub const ENDPOINT_NOT_REGISTERED: Status = Status(1753);
    pub const RESOURCE_NOT_FOUND: Status = Status(5007);
    pub const CLUSTER_NOT_FOUND: Status = Status(5078);
    /// The requested key container does not exist.
    pub const BAD_KEYSET: Status = Status(0x8009_0016);

    /// Wrap a raw code.
    pub const fn from_raw(code: u32) -> Self {
        Status(code)
    }

    /// The raw code.
    pub const fn code(self) -> u32 {
        self.0
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Convert a raw return code into `Ok(())` or `Err(status)`.
    pub fn check(code: u32) -> Result<(), Status> {
        if code == 0 {
            Ok(())
        } else {
            Err(Status(code))
        }
    }

    /// Symbolic name for well-known codes.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Status::SUCCESS => "ERROR_SUCCESS",
            Status::FILE_NOT_FOUND => "ERROR_FILE_NOT_FOUND",
            Status::ACCESS_DENIED => "ERROR_ACCESS_DENIED",
            Status::INVALID_HANDLE => "ERROR_INVALID_HANDLE",
            Status::NOT_ENOUGH_MEMORY => "ERROR_NOT_ENOUGH_MEMORY",
            Status::INVALID_DATA => "ERROR_INVALID_DATA",
            Status::INVALID_PARAMETER => "ERROR_INVALID_PARAMETER",
            Status::ALREADY_EXISTS => "ERROR_ALREADY_EXISTS",
            Status::MORE_DATA => "ERROR_MORE_DATA",
            Status::NO_MORE_ITEMS => "ERROR_NO_MORE_ITEMS",
            Status::IO_PENDING => "ERROR_IO_PENDING",
            Status::KEY_DELETED => "ERROR_KEY_DELETED",
            Status::REVISION_MISMATCH => "ERROR_REVISION_MISMATCH",
            Status::RPC_SERVER_UNAVAILABLE => "RPC_S_SERVER_UNAVAILABLE",
            Status::ENDPOINT_NOT_REGISTERED => "EPT_S_NOT_REGISTERED",
            Status::RESOURCE_NOT_FOUND => "ERROR_RESOURCE_NOT_FOUND",
            Status::CLUSTER_NOT_FOUND => "ERROR_CLUSTER_NOT_FOUND",
            Status::BAD_KEYSET => "NTE_BAD_KEYSET",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "error {}", self.0),
        }
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        Status(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_maps_zero_to_ok() {
        assert_eq!(Status::check(0), Ok(()));
        assert_eq!(Status::check(2), Err(Status::FILE_NOT_FOUND));
    }

    #[test]
    fn display_names_known_codes() {
        assert_eq!(Status::MORE_DATA.to_string(), "ERROR_MORE_DATA (234)");
        assert_eq!(Status(4242).to_string(), "error 4242");
    }
}
