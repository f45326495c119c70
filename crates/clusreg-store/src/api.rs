//! The raw entry-point seam.
//!
//! [`ClusterApi`] mirrors the cluster service's handle-based registry calls
//! one-to-one: raw handles in, raw handles and [`Status`] codes out, with
//! caller-supplied output buffers for anything variable-length. It does no
//! retrying and owns nothing; the safe types in [`crate::key`],
//! [`crate::handle`] and [`crate::batch`] are built on top of it.
//!
//! Implementations: [`crate::memory::MemoryCluster`] (in-process) and, on
//! Windows, `native::NativeCluster`.

use std::fmt;
use std::ops::BitOr;

use clusreg_core::{Status, ValueType};

/// Raw cluster connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawCluster(pub usize);

/// Raw cluster resource handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawResource(pub usize);

/// Raw registry key handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawKey(pub usize);

/// Raw batch handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawBatch(pub usize);

/// Registry access rights requested when opening or creating a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessMask(pub u32);

impl AccessMask {
    pub const QUERY_VALUE: AccessMask = AccessMask(0x0001);
    pub const SET_VALUE: AccessMask = AccessMask(0x0002);
    pub const CREATE_SUB_KEY: AccessMask = AccessMask(0x0004);
    pub const ENUMERATE_SUB_KEYS: AccessMask = AccessMask(0x0008);
    pub const NOTIFY: AccessMask = AccessMask(0x0010);
    pub const DELETE: AccessMask = AccessMask(0x0001_0000);
    pub const READ_CONTROL: AccessMask = AccessMask(0x0002_0000);
    pub const READ: AccessMask = AccessMask(0x0002_0019);
    pub const WRITE: AccessMask = AccessMask(0x0002_0006);
    pub const ALL_ACCESS: AccessMask = AccessMask(0x000F_003F);

    /// Whether every right in `other` is granted by `self`.
    pub const fn contains(self, other: AccessMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AccessMask {
    type Output = AccessMask;

    fn bitor(self, rhs: AccessMask) -> AccessMask {
        AccessMask(self.0 | rhs.0)
    }
}

impl fmt::Display for AccessMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#07x}", self.0)
    }
}

/// Outcome of an open-or-create call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    CreatedNew,
    OpenedExisting,
}

impl Disposition {
    pub const RAW_CREATED_NEW: u32 = 1;
    pub const RAW_OPENED_EXISTING: u32 = 2;

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            Self::RAW_CREATED_NEW => Some(Disposition::CreatedNew),
            Self::RAW_OPENED_EXISTING => Some(Disposition::OpenedExisting),
            _ => None,
        }
    }
}

/// Batch command codes, numbered as the cluster registry numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandKind {
    SetValue = 1,
    CreateKey = 2,
    DeleteKey = 3,
    DeleteValue = 4,
    ConditionExists = 11,
    ConditionNotExists = 12,
    ConditionIsEqual = 13,
    ConditionIsNotEqual = 14,
}

impl CommandKind {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let kind = match code {
            1 => CommandKind::SetValue,
            2 => CommandKind::CreateKey,
            3 => CommandKind::DeleteKey,
            4 => CommandKind::DeleteValue,
            11 => CommandKind::ConditionExists,
            12 => CommandKind::ConditionNotExists,
            13 => CommandKind::ConditionIsEqual,
            14 => CommandKind::ConditionIsNotEqual,
            _ => return None,
        };
        Some(kind)
    }

    /// Conditions guard the batch without mutating anything.
    pub const fn is_condition(self) -> bool {
        matches!(
            self,
            CommandKind::ConditionExists
                | CommandKind::ConditionNotExists
                | CommandKind::ConditionIsEqual
                | CommandKind::ConditionIsNotEqual
        )
    }
}

/// Sizes reported by a successful [`ClusterApi::query_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueriedValue {
    pub value_type: ValueType,
    /// Bytes written into the data buffer.
    pub data_len: usize,
}

/// Sizes reported by a successful [`ClusterApi::enum_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumeratedValue {
    pub value_type: ValueType,
    /// UTF-16 units written into the name buffer, excluding the NUL.
    pub name_len: usize,
    /// Bytes written into the data buffer.
    pub data_len: usize,
}

/// Result of [`ClusterApi::close_batch`].
///
/// `failed_command` is the raw ordinal the service reports: 1-based index
/// of the failing command, or `-1` when the batch failed before any
/// command ran. It is meaningless when `status` is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchClose {
    pub status: Status,
    pub failed_command: i32,
}

impl BatchClose {
    pub const fn ok() -> Self {
        BatchClose {
            status: Status::SUCCESS,
            failed_command: 0,
        }
    }
}

/// The cluster service's registry entry points.
///
/// Sized-output calls (`query_value`, `enum_value`, `enum_key`) write into
/// the supplied buffers and return the exact sizes written, or
/// [`Status::MORE_DATA`] when a buffer is too small. Content of the buffers
/// after `MORE_DATA` is undefined. Name buffers must also hold the
/// terminating NUL.
pub trait ClusterApi {
    /// Connect to the local cluster (`None`) or a named cluster.
    fn open_cluster(&self, name: Option<&str>) -> Result<RawCluster, Status>;
    fn close_cluster(&self, cluster: RawCluster) -> Result<(), Status>;

    fn open_resource(&self, cluster: RawCluster, name: &str) -> Result<RawResource, Status>;
    fn close_resource(&self, resource: RawResource) -> Result<(), Status>;

    /// Root key of the cluster database.
    fn cluster_key(&self, cluster: RawCluster, access: AccessMask) -> Result<RawKey, Status>;
    /// Key holding a resource's private configuration.
    fn resource_key(&self, resource: RawResource, access: AccessMask) -> Result<RawKey, Status>;

    fn create_key(
        &self,
        key: RawKey,
        name: &str,
        access: AccessMask,
    ) -> Result<(RawKey, Disposition), Status>;
    fn open_key(&self, key: RawKey, name: &str, access: AccessMask) -> Result<RawKey, Status>;
    fn delete_key(&self, key: RawKey, name: &str) -> Result<(), Status>;
    fn close_key(&self, key: RawKey) -> Result<(), Status>;

    fn set_value(
        &self,
        key: RawKey,
        name: &str,
        value_type: ValueType,
        data: &[u8],
    ) -> Result<(), Status>;
    fn delete_value(&self, key: RawKey, name: &str) -> Result<(), Status>;
    fn query_value(&self, key: RawKey, name: &str, data: &mut [u8]) -> Result<QueriedValue, Status>;
    /// Read the value at ordinal `index`; [`Status::NO_MORE_ITEMS`] past the end.
    fn enum_value(
        &self,
        key: RawKey,
        index: u32,
        name: &mut [u16],
        data: &mut [u8],
    ) -> Result<EnumeratedValue, Status>;
    /// Read the child key name at ordinal `index`; returns its length in UTF-16 units.
    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u16]) -> Result<usize, Status>;

    fn create_batch(&self, key: RawKey) -> Result<RawBatch, Status>;
    fn batch_add_command(
        &self,
        batch: RawBatch,
        kind: CommandKind,
        name: &str,
        value_type: ValueType,
        data: &[u8],
    ) -> Result<(), Status>;
    /// Commit or discard the batch. The handle is invalid afterwards either way.
    fn close_batch(&self, batch: RawBatch, commit: bool) -> BatchClose;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_mask_composition() {
        assert!(AccessMask::ALL_ACCESS.contains(AccessMask::WRITE));
        assert!(AccessMask::READ.contains(AccessMask::QUERY_VALUE));
        assert!(!AccessMask::READ.contains(AccessMask::SET_VALUE));
        let mask = AccessMask::QUERY_VALUE | AccessMask::SET_VALUE;
        assert!(mask.contains(AccessMask::SET_VALUE));
        assert!(!mask.contains(AccessMask::CREATE_SUB_KEY));
    }

    #[test]
    fn command_codes_round_trip() {
        for kind in [
            CommandKind::SetValue,
            CommandKind::CreateKey,
            CommandKind::DeleteKey,
            CommandKind::DeleteValue,
            CommandKind::ConditionExists,
            CommandKind::ConditionNotExists,
            CommandKind::ConditionIsEqual,
            CommandKind::ConditionIsNotEqual,
        ] {
            assert_eq!(CommandKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(CommandKind::from_code(0), None);
        assert!(CommandKind::ConditionIsEqual.is_condition());
        assert!(!CommandKind::DeleteKey.is_condition());
    }

    #[test]
    fn disposition_codes() {
        assert_eq!(Disposition::from_raw(1), Some(Disposition::CreatedNew));
        assert_eq!(Disposition::from_raw(2), Some(Disposition::OpenedExisting));
        assert_eq!(Disposition::from_raw(0), None);
    }
}
