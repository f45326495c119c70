//! Registry keys and value CRUD.
//!
//! A [`Key`] owns one raw key handle and releases it exactly once, either
//! through [`Key::close`] or when dropped. Reads go through
//! [`buffer::negotiate`](crate::buffer::negotiate), so callers never see
//! `MORE_DATA`.

use std::collections::BTreeMap;
use std::fmt;

use clusreg_core::value::{
    decode_dword, decode_multi_string, decode_qword, decode_string, encode_multi_string,
    encode_string,
};
use clusreg_core::{Guid, Status, Value, ValueType};
use tracing::{debug, trace, warn};

use crate::api::{AccessMask, ClusterApi, Disposition, RawKey};
use crate::batch::Batch;
use crate::buffer::{negotiate, BufferPolicy, NameLen, NegotiationError};
use crate::error::{Result, StoreError};

/// An open key in the cluster registry.
pub struct Key<'a, A: ClusterApi + ?Sized> {
    api: &'a A,
    raw: RawKey,
    path: String,
    policy: BufferPolicy,
    closed: bool,
}

impl<'a, A: ClusterApi + ?Sized> Key<'a, A> {
    /// Take ownership of a raw key handle. It is closed when the `Key` is.
    pub fn from_raw(api: &'a A, raw: RawKey, path: impl Into<String>, policy: BufferPolicy) -> Self {
        Key {
            api,
            raw,
            path: path.into(),
            policy,
            closed: false,
        }
    }

    pub fn raw(&self) -> RawKey {
        self.raw
    }

    /// Path of this key relative to where it was opened from, for diagnostics.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn policy(&self) -> &BufferPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: BufferPolicy) {
        self.policy = policy;
    }

    pub(crate) fn api(&self) -> &'a A {
        self.api
    }

    /// Open `name` under this key, creating it if it does not exist.
    ///
    /// The flag is `true` only when the key was newly created. Nested names
    /// separated by `\` create intermediate keys.
    pub fn create_key(&self, name: &str, access: AccessMask) -> Result<(Key<'a, A>, bool)> {
        check_name(name)?;
        let (raw, disposition) = self
            .api
            .create_key(self.raw, name, access)
            .map_err(|s| StoreError::from_status("create key", name, s))?;
        let created = disposition == Disposition::CreatedNew;
        debug!(parent = %self.path, name, created, "opened key");
        Ok((self.child(raw, name), created))
    }

    /// Open an existing child key.
    pub fn open_key(&self, name: &str, access: AccessMask) -> Result<Key<'a, A>> {
        check_name(name)?;
        let raw = self
            .api
            .open_key(self.raw, name, access)
            .map_err(|s| StoreError::from_status("open key", name, s))?;
        Ok(self.child(raw, name))
    }

    /// Delete a child key and everything beneath it.
    pub fn delete_key(&self, name: &str) -> Result<()> {
        check_name(name)?;
        self.api
            .delete_key(self.raw, name)
            .map_err(|s| StoreError::from_status("delete key", name, s))
    }

    /// Create or overwrite a value. Zero-length data is stored as such.
    pub fn set_value(&self, name: &str, value_type: ValueType, data: &[u8]) -> Result<()> {
        check_name(name)?;
        trace!(key = %self.path, name, %value_type, len = data.len(), "set value");
        self.api
            .set_value(self.raw, name, value_type, data)
            .map_err(|s| StoreError::from_status("set value", name, s))
    }

    pub fn set(&self, name: &str, value: &Value) -> Result<()> {
        self.set_value(name, value.value_type, &value.data)
    }

    /// Read a value. A missing value is [`StoreError::NotFound`].
    pub fn query_value(&self, name: &str) -> Result<Value> {
        check_name(name)?;
        let got = negotiate(&self.policy.data_only(), |_name, data| {
            self.api.query_value(self.raw, name, data)
        })
        .map_err(|e| negotiation_error("query value", name, e))?;
        Ok(Value {
            value_type: got.reported.value_type,
            data: got.data,
        })
    }

    /// Like [`Key::query_value`], but a missing value is `None`.
    pub fn query_value_opt(&self, name: &str) -> Result<Option<Value>> {
        match self.query_value(name) {
            Ok(value) => Ok(Some(value)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn delete_value(&self, name: &str) -> Result<()> {
        check_name(name)?;
        self.api
            .delete_value(self.raw, name)
            .map_err(|s| StoreError::from_status("delete value", name, s))
    }

    /// Read every value under this key.
    ///
    /// Walks ordinals from 0 until the store reports no more items. Any
    /// other failure aborts the walk and is returned; a partial map is
    /// never returned.
    pub fn enumerate_values(&self) -> Result<BTreeMap<String, Value>> {
        let mut values = BTreeMap::new();
        for index in 0u32.. {
            let got = match negotiate(&self.policy, |name, data| {
                self.api.enum_value(self.raw, index, name, data)
            }) {
                Ok(got) => got,
                Err(NegotiationError::Status(Status::NO_MORE_ITEMS)) => break,
                Err(e) => return Err(negotiation_error("enumerate values", &self.path, e)),
            };
            let name = utf16_name(&got.name, &self.path)?;
            values.insert(
                name,
                Value {
                    value_type: got.reported.value_type,
                    data: got.data,
                },
            );
        }
        debug!(key = %self.path, count = values.len(), "enumerated values");
        Ok(values)
    }

    /// Names of the child keys directly under this key.
    pub fn enumerate_keys(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for index in 0u32.. {
            let got = match negotiate(&self.policy.name_only(), |name, _data| {
                self.api.enum_key(self.raw, index, name).map(NameLen)
            }) {
                Ok(got) => got,
                Err(NegotiationError::Status(Status::NO_MORE_ITEMS)) => break,
                Err(e) => return Err(negotiation_error("enumerate keys", &self.path, e)),
            };
            names.push(utf16_name(&got.name, &self.path)?);
        }
        Ok(names)
    }

    pub fn set_binary(&self, name: &str, data: &[u8]) -> Result<()> {
        self.set_value(name, ValueType::BINARY, data)
    }

    /// Read a value that must be of the binary type.
    pub fn query_binary(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.query_typed(name, &[ValueType::BINARY])?.data)
    }

    /// Store a GUID as a 16-byte binary value.
    pub fn set_guid(&self, name: &str, guid: &Guid) -> Result<()> {
        self.set_binary(name, &guid.to_bytes())
    }

    /// Read a GUID; the value must be binary and exactly 16 bytes long.
    pub fn query_guid(&self, name: &str) -> Result<Guid> {
        let data = self.query_binary(name)?;
        if data.len() != Guid::ENCODED_LEN {
            return Err(StoreError::InvalidData {
                name: name.to_string(),
                detail: format!("expected {} bytes, got {}", Guid::ENCODED_LEN, data.len()),
            });
        }
        Guid::from_bytes(&data).map_err(|e| invalid_data(name, e))
    }

    pub fn set_dword(&self, name: &str, n: u32) -> Result<()> {
        self.set(name, &Value::dword(n))
    }

    pub fn query_dword(&self, name: &str) -> Result<u32> {
        let value = self.query_typed(name, &[ValueType::DWORD])?;
        decode_dword(&value.data).map_err(|e| invalid_data(name, e))
    }

    pub fn set_qword(&self, name: &str, n: u64) -> Result<()> {
        self.set(name, &Value::qword(n))
    }

    pub fn query_qword(&self, name: &str) -> Result<u64> {
        let value = self.query_typed(name, &[ValueType::QWORD])?;
        decode_qword(&value.data).map_err(|e| invalid_data(name, e))
    }

    pub fn set_string(&self, name: &str, s: &str) -> Result<()> {
        self.set_value(name, ValueType::SZ, &encode_string(s))
    }

    /// Read a string or expandable-string value (expansion is not performed).
    pub fn query_string(&self, name: &str) -> Result<String> {
        let value = self.query_typed(name, &[ValueType::SZ, ValueType::EXPAND_SZ])?;
        decode_string(&value.data).map_err(|e| invalid_data(name, e))
    }

    pub fn set_multi_string<S: AsRef<str>>(&self, name: &str, items: &[S]) -> Result<()> {
        let data = encode_multi_string(items).map_err(|e| invalid_data(name, e))?;
        self.set_value(name, ValueType::MULTI_SZ, &data)
    }

    pub fn query_multi_string(&self, name: &str) -> Result<Vec<String>> {
        let value = self.query_typed(name, &[ValueType::MULTI_SZ])?;
        decode_multi_string(&value.data).map_err(|e| invalid_data(name, e))
    }

    /// Start a batch of commands scoped to this key.
    pub fn create_batch(&self) -> Result<Batch<'_, A>> {
        Batch::open(self)
    }

    /// Release the handle, reporting a failed close.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.api
            .close_key(self.raw)
            .map_err(|s| StoreError::from_status("close key", &self.path, s))
    }

    fn query_typed(&self, name: &str, accepted: &[ValueType]) -> Result<Value> {
        let value = self.query_value(name)?;
        if !accepted.contains(&value.value_type) {
            return Err(StoreError::InvalidData {
                name: name.to_string(),
                detail: format!("unexpected value type {}", value.value_type),
            });
        }
        Ok(value)
    }

    fn child(&self, raw: RawKey, name: &str) -> Key<'a, A> {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}\\{}", self.path, name)
        };
        Key::from_raw(self.api, raw, path, self.policy)
    }
}

impl<A: ClusterApi + ?Sized> Drop for Key<'_, A> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(status) = self.api.close_key(self.raw) {
            warn!(key = %self.path, %status, "failed to close key");
        }
    }
}

impl<A: ClusterApi + ?Sized> fmt::Debug for Key<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("raw", &self.raw)
            .field("path", &self.path)
            .finish()
    }
}

pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.contains('\0') {
        return Err(StoreError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn negotiation_error(operation: &'static str, name: &str, err: NegotiationError) -> StoreError {
    match err {
        NegotiationError::Status(status) => StoreError::from_status(operation, name, status),
        NegotiationError::LimitExceeded { limit } => StoreError::BufferLimit {
            operation,
            name: name.to_string(),
            limit,
        },
        NegotiationError::Overrun { reported, capacity } => StoreError::InvalidData {
            name: name.to_string(),
            detail: format!("{operation} reported {reported} units for a {capacity}-unit buffer"),
        },
    }
}

fn invalid_data(name: &str, err: clusreg_core::CoreError) -> StoreError {
    StoreError::InvalidData {
        name: name.to_string(),
        detail: err.to_string(),
    }
}

fn utf16_name(units: &[u16], key: &str) -> Result<String> {
    String::from_utf16(units).map_err(|e| StoreError::InvalidData {
        name: key.to_string(),
        detail: format!("value name is not UTF-16: {e}"),
    })
}
