//! Registry value type codes and payload encodings.
//!
//! The store never interprets a value's bytes; the type code is an opaque
//! tag that travels with the data. The helpers here give the conventional
//! encodings for the common tags: UTF-16LE strings with a terminating NUL,
//! little-endian integers, and NUL-separated string lists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::guid::Guid;

/// Type tag of a registry value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueType(pub u32);

impl ValueType {
    pub const NONE: ValueType = ValueType(0);
    pub const SZ: ValueType = ValueType(1);
    pub const EXPAND_SZ: ValueType = ValueType(2);
    pub const BINARY: ValueType = ValueType(3);
    pub const DWORD: ValueType = ValueType(4);
    pub const DWORD_BIG_ENDIAN: ValueType = ValueType(5);
    pub const LINK: ValueType = ValueType(6);
    pub const MULTI_SZ: ValueType = ValueType(7);
    pub const QWORD: ValueType = ValueType(11);

    /// Conventional name of well-known tags.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            ValueType::NONE => "none",
            ValueType::SZ => "string",
            ValueType::EXPAND_SZ => "expand-string",
            ValueType::BINARY => "binary",
            ValueType::DWORD => "dword",
            ValueType::DWORD_BIG_ENDIAN => "dword-big-endian",
            ValueType::LINK => "link",
            ValueType::MULTI_SZ => "multi-string",
            ValueType::QWORD => "qword",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "type {}", self.0),
        }
    }
}

impl FromStr for ValueType {
    type Err = CoreError;

    /// Parse a conventional name (`binary`, `dword`, ...) or a numeric code
    /// (`3`, `0x3`).
    fn from_str(s: &str) -> Result<Self> {
        let known = [
            ValueType::NONE,
            ValueType::SZ,
            ValueType::EXPAND_SZ,
            ValueType::BINARY,
            ValueType::DWORD,
            ValueType::DWORD_BIG_ENDIAN,
            ValueType::LINK,
            ValueType::MULTI_SZ,
            ValueType::QWORD,
        ];
        let lower = s.to_ascii_lowercase();
        if let Some(ty) = known.iter().find(|t| t.name() == Some(lower.as_str())) {
            return Ok(*ty);
        }
        let parsed = match lower.strip_prefix("0x") {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => lower.parse::<u32>(),
        };
        parsed.map(ValueType).map_err(|_| CoreError::UnknownValueType {
            name: s.to_string(),
        })
    }
}

/// A value's type tag together with its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    pub value_type: ValueType,
    pub data: Vec<u8>,
}

impl Value {
    pub fn new(value_type: ValueType, data: impl Into<Vec<u8>>) -> Self {
        Value {
            value_type,
            data: data.into(),
        }
    }

    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Value::new(ValueType::BINARY, data)
    }

    pub fn dword(n: u32) -> Self {
        Value::new(ValueType::DWORD, n.to_le_bytes())
    }

    pub fn qword(n: u64) -> Self {
        Value::new(ValueType::QWORD, n.to_le_bytes())
    }

    pub fn string(s: &str) -> Self {
        Value::new(ValueType::SZ, encode_string(s))
    }

    pub fn multi_string<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        Ok(Value::new(ValueType::MULTI_SZ, encode_multi_string(items)?))
    }

    /// A GUID stored as a 16-byte binary value.
    pub fn guid(guid: &Guid) -> Self {
        Value::binary(guid.to_bytes())
    }
}

/// Encode a string as UTF-16LE followed by a terminating NUL.
pub fn encode_string(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity((s.len() + 1) * 2);
    for unit in s.encode_utf16().chain(std::iter::once(0)) {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Decode a UTF-16LE string, stopping at the first NUL if one is present.
pub fn decode_string(data: &[u8]) -> Result<String> {
    let units = utf16_units(data, "string")?;
    let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
    String::from_utf16(&units[..end]).map_err(|e| CoreError::InvalidEncoding {
        kind: "string",
        detail: e.to_string(),
    })
}

/// Encode a list of strings: each NUL-terminated, followed by one more NUL.
///
/// An empty item would read back as the end of the list and an embedded NUL
/// as an item boundary, so both are rejected.
pub fn encode_multi_string<S: AsRef<str>>(items: &[S]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let item = item.as_ref();
        if item.is_empty() || item.contains('\0') {
            return Err(CoreError::InvalidEncoding {
                kind: "multi-string",
                detail: format!("item {i} is empty or contains NUL"),
            });
        }
        out.extend(encode_string(item));
    }
    out.extend_from_slice(&[0, 0]);
    Ok(out)
}

/// Decode a NUL-separated string list. An empty payload is an empty list.
pub fn decode_multi_string(data: &[u8]) -> Result<Vec<String>> {
    let units = utf16_units(data, "multi-string")?;
    let mut items = Vec::new();
    for chunk in units.split(|&u| u == 0) {
        if chunk.is_empty() {
            // Empty segment marks the end of the list.
            break;
        }
        let item = String::from_utf16(chunk).map_err(|e| CoreError::InvalidEncoding {
            kind: "multi-string",
            detail: e.to_string(),
        })?;
        items.push(item);
    }
    Ok(items)
}

pub fn decode_dword(data: &[u8]) -> Result<u32> {
    let raw: [u8; 4] = data.try_into().map_err(|_| CoreError::InvalidLength {
        expected: 4,
        actual: data.len(),
    })?;
    Ok(u32::from_le_bytes(raw))
}

pub fn decode_qword(data: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = data.try_into().map_err(|_| CoreError::InvalidLength {
        expected: 8,
        actual: data.len(),
    })?;
    Ok(u64::from_le_bytes(raw))
}

fn utf16_units(data: &[u8], kind: &'static str) -> Result<Vec<u16>> {
    if data.len() % 2 != 0 {
        return Err(CoreError::InvalidEncoding {
            kind,
            detail: format!("odd byte length {}", data.len()),
        });
    }
    Ok(data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_type_names_and_codes() {
        assert_eq!("binary".parse::<ValueType>().unwrap(), ValueType::BINARY);
        assert_eq!("DWORD".parse::<ValueType>().unwrap(), ValueType::DWORD);
        assert_eq!("11".parse::<ValueType>().unwrap(), ValueType::QWORD);
        assert_eq!("0x20".parse::<ValueType>().unwrap(), ValueType(0x20));
        assert!("blob".parse::<ValueType>().is_err());
    }

    #[test]
    fn unknown_type_code_displays_number() {
        assert_eq!(ValueType(42).to_string(), "type 42");
        assert_eq!(ValueType::MULTI_SZ.to_string(), "multi-string");
    }

    #[test]
    fn string_is_nul_terminated_utf16() {
        let data = encode_string("ab");
        assert_eq!(data, vec![b'a', 0, b'b', 0, 0, 0]);
        assert_eq!(decode_string(&data).unwrap(), "ab");
        // Missing terminator is tolerated.
        assert_eq!(decode_string(&data[..4]).unwrap(), "ab");
    }

    #[test]
    fn string_round_trips_non_ascii() {
        let s = "clé \u{1F512}";
        assert_eq!(decode_string(&encode_string(s)).unwrap(), s);
    }

    #[test]
    fn odd_length_string_rejected() {
        assert!(decode_string(&[b'a', 0, b'b']).is_err());
    }

    #[test]
    fn multi_string_layout() {
        let data = encode_multi_string(&["a", "bc"]).unwrap();
        assert_eq!(data, vec![b'a', 0, 0, 0, b'b', 0, b'c', 0, 0, 0, 0, 0]);
        assert_eq!(decode_multi_string(&data).unwrap(), vec!["a", "bc"]);
        assert!(decode_multi_string(&[]).unwrap().is_empty());
        assert!(decode_multi_string(&encode_multi_string::<&str>(&[]).unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn multi_string_rejects_items_that_would_not_read_back() {
        let err = encode_multi_string(&["a", "", "b"]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidEncoding { kind: "multi-string", .. }));
        assert!(encode_multi_string(&["a\0b"]).is_err());
        assert!(Value::multi_string(&[""]).is_err());
    }

    #[test]
    fn integers_require_exact_length() {
        assert_eq!(decode_dword(&Value::dword(7).data).unwrap(), 7);
        assert_eq!(decode_qword(&Value::qword(1 << 40).data).unwrap(), 1 << 40);
        assert!(decode_dword(&[1, 2, 3]).is_err());
        assert!(decode_qword(&[0; 4]).is_err());
    }

    proptest::proptest! {
        #[test]
        fn multi_string_round_trips(items in proptest::collection::vec("[^\\x00]{1,12}", 0..8)) {
            let data = encode_multi_string(&items).unwrap();
            proptest::prop_assert_eq!(decode_multi_string(&data).unwrap(), items);
        }
    }
}
