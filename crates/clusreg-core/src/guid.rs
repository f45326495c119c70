//! Globally unique identifiers as stored in the cluster registry.
//!
//! A GUID is persisted as a 16-byte binary value: `data1`, `data2` and
//! `data3` least-significant byte first, followed by the 8 bytes of `data4`
//! verbatim. The text form is `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Fixed-layout 128-bit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// Size of the binary encoding.
    pub const ENCODED_LEN: usize = 16;

    /// The all-zero GUID.
    pub const NIL: Guid = Guid {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };

    /// Build a GUID from its four fields.
    pub const fn from_fields(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// Generate a random (version 4) GUID.
    pub fn generate() -> Self {
        Guid::from(Uuid::new_v4())
    }

    /// Encode into the 16-byte registry representation.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..4].copy_from_slice(&self.data1.to_le_bytes());
        out[4..6].copy_from_slice(&self.data2.to_le_bytes());
        out[6..8].copy_from_slice(&self.data3.to_le_bytes());
        out[8..16].copy_from_slice(&self.data4);
        out
    }

    /// Decode the 16-byte registry representation.
    ///
    /// Any other length is rejected with [`CoreError::InvalidLength`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; 16] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
            expected: Self::ENCODED_LEN,
            actual: bytes.len(),
        })?;
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&bytes[8..16]);
        Ok(Guid {
            data1: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_le_bytes([bytes[4], bytes[5]]),
            data3: u16::from_le_bytes([bytes[6], bytes[7]]),
            data4,
        })
    }

    /// Whether this is the all-zero GUID.
    pub fn is_nil(&self) -> bool {
        *self == Guid::NIL
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl FromStr for Guid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidGuid {
            text: s.to_string(),
        };

        let groups: Vec<&str> = s.split('-').collect();
        let widths = [8, 4, 4, 4, 12];
        if groups.len() != widths.len()
            || groups
                .iter()
                .zip(widths)
                .any(|(g, w)| g.len() != w || !g.bytes().all(|b| b.is_ascii_hexdigit()))
        {
            return Err(invalid());
        }

        let data1 = u32::from_str_radix(groups[0], 16).map_err(|_| invalid())?;
        let data2 = u16::from_str_radix(groups[1], 16).map_err(|_| invalid())?;
        let data3 = u16::from_str_radix(groups[2], 16).map_err(|_| invalid())?;

        // Group 4 carries data4[0..2], group 5 carries data4[2..8].
        let tail = format!("{}{}", groups[3], groups[4]);
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }

        Ok(Guid {
            data1,
            data2,
            data3,
            data4,
        })
    }
}

impl From<Uuid> for Guid {
    fn from(uuid: Uuid) -> Self {
        let (data1, data2, data3, data4) = uuid.as_fields();
        Guid {
            data1,
            data2,
            data3,
            data4: *data4,
        }
    }
}

impl From<Guid> for Uuid {
    fn from(guid: Guid) -> Self {
        Uuid::from_fields(guid.data1, guid.data2, guid.data3, &guid.data4)
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Guid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "206994D6-C7B7-ABDB-D89E-AB9CBF3853C4";

    #[test]
    fn parse_and_format() {
        let guid: Guid = SAMPLE.parse().unwrap();
        assert_eq!(guid.data1, 0x206994D6);
        assert_eq!(guid.data2, 0xC7B7);
        assert_eq!(guid.data3, 0xABDB);
        assert_eq!(guid.data4, [0xD8, 0x9E, 0xAB, 0x9C, 0xBF, 0x38, 0x53, 0xC4]);
        assert_eq!(guid.to_string(), SAMPLE);
    }

    #[test]
    fn lowercase_input_accepted() {
        let guid: Guid = SAMPLE.to_lowercase().parse().unwrap();
        assert_eq!(guid.to_string(), SAMPLE);
    }

    #[test]
    fn binary_layout_is_little_endian_then_verbatim() {
        let guid: Guid = SAMPLE.parse().unwrap();
        let bytes = guid.to_bytes();
        assert_eq!(&bytes[0..4], &[0xD6, 0x94, 0x69, 0x20]);
        assert_eq!(&bytes[4..6], &[0xB7, 0xC7]);
        assert_eq!(&bytes[6..8], &[0xDB, 0xAB]);
        assert_eq!(&bytes[8..16], &guid.data4);
    }

    #[test]
    fn reject_malformed_text() {
        for text in [
            "",
            "{206994D6-C7B7-ABDB-D89E-AB9CBF3853C4}",
            "206994D6C7B7ABDBD89EAB9CBF3853C4",
            "206994D6-C7B7-ABDB-D89E-AB9CBF3853C",
            "206994D6-C7B7-ABDB-D89E-AB9CBF3853CG",
            "+06994D6-C7B7-ABDB-D89E-AB9CBF3853C4",
        ] {
            assert!(text.parse::<Guid>().is_err(), "accepted {text:?}");
        }
    }

    #[test]
    fn reject_wrong_length_bytes() {
        let err = Guid::from_bytes(&[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            CoreError::InvalidLength {
                expected: 16,
                actual: 15
            }
        );
        assert!(Guid::from_bytes(&[0u8; 17]).is_err());
    }

    #[test]
    fn uuid_conversion_matches_text() {
        let guid = Guid::generate();
        let uuid = Uuid::from(guid);
        assert_eq!(uuid.hyphenated().to_string().to_uppercase(), guid.to_string());
        assert_eq!(Guid::from(uuid), guid);
        assert_eq!(uuid.to_bytes_le(), guid.to_bytes());
    }

    #[test]
    fn serde_uses_text_form() {
        let guid: Guid = SAMPLE.parse().unwrap();
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, format!("\"{SAMPLE}\""));
        let back: Guid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, guid);
    }

    proptest! {
        #[test]
        fn bytes_and_text_are_lossless(raw in any::<[u8; 16]>()) {
            let guid = Guid::from_bytes(&raw).unwrap();
            prop_assert_eq!(guid.to_bytes(), raw);
            prop_assert_eq!(guid.to_string().parse::<Guid>().unwrap(), guid);
        }
    }
}
