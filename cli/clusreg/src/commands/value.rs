//! `clusreg get|set|delete|list|mkkey|rmkey` — value and key CRUD.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use clusreg_core::value::{decode_dword, decode_multi_string, decode_qword, decode_string};
use clusreg_core::{Guid, Value, ValueType};
use clusreg_store::AccessMask;
use serde_json::json;

use super::{key_path, with_key, Session};

/// Build a value from its command-line form.
///
/// `type_name` is a value type name or numeric code, or `guid` for a GUID
/// stored as 16 binary bytes. Binary and unknown types take hex data.
pub fn parse_value(type_name: &str, text: &str) -> Result<Value> {
    if type_name.eq_ignore_ascii_case("guid") {
        let guid: Guid = text.parse()?;
        return Ok(Value::guid(&guid));
    }
    let value_type: ValueType = type_name.parse()?;
    let value = match value_type {
        ValueType::SZ | ValueType::EXPAND_SZ => {
            Value::new(value_type, Value::string(text).data)
        }
        ValueType::MULTI_SZ => {
            let items: Vec<&str> = if text.is_empty() {
                Vec::new()
            } else {
                text.split(',').collect()
            };
            Value::multi_string(&items).with_context(|| format!("'{text}' is not a string list"))?
        }
        ValueType::DWORD => Value::dword(parse_int(text)?),
        ValueType::QWORD => Value::qword(parse_int(text)?),
        other => Value::new(
            other,
            hex::decode(text).with_context(|| format!("'{text}' is not hex"))?,
        ),
    };
    Ok(value)
}

fn parse_int<T>(text: &str) -> Result<T>
where
    T: TryFrom<u64>,
{
    let n = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    }
    .with_context(|| format!("'{text}' is not a number"))?;
    match T::try_from(n) {
        Ok(v) => Ok(v),
        Err(_) => bail!("{n} is out of range"),
    }
}

/// Human-readable rendering of a value's payload.
pub fn render(value: &Value) -> String {
    let fallback = || hex::encode(&value.data);
    match value.value_type {
        ValueType::SZ | ValueType::EXPAND_SZ => {
            decode_string(&value.data).unwrap_or_else(|_| fallback())
        }
        ValueType::MULTI_SZ => decode_multi_string(&value.data)
            .map(|items| items.join(","))
            .unwrap_or_else(|_| fallback()),
        ValueType::DWORD => decode_dword(&value.data)
            .map(|n| n.to_string())
            .unwrap_or_else(|_| fallback()),
        ValueType::QWORD => decode_qword(&value.data)
            .map(|n| n.to_string())
            .unwrap_or_else(|_| fallback()),
        _ => fallback(),
    }
}

fn to_json(name: &str, value: &Value) -> serde_json::Value {
    json!({
        "name": name,
        "type": value.value_type.to_string(),
        "code": value.value_type.0,
        "data": hex::encode(&value.data),
        "display": render(value),
    })
}

pub fn get(session: &Session, key: &str, name: &str, as_json: bool) -> Result<()> {
    let value = with_key(session, key, false, |k| {
        k.query_value(name)
            .with_context(|| format!("reading '{name}'"))
    })?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&to_json(name, &value))?);
    } else {
        println!("{}", render(&value));
    }
    Ok(())
}

pub fn set(session: &Session, key: &str, name: &str, text: &str, type_name: &str) -> Result<()> {
    let value = parse_value(type_name, text)?;
    with_key(session, key, true, |k| {
        k.set(name, &value)
            .with_context(|| format!("writing '{name}'"))
    })?;
    println!("Set {name} ({}, {} bytes)", value.value_type, value.data.len());
    Ok(())
}

pub fn delete(session: &Session, key: &str, name: &str) -> Result<()> {
    with_key(session, key, true, |k| {
        k.delete_value(name)
            .with_context(|| format!("deleting '{name}'"))
    })?;
    println!("Deleted {name}");
    Ok(())
}

/// Child keys and values of a key.
#[derive(Debug, Default)]
pub struct Listing {
    pub keys: Vec<String>,
    pub values: BTreeMap<String, Value>,
}

pub fn list(session: &Session, key: &str, as_json: bool) -> Result<()> {
    let listing = with_key(session, key, false, |k| {
        Ok(Listing {
            keys: k.enumerate_keys()?,
            values: k.enumerate_values()?,
        })
    })?;

    if as_json {
        let values: Vec<_> = listing
            .values
            .iter()
            .map(|(name, value)| to_json(name, value))
            .collect();
        let out = json!({ "keys": listing.keys, "values": values });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for name in &listing.keys {
        println!("{name}\\");
    }
    let width = listing.values.keys().map(|n| n.len()).max().unwrap_or(0);
    for (name, value) in &listing.values {
        println!("{name:<width$}  {:<14}  {}", value.value_type.to_string(), render(value));
    }
    Ok(())
}

/// Create the key at `path`, including any missing parents.
pub fn mkkey(session: &Session, path: &str) -> Result<()> {
    let relative = key_path(path);
    if relative.is_empty() {
        bail!("the root key always exists");
    }
    let created = with_key(session, ".", true, |root| {
        let (_, created) = root
            .create_key(&relative, AccessMask::ALL_ACCESS)
            .with_context(|| format!("creating key '{relative}'"))?;
        Ok(created)
    })?;
    if created {
        println!("Created {relative}");
    } else {
        println!("{relative} already exists");
    }
    Ok(())
}

/// Delete the child `name` of the key at `parent`, with its subtree.
pub fn rmkey(session: &Session, parent: &str, name: &str) -> Result<()> {
    with_key(session, parent, true, |k| {
        k.delete_key(name)
            .with_context(|| format!("deleting key '{name}'"))
    })?;
    println!("Deleted {name}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_typed_values() {
        assert_eq!(parse_value("dword", "0x10").unwrap(), Value::dword(16));
        assert_eq!(parse_value("qword", "5").unwrap(), Value::qword(5));
        assert_eq!(parse_value("string", "hi").unwrap(), Value::string("hi"));
        assert_eq!(
            parse_value("multi-string", "a,b").unwrap(),
            Value::multi_string(&["a", "b"]).unwrap()
        );
        assert_eq!(parse_value("binary", "00ff").unwrap(), Value::binary(vec![0, 0xff]));
        assert_eq!(
            parse_value("0x1234", "01").unwrap(),
            Value::new(ValueType(0x1234), vec![1])
        );
    }

    #[test]
    fn parse_guid_as_binary() {
        let value = parse_value("guid", "6BA7B810-9DAD-11D1-80B4-00C04FD430C8").unwrap();
        assert_eq!(value.value_type, ValueType::BINARY);
        assert_eq!(value.data.len(), 16);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse_value("dword", "4294967296").is_err());
        assert!(parse_value("binary", "xyz").is_err());
        assert!(parse_value("no-such-type", "1").is_err());
        assert!(parse_value("guid", "not-a-guid").is_err());
        assert!(parse_value("multi-string", "a,,b").is_err());
    }

    #[test]
    fn render_by_type() {
        assert_eq!(render(&Value::dword(7)), "7");
        assert_eq!(render(&Value::string("x")), "x");
        assert_eq!(render(&Value::multi_string(&["a", "b"]).unwrap()), "a,b");
        assert_eq!(render(&Value::binary(vec![0xab])), "ab");
        // Malformed payloads fall back to hex.
        assert_eq!(render(&Value::new(ValueType::DWORD, vec![1])), "01");
    }
}
