//! `clusreg batch` — run a TOML batch script against one key.
//!
//! ```toml
//! [[command]]
//! op = "not-exists"
//! name = "Owner"
//!
//! [[command]]
//! op = "set-value"
//! name = "Owner"
//! type = "string"
//! value = "node-1"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use clusreg_store::BatchCommand;
use serde::Deserialize;

use super::value::parse_value;
use super::{with_key, Session};

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default, rename = "command")]
    pub commands: Vec<ScriptCommand>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum ScriptCommand {
    SetValue {
        name: String,
        #[serde(rename = "type", default = "default_type")]
        value_type: String,
        value: String,
    },
    CreateKey {
        name: String,
    },
    DeleteKey {
        name: String,
    },
    DeleteValue {
        name: String,
    },
    Exists {
        name: String,
    },
    NotExists {
        name: String,
    },
    IsEqual {
        name: String,
        #[serde(rename = "type", default = "default_type")]
        value_type: String,
        value: String,
    },
    IsNotEqual {
        name: String,
        #[serde(rename = "type", default = "default_type")]
        value_type: String,
        value: String,
    },
}

fn default_type() -> String {
    "string".to_string()
}

impl ScriptCommand {
    pub fn to_command(&self) -> Result<BatchCommand> {
        let command = match self {
            ScriptCommand::SetValue {
                name,
                value_type,
                value,
            } => BatchCommand::SetValue {
                name: name.clone(),
                value: parse_value(value_type, value)?,
            },
            ScriptCommand::CreateKey { name } => BatchCommand::CreateKey { name: name.clone() },
            ScriptCommand::DeleteKey { name } => BatchCommand::DeleteKey { name: name.clone() },
            ScriptCommand::DeleteValue { name } => BatchCommand::DeleteValue { name: name.clone() },
            ScriptCommand::Exists { name } => BatchCommand::ConditionExists { name: name.clone() },
            ScriptCommand::NotExists { name } => {
                BatchCommand::ConditionNotExists { name: name.clone() }
            }
            ScriptCommand::IsEqual {
                name,
                value_type,
                value,
            } => BatchCommand::ConditionIsEqual {
                name: name.clone(),
                value: parse_value(value_type, value)?,
            },
            ScriptCommand::IsNotEqual {
                name,
                value_type,
                value,
            } => BatchCommand::ConditionIsNotEqual {
                name: name.clone(),
                value: parse_value(value_type, value)?,
            },
        };
        Ok(command)
    }
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Convert every command up front so a typo fails before the batch opens.
    pub fn commands(&self) -> Result<Vec<BatchCommand>> {
        self.commands
            .iter()
            .enumerate()
            .map(|(i, c)| c.to_command().with_context(|| format!("command {}", i + 1)))
            .collect()
    }
}

pub fn run(session: &Session, key: &str, script: &Path, dry_run: bool) -> Result<()> {
    let commands = Script::load(script)?.commands()?;
    let count = commands.len();

    with_key(session, key, !dry_run, |k| {
        let mut batch = k.create_batch()?;
        for command in commands {
            batch.add(command)?;
        }
        if dry_run {
            batch.discard();
            return Ok(());
        }
        batch.commit().context("batch rejected")
    })?;

    if dry_run {
        println!("Checked {count} command(s); nothing applied");
    } else {
        println!("Applied {count} command(s)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusreg_core::{Value, ValueType};

    #[test]
    fn parses_every_op() {
        let script: Script = toml::from_str(
            r#"
[[command]]
op = "exists"
name = "a"

[[command]]
op = "not-exists"
name = "b"

[[command]]
op = "is-equal"
name = "v"
type = "dword"
value = "1"

[[command]]
op = "is-not-equal"
name = "v"
type = "dword"
value = "2"

[[command]]
op = "set-value"
name = "s"
value = "text"

[[command]]
op = "delete-value"
name = "old"

[[command]]
op = "create-key"
name = "child"

[[command]]
op = "delete-key"
name = "gone"
"#,
        )
        .unwrap();
        let commands = script.commands().unwrap();
        assert_eq!(commands.len(), 8);
        assert_eq!(
            commands[2],
            BatchCommand::ConditionIsEqual {
                name: "v".to_string(),
                value: Value::dword(1)
            }
        );
        assert_eq!(commands[4].value(), Some(&Value::string("text")));
        assert_eq!(commands[4].value().map(|v| v.value_type), Some(ValueType::SZ));
    }

    #[test]
    fn bad_value_names_the_command() {
        let script: Script = toml::from_str(
            r#"
[[command]]
op = "set-value"
name = "n"
type = "dword"
value = "nope"
"#,
        )
        .unwrap();
        let err = script.commands().unwrap_err();
        assert!(format!("{err:#}").starts_with("command 1"));
    }

    #[test]
    fn unknown_op_is_rejected() {
        assert!(toml::from_str::<Script>("[[command]]\nop = \"explode\"\nname = \"x\"\n").is_err());
    }
}
