//! Conditional, all-or-nothing batches.
//!
//! A [`Batch`] collects an ordered list of [`BatchCommand`]s against one key
//! and hands them to the store as a unit. On [`Batch::commit`] the store
//! either applies every command or none of them; conditions abort the batch
//! when their predicate is false and never mutate anything themselves.
//!
//! ```text
//! Open ──add──▶ Open ──commit──▶ Committed | failed (nothing applied)
//!                    └─discard/drop──▶ Discarded
//! ```
//!
//! `commit` and `discard` consume the batch, so a closed batch cannot be
//! used again.

use std::fmt;

use clusreg_core::{Status, Value, ValueType};
use tracing::{debug, warn};

use crate::api::{ClusterApi, CommandKind, RawBatch};
use crate::error::{Result, StoreError};
use crate::key::{check_name, Key};

/// One step of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCommand {
    /// Create or overwrite a value on the current key.
    SetValue { name: String, value: Value },
    /// Open or create a child key; later commands target it.
    CreateKey { name: String },
    /// Delete a child key and its subtree.
    DeleteKey { name: String },
    /// Delete a value on the current key.
    DeleteValue { name: String },
    /// Abort unless the value exists.
    ConditionExists { name: String },
    /// Abort if the value exists.
    ConditionNotExists { name: String },
    /// Abort unless the value currently equals `value` (type and bytes).
    ConditionIsEqual { name: String, value: Value },
    /// Abort if the value currently equals `value`.
    ConditionIsNotEqual { name: String, value: Value },
}

impl BatchCommand {
    pub fn set_value(name: impl Into<String>, value_type: ValueType, data: impl Into<Vec<u8>>) -> Self {
        BatchCommand::SetValue {
            name: name.into(),
            value: Value::new(value_type, data),
        }
    }

    pub fn is_equal(name: impl Into<String>, value_type: ValueType, data: impl Into<Vec<u8>>) -> Self {
        BatchCommand::ConditionIsEqual {
            name: name.into(),
            value: Value::new(value_type, data),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            BatchCommand::SetValue { .. } => CommandKind::SetValue,
            BatchCommand::CreateKey { .. } => CommandKind::CreateKey,
            BatchCommand::DeleteKey { .. } => CommandKind::DeleteKey,
            BatchCommand::DeleteValue { .. } => CommandKind::DeleteValue,
            BatchCommand::ConditionExists { .. } => CommandKind::ConditionExists,
            BatchCommand::ConditionNotExists { .. } => CommandKind::ConditionNotExists,
            BatchCommand::ConditionIsEqual { .. } => CommandKind::ConditionIsEqual,
            BatchCommand::ConditionIsNotEqual { .. } => CommandKind::ConditionIsNotEqual,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            BatchCommand::SetValue { name, .. }
            | BatchCommand::CreateKey { name }
            | BatchCommand::DeleteKey { name }
            | BatchCommand::DeleteValue { name }
            | BatchCommand::ConditionExists { name }
            | BatchCommand::ConditionNotExists { name }
            | BatchCommand::ConditionIsEqual { name, .. }
            | BatchCommand::ConditionIsNotEqual { name, .. } => name,
        }
    }

    /// The type and payload carried by the command, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            BatchCommand::SetValue { value, .. }
            | BatchCommand::ConditionIsEqual { value, .. }
            | BatchCommand::ConditionIsNotEqual { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// Where a rejected batch stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStep {
    /// Validation failed before any command ran (raw ordinal `-1`).
    BeforeExecution,
    /// The command at this 1-based position failed.
    Command(usize),
}

impl FailedStep {
    /// Decode the raw ordinal reported by the store.
    pub fn from_raw(raw: i32) -> Self {
        if raw >= 1 {
            FailedStep::Command(raw as usize)
        } else {
            FailedStep::BeforeExecution
        }
    }

    /// 1-based position of the failed command, if one ran.
    pub fn position(&self) -> Option<usize> {
        match self {
            FailedStep::BeforeExecution => None,
            FailedStep::Command(n) => Some(*n),
        }
    }
}

impl fmt::Display for FailedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedStep::BeforeExecution => f.write_str("before any command ran"),
            FailedStep::Command(n) => write!(f, "at command {n}"),
        }
    }
}

/// Why a commit was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchFailure {
    pub status: Status,
    pub step: FailedStep,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.step)
    }
}

/// An open batch scoped to one key.
pub struct Batch<'k, A: ClusterApi + ?Sized> {
    api: &'k A,
    raw: RawBatch,
    key_path: String,
    len: usize,
    closed: bool,
}

impl<'k, A: ClusterApi + ?Sized> Batch<'k, A> {
    pub(crate) fn open(key: &'k Key<'_, A>) -> Result<Self> {
        let api = key.api();
        let raw = api
            .create_batch(key.raw())
            .map_err(|s| StoreError::from_status("create batch", key.path(), s))?;
        Ok(Batch {
            api,
            raw,
            key_path: key.path().to_string(),
            len: 0,
            closed: false,
        })
    }

    /// Append a command. Commands run in the order they were added.
    pub fn add(&mut self, command: BatchCommand) -> Result<()> {
        let name = command.name();
        check_name(name)?;
        let (value_type, data) = match command.value() {
            Some(value) => (value.value_type, value.data.as_slice()),
            None => (ValueType::NONE, &[][..]),
        };
        self.api
            .batch_add_command(self.raw, command.kind(), name, value_type, data)
            .map_err(|s| StoreError::from_status("add batch command", name, s))?;
        self.len += 1;
        Ok(())
    }

    pub fn set_value(&mut self, name: &str, value_type: ValueType, data: &[u8]) -> Result<()> {
        self.add(BatchCommand::set_value(name, value_type, data))
    }

    pub fn create_key(&mut self, name: &str) -> Result<()> {
        self.add(BatchCommand::CreateKey {
            name: name.to_string(),
        })
    }

    pub fn delete_key(&mut self, name: &str) -> Result<()> {
        self.add(BatchCommand::DeleteKey {
            name: name.to_string(),
        })
    }

    pub fn delete_value(&mut self, name: &str) -> Result<()> {
        self.add(BatchCommand::DeleteValue {
            name: name.to_string(),
        })
    }

    pub fn condition_exists(&mut self, name: &str) -> Result<()> {
        self.add(BatchCommand::ConditionExists {
            name: name.to_string(),
        })
    }

    pub fn condition_not_exists(&mut self, name: &str) -> Result<()> {
        self.add(BatchCommand::ConditionNotExists {
            name: name.to_string(),
        })
    }

    pub fn condition_is_equal(&mut self, name: &str, value_type: ValueType, data: &[u8]) -> Result<()> {
        self.add(BatchCommand::is_equal(name, value_type, data))
    }

    pub fn condition_is_not_equal(
        &mut self,
        name: &str,
        value_type: ValueType,
        data: &[u8],
    ) -> Result<()> {
        self.add(BatchCommand::ConditionIsNotEqual {
            name: name.to_string(),
            value: Value::new(value_type, data),
        })
    }

    /// Number of commands added so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Apply every command atomically, or none of them.
    pub fn commit(mut self) -> Result<()> {
        self.closed = true;
        let closed = self.api.close_batch(self.raw, true);
        if closed.status.is_success() {
            debug!(key = %self.key_path, commands = self.len, "batch committed");
            return Ok(());
        }
        let failure = BatchFailure {
            status: closed.status,
            step: FailedStep::from_raw(closed.failed_command),
        };
        debug!(key = %self.key_path, commands = self.len, %failure, "batch rejected");
        Err(StoreError::BatchFailed(failure))
    }

    /// Drop every command without touching the store.
    pub fn discard(mut self) {
        self.closed = true;
        self.release();
    }

    fn release(&self) {
        let closed = self.api.close_batch(self.raw, false);
        if closed.status.is_success() {
            debug!(key = %self.key_path, commands = self.len, "batch discarded");
        } else {
            warn!(key = %self.key_path, status = %closed.status, "failed to discard batch");
        }
    }
}

impl<A: ClusterApi + ?Sized> Drop for Batch<'_, A> {
    fn drop(&mut self) {
        if !self.closed {
            self.release();
        }
    }
}

impl<A: ClusterApi + ?Sized> fmt::Debug for Batch<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batch")
            .field("raw", &self.raw)
            .field("key", &self.key_path)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_step_from_raw_ordinal() {
        assert_eq!(FailedStep::from_raw(-1), FailedStep::BeforeExecution);
        assert_eq!(FailedStep::from_raw(0), FailedStep::BeforeExecution);
        assert_eq!(FailedStep::from_raw(1), FailedStep::Command(1));
        assert_eq!(FailedStep::from_raw(7).position(), Some(7));
        assert_eq!(FailedStep::BeforeExecution.position(), None);
    }

    #[test]
    fn failure_display() {
        let failure = BatchFailure {
            status: Status::ALREADY_EXISTS,
            step: FailedStep::Command(1),
        };
        assert_eq!(failure.to_string(), "ERROR_ALREADY_EXISTS (183) at command 1");
    }

    #[test]
    fn command_accessors() {
        let cmd = BatchCommand::set_value("v", ValueType::BINARY, vec![1, 2]);
        assert_eq!(cmd.kind(), CommandKind::SetValue);
        assert_eq!(cmd.name(), "v");
        assert_eq!(cmd.value().unwrap().data, vec![1, 2]);

        let cmd = BatchCommand::CreateKey {
            name: "child".to_string(),
        };
        assert_eq!(cmd.kind(), CommandKind::CreateKey);
        assert!(cmd.value().is_none());
    }
}
