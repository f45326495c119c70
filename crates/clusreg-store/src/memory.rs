//! In-process cluster registry.
//!
//! [`MemoryCluster`] implements [`ClusterApi`] against a tree held in
//! memory, with the same observable behaviour the cluster service has at
//! this boundary: case-insensitive names, per-handle access rights,
//! `MORE_DATA` for short buffers, and batches applied all-or-nothing. It
//! backs the test suite and the CLI's snapshot mode, where the tree is
//! persisted as JSON between runs.
//!
//! Layout:
//! ```text
//! <root>
//!   Resources\
//!     <resource name>\   — key returned by resource_key()
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use clusreg_core::{Status, Value, ValueType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::api::{
    AccessMask, BatchClose, ClusterApi, CommandKind, Disposition, EnumeratedValue, QueriedValue,
    RawBatch, RawCluster, RawKey, RawResource,
};
use crate::error::Result;

const RESOURCES_KEY: &str = "Resources";

/// A cluster registry held in process memory.
#[derive(Debug)]
pub struct MemoryCluster {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    cluster_name: String,
    root: Node,
    resources: BTreeMap<String, String>,
    handles: HashMap<usize, Handle>,
    next_handle: usize,
}

#[derive(Debug)]
enum Handle {
    Cluster,
    Resource { folded: String },
    Key { path: Vec<String>, access: AccessMask },
    Batch { path: Vec<String>, commands: Vec<Staged> },
}

#[derive(Debug)]
struct Staged {
    kind: CommandKind,
    name: String,
    value: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Node {
    #[serde(default)]
    values: BTreeMap<String, StoredValue>,
    #[serde(default)]
    keys: BTreeMap<String, Child>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    name: String,
    #[serde(flatten)]
    value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Child {
    name: String,
    #[serde(flatten)]
    node: Node,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    cluster_name: String,
    #[serde(default)]
    resources: Vec<String>,
    root: Node,
}

impl MemoryCluster {
    /// An empty registry for a cluster called `cluster_name`.
    pub fn new(cluster_name: &str) -> Self {
        MemoryCluster {
            state: Mutex::new(State {
                cluster_name: cluster_name.to_string(),
                root: Node::default(),
                resources: BTreeMap::new(),
                handles: HashMap::new(),
                next_handle: 1,
            }),
        }
    }

    pub fn cluster_name(&self) -> String {
        self.state.lock().cluster_name.clone()
    }

    /// Register a resource so it can be opened; creates its key.
    pub fn add_resource(&self, name: &str) {
        let mut state = self.state.lock();
        state.resources.insert(fold(name), name.to_string());
        state.root.create(&[RESOURCES_KEY, name]);
    }

    /// Names of the registered resources.
    pub fn resources(&self) -> Vec<String> {
        self.state.lock().resources.values().cloned().collect()
    }

    /// Number of handles of any kind currently open.
    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Load a registry previously written by [`MemoryCluster::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&data)?;
        let cluster = MemoryCluster::new(&snapshot.cluster_name);
        {
            let mut state = cluster.state.lock();
            state.root = snapshot.root;
            state.resources = snapshot
                .resources
                .into_iter()
                .map(|name| (fold(&name), name))
                .collect();
        }
        debug!(path = %path.display(), "loaded registry snapshot");
        Ok(cluster)
    }

    /// Write the tree and resource list as JSON. Open handles are not saved.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = {
            let state = self.state.lock();
            let snapshot = Snapshot {
                cluster_name: state.cluster_name.clone(),
                resources: state.resources.values().cloned().collect(),
                root: state.root.clone(),
            };
            serde_json::to_string_pretty(&snapshot)?
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "saved registry snapshot");
        Ok(())
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        MemoryCluster::new("local")
    }
}

impl State {
    fn insert(&mut self, handle: Handle) -> usize {
        let id = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(id, handle);
        id
    }

    /// Path and rights of an open key handle whose key still exists.
    fn key(&self, key: RawKey) -> std::result::Result<(Vec<String>, AccessMask), Status> {
        match self.handles.get(&key.0) {
            Some(Handle::Key { path, access }) => {
                if self.root.find(path).is_none() {
                    return Err(Status::KEY_DELETED);
                }
                Ok((path.clone(), *access))
            }
            _ => Err(Status::INVALID_HANDLE),
        }
    }

    fn node(&self, path: &[String]) -> std::result::Result<&Node, Status> {
        self.root.find(path).ok_or(Status::KEY_DELETED)
    }

    fn node_mut(&mut self, path: &[String]) -> std::result::Result<&mut Node, Status> {
        self.root.find_mut(path).ok_or(Status::KEY_DELETED)
    }
}

impl Node {
    fn find(&self, path: &[String]) -> Option<&Node> {
        let mut node = self;
        for segment in path {
            node = &node.keys.get(segment)?.node;
        }
        Some(node)
    }

    fn find_mut(&mut self, path: &[String]) -> Option<&mut Node> {
        let mut node = self;
        for segment in path {
            node = &mut node.keys.get_mut(segment)?.node;
        }
        Some(node)
    }

    /// Walk `segments`, creating missing keys. Reports whether the last one was new.
    fn create(&mut self, segments: &[&str]) -> bool {
        let mut node = self;
        let mut created = false;
        for segment in segments {
            let folded = fold(segment);
            created = !node.keys.contains_key(&folded);
            node = &mut node
                .keys
                .entry(folded)
                .or_insert_with(|| Child {
                    name: segment.to_string(),
                    node: Node::default(),
                })
                .node;
        }
        created
    }

    fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(&fold(name)).map(|v| &v.value)
    }

    fn set(&mut self, name: &str, value: Value) {
        self.values.insert(
            fold(name),
            StoredValue {
                name: name.to_string(),
                value,
            },
        );
    }
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Split a relative key name into its `\`-separated segments.
fn segments(name: &str) -> std::result::Result<Vec<&str>, Status> {
    let parts: Vec<&str> = name.split('\\').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(Status::INVALID_PARAMETER);
    }
    Ok(parts)
}

fn join(base: &[String], parts: &[&str]) -> Vec<String> {
    base.iter().cloned().chain(parts.iter().map(|p| fold(p))).collect()
}

fn require(access: AccessMask, needed: AccessMask) -> std::result::Result<(), Status> {
    if access.contains(needed) {
        Ok(())
    } else {
        Err(Status::ACCESS_DENIED)
    }
}

/// Write `name` plus its NUL into `buf`, or ask for more room.
fn write_name(name: &str, buf: &mut [u16]) -> std::result::Result<usize, Status> {
    let units: Vec<u16> = name.encode_utf16().collect();
    if buf.len() < units.len() + 1 {
        return Err(Status::MORE_DATA);
    }
    buf[..units.len()].copy_from_slice(&units);
    buf[units.len()] = 0;
    Ok(units.len())
}

/// Run staged commands against `root`. Returns the failing 1-based position.
fn apply(root: &mut Node, base: &[String], commands: &[Staged]) -> std::result::Result<(), (Status, i32)> {
    let mut cursor = base.to_vec();
    for (i, command) in commands.iter().enumerate() {
        let position = i as i32 + 1;
        let fail = |status: Status| (status, position);
        match command.kind {
            CommandKind::CreateKey => {
                let parts = segments(&command.name).map_err(fail)?;
                let base_node = root.find_mut(base).ok_or(fail(Status::KEY_DELETED))?;
                base_node.create(&parts);
                cursor = join(base, &parts);
            }
            CommandKind::DeleteKey => {
                let parts = segments(&command.name).map_err(fail)?;
                let path = join(base, &parts);
                let (last, parent) = path.split_last().ok_or(fail(Status::INVALID_PARAMETER))?;
                let parent = root.find_mut(parent).ok_or(fail(Status::FILE_NOT_FOUND))?;
                parent.keys.remove(last).ok_or(fail(Status::FILE_NOT_FOUND))?;
            }
            CommandKind::SetValue => {
                let node = root.find_mut(&cursor).ok_or(fail(Status::KEY_DELETED))?;
                node.set(&command.name, command.value.clone());
            }
            CommandKind::DeleteValue => {
                let node = root.find_mut(&cursor).ok_or(fail(Status::KEY_DELETED))?;
                node.values
                    .remove(&fold(&command.name))
                    .ok_or(fail(Status::FILE_NOT_FOUND))?;
            }
            CommandKind::ConditionExists
            | CommandKind::ConditionNotExists
            | CommandKind::ConditionIsEqual
            | CommandKind::ConditionIsNotEqual => {
                let node = root.find(&cursor).ok_or(fail(Status::KEY_DELETED))?;
                check_condition(command, node.value(&command.name)).map_err(fail)?;
            }
        }
    }
    Ok(())
}

fn check_condition(command: &Staged, current: Option<&Value>) -> std::result::Result<(), Status> {
    match (command.kind, current) {
        (CommandKind::ConditionExists, None) => Err(Status::FILE_NOT_FOUND),
        (CommandKind::ConditionNotExists, Some(_)) => Err(Status::ALREADY_EXISTS),
        (CommandKind::ConditionIsEqual, None) => Err(Status::FILE_NOT_FOUND),
        (CommandKind::ConditionIsEqual, Some(v)) if *v != command.value => {
            Err(Status::REVISION_MISMATCH)
        }
        (CommandKind::ConditionIsNotEqual, Some(v)) if *v == command.value => {
            Err(Status::REVISION_MISMATCH)
        }
        _ => Ok(()),
    }
}

impl ClusterApi for MemoryCluster {
    fn open_cluster(&self, name: Option<&str>) -> std::result::Result<RawCluster, Status> {
        let mut state = self.state.lock();
        if let Some(name) = name {
            if fold(name) != fold(&state.cluster_name) {
                return Err(Status::RPC_SERVER_UNAVAILABLE);
            }
        }
        Ok(RawCluster(state.insert(Handle::Cluster)))
    }

    fn close_cluster(&self, cluster: RawCluster) -> std::result::Result<(), Status> {
        let mut state = self.state.lock();
        match state.handles.get(&cluster.0) {
            Some(Handle::Cluster) => {
                state.handles.remove(&cluster.0);
                Ok(())
            }
            _ => Err(Status::INVALID_HANDLE),
        }
    }

    fn open_resource(&self, cluster: RawCluster, name: &str) -> std::result::Result<RawResource, Status> {
        let mut state = self.state.lock();
        if !matches!(state.handles.get(&cluster.0), Some(Handle::Cluster)) {
            return Err(Status::INVALID_HANDLE);
        }
        let folded = fold(name);
        if !state.resources.contains_key(&folded) {
            return Err(Status::RESOURCE_NOT_FOUND);
        }
        Ok(RawResource(state.insert(Handle::Resource { folded })))
    }

    fn close_resource(&self, resource: RawResource) -> std::result::Result<(), Status> {
        let mut state = self.state.lock();
        match state.handles.get(&resource.0) {
            Some(Handle::Resource { .. }) => {
                state.handles.remove(&resource.0);
                Ok(())
            }
            _ => Err(Status::INVALID_HANDLE),
        }
    }

    fn cluster_key(&self, cluster: RawCluster, access: AccessMask) -> std::result::Result<RawKey, Status> {
        let mut state = self.state.lock();
        if !matches!(state.handles.get(&cluster.0), Some(Handle::Cluster)) {
            return Err(Status::INVALID_HANDLE);
        }
        Ok(RawKey(state.insert(Handle::Key {
            path: Vec::new(),
            access,
        })))
    }

    fn resource_key(&self, resource: RawResource, access: AccessMask) -> std::result::Result<RawKey, Status> {
        let mut state = self.state.lock();
        let folded = match state.handles.get(&resource.0) {
            Some(Handle::Resource { folded }) => folded.clone(),
            _ => return Err(Status::INVALID_HANDLE),
        };
        let path = vec![fold(RESOURCES_KEY), folded];
        if state.root.find(&path).is_none() {
            return Err(Status::FILE_NOT_FOUND);
        }
        Ok(RawKey(state.insert(Handle::Key { path, access })))
    }

    fn create_key(
        &self,
        key: RawKey,
        name: &str,
        access: AccessMask,
    ) -> std::result::Result<(RawKey, Disposition), Status> {
        let mut state = self.state.lock();
        let (base, granted) = state.key(key)?;
        let parts = segments(name)?;
        let path = join(&base, &parts);
        let disposition = if state.root.find(&path).is_some() {
            Disposition::OpenedExisting
        } else {
            require(granted, AccessMask::CREATE_SUB_KEY)?;
            state.node_mut(&base)?.create(&parts);
            Disposition::CreatedNew
        };
        trace!(name, ?disposition, "create key");
        Ok((RawKey(state.insert(Handle::Key { path, access })), disposition))
    }

    fn open_key(&self, key: RawKey, name: &str, access: AccessMask) -> std::result::Result<RawKey, Status> {
        let mut state = self.state.lock();
        let (base, _) = state.key(key)?;
        let path = join(&base, &segments(name)?);
        if state.root.find(&path).is_none() {
            return Err(Status::FILE_NOT_FOUND);
        }
        Ok(RawKey(state.insert(Handle::Key { path, access })))
    }

    fn delete_key(&self, key: RawKey, name: &str) -> std::result::Result<(), Status> {
        let mut state = self.state.lock();
        let (base, access) = state.key(key)?;
        require(access, AccessMask::WRITE)?;
        let path = join(&base, &segments(name)?);
        let (last, parent) = path.split_last().ok_or(Status::INVALID_PARAMETER)?;
        let parent = state.root.find_mut(parent).ok_or(Status::FILE_NOT_FOUND)?;
        parent.keys.remove(last).ok_or(Status::FILE_NOT_FOUND)?;
        Ok(())
    }

    fn close_key(&self, key: RawKey) -> std::result::Result<(), Status> {
        let mut state = self.state.lock();
        match state.handles.get(&key.0) {
            Some(Handle::Key { .. }) => {
                state.handles.remove(&key.0);
                Ok(())
            }
            _ => Err(Status::INVALID_HANDLE),
        }
    }

    fn set_value(
        &self,
        key: RawKey,
        name: &str,
        value_type: ValueType,
        data: &[u8],
    ) -> std::result::Result<(), Status> {
        let mut state = self.state.lock();
        let (path, access) = state.key(key)?;
        require(access, AccessMask::SET_VALUE)?;
        state.node_mut(&path)?.set(name, Value::new(value_type, data));
        Ok(())
    }

    fn delete_value(&self, key: RawKey, name: &str) -> std::result::Result<(), Status> {
        let mut state = self.state.lock();
        let (path, access) = state.key(key)?;
        require(access, AccessMask::SET_VALUE)?;
        state
            .node_mut(&path)?
            .values
            .remove(&fold(name))
            .map(|_| ())
            .ok_or(Status::FILE_NOT_FOUND)
    }

    fn query_value(
        &self,
        key: RawKey,
        name: &str,
        data: &mut [u8],
    ) -> std::result::Result<QueriedValue, Status> {
        let state = self.state.lock();
        let (path, access) = state.key(key)?;
        require(access, AccessMask::QUERY_VALUE)?;
        let value = state.node(&path)?.value(name).ok_or(Status::FILE_NOT_FOUND)?;
        if data.len() < value.data.len() {
            return Err(Status::MORE_DATA);
        }
        data[..value.data.len()].copy_from_slice(&value.data);
        Ok(QueriedValue {
            value_type: value.value_type,
            data_len: value.data.len(),
        })
    }

    fn enum_value(
        &self,
        key: RawKey,
        index: u32,
        name: &mut [u16],
        data: &mut [u8],
    ) -> std::result::Result<EnumeratedValue, Status> {
        let state = self.state.lock();
        let (path, access) = state.key(key)?;
        require(access, AccessMask::QUERY_VALUE)?;
        let stored = state
            .node(&path)?
            .values
            .values()
            .nth(index as usize)
            .ok_or(Status::NO_MORE_ITEMS)?;
        let name_len = write_name(&stored.name, name)?;
        if data.len() < stored.value.data.len() {
            return Err(Status::MORE_DATA);
        }
        data[..stored.value.data.len()].copy_from_slice(&stored.value.data);
        Ok(EnumeratedValue {
            value_type: stored.value.value_type,
            name_len,
            data_len: stored.value.data.len(),
        })
    }

    fn enum_key(&self, key: RawKey, index: u32, name: &mut [u16]) -> std::result::Result<usize, Status> {
        let state = self.state.lock();
        let (path, access) = state.key(key)?;
        require(access, AccessMask::ENUMERATE_SUB_KEYS)?;
        let child = state
            .node(&path)?
            .keys
            .values()
            .nth(index as usize)
            .ok_or(Status::NO_MORE_ITEMS)?;
        write_name(&child.name, name)
    }

    fn create_batch(&self, key: RawKey) -> std::result::Result<RawBatch, Status> {
        let mut state = self.state.lock();
        let (path, access) = state.key(key)?;
        require(access, AccessMask::SET_VALUE)?;
        Ok(RawBatch(state.insert(Handle::Batch {
            path,
            commands: Vec::new(),
        })))
    }

    fn batch_add_command(
        &self,
        batch: RawBatch,
        kind: CommandKind,
        name: &str,
        value_type: ValueType,
        data: &[u8],
    ) -> std::result::Result<(), Status> {
        let mut state = self.state.lock();
        match state.handles.get_mut(&batch.0) {
            Some(Handle::Batch { commands, .. }) => {
                commands.push(Staged {
                    kind,
                    name: name.to_string(),
                    value: Value::new(value_type, data),
                });
                Ok(())
            }
            _ => Err(Status::INVALID_HANDLE),
        }
    }

    fn close_batch(&self, batch: RawBatch, commit: bool) -> BatchClose {
        let mut state = self.state.lock();
        let (path, commands) = match state.handles.remove(&batch.0) {
            Some(Handle::Batch { path, commands }) => (path, commands),
            Some(other) => {
                // Not a batch: put it back untouched.
                state.handles.insert(batch.0, other);
                return BatchClose {
                    status: Status::INVALID_HANDLE,
                    failed_command: -1,
                };
            }
            None => {
                return BatchClose {
                    status: Status::INVALID_HANDLE,
                    failed_command: -1,
                }
            }
        };
        if !commit {
            return BatchClose::ok();
        }

        let malformed = commands.iter().any(|c| {
            matches!(c.kind, CommandKind::CreateKey | CommandKind::DeleteKey)
                && segments(&c.name).is_err()
        });
        if malformed {
            return BatchClose {
                status: Status::INVALID_PARAMETER,
                failed_command: -1,
            };
        }

        // Work on a copy so a failure leaves the live tree untouched.
        let mut staged = state.root.clone();
        match apply(&mut staged, &path, &commands) {
            Ok(()) => {
                state.root = staged;
                BatchClose::ok()
            }
            Err((status, failed_command)) => BatchClose {
                status,
                failed_command,
            },
        }
    }
}
