//! Cluster and resource handles.
//!
//! Thin owners of the raw connection and resource handles. Each closes its
//! handle on drop; keys obtained from them borrow the same [`ClusterApi`]
//! and are independent of the handle they came from.

use std::fmt;

use tracing::{info, warn};

use crate::api::{AccessMask, ClusterApi, RawCluster, RawResource};
use crate::buffer::BufferPolicy;
use crate::error::{Result, StoreError};
use crate::key::{check_name, Key};

/// A connection to a cluster.
pub struct Cluster<'a, A: ClusterApi + ?Sized> {
    api: &'a A,
    raw: RawCluster,
    name: Option<String>,
    policy: BufferPolicy,
}

impl<'a, A: ClusterApi + ?Sized> Cluster<'a, A> {
    /// Connect to the cluster this node belongs to.
    pub fn open(api: &'a A) -> Result<Self> {
        Self::connect(api, None)
    }

    /// Connect to a named cluster.
    pub fn open_remote(api: &'a A, name: &str) -> Result<Self> {
        check_name(name)?;
        Self::connect(api, Some(name))
    }

    fn connect(api: &'a A, name: Option<&str>) -> Result<Self> {
        let raw = api
            .open_cluster(name)
            .map_err(|s| StoreError::from_status("open cluster", name.unwrap_or("."), s))?;
        info!(cluster = name.unwrap_or("."), "connected to cluster");
        Ok(Cluster {
            api,
            raw,
            name: name.map(str::to_string),
            policy: BufferPolicy::default(),
        })
    }

    /// Buffer policy handed to every key opened through this connection.
    pub fn with_policy(mut self, policy: BufferPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Root key of the cluster database.
    pub fn root_key(&self, access: AccessMask) -> Result<Key<'a, A>> {
        let raw = self
            .api
            .cluster_key(self.raw, access)
            .map_err(|s| StoreError::from_status("open cluster key", "", s))?;
        Ok(Key::from_raw(self.api, raw, "", self.policy))
    }

    pub fn open_resource(&self, name: &str) -> Result<Resource<'a, A>> {
        check_name(name)?;
        let raw = self
            .api
            .open_resource(self.raw, name)
            .map_err(|s| StoreError::from_status("open resource", name, s))?;
        Ok(Resource {
            api: self.api,
            raw,
            name: name.to_string(),
            policy: self.policy,
        })
    }
}

impl<A: ClusterApi + ?Sized> Drop for Cluster<'_, A> {
    fn drop(&mut self) {
        if let Err(status) = self.api.close_cluster(self.raw) {
            warn!(%status, "failed to close cluster");
        }
    }
}

impl<A: ClusterApi + ?Sized> fmt::Debug for Cluster<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cluster")
            .field("raw", &self.raw)
            .field("name", &self.name)
            .finish()
    }
}

/// An open cluster resource.
pub struct Resource<'a, A: ClusterApi + ?Sized> {
    api: &'a A,
    raw: RawResource,
    name: String,
    policy: BufferPolicy,
}

impl<'a, A: ClusterApi + ?Sized> Resource<'a, A> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The key holding this resource's configuration.
    pub fn key(&self, access: AccessMask) -> Result<Key<'a, A>> {
        let raw = self
            .api
            .resource_key(self.raw, access)
            .map_err(|s| StoreError::from_status("open resource key", &self.name, s))?;
        Ok(Key::from_raw(self.api, raw, "", self.policy))
    }
}

impl<A: ClusterApi + ?Sized> Drop for Resource<'_, A> {
    fn drop(&mut self) {
        if let Err(status) = self.api.close_resource(self.raw) {
            warn!(resource = %self.name, %status, "failed to close resource");
        }
    }
}

impl<A: ClusterApi + ?Sized> fmt::Debug for Resource<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("raw", &self.raw)
            .field("name", &self.name)
            .finish()
    }
}
