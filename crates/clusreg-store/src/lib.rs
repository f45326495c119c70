//! Client for the clustered configuration registry.
//!
//! The registry is a replicated key/value tree owned by the cluster service.
//! This crate wraps its handle-based entry points with owned handle types,
//! a capacity-negotiating read path, and an atomic batch engine.
//!
//! ## Modules
//!
//! - [`api`] — the raw entry-point seam ([`ClusterApi`]) and handle types
//! - [`buffer`] — growing-buffer negotiation for variable-length reads
//! - [`handle`] — cluster and resource handles
//! - [`key`] — registry keys and value CRUD
//! - [`batch`] — conditional, all-or-nothing batches
//! - [`memory`] — in-process store implementing [`ClusterApi`]
//! - `native` — the cluster service's own entry points (Windows only)

pub mod api;
pub mod batch;
pub mod buffer;
pub mod error;
pub mod handle;
pub mod key;
pub mod memory;
#[cfg(windows)]
pub mod native;

pub use api::{AccessMask, ClusterApi, CommandKind, Disposition};
pub use batch::{Batch, BatchCommand, BatchFailure, FailedStep};
pub use buffer::{BufferPolicy, Growth};
pub use error::{Result, StoreError};
pub use handle::{Cluster, Resource};
pub use key::Key;
pub use memory::MemoryCluster;
#[cfg(windows)]
pub use native::NativeCluster;

pub use clusreg_core::{Guid, Status, Value, ValueType};
