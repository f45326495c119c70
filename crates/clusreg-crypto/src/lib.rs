//! Encrypt and decrypt payloads through a cluster crypto provider.
//!
//! The provider allocates every result itself and must be told to release
//! it. [`CryptoProvider`] runs that round trip: stage the input, call the
//! provider, copy the result out of a [`RemoteBuffer`], and let the buffer
//! hand the allocation back on drop.
//!
//! ## Modules
//!
//! - [`api`] — the raw entry-point seam ([`CryptoApi`])
//! - [`staging`] — caller-owned input buffers
//! - [`remote`] — provider-owned result buffers
//! - [`provider`] — the provider handle and the round trip
//! - [`memory`] — in-process provider implementing [`CryptoApi`]
//! - `native` — the cluster's resource utility entry points (Windows only)

pub mod api;
pub mod error;
pub mod memory;
pub mod provider;
pub mod remote;
pub mod staging;
#[cfg(windows)]
pub mod native;

pub use api::{CryptoApi, Direction, OpenFlags, ProviderType, RawAllocation, MS_ENH_RSA_AES_PROV};
pub use error::{CryptoError, Result};
pub use memory::{AllocationStats, MemoryCrypto};
#[cfg(windows)]
pub use native::NativeCrypto;
pub use provider::CryptoProvider;
pub use remote::RemoteBuffer;
pub use staging::StagingBuffer;
