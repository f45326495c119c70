//! Provider-owned result buffers.
//!
//! A [`RemoteBuffer`] is memory the process can read but does not own. The
//! only way to release it is [`CryptoApi::free`], which its `Drop` calls
//! exactly once, whether or not the bytes were copied out successfully.

use std::fmt;

use tracing::{trace, warn};

use crate::api::{CryptoApi, RawAllocation};
use crate::error::{CryptoError, Result};

pub struct RemoteBuffer<'a, A: CryptoApi + ?Sized> {
    api: &'a A,
    allocation: RawAllocation,
}

impl<'a, A: CryptoApi + ?Sized> RemoteBuffer<'a, A> {
    /// Take ownership of an allocation returned by `api`.
    pub fn new(api: &'a A, allocation: RawAllocation) -> Self {
        RemoteBuffer { api, allocation }
    }

    pub fn len(&self) -> usize {
        self.allocation.len
    }

    pub fn is_empty(&self) -> bool {
        self.allocation.len == 0
    }

    /// Copy exactly the reported number of bytes into a local vector.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.allocation.len];
        self.api
            .copy_out(self.allocation, &mut out)
            .map_err(|status| CryptoError::Native {
                operation: "copy result",
                status,
            })?;
        Ok(out)
    }
}

impl<A: CryptoApi + ?Sized> Drop for RemoteBuffer<'_, A> {
    fn drop(&mut self) {
        match self.api.free(self.allocation) {
            Ok(()) => trace!(len = self.allocation.len, "released provider allocation"),
            Err(status) => warn!(%status, "failed to release provider allocation"),
        }
    }
}

impl<A: CryptoApi + ?Sized> fmt::Debug for RemoteBuffer<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBuffer")
            .field("allocation", &self.allocation)
            .finish()
    }
}
