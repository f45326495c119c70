//! In-process crypto provider.
//!
//! [`MemoryCrypto`] stands in for the cluster provider off-cluster. Key
//! containers are derived from the resource, key and provider names plus an
//! optional secret, so two instances with the same secret read each
//! other's output. The cipher is a SHA-256 counter-mode keystream with a
//! truncated SHA-256 integrity tag:
//!
//! ```text
//! nonce (16) ‖ plaintext ⊕ keystream ‖ tag (16)
//! ```
//!
//! Every result is handed out as a tracked allocation so tests can check
//! that each one is freed exactly once.

use std::collections::{BTreeSet, HashMap};

use clusreg_core::Status;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::api::{CryptoApi, Direction, OpenFlags, ProviderType, RawAllocation, RawProvider};
use crate::staging::StagingBuffer;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Default)]
pub struct MemoryCrypto {
    secret: Vec<u8>,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeSet<String>,
    providers: HashMap<usize, [u8; 32]>,
    allocations: HashMap<usize, Vec<u8>>,
    next_handle: usize,
    counter: u64,
    allocated: u64,
    freed: u64,
    fail_copy_out: bool,
}

/// Allocation bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    pub allocated: u64,
    pub freed: u64,
    pub outstanding: usize,
}

impl MemoryCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose keys also depend on `secret`.
    pub fn with_secret(secret: &[u8]) -> Self {
        MemoryCrypto {
            secret: secret.to_vec(),
            state: Mutex::default(),
        }
    }

    /// Make a key container exist without going through an open.
    pub fn add_container(&self, resource: &str, key: Option<&str>) {
        self.state.lock().containers.insert(container_name(resource, key));
    }

    pub fn stats(&self) -> AllocationStats {
        let state = self.state.lock();
        AllocationStats {
            allocated: state.allocated,
            freed: state.freed,
            outstanding: state.allocations.len(),
        }
    }

    /// Make every subsequent `copy_out` fail.
    pub fn fail_copy_out(&self, fail: bool) {
        self.state.lock().fail_copy_out = fail;
    }

    fn derive_key(&self, container: &str, provider: &str, provider_type: ProviderType) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"clusreg-container\0");
        hasher.update(&self.secret);
        hasher.update([0u8]);
        hasher.update(container.as_bytes());
        hasher.update([0u8]);
        hasher.update(provider.as_bytes());
        hasher.update(provider_type.0.to_le_bytes());
        hasher.finalize().into()
    }
}

fn container_name(resource: &str, key: Option<&str>) -> String {
    let resource = resource.to_lowercase();
    match key {
        Some(key) => format!("{resource}\\{}", key.to_lowercase()),
        None => resource,
    }
}

fn keystream_xor(key: &[u8; 32], nonce: &[u8], data: &mut [u8]) {
    for (block, chunk) in data.chunks_mut(32).enumerate() {
        let pad = Sha256::new()
            .chain_update(key)
            .chain_update(nonce)
            .chain_update((block as u64).to_le_bytes())
            .finalize();
        for (byte, p) in chunk.iter_mut().zip(pad.iter()) {
            *byte ^= p;
        }
    }
}

fn tag(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
    let digest = Sha256::new()
        .chain_update(b"tag")
        .chain_update(key)
        .chain_update(nonce)
        .chain_update(ciphertext)
        .finalize();
    let mut out = [0u8; TAG_LEN];
    out.copy_from_slice(&digest[..TAG_LEN]);
    out
}

fn seal(key: &[u8; 32], counter: u64, plaintext: &[u8]) -> Vec<u8> {
    let nonce_digest = Sha256::new()
        .chain_update(b"nonce")
        .chain_update(key)
        .chain_update(counter.to_le_bytes())
        .finalize();
    let nonce = &nonce_digest[..NONCE_LEN];

    let mut out = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
    out.extend_from_slice(nonce);
    out.extend_from_slice(plaintext);
    keystream_xor(key, nonce, &mut out[NONCE_LEN..]);
    let t = tag(key, nonce, &out[NONCE_LEN..]);
    out.extend_from_slice(&t);
    out
}

fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, Status> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(Status::INVALID_DATA);
    }
    let (nonce, rest) = sealed.split_at(NONCE_LEN);
    let (ciphertext, expected) = rest.split_at(rest.len() - TAG_LEN);
    if tag(key, nonce, ciphertext) != expected {
        return Err(Status::INVALID_DATA);
    }
    let mut plaintext = ciphertext.to_vec();
    keystream_xor(key, nonce, &mut plaintext);
    Ok(plaintext)
}

impl CryptoApi for MemoryCrypto {
    fn open_provider(
        &self,
        resource: &str,
        key: Option<&str>,
        provider: &str,
        provider_type: ProviderType,
        flags: OpenFlags,
    ) -> Result<RawProvider, Status> {
        if resource.is_empty() || provider.is_empty() {
            return Err(Status::INVALID_PARAMETER);
        }
        let container = container_name(resource, key);
        let derived = self.derive_key(&container, provider, provider_type);

        let mut state = self.state.lock();
        if !state.containers.contains(&container) {
            if !flags.contains(OpenFlags::CREATE_CONTAINER_IF_NOT_FOUND) {
                return Err(Status::BAD_KEYSET);
            }
            state.containers.insert(container);
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        state.providers.insert(handle, derived);
        Ok(RawProvider(handle))
    }

    fn close_provider(&self, provider: RawProvider) -> Result<(), Status> {
        self.state
            .lock()
            .providers
            .remove(&provider.0)
            .map(|_| ())
            .ok_or(Status::INVALID_HANDLE)
    }

    fn transform(
        &self,
        provider: RawProvider,
        direction: Direction,
        input: &StagingBuffer,
    ) -> Result<RawAllocation, Status> {
        let mut state = self.state.lock();
        let key = *state.providers.get(&provider.0).ok_or(Status::INVALID_HANDLE)?;
        let output = match direction {
            Direction::Encrypt => {
                state.counter += 1;
                seal(&key, state.counter, input.as_slice())
            }
            Direction::Decrypt => open(&key, input.as_slice())?,
        };

        state.next_handle += 1;
        let address = state.next_handle;
        let len = output.len();
        state.allocations.insert(address, output);
        state.allocated += 1;
        trace!(%direction, address, len, "provider allocation");
        Ok(RawAllocation { address, len })
    }

    fn copy_out(&self, allocation: RawAllocation, out: &mut [u8]) -> Result<(), Status> {
        let state = self.state.lock();
        if state.fail_copy_out {
            return Err(Status::INVALID_PARAMETER);
        }
        let data = state
            .allocations
            .get(&allocation.address)
            .ok_or(Status::INVALID_HANDLE)?;
        if data.len() != allocation.len || out.len() != allocation.len {
            return Err(Status::INVALID_PARAMETER);
        }
        out.copy_from_slice(data);
        Ok(())
    }

    fn free(&self, allocation: RawAllocation) -> Result<(), Status> {
        let mut state = self.state.lock();
        state
            .allocations
            .remove(&allocation.address)
            .ok_or(Status::INVALID_HANDLE)?;
        state.freed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open() {
        let key = [7u8; 32];
        for len in [0usize, 1, 31, 32, 33, 100] {
            let plaintext: Vec<u8> = (0..len as u8).collect();
            let sealed = seal(&key, 1, &plaintext);
            assert_eq!(sealed.len(), len + NONCE_LEN + TAG_LEN);
            assert_eq!(open(&key, &sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn tampering_is_detected() {
        let key = [7u8; 32];
        let mut sealed = seal(&key, 1, b"payload");
        sealed[NONCE_LEN] ^= 1;
        assert_eq!(open(&key, &sealed), Err(Status::INVALID_DATA));
        assert_eq!(open(&key, &[0u8; 8]), Err(Status::INVALID_DATA));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let sealed = seal(&[1u8; 32], 1, b"payload");
        assert_eq!(open(&[2u8; 32], &sealed), Err(Status::INVALID_DATA));
    }

    #[test]
    fn missing_container_without_create_flag() {
        let crypto = MemoryCrypto::new();
        let open = |flags| {
            crypto.open_provider("r1", None, "p", ProviderType::RSA_AES, flags)
        };
        assert_eq!(open(OpenFlags::NONE), Err(Status::BAD_KEYSET));
        assert!(open(OpenFlags::CREATE_CONTAINER_IF_NOT_FOUND).is_ok());
        assert!(open(OpenFlags::NONE).is_ok());
    }

    #[test]
    fn double_free_is_refused() {
        let crypto = MemoryCrypto::new();
        let provider = crypto
            .open_provider("r1", None, "p", ProviderType::RSA_AES, OpenFlags::CREATE_CONTAINER_IF_NOT_FOUND)
            .unwrap();
        let allocation = crypto
            .transform(provider, Direction::Encrypt, &StagingBuffer::new(b"x"))
            .unwrap();
        assert_eq!(crypto.free(allocation), Ok(()));
        assert_eq!(crypto.free(allocation), Err(Status::INVALID_HANDLE));
        assert_eq!(
            crypto.stats(),
            AllocationStats {
                allocated: 1,
                freed: 1,
                outstanding: 0
            }
        );
    }
}
