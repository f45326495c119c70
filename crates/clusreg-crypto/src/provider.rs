//! Crypto-provider handles and the encrypt/decrypt round trip.

use std::fmt;

use tracing::{debug, warn};

use crate::api::{CryptoApi, Direction, OpenFlags, ProviderType, RawProvider};
use crate::error::{CryptoError, Result};
use crate::remote::RemoteBuffer;
use crate::staging::StagingBuffer;

/// An open crypto provider bound to a cluster resource.
pub struct CryptoProvider<'a, A: CryptoApi + ?Sized> {
    api: &'a A,
    raw: RawProvider,
    resource: String,
}

impl<'a, A: CryptoApi + ?Sized> CryptoProvider<'a, A> {
    /// Open the resource's default key container.
    pub fn open(
        api: &'a A,
        resource: &str,
        provider: &str,
        provider_type: ProviderType,
        flags: OpenFlags,
    ) -> Result<Self> {
        Self::connect(api, resource, None, provider, provider_type, flags)
    }

    /// Open a named key container within the resource.
    pub fn open_with_key(
        api: &'a A,
        resource: &str,
        key: &str,
        provider: &str,
        provider_type: ProviderType,
        flags: OpenFlags,
    ) -> Result<Self> {
        Self::connect(api, resource, Some(key), provider, provider_type, flags)
    }

    fn connect(
        api: &'a A,
        resource: &str,
        key: Option<&str>,
        provider: &str,
        provider_type: ProviderType,
        flags: OpenFlags,
    ) -> Result<Self> {
        for name in [Some(resource), key, Some(provider)].into_iter().flatten() {
            if name.contains('\0') {
                return Err(CryptoError::InvalidName {
                    name: name.to_string(),
                });
            }
        }
        let raw = api
            .open_provider(resource, key, provider, provider_type, flags)
            .map_err(|status| CryptoError::Native {
                operation: "open crypto provider",
                status,
            })?;
        debug!(resource, key, provider, "opened crypto provider");
        Ok(CryptoProvider {
            api,
            raw,
            resource: resource.to_string(),
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.round_trip(Direction::Encrypt, data)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.round_trip(Direction::Decrypt, data)
    }

    fn round_trip(&self, direction: Direction, data: &[u8]) -> Result<Vec<u8>> {
        let staged = StagingBuffer::new(data);
        let allocation = self
            .api
            .transform(self.raw, direction, &staged)
            .map_err(|status| CryptoError::Native {
                operation: direction.as_str(),
                status,
            })?;
        let result = RemoteBuffer::new(self.api, allocation);
        let out = result.to_vec()?;
        debug!(%direction, input = data.len(), output = out.len(), "crypto round trip");
        Ok(out)
    }
}

impl<A: CryptoApi + ?Sized> Drop for CryptoProvider<'_, A> {
    fn drop(&mut self) {
        if let Err(status) = self.api.close_provider(self.raw) {
            warn!(resource = %self.resource, %status, "failed to close crypto provider");
        }
    }
}

impl<A: CryptoApi + ?Sized> fmt::Debug for CryptoProvider<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoProvider")
            .field("raw", &self.raw)
            .field("resource", &self.resource)
            .finish()
    }
}
