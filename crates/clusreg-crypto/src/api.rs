//! The raw entry-point seam for cluster crypto providers.

use std::fmt;

use clusreg_core::Status;

use crate::staging::StagingBuffer;

/// Well-known name of the enhanced RSA/AES provider.
pub const MS_ENH_RSA_AES_PROV: &str = "Microsoft Enhanced RSA and AES Cryptographic Provider";

/// Raw crypto-provider handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawProvider(pub usize);

/// A result buffer allocated and owned by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawAllocation {
    pub address: usize,
    pub len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Encrypt => "encrypt",
            Direction::Decrypt => "decrypt",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cryptographic service provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderType(pub u32);

impl ProviderType {
    pub const RSA_FULL: ProviderType = ProviderType(1);
    pub const RSA_SIG: ProviderType = ProviderType(2);
    pub const DSS: ProviderType = ProviderType(3);
    pub const FORTEZZA: ProviderType = ProviderType(4);
    pub const MS_EXCHANGE: ProviderType = ProviderType(5);
    pub const SSL: ProviderType = ProviderType(6);
    pub const RSA_SCHANNEL: ProviderType = ProviderType(12);
    pub const DSS_DH: ProviderType = ProviderType(13);
    pub const EC_ECDSA_SIG: ProviderType = ProviderType(14);
    pub const EC_ECNRA_SIG: ProviderType = ProviderType(15);
    pub const EC_ECDSA_FULL: ProviderType = ProviderType(16);
    pub const EC_ECNRA_FULL: ProviderType = ProviderType(17);
    pub const DH_SCHANNEL: ProviderType = ProviderType(18);
    pub const SPYRUS_LYNKS: ProviderType = ProviderType(20);
    pub const RNG: ProviderType = ProviderType(21);
    pub const INTEL_SEC: ProviderType = ProviderType(22);
    pub const REPLACE_OWF: ProviderType = ProviderType(23);
    pub const RSA_AES: ProviderType = ProviderType(24);
}

/// Flags for opening a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const NONE: OpenFlags = OpenFlags(0);
    /// Create the key container if the resource does not have one yet.
    pub const CREATE_CONTAINER_IF_NOT_FOUND: OpenFlags = OpenFlags(1);

    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// The provider entry points.
///
/// Every successful [`CryptoApi::transform`] hands back an allocation the
/// caller must return through [`CryptoApi::free`] exactly once, after
/// copying it out with [`CryptoApi::copy_out`].
pub trait CryptoApi {
    /// Open a provider bound to `resource`, optionally to a named key within it.
    fn open_provider(
        &self,
        resource: &str,
        key: Option<&str>,
        provider: &str,
        provider_type: ProviderType,
        flags: OpenFlags,
    ) -> Result<RawProvider, Status>;
    fn close_provider(&self, provider: RawProvider) -> Result<(), Status>;

    /// Encrypt or decrypt the staged bytes into a provider-owned allocation.
    fn transform(
        &self,
        provider: RawProvider,
        direction: Direction,
        input: &StagingBuffer,
    ) -> Result<RawAllocation, Status>;

    /// Copy the whole allocation into `out`, which is exactly `allocation.len` long.
    fn copy_out(&self, allocation: RawAllocation, out: &mut [u8]) -> Result<(), Status>;

    /// Return an allocation to the provider.
    fn free(&self, allocation: RawAllocation) -> Result<(), Status>;
}
