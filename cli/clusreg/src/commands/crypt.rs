//! `clusreg encrypt|decrypt` — payload round trips through the resource's
//! crypto provider.
//!
//! Input and output are each either a file or a binary value on a key, so a
//! payload can be encrypted straight into the registry and read back.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clusreg_crypto::{CryptoApi, CryptoProvider, Direction, MemoryCrypto, ProviderType};
use tracing::info;

use super::{with_key, Session};
use crate::config::{Backend, Config};

/// Where payload bytes come from or go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    File(PathBuf),
    Value { key: String, name: String },
}

impl Endpoint {
    /// Pick the file when given, otherwise the registry value.
    pub fn resolve(file: Option<PathBuf>, key: &str, value: Option<String>, role: &str) -> Result<Self> {
        match (file, value) {
            (Some(_), Some(_)) => bail!("give either a file or --{role}-value, not both"),
            (Some(path), None) => Ok(Endpoint::File(path)),
            (None, Some(name)) => Ok(Endpoint::Value {
                key: key.to_string(),
                name,
            }),
            (None, None) => bail!("missing {role}: give --{role} FILE or --{role}-value NAME"),
        }
    }

    fn read(&self, session: &Session) -> Result<Vec<u8>> {
        match self {
            Endpoint::File(path) => {
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))
            }
            Endpoint::Value { key, name } => with_key(session, key, false, |k| {
                k.query_binary(name)
                    .with_context(|| format!("reading '{name}'"))
            }),
        }
    }

    fn write(&self, session: &Session, data: &[u8]) -> Result<()> {
        match self {
            Endpoint::File(path) => {
                std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
            }
            Endpoint::Value { key, name } => with_key(session, key, true, |k| {
                k.set_binary(name, data)
                    .with_context(|| format!("writing '{name}'"))
            }),
        }
    }
}

pub fn run(session: &Session, direction: Direction, input: &Endpoint, output: &Endpoint) -> Result<()> {
    let data = input.read(session)?;
    let result = match session.config.store.backend {
        Backend::Snapshot => {
            transform(&snapshot_crypto(&session.config), &session.config, direction, &data)?
        }
        #[cfg(windows)]
        Backend::Native => {
            let native = clusreg_crypto::NativeCrypto::load().context("loading crypto API")?;
            transform(&native, &session.config, direction, &data)?
        }
        #[cfg(not(windows))]
        Backend::Native => bail!("the native backend is only available on Windows"),
    };
    output.write(session, &result)?;
    info!(%direction, input = data.len(), output = result.len(), "payload transformed");
    println!("{}ed {} bytes into {} bytes", capitalised(direction), data.len(), result.len());
    Ok(())
}

/// Run one round trip with a provider opened from the configuration.
pub fn transform<A: CryptoApi + ?Sized>(
    api: &A,
    config: &Config,
    direction: Direction,
    data: &[u8],
) -> Result<Vec<u8>> {
    let Some(resource) = config.cluster.resource.as_deref() else {
        bail!("encryption needs [cluster] resource in clusreg.toml");
    };
    let crypto = &config.crypto;
    let provider_type = ProviderType(crypto.provider_type);
    let provider = match crypto.key.as_deref() {
        Some(key) => CryptoProvider::open_with_key(
            api,
            resource,
            key,
            &crypto.provider,
            provider_type,
            crypto.flags(),
        ),
        None => CryptoProvider::open(api, resource, &crypto.provider, provider_type, crypto.flags()),
    }
    .with_context(|| format!("opening crypto provider for '{resource}'"))?;

    let out = match direction {
        Direction::Encrypt => provider.encrypt(data),
        Direction::Decrypt => provider.decrypt(data),
    };
    out.with_context(|| format!("{direction} failed"))
}

/// The in-process provider for the snapshot backend.
///
/// It is keyed with the configured secret, or the cluster name, so that one
/// snapshot decrypts its own payloads. Containers are not persisted, so the
/// configured one is registered up front and `create_container = false`
/// behaves like a cluster where it already exists.
fn snapshot_crypto(config: &Config) -> MemoryCrypto {
    let secret = config
        .crypto
        .secret
        .clone()
        .or_else(|| config.cluster.name.clone())
        .unwrap_or_default();
    let crypto = MemoryCrypto::with_secret(secret.as_bytes());
    if let Some(resource) = config.cluster.resource.as_deref() {
        crypto.add_container(resource, config.crypto.key.as_deref());
    }
    crypto
}

fn capitalised(direction: Direction) -> &'static str {
    match direction {
        Direction::Encrypt => "Encrypt",
        Direction::Decrypt => "Decrypt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        config.cluster.resource = Some("r1".to_string());
        config
    }

    #[test]
    fn transform_round_trip() {
        let crypto = MemoryCrypto::with_secret(b"s");
        let sealed = transform(&crypto, &config(), Direction::Encrypt, b"payload").unwrap();
        let plain = transform(&crypto, &config(), Direction::Decrypt, &sealed).unwrap();
        assert_eq!(plain, b"payload");
        assert_eq!(crypto.stats().outstanding, 0);
    }

    #[test]
    fn transform_needs_a_resource() {
        let crypto = MemoryCrypto::new();
        let err = transform(&crypto, &Config::default(), Direction::Encrypt, b"x").unwrap_err();
        assert!(err.to_string().contains("resource"));
    }

    #[test]
    fn snapshot_provider_works_without_container_creation() {
        let mut config = config();
        config.crypto.create_container = false;
        config.crypto.key = Some("payloads".to_string());

        let sealed =
            transform(&snapshot_crypto(&config), &config, Direction::Encrypt, b"payload").unwrap();
        // A fresh provider, as on the next command run.
        let plain =
            transform(&snapshot_crypto(&config), &config, Direction::Decrypt, &sealed).unwrap();
        assert_eq!(plain, b"payload");
    }

    #[test]
    fn endpoint_resolution() {
        assert_eq!(
            Endpoint::resolve(Some(PathBuf::from("f")), ".", None, "input").unwrap(),
            Endpoint::File(PathBuf::from("f"))
        );
        assert_eq!(
            Endpoint::resolve(None, "k", Some("v".to_string()), "input").unwrap(),
            Endpoint::Value {
                key: "k".to_string(),
                name: "v".to_string()
            }
        );
        assert!(Endpoint::resolve(None, ".", None, "output").is_err());
        assert!(Endpoint::resolve(Some(PathBuf::from("f")), ".", Some("v".to_string()), "output").is_err());
    }
}
