//! `clusreg.toml` parsing.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clusreg_crypto::{OpenFlags, ProviderType, MS_ENH_RSA_AES_PROV};
use clusreg_store::{BufferPolicy, Growth};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "clusreg.toml";

/// The top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub buffers: BuffersConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
}

/// Which cluster and which part of its registry to work on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Remote cluster name. The local cluster when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Resource whose key is the root for key paths. The cluster root when absent.
    #[serde(default)]
    pub resource: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process store persisted to a JSON file.
    #[default]
    Snapshot,
    /// The cluster service itself (Windows only).
    Native,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Snapshot file, relative to the directory holding `clusreg.toml`.
    pub snapshot: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: Backend::Snapshot,
            snapshot: PathBuf::from(".clusreg/store.json"),
        }
    }
}

/// Read-buffer sizing, see [`BufferPolicy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuffersConfig {
    pub name_initial: usize,
    pub name_increment: usize,
    pub data_initial: usize,
    pub data_increment: usize,
    pub limit: usize,
}

impl Default for BuffersConfig {
    fn default() -> Self {
        let policy = BufferPolicy::default();
        BuffersConfig {
            name_initial: policy.name.initial,
            name_increment: policy.name.increment,
            data_initial: policy.data.initial,
            data_increment: policy.data.increment,
            limit: policy.limit,
        }
    }
}

impl BuffersConfig {
    pub fn policy(&self) -> BufferPolicy {
        BufferPolicy {
            name: Growth::new(self.name_initial, self.name_increment),
            data: Growth::new(self.data_initial, self.data_increment),
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    pub provider: String,
    pub provider_type: u32,
    /// Create the resource's key container on first use.
    pub create_container: bool,
    /// Named key container within the resource.
    pub key: Option<String>,
    /// Key material for the snapshot backend's provider.
    pub secret: Option<String>,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        CryptoConfig {
            provider: MS_ENH_RSA_AES_PROV.to_string(),
            provider_type: ProviderType::RSA_AES.0,
            create_container: true,
            key: None,
            secret: None,
        }
    }
}

impl CryptoConfig {
    pub fn flags(&self) -> OpenFlags {
        if self.create_container {
            OpenFlags::CREATE_CONTAINER_IF_NOT_FOUND
        } else {
            OpenFlags::NONE
        }
    }
}

impl Config {
    /// Search upward from `start_dir` for a `clusreg.toml`, returning it and
    /// the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Ok(Some((Self::load(&candidate)?, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Absolute location of the snapshot file.
    pub fn snapshot_path(&self, config_dir: &Path) -> PathBuf {
        config_dir.join(&self.store.snapshot)
    }

    /// A commented starter configuration.
    pub fn template(cluster: Option<&str>, resource: Option<&str>) -> String {
        let line = |key: &str, value: Option<&str>| match value {
            Some(v) => format!("{key} = {v:?}\n"),
            None => format!("# {key} = \"\"\n"),
        };
        let defaults = BuffersConfig::default();
        format!(
            "[cluster]\n{}{}\n\
             [store]\n\
             backend = \"snapshot\"\n\
             snapshot = \".clusreg/store.json\"\n\n\
             [buffers]\n\
             name_initial = {}\n\
             name_increment = {}\n\
             data_initial = {}\n\
             data_increment = {}\n\
             limit = {}\n\n\
             [crypto]\n\
             provider = {:?}\n\
             provider_type = {}\n\
             create_container = true\n",
            line("name", cluster),
            line("resource", resource),
            defaults.name_initial,
            defaults.name_increment,
            defaults.data_initial,
            defaults.data_increment,
            defaults.limit,
            MS_ENH_RSA_AES_PROV,
            ProviderType::RSA_AES.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.store.backend, Backend::Snapshot);
        assert_eq!(config.buffers.policy(), BufferPolicy::default());
        assert!(config.cluster.name.is_none());
        assert_eq!(config.crypto.flags(), OpenFlags::CREATE_CONTAINER_IF_NOT_FOUND);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[cluster]
resource = "Disk 1"

[buffers]
data_initial = 8

[crypto]
create_container = false
"#,
        )
        .unwrap();
        assert_eq!(config.cluster.resource.as_deref(), Some("Disk 1"));
        assert_eq!(config.buffers.data_initial, 8);
        assert_eq!(config.buffers.data_increment, 256);
        assert_eq!(config.crypto.flags(), OpenFlags::NONE);
        assert_eq!(config.crypto.provider, MS_ENH_RSA_AES_PROV);
    }

    #[test]
    fn template_parses() {
        let config: Config = toml::from_str(&Config::template(Some("prod"), None)).unwrap();
        assert_eq!(config.cluster.name.as_deref(), Some("prod"));
        assert!(config.cluster.resource.is_none());
        assert_eq!(config.crypto.provider_type, 24);
    }

    #[test]
    fn find_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[store]\nbackend = \"snapshot\"\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let (_, found) = Config::find_and_load(&nested).unwrap().unwrap();
        assert_eq!(found, dir.path());
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let err = toml::from_str::<Config>("[store]\nbackend = \"carrier-pigeon\"\n").unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }
}
