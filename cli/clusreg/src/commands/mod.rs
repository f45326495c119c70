//! CLI command implementations.
//!
//! Every command runs against one [`Session`]: the loaded configuration plus
//! the directory it came from. The store backend is opened per command and,
//! for the snapshot backend, written back after a successful mutation.

pub mod batch;
pub mod crypt;
pub mod guid;
pub mod init;
pub mod value;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clusreg_store::{AccessMask, Cluster, ClusterApi, Key, MemoryCluster};
use tracing::debug;

use crate::config::{Backend, Config};

/// Configuration and where it was found.
#[derive(Debug, Clone)]
pub struct Session {
    pub config: Config,
    pub dir: PathBuf,
}

/// An opened store backend.
pub(crate) enum Store {
    Snapshot { store: MemoryCluster, path: PathBuf },
    #[cfg(windows)]
    Native(clusreg_store::NativeCluster),
}

impl Store {
    pub(crate) fn open(session: &Session) -> Result<Self> {
        match session.config.store.backend {
            Backend::Snapshot => {
                let path = session.config.snapshot_path(&session.dir);
                if !path.is_file() {
                    bail!(
                        "snapshot {} does not exist (run `clusreg init` first)",
                        path.display()
                    );
                }
                let store = MemoryCluster::load(&path)
                    .with_context(|| format!("loading snapshot {}", path.display()))?;
                Ok(Store::Snapshot { store, path })
            }
            #[cfg(windows)]
            Backend::Native => Ok(Store::Native(
                clusreg_store::NativeCluster::load().context("loading cluster API")?,
            )),
            #[cfg(not(windows))]
            Backend::Native => bail!("the native backend is only available on Windows"),
        }
    }

    pub(crate) fn api(&self) -> &(dyn ClusterApi + 'static) {
        match self {
            Store::Snapshot { store, .. } => store,
            #[cfg(windows)]
            Store::Native(native) => native,
        }
    }

    fn persist(&self) -> Result<()> {
        match self {
            Store::Snapshot { store, path } => {
                store
                    .save(path)
                    .with_context(|| format!("saving snapshot {}", path.display()))?;
                debug!(path = %path.display(), "snapshot written");
                Ok(())
            }
            #[cfg(windows)]
            Store::Native(_) => Ok(()),
        }
    }
}

/// Run `f` on the configured root key: the resource's key when a resource
/// is configured, the cluster root otherwise. Snapshot changes are saved
/// only when `mutates` is set and `f` succeeded.
pub fn with_root<T>(
    session: &Session,
    mutates: bool,
    f: impl FnOnce(&Key<'_, dyn ClusterApi>) -> Result<T>,
) -> Result<T> {
    let store = Store::open(session)?;
    let out = {
        let cluster = match &session.config.cluster.name {
            Some(name) => Cluster::open_remote(store.api(), name)
                .with_context(|| format!("connecting to cluster '{name}'"))?,
            None => Cluster::open(store.api()).context("connecting to the local cluster")?,
        }
        .with_policy(session.config.buffers.policy());

        let root = match &session.config.cluster.resource {
            Some(name) => cluster
                .open_resource(name)
                .and_then(|resource| resource.key(AccessMask::ALL_ACCESS))
                .with_context(|| format!("opening resource '{name}'"))?,
            None => cluster
                .root_key(AccessMask::ALL_ACCESS)
                .context("opening cluster root key")?,
        };
        f(&root)?
    };
    if mutates {
        store.persist()?;
    }
    Ok(out)
}

/// Like [`with_root`], but on the key at `path` below the root.
pub fn with_key<T>(
    session: &Session,
    path: &str,
    mutates: bool,
    f: impl FnOnce(&Key<'_, dyn ClusterApi>) -> Result<T>,
) -> Result<T> {
    let relative = key_path(path);
    with_root(session, mutates, |root| {
        if relative.is_empty() {
            return f(root);
        }
        let key = root
            .open_key(&relative, AccessMask::ALL_ACCESS)
            .with_context(|| format!("opening key '{relative}'"))?;
        f(&key)
    })
}

/// Normalise a user-supplied key path: `/` or `\` separated, `.` for the root.
pub fn key_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("\\")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_paths_are_normalised() {
        assert_eq!(key_path("."), "");
        assert_eq!(key_path(""), "");
        assert_eq!(key_path("a/b"), "a\\b");
        assert_eq!(key_path("/a//b/"), "a\\b");
        assert_eq!(key_path("a\\b/c"), "a\\b\\c");
        assert_eq!(key_path("./a"), "a");
    }
}
