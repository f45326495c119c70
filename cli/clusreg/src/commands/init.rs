//! `clusreg init` — write a starter `clusreg.toml` and an empty snapshot.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clusreg_store::MemoryCluster;

use crate::config::{Config, CONFIG_FILE};

pub fn run(dir: &Path, cluster: Option<&str>, resource: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILE);
    if config_path.exists() && !force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            config_path.display()
        );
    }

    let content = Config::template(cluster, resource);
    let config: Config = toml::from_str(&content).context("parsing generated configuration")?;
    fs::write(&config_path, &content).with_context(|| format!("writing {CONFIG_FILE}"))?;

    let store = MemoryCluster::new(cluster.unwrap_or("local"));
    if let Some(name) = resource {
        store.add_resource(name);
    }
    let snapshot = config.snapshot_path(dir);
    store
        .save(&snapshot)
        .with_context(|| format!("writing snapshot {}", snapshot.display()))?;

    println!("Created {CONFIG_FILE}");
    println!("  snapshot {}", config.store.snapshot.display());
    if let Some(name) = resource {
        println!("  resource {name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_config_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), Some("prod"), Some("Disk 1"), false).unwrap();

        let config = Config::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config.cluster.name.as_deref(), Some("prod"));

        let store = MemoryCluster::load(&config.snapshot_path(dir.path())).unwrap();
        assert_eq!(store.cluster_name(), "prod");
        assert_eq!(store.resources(), vec!["Disk 1".to_string()]);
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), None, None, false).unwrap();
        let err = run(dir.path(), None, None, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        run(dir.path(), None, Some("r"), true).unwrap();
    }
}
