//! clusreg — command-line client for the clustered configuration registry.

mod commands;
mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use clusreg_crypto::Direction;

use commands::crypt::Endpoint;
use commands::Session;
use config::Config;

#[derive(Parser)]
#[command(name = "clusreg", version, about = "Clustered configuration registry client")]
struct Cli {
    /// Configuration file (default: search upward for clusreg.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write clusreg.toml and an empty snapshot in the current directory
    Init {
        /// Cluster name
        #[arg(long)]
        cluster: Option<String>,
        /// Resource whose key becomes the root for key paths
        #[arg(long)]
        resource: Option<String>,
        /// Overwrite an existing clusreg.toml
        #[arg(long)]
        force: bool,
    },
    /// Print a value
    Get {
        /// Key path ("." for the root)
        key: String,
        /// Value name
        name: String,
        /// Print type, raw data and rendering as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a value
    Set {
        key: String,
        name: String,
        value: String,
        /// Value type (string, expand-string, multi-string, dword, qword, binary, guid, or a code)
        #[arg(long = "type", default_value = "string")]
        value_type: String,
    },
    /// Delete a value
    Delete { key: String, name: String },
    /// List the child keys and values of a key
    List {
        #[arg(default_value = ".")]
        key: String,
        #[arg(long)]
        json: bool,
    },
    /// Create a key and any missing parents
    Mkkey { key: String },
    /// Delete a child key with its subtree
    Rmkey {
        /// Parent key path
        key: String,
        /// Child to delete
        name: String,
    },
    /// Apply a TOML batch script to a key atomically
    Batch {
        key: String,
        script: PathBuf,
        /// Stage the commands and discard them instead of committing
        #[arg(long)]
        dry_run: bool,
    },
    /// Encrypt a payload with the resource's crypto provider
    Encrypt(CryptArgs),
    /// Decrypt a payload with the resource's crypto provider
    Decrypt(CryptArgs),
    /// Generate or check GUIDs
    Guid {
        #[command(subcommand)]
        action: GuidAction,
    },
}

#[derive(clap::Args)]
struct CryptArgs {
    /// Read the payload from a file
    #[arg(long)]
    input: Option<PathBuf>,
    /// Read the payload from a binary value under --key
    #[arg(long)]
    input_value: Option<String>,
    /// Write the result to a file
    #[arg(long)]
    output: Option<PathBuf>,
    /// Write the result to a binary value under --key
    #[arg(long)]
    output_value: Option<String>,
    /// Key holding --input-value / --output-value
    #[arg(long, default_value = ".")]
    key: String,
}

#[derive(Subcommand)]
enum GuidAction {
    /// Print a fresh random GUID
    New,
    /// Parse a GUID and print its canonical form and stored bytes
    Check { text: String },
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("clusreg=debug,clusreg_store=debug,clusreg_crypto=debug")
        } else {
            EnvFilter::new("clusreg=info,clusreg_store=warn,clusreg_crypto=warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Init {
            cluster,
            resource,
            force,
        } => commands::init::run(&cwd, cluster.as_deref(), resource.as_deref(), force),

        Commands::Guid { action } => match action {
            GuidAction::New => commands::guid::new(),
            GuidAction::Check { text } => commands::guid::check(&text),
        },

        command => {
            let session = load_session(cli.config.as_deref(), &cwd)?;
            dispatch(&session, command)
        }
    }
}

fn dispatch(session: &Session, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Get { key, name, json } => commands::value::get(session, &key, &name, json),
        Commands::Set {
            key,
            name,
            value,
            value_type,
        } => commands::value::set(session, &key, &name, &value, &value_type),
        Commands::Delete { key, name } => commands::value::delete(session, &key, &name),
        Commands::List { key, json } => commands::value::list(session, &key, json),
        Commands::Mkkey { key } => commands::value::mkkey(session, &key),
        Commands::Rmkey { key, name } => commands::value::rmkey(session, &key, &name),
        Commands::Batch {
            key,
            script,
            dry_run,
        } => commands::batch::run(session, &key, &script, dry_run),
        Commands::Encrypt(args) => crypt(session, Direction::Encrypt, args),
        Commands::Decrypt(args) => crypt(session, Direction::Decrypt, args),
        Commands::Init { .. } | Commands::Guid { .. } => {
            anyhow::bail!("command does not take a configuration")
        }
    }
}

fn crypt(session: &Session, direction: Direction, args: CryptArgs) -> anyhow::Result<()> {
    let input = Endpoint::resolve(args.input, &args.key, args.input_value, "input")?;
    let output = Endpoint::resolve(args.output, &args.key, args.output_value, "output")?;
    commands::crypt::run(session, direction, &input, &output)
}

/// Load the configuration named by `--config`, or search upward from `cwd`.
fn load_session(config: Option<&Path>, cwd: &Path) -> anyhow::Result<Session> {
    if let Some(path) = config {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => cwd.to_path_buf(),
        };
        return Ok(Session {
            config: Config::load(path)?,
            dir,
        });
    }
    match Config::find_and_load(cwd)? {
        Some((config, dir)) => Ok(Session { config, dir }),
        None => anyhow::bail!("no clusreg.toml found (run `clusreg init` first)"),
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use clusreg_core::Value;
    use clusreg_store::{Cluster, MemoryCluster};

    fn session_in(dir: &Path, cluster: Option<&str>, resource: Option<&str>) -> Session {
        commands::init::run(dir, cluster, resource, false).unwrap();
        load_session(None, dir).unwrap()
    }

    fn snapshot(session: &Session) -> MemoryCluster {
        MemoryCluster::load(&session.config.snapshot_path(&session.dir)).unwrap()
    }

    /// Full workflow: init → set → list → batch → read back from the snapshot.
    #[test]
    fn init_set_batch_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path(), None, None);

        commands::value::mkkey(&session, "App/Settings").unwrap();
        commands::value::set(&session, "App/Settings", "Mode", "fast", "string").unwrap();
        commands::value::set(&session, "App/Settings", "Retries", "3", "dword").unwrap();
        commands::value::get(&session, "App/Settings", "Mode", true).unwrap();
        commands::value::list(&session, "App/Settings", false).unwrap();

        let script = dir.path().join("bump.toml");
        std::fs::write(
            &script,
            r#"
[[command]]
op = "is-equal"
name = "Retries"
type = "dword"
value = "3"

[[command]]
op = "set-value"
name = "Retries"
type = "dword"
value = "4"
"#,
        )
        .unwrap();
        commands::batch::run(&session, "App/Settings", &script, false).unwrap();

        // The guard no longer holds, so a second run changes nothing.
        let err = commands::batch::run(&session, "App/Settings", &script, false).unwrap_err();
        assert!(format!("{err:#}").contains("batch rejected"));

        let store = snapshot(&session);
        let cluster = Cluster::open(&store).unwrap();
        let key = cluster
            .root_key(clusreg_store::AccessMask::ALL_ACCESS)
            .unwrap()
            .open_key("App\\Settings", clusreg_store::AccessMask::READ)
            .unwrap();
        assert_eq!(key.query_dword("Retries").unwrap(), 4);
        assert_eq!(key.query_string("Mode").unwrap(), "fast");
    }

    /// A dry run leaves the snapshot untouched.
    #[test]
    fn batch_dry_run_applies_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path(), None, None);
        let script = dir.path().join("set.toml");
        std::fs::write(&script, "[[command]]\nop = \"set-value\"\nname = \"x\"\nvalue = \"1\"\n")
            .unwrap();

        commands::batch::run(&session, ".", &script, true).unwrap();

        let err = commands::value::get(&session, ".", "x", false).unwrap_err();
        assert!(format!("{err:#}").contains("reading 'x'"));
    }

    /// Remote name and resource both come from the configuration.
    #[test]
    fn resource_root_on_named_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path(), Some("prod"), Some("Disk 1"));

        commands::value::set(&session, ".", "Owner", "node-2", "string").unwrap();

        let store = snapshot(&session);
        let cluster = Cluster::open_remote(&store, "prod").unwrap();
        let key = cluster
            .open_resource("Disk 1")
            .unwrap()
            .key(clusreg_store::AccessMask::READ)
            .unwrap();
        assert_eq!(key.query_value("Owner").unwrap(), Value::string("node-2"));
    }

    /// Encrypt into a registry value, decrypt back out to a file.
    #[test]
    fn encrypt_decrypt_through_a_value() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path(), None, Some("Vault"));

        let plain = dir.path().join("plain.txt");
        std::fs::write(&plain, b"connection-string").unwrap();
        let sealed = Endpoint::Value {
            key: ".".to_string(),
            name: "Secret".to_string(),
        };
        commands::crypt::run(&session, Direction::Encrypt, &Endpoint::File(plain), &sealed)
            .unwrap();

        let back = dir.path().join("back.txt");
        commands::crypt::run(&session, Direction::Decrypt, &sealed, &Endpoint::File(back.clone()))
            .unwrap();
        assert_eq!(std::fs::read(&back).unwrap(), b"connection-string");
    }

    #[test]
    fn encrypt_without_resource_fails() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_in(dir.path(), None, None);
        let plain = dir.path().join("p");
        std::fs::write(&plain, b"x").unwrap();
        let err = commands::crypt::run(
            &session,
            Direction::Encrypt,
            &Endpoint::File(plain),
            &Endpoint::File(dir.path().join("out")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("resource"));
    }

    #[test]
    fn missing_config_is_reported() {
        // The filesystem root has no ancestors, so only its own entry is checked.
        let root = Path::new("/");
        assert!(!root.join(config::CONFIG_FILE).exists());
        let err = load_session(None, root).unwrap_err();
        assert!(err.to_string().contains("clusreg init"));
    }

    #[test]
    fn explicit_config_sets_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        commands::init::run(dir.path(), None, None, false).unwrap();
        let path = dir.path().join(config::CONFIG_FILE);
        let session = load_session(Some(path.as_path()), Path::new("/")).unwrap();
        assert_eq!(session.dir, dir.path());
    }

    #[test]
    fn guid_commands() {
        commands::guid::new().unwrap();
        commands::guid::check("{6ba7b810-9dad-11d1-80b4-00c04fd430c8}").unwrap();
        assert!(commands::guid::check("nope").is_err());
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["clusreg", "set", "a/b", "n", "5", "--type", "dword"]).unwrap();
        assert!(matches!(cli.command, Commands::Set { ref value_type, .. } if value_type == "dword"));
    }
}
