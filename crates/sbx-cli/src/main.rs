//! sbx: scatterbox client CLI
//!
//! Commands:
//!   store <file>        - encrypt, disperse, and announce a secret file
//!   plan <bytes>        - preview a randomized chunk-size plan
//!   config show         - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use sbx_pipeline::{EmbeddedCustody, FileStore};
use sbx_queue::ManifestQueue;

// ── CLI structure ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sbx",
    version,
    about = "scatterbox client",
    long_about = "sbx: store secret files as encrypted, dispersed chunks announced over a queue"
)]
struct Cli {
    /// Path to scatterbox.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SBX_CONFIG",
        default_value = "/etc/scatterbox/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SBX_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a local file, disperse the ciphertext, and announce the
    /// manifest
    ///
    /// S3 credentials are read from AWS_ACCESS_KEY_ID and
    /// AWS_SECRET_ACCESS_KEY (or SBX_ACCESS_KEY_ID / SBX_SECRET_ACCESS_KEY).
    Store {
        /// Local file to store
        file: PathBuf,
        /// Name recorded in the manifest (default: the file's base name)
        #[arg(long, short = 'n')]
        name: Option<String>,
        /// Lock the manifest's key material with this passphrase
        #[arg(long, env = "SBX_KEY_PASSPHRASE")]
        passphrase: Option<String>,
        /// Store chunks and print the manifest without publishing it
        #[arg(long)]
        no_publish: bool,
    },

    /// Preview a randomized chunk-size plan for a byte count
    Plan {
        /// Total bytes to plan for
        bytes: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

// ── main ───────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Store {
            file,
            name,
            passphrase,
            no_publish,
        } => cmd_store(&config, &file, name.as_deref(), passphrase.as_deref(), no_publish).await,
        Commands::Plan { bytes } => cmd_plan(bytes),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

// ── Commands ───────────────────────────────────────────────────────────────

async fn cmd_store(
    config: &sbx_core::config::SbxConfig,
    file: &Path,
    name: Option<&str>,
    passphrase: Option<&str>,
    no_publish: bool,
) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let file_name = match name {
        Some(n) => n.to_string(),
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .context("file has no usable base name; pass --name")?
            .to_string(),
    };

    let (access_key, secret_key) = load_credentials()?;
    let op = sbx_storage::build_operator(&config.storage, &access_key, &secret_key)
        .context("building storage operator")?;

    let queue = if no_publish {
        None
    } else {
        let queue = ManifestQueue::connect(&config.queue)
            .await
            .context("connecting to NATS")?;
        queue.ensure_stream().await.context("ensuring stream")?;
        Some(queue)
    };

    let custody = match passphrase {
        Some(p) => EmbeddedCustody::with_passphrase(p),
        None => EmbeddedCustody::new(),
    };

    let store = FileStore::new(op, queue, Box::new(custody));
    let receipt = store.store_secret_file(&file_name, &data).await?;

    println!("{}", serde_json::to_string_pretty(&receipt.manifest)?);

    if let Some(err) = receipt.publish_error {
        // Chunks are stored and the manifest printed above is complete;
        // only the announcement failed.
        anyhow::bail!("manifest publish failed: {err}");
    }
    Ok(())
}

fn cmd_plan(bytes: usize) -> Result<()> {
    let mut rng = rand::thread_rng();
    let sizes = sbx_shards::plan_sizes(bytes, &mut rng);
    println!("{} bytes → {} chunks", bytes, sizes.len());
    for (i, len) in sizes.iter().enumerate() {
        println!("  chunk {i}: {len} bytes");
    }
    Ok(())
}

fn cmd_config_show(config: &sbx_core::config::SbxConfig, path: &Path) -> Result<()> {
    println!("# config file: {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn load_credentials() -> Result<(String, String)> {
    let access_key = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("SBX_ACCESS_KEY_ID"))
        .context("S3 credentials not set: export AWS_ACCESS_KEY_ID")?;
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("SBX_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY not set")?;
    Ok((access_key, secret_key))
}

async fn load_config(path: &Path) -> Result<sbx_core::config::SbxConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        Ok(sbx_core::config::SbxConfig::default())
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
