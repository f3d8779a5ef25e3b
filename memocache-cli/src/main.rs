use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use memocache_engine::{CacheConfig, CacheManager};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "memocache-cli")]
#[command(about = "Memocache CLI - inspect and maintain a cache directory", long_about = None)]
struct Args {
    /// Cache directory
    #[arg(short = 'd', long, default_value = "./data/cache")]
    dir: PathBuf,

    /// Optional YAML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cache stats snapshot
    Stats,
    /// Look a key up
    Get {
        key: String,
        /// Input hash the entry must match
        #[arg(long)]
        input_hash: Option<String>,
    },
    /// Store a JSON value under a key
    Set {
        key: String,
        /// JSON payload
        value: String,
        /// Time-to-live in milliseconds
        #[arg(long)]
        ttl_ms: Option<u64>,
        #[arg(long)]
        input_hash: Option<String>,
    },
    /// Remove a key from both tiers
    Del { key: String },
    /// Check whether a key is present
    Has { key: String },
    /// Drop every entry
    Clear,
    /// Scan all partitions, removing corrupt and expired entries
    Verify,
    /// Show per-partition file counts and the balance score
    Balance,
}

async fn open_cache(args: &Args) -> Result<Arc<CacheManager>> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("loading config from {:?}", path))?,
        None => CacheConfig::default(),
    };
    config.base_dir = args.dir.clone();

    debug!("Opening cache at {:?}", config.base_dir);
    let cache = CacheManager::new(config)
        .await
        .context("initializing cache engine")?;
    Ok(cache)
}

async fn run(args: Args) -> Result<()> {
    let started = Instant::now();
    let cache = open_cache(&args).await?;

    match args.command {
        Command::Stats => {
            let stats = cache.stats();
            println!("# snapshot at {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Get { key, input_hash } => {
            let value: Option<Value> = cache.get(&key, input_hash.as_deref()).await?;
            match value {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("(absent)"),
            }
        }
        Command::Set {
            key,
            value,
            ttl_ms,
            input_hash,
        } => {
            let value: Value =
                serde_json::from_str(&value).context("payload must be valid JSON")?;
            cache.set(&key, &value, ttl_ms, input_hash).await?;
            println!("OK ({:.2?})", started.elapsed());
        }
        Command::Del { key } => {
            cache.delete(&key).await?;
            println!("OK ({:.2?})", started.elapsed());
        }
        Command::Has { key } => {
            println!("{}", cache.has(&key).await);
        }
        Command::Clear => {
            cache.clear().await?;
            println!("OK ({:.2?})", started.elapsed());
        }
        Command::Verify => {
            let report = cache.verify().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Balance => {
            let infos = cache.partition_info().await?;
            let score = cache.balance_score().await?;
            for info in infos.iter().filter(|i| i.file_count > 0) {
                println!("{:>5} files  {:?}", info.file_count, info.partition_dir);
            }
            println!(
                "{} shards, {} files, balance score {:.3}",
                infos.len(),
                infos.iter().map(|i| i.file_count).sum::<usize>(),
                score
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    run(Args::parse()).await
}
