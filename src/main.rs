//! Stashpoint - pluggable cache backends
//!
//! Command line access to a cache configured from the environment or a TOML
//! file. Handy for inspecting what an application left in its cache.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stashpoint::{Cache, CacheConfig, CacheDriver};

#[derive(Debug, Parser)]
#[command(name = "stashpoint", version, about = "Inspect and modify a configured cache")]
struct Cli {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured primary driver
    #[arg(short, long, global = true)]
    driver: Option<CacheDriver>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the value stored under a key
    Get { key: String },
    /// Store a value; parsed as JSON, otherwise stored as a string
    Set {
        key: String,
        value: String,
        /// TTL in seconds, 0 = never expires
        #[arg(short, long)]
        ttl: Option<u64>,
    },
    /// Remove a key
    Delete { key: String },
    /// Remove every entry the backend manages
    Clean,
    /// Print backend statistics
    Info { kind: Option<String> },
    /// Print expiration details for a key
    Meta { key: String },
    /// Print the driver that was bound after fallback
    Driver,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stashpoint=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CacheConfig::from_env(),
    };
    if let Some(driver) = cli.driver {
        config.driver = driver;
    }
    info!(
        "Configuration loaded: driver={}, backup={:?}, key_prefix='{}', default_ttl={}s",
        config.driver, config.backup, config.key_prefix, config.default_ttl
    );

    let cache = Cache::open(&config).await;

    match cli.command {
        Command::Get { key } => print_json(cache.get(&key).await)?,
        Command::Set { key, value, ttl } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            report(cache.save(&key, value, ttl).await, "set", &key)?;
        }
        Command::Delete { key } => report(cache.delete(&key).await, "delete", &key)?,
        Command::Clean => report(cache.clean().await, "clean", "cache")?,
        Command::Info { kind } => print_json(cache.cache_info(kind.as_deref()).await)?,
        Command::Meta { key } => print_json(cache.get_metadata(&key).await)?,
        Command::Driver => println!("{}", cache.driver()),
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: Option<T>) -> anyhow::Result<()> {
    match value {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => anyhow::bail!("not found"),
    }
    Ok(())
}

fn report(ok: bool, action: &str, target: &str) -> anyhow::Result<()> {
    anyhow::ensure!(ok, "{action} failed for '{target}'");
    println!("{action}: {target}");
    Ok(())
}
