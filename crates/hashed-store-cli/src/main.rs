//! Hashed Store CLI - inspect and edit a hashed blob store
//!
//! Opens the store rooted at `--root` (or `HASHED_STORE_ROOT`), runs one
//! command and waits for any scheduled storage work before exiting.

mod commands;
mod error;

use crate::error::{CliError, Result};
use clap::{Parser, Subcommand};
use hashed_blob_store::{BackgroundQueue, FsStorage, HashedStoreProvider, StoreConfig};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "hashed-store")]
#[command(about = "Inspect and edit a hashed blob store")]
#[command(version)]
struct Args {
    /// Store root directory (defaults to HASHED_STORE_ROOT)
    #[arg(long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every stored record as JSON lines
    List,
    /// Show the current record for a key
    Get {
        key: String,
        /// Write the payload bytes instead of the descriptor
        #[arg(long)]
        payload: bool,
    },
    /// Store a payload under a key
    Put {
        key: String,
        /// Seconds until the record expires
        #[arg(long, default_value_t = 3600)]
        ttl_secs: i64,
        #[arg(long)]
        optimized: bool,
        /// Payload given inline
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,
        /// Payload read from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Delete the current record for a key
    Delete { key: String },
    /// Delete every stored version of a key
    Purge { key: String },
}

fn init_logging() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("hashed_store=info".parse()?)
        .add_directive("hashed_blob_store=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let args = Args::parse();

    let mut config = StoreConfig::from_env();
    if let Some(root) = args.root {
        config = config.with_root(root);
    }
    info!("Store root: {:?}", config.root);

    let provider = HashedStoreProvider::<FsStorage, BackgroundQueue>::open(&config).await?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::List => {
            let count = commands::list(&provider, &mut out).await?;
            info!(count, "Listed records");
        }
        Command::Get { key, payload } => {
            commands::get(&provider, &key, payload, &mut out).await?;
        }
        Command::Put {
            key,
            ttl_secs,
            optimized,
            data,
            file,
        } => {
            let bytes = match (data, file) {
                (Some(data), _) => data.into_bytes(),
                (None, Some(path)) => tokio::fs::read(&path).await?,
                (None, None) => {
                    return Err(CliError::Config(
                        "put needs --data or --file".to_string(),
                    ))
                }
            };
            let ttl = commands::ttl_from_secs(ttl_secs)?;
            let descriptor = commands::put(&provider, &key, bytes, ttl, optimized)?;
            provider.queue().drain().await;

            if provider.cached_latest(&key).as_ref() != Some(&descriptor) {
                warn!(key = %key, "Write was not committed");
                return Err(CliError::WriteDropped(key));
            }
            serde_json::to_writer(&mut out, &descriptor)?;
            writeln!(out)?;
        }
        Command::Delete { key } => {
            let removed = commands::delete(&provider, &key).await?;
            provider.queue().drain().await;
            info!(key = %removed.unique_name(), "Deleted record");
        }
        Command::Purge { key } => {
            commands::purge(&provider, &key);
            provider.queue().drain().await;
        }
    }

    out.flush()?;
    Ok(())
}
