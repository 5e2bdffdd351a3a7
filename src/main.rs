//! s3fs - Filesystem-backed Object Storage
//!
//! Serves `PUT`, `GET` and `DELETE` on `/{bucket}/{key...}` from a local
//! storage directory.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use s3fs::api::HttpServer;
use s3fs::config::S3fsConfig;
use s3fs::error::Result;
use s3fs::storage::ObjectStore;

/// s3fs - S3-style object storage on a local directory
#[derive(Parser)]
#[command(name = "s3fs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Storage root directory (created if missing)
    #[arg(required_unless_present = "config")]
    storage_root: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the configuration file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli)?;

    // Initialize logging
    init_logging(&config.logging.level);

    run_server(config).await
}

/// Merge the optional configuration file with command line overrides
fn load_config(cli: &Cli) -> Result<S3fsConfig> {
    let mut config = match (&cli.config, &cli.storage_root) {
        (Some(path), _) => S3fsConfig::from_file(path)?,
        (None, Some(root)) => S3fsConfig::with_root(root),
        (None, None) => {
            return Err(s3fs::Error::Config(
                "a storage root or a configuration file is required".into(),
            ))
        }
    };

    if let Some(root) = &cli.storage_root {
        config.storage.root = root.clone();
    }
    if let Some(bind) = &cli.bind {
        config.api.bind_address = bind.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Prepare the storage root and serve until shutdown
async fn run_server(config: S3fsConfig) -> Result<()> {
    tracing::info!("Starting s3fs...");

    let store = match ObjectStore::open(config.storage_root()).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(
                "Unable to create storage root {:?}: {}",
                config.storage_root(),
                e
            );
            return Err(e);
        }
    };
    tracing::info!("Storage root ready at {}", store.root().display());
    tracing::debug!("Serving PUT, GET and DELETE on /{{bucket}}/{{key}}");

    let server = HttpServer::new(config.api.clone(), store);
    server.start().await?;

    tracing::info!("s3fs shutdown complete");
    Ok(())
}
