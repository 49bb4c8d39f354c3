//! packd: build metadata and staleness checks for packaged apps.

mod cli;
mod commands;

use clap::Parser;
use derive_more::{Display, Error};
use exn::ResultExt;
use packd_config::Config;
use packd_metadata::{CacheSettings, Database, MetadataService, SqliteStore, StalenessDetector, StoreHandle};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

/// Which stage of a command failed.
#[derive(Debug, Display, Error)]
pub enum Failure {
    #[display("configuration error")]
    Config,
    #[display("could not open the metadata store")]
    Store,
    #[display("metadata operation failed")]
    Metadata,
    #[display("could not load the manifest")]
    Load,
    #[display("could not read the request")]
    Input,
    #[display("could not write the response")]
    Output,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    run(cli).await.map_err(|err| miette::miette!("{err:?}"))
}

async fn run(cli: Cli) -> Result<(), exn::Exn<Failure>> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| Failure::Config)?;
    init_logging(&config);
    tracing::debug!(store = %config.store_connection, ttl = config.ttl_seconds, "Loaded configuration");

    let db = Database::open(&config.store_connection).await.or_raise(|| Failure::Store)?;
    let store: StoreHandle = Arc::new(SqliteStore::from(&db));
    let result = match cli.command {
        Command::Show { manifest_url } => {
            let service = service(store, &config);
            commands::show(&service, &manifest_url).await
        },
        Command::Record {
            manifest_url,
            library_version,
            source,
            manifest,
        } => {
            let service = service(store, &config);
            let source = source.or_else(|| config.source.clone());
            commands::record(&service, &manifest_url, &library_version, source.as_deref(), manifest.as_deref()).await
        },
        Command::Outdated { input } => commands::outdated(&StalenessDetector::new(store), input.as_deref()).await,
    };
    db.close().await;
    result
}

fn service(store: StoreHandle, config: &Config) -> MetadataService {
    let settings = CacheSettings {
        ttl: config.cache_ttl(),
        max_entries: config.max_cache_entries,
    };
    MetadataService::new(store, settings)
}

/// Log to stderr so stdout carries only command output. `RUST_LOG` wins over
/// the configured level.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
