//! IMDb Ingest - download, clean and load the IMDb title datasets

use anyhow::{Context, Result};
use clap::Parser;
use imdb_common::logging::{init_logging, LogConfig, LogLevel};
use imdb_ingest::config::IngestConfig;
use imdb_ingest::credentials::{CredentialSource, EnvCredentials, PromptCredentials};
use imdb_ingest::dataset::DatasetDescriptor;
use imdb_ingest::decompress::GzipDecompressor;
use imdb_ingest::fetch::HttpFetcher;
use imdb_ingest::pipeline::Pipeline;
use imdb_ingest::sink::PgSink;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "imdb-ingest")]
#[command(author, version, about = "IMDb dataset ingestion tool")]
struct Cli {
    /// Directory for downloaded, decompressed and cleaned files
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Dataset URL (repeatable); replaces the configured list
    #[arg(short, long = "url")]
    urls: Vec<String>,

    /// Prompt for the database user and password instead of reading
    /// IMDB_DB_USER / IMDB_DB_PASSWORD
    #[arg(long)]
    prompt: bool,

    /// Hide the download progress bar
    #[arg(long)]
    no_progress: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("imdb-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _guard = init_logging(&log_config)?;

    let mut config = IngestConfig::load().context("Failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if !cli.urls.is_empty() {
        config.dataset_urls = cli.urls;
    }
    config.validate()?;

    std::fs::create_dir_all(&config.data_dir).with_context(|| {
        format!("Failed to create data directory {}", config.data_dir.display())
    })?;

    let descriptors = config
        .dataset_urls
        .iter()
        .map(|url| DatasetDescriptor::from_url(url, &config.data_dir))
        .collect::<imdb_common::Result<Vec<_>>>()?;

    let credentials = if cli.prompt {
        PromptCredentials {
            host: config.database.host.clone(),
            port: config.database.port,
        }
        .credentials()?
    } else {
        EnvCredentials {
            host: config.database.host.clone(),
            port: config.database.port,
        }
        .credentials()?
    };

    info!(
        datasets = descriptors.len(),
        data_dir = %config.data_dir.display(),
        host = %credentials.host,
        database = %config.database.name,
        "Starting ingestion"
    );

    let mut sink = PgSink::new(&config.database, &credentials);
    let pipeline = Pipeline::new(HttpFetcher::new(!cli.no_progress)?, GzipDecompressor);
    let report = pipeline
        .run(&descriptors, &mut sink)
        .await
        .context("Ingestion failed")?;

    for load in &report.loads {
        info!(
            table = load.table,
            inserted = load.inserted,
            skipped = load.skipped,
            "Table loaded"
        );
    }
    for failure in &report.failed {
        warn!(
            dataset = %failure.dataset,
            stage = %failure.stage,
            error = %failure.error,
            "Dataset will be retried on the next run"
        );
    }

    info!("Ingestion complete");
    Ok(())
}
