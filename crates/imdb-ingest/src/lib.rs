//! IMDb Ingest Library
//!
//! Staged ETL for the public IMDb title datasets: download, decompress,
//! repair and normalize, then bulk load into PostgreSQL.
//!
//! # Stages
//!
//! - **fetch**: stream `<name>.<part>.tsv.gz` to the data directory
//! - **decompress**: expand it to `<name>_<part>.tsv`
//! - **convert**: repair rows whose quoted title swallowed a separator,
//!   map `\N` and empty cells to `NULL`, write `<name>_<part>.csv`
//! - **load**: insert row by row, skipping rows the database refuses,
//!   and commit once per table
//!
//! Every stage is skipped when its output file already exists.
//!
//! # Example
//!
//! ```no_run
//! use imdb_ingest::config::IngestConfig;
//! use imdb_ingest::credentials::{CredentialSource, EnvCredentials};
//! use imdb_ingest::dataset::DatasetDescriptor;
//! use imdb_ingest::decompress::GzipDecompressor;
//! use imdb_ingest::fetch::HttpFetcher;
//! use imdb_ingest::pipeline::Pipeline;
//! use imdb_ingest::sink::PgSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let descriptors = config
//!         .dataset_urls
//!         .iter()
//!         .map(|url| DatasetDescriptor::from_url(url, &config.data_dir))
//!         .collect::<Result<Vec<_>, _>>()?;
//!
//!     let credentials = EnvCredentials {
//!         host: config.database.host.clone(),
//!         port: config.database.port,
//!     }
//!     .credentials()?;
//!     let mut sink = PgSink::new(&config.database, &credentials);
//!
//!     let pipeline = Pipeline::new(HttpFetcher::new(false)?, GzipDecompressor);
//!     let report = pipeline.run(&descriptors, &mut sink).await?;
//!     println!("inserted {} rows", report.inserted());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod credentials;
pub mod dataset;
pub mod decompress;
pub mod fetch;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod repair;
pub mod schema;
pub mod sink;
pub mod stage;
pub mod tsv;
