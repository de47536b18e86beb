//! Configuration management
//!
//! Values come from the environment (optionally a `.env` file) with the
//! defaults below; CLI flags override them in `main`.

use imdb_common::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Defaults
// ============================================================================

/// Datasets loaded when no URLs are configured, primary table first.
pub const DEFAULT_DATASET_URLS: [&str; 2] = [
    "https://datasets.imdbws.com/title.basics.tsv.gz",
    "https://datasets.imdbws.com/title.ratings.tsv.gz",
];

pub const DEFAULT_DATA_DIR: &str = ".";

pub const DEFAULT_DATABASE_HOST: &str = "localhost";

pub const DEFAULT_DATABASE_PORT: u16 = 5432;

pub const DEFAULT_DATABASE_NAME: &str = "my_imdb";

/// Database connected to when the target database has to be created.
pub const DEFAULT_MAINTENANCE_DATABASE: &str = "postgres";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestConfig {
    /// Directory holding every stage artifact
    pub data_dir: PathBuf,
    pub dataset_urls: Vec<String>,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub maintenance_database: String,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DATABASE_HOST.to_string(),
            port: DEFAULT_DATABASE_PORT,
            name: DEFAULT_DATABASE_NAME.to_string(),
            maintenance_database: DEFAULT_MAINTENANCE_DATABASE.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            dataset_urls: DEFAULT_DATASET_URLS.iter().map(|s| s.to_string()).collect(),
            database: DatabaseConfig::default(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl IngestConfig {
    /// Load configuration from environment and defaults
    ///
    /// Environment variables:
    /// - `IMDB_DATA_DIR`: artifact directory (default `.`)
    /// - `IMDB_DATASET_URLS`: comma separated dataset URLs
    /// - `IMDB_DB_HOST`, `IMDB_DB_PORT`, `IMDB_DB_NAME`
    /// - `IMDB_DB_MAINTENANCE`: database used to issue `CREATE DATABASE`
    /// - `IMDB_DB_CONNECT_TIMEOUT`: seconds
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let dataset_urls = match std::env::var("IMDB_DATASET_URLS") {
            Ok(urls) => urls
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => DEFAULT_DATASET_URLS.iter().map(|s| s.to_string()).collect(),
        };

        let config = Self {
            data_dir: PathBuf::from(env_or("IMDB_DATA_DIR", DEFAULT_DATA_DIR)),
            dataset_urls,
            database: DatabaseConfig {
                host: env_or("IMDB_DB_HOST", DEFAULT_DATABASE_HOST),
                port: env_parsed("IMDB_DB_PORT", DEFAULT_DATABASE_PORT),
                name: env_or("IMDB_DB_NAME", DEFAULT_DATABASE_NAME),
                maintenance_database: env_or("IMDB_DB_MAINTENANCE", DEFAULT_MAINTENANCE_DATABASE),
                connect_timeout_secs: env_parsed(
                    "IMDB_DB_CONNECT_TIMEOUT",
                    DEFAULT_CONNECT_TIMEOUT_SECS,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset_urls.is_empty() {
            return Err(IngestError::config("At least one dataset URL is required"));
        }

        // The name is interpolated into CREATE DATABASE, so keep it to a plain identifier
        let name = &self.database.name;
        if name.is_empty()
            || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            || name.starts_with(|c: char| c.is_ascii_digit())
        {
            return Err(IngestError::config(format!(
                "Database name '{}' must be a plain identifier ([A-Za-z_][A-Za-z0-9_]*)",
                name
            )));
        }

        if self.database.port == 0 {
            return Err(IngestError::config("Database port must be greater than 0"));
        }

        if self.database.connect_timeout_secs == 0 {
            return Err(IngestError::config("Database connect timeout must be greater than 0"));
        }

        Ok(())
    }
}
