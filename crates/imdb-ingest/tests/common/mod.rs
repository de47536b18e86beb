//! Shared fixtures for the pipeline integration tests
//!
//! - [`MemorySink`]: an in-memory sink that enforces primary keys, foreign
//!   keys, `NOT NULL` and `varchar` widths, and records every call in order
//! - [`CountingFetcher`] / [`CountingDecompressor`]: stage collaborators
//!   that count how often they run
//! - gzip and TSV fixture helpers

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use imdb_common::{IngestError, Result};
use imdb_ingest::dataset::DatasetDescriptor;
use imdb_ingest::decompress::{Decompressor, GzipDecompressor};
use imdb_ingest::fetch::Fetcher;
use imdb_ingest::schema::{ColumnType, KeyRole, SqlValue, TableSchema};
use imdb_ingest::sink::{InsertError, Sink};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const BASICS_URL: &str = "https://datasets.example.test/title.basics.tsv.gz";
pub const RATINGS_URL: &str = "https://datasets.example.test/title.ratings.tsv.gz";

pub const BASICS_HEADER: &str =
    "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres";
pub const RATINGS_HEADER: &str = "tconst\taverageRating\tnumVotes";

/// Five titles; tt0000003's quoted title swallows the separator before
/// its original title
pub fn basics_tsv() -> String {
    [
        BASICS_HEADER,
        "tt0000001\tshort\tCarmencita\tCarmencita\t0\t1894\t\\N\t1\tDocumentary,Short",
        "tt0000002\tshort\tLe clown et ses chiens\tLe clown et ses chiens\t0\t1892\t\\N\t5\tAnimation,Short",
        "tt0000003\tmovie\t\"Part A\tPart B\"\t0\t1990\t\\N\t90\tDrama",
        "tt0000004\tshort\tUn bon bock\tUn bon bock\t0\t1892\t\\N\t12\tAnimation,Short",
        "tt0000005\tshort\tBlacksmith Scene\tBlacksmith Scene\t0\t1893\t\\N\t1\tComedy,Short",
    ]
    .join("\n")
        + "\n"
}

/// Four ratings; tt9999999 has no title and tt0000004's vote count is not
/// a number
pub fn ratings_tsv() -> String {
    [
        RATINGS_HEADER,
        "tt0000001\t5.7\t2051",
        "tt0000003\t6.1\t17",
        "tt9999999\t4.2\t10",
        "tt0000004\t6.4\tmany",
        "tt0000005\t6.2\t2802",
    ]
    .join("\n")
        + "\n"
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,imdb_ingest=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn descriptors(data_dir: &Path) -> Vec<DatasetDescriptor> {
    [BASICS_URL, RATINGS_URL]
        .iter()
        .map(|url| DatasetDescriptor::from_url(url, data_dir).unwrap())
        .collect()
}

// ============================================================================
// Stage collaborators
// ============================================================================

/// Serves fixture archives by URL; unknown URLs answer 404
#[derive(Default)]
pub struct CountingFetcher {
    archives: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl CountingFetcher {
    pub fn with_archive(mut self, url: &str, contents: &str) -> Self {
        self.archives
            .insert(url.to_string(), gzip(contents.as_bytes()));
        self
    }

    /// Serve bytes that are not a valid gzip stream
    pub fn with_raw(mut self, url: &str, bytes: &[u8]) -> Self {
        self.archives.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// The fixture pair used by most tests
pub fn imdb_fetcher() -> CountingFetcher {
    CountingFetcher::default()
        .with_archive(BASICS_URL, &basics_tsv())
        .with_archive(RATINGS_URL, &ratings_tsv())
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .archives
            .get(url)
            .ok_or_else(|| IngestError::DownloadStatus {
                url: url.to_string(),
                status: 404,
            })?;
        std::fs::write(destination, bytes)?;
        Ok(destination.to_path_buf())
    }
}

#[derive(Default)]
pub struct CountingDecompressor {
    calls: AtomicUsize,
}

impl CountingDecompressor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decompressor for CountingDecompressor {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        GzipDecompressor.decompress(source, destination)
    }
}

// ============================================================================
// In-memory sink
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    SelectDatabase,
    CreateTable(&'static str),
    Insert(&'static str),
    Commit,
    Close,
}

#[derive(Debug, Default)]
struct MemoryTable {
    committed: Vec<Vec<SqlValue>>,
    pending: Vec<Vec<SqlValue>>,
}

impl MemoryTable {
    fn rows(&self) -> impl Iterator<Item = &Vec<SqlValue>> {
        self.committed.iter().chain(self.pending.iter())
    }
}

/// Constraint-enforcing sink kept entirely in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    tables: HashMap<&'static str, MemoryTable>,
    pub events: Vec<SinkEvent>,
    pub database_selected: bool,
    /// Make `select_or_create_database` fail like an unreachable server
    pub refuse_connection: bool,
}

fn text_key(value: &SqlValue) -> Option<&str> {
    match value {
        SqlValue::Text(Some(text)) => Some(text.as_str()),
        _ => None,
    }
}

impl MemorySink {
    pub fn refusing_connections() -> Self {
        Self {
            refuse_connection: true,
            ..Default::default()
        }
    }

    pub fn committed_rows(&self, table: &str) -> usize {
        self.tables.get(table).map(|t| t.committed.len()).unwrap_or(0)
    }

    /// Committed text values of one column
    pub fn committed_column(&self, table: &str, index: usize) -> Vec<Option<String>> {
        self.tables
            .get(table)
            .map(|t| {
                t.committed
                    .iter()
                    .map(|row| text_key(&row[index]).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn committed_row(&self, table: &str, key: &str) -> Option<Vec<SqlValue>> {
        self.tables
            .get(table)?
            .committed
            .iter()
            .find(|row| text_key(&row[0]) == Some(key))
            .cloned()
    }

    pub fn position(&self, event: &SinkEvent) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }

    fn keys(&self, table: &str, index: usize) -> HashSet<String> {
        self.tables
            .get(table)
            .map(|t| {
                t.rows()
                    .filter_map(|row| text_key(&row[index]).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check(&self, schema: &TableSchema, values: &[SqlValue]) -> std::result::Result<(), String> {
        if values.len() != schema.width() {
            return Err(format!("expected {} values, got {}", schema.width(), values.len()));
        }

        for (index, (column, value)) in schema.columns.iter().zip(values).enumerate() {
            if !column.nullable && value.is_null() {
                return Err(format!("null value in column \"{}\"", column.name));
            }

            if let (ColumnType::Text { max_len }, Some(text)) = (column.column_type, text_key(value)) {
                if text.chars().count() > max_len as usize {
                    return Err(format!("value too long for column \"{}\"", column.name));
                }
            }

            match column.key {
                KeyRole::Primary => {
                    if let Some(key) = text_key(value) {
                        if self.keys(schema.name, index).contains(key) {
                            return Err(format!("duplicate key value \"{}\"", key));
                        }
                    }
                },
                KeyRole::Foreign { table, .. } => {
                    if let Some(key) = text_key(value) {
                        if !self.keys(table, 0).contains(key) {
                            return Err(format!(
                                "key \"{}\" is not present in table \"{}\"",
                                key, table
                            ));
                        }
                    }
                },
                KeyRole::None => {},
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn select_or_create_database(&mut self) -> Result<()> {
        self.events.push(SinkEvent::SelectDatabase);
        if self.refuse_connection {
            return Err(IngestError::config("connection refused"));
        }
        self.database_selected = true;
        Ok(())
    }

    async fn create_table_if_absent(&mut self, schema: &TableSchema) -> Result<bool> {
        self.events.push(SinkEvent::CreateTable(schema.name));
        if self.tables.contains_key(schema.name) {
            return Ok(false);
        }
        self.tables.insert(schema.name, MemoryTable::default());
        Ok(true)
    }

    async fn insert(
        &mut self,
        schema: &TableSchema,
        values: &[SqlValue],
    ) -> std::result::Result<(), InsertError> {
        self.events.push(SinkEvent::Insert(schema.name));
        if !self.tables.contains_key(schema.name) {
            return Err(IngestError::schema(format!("relation \"{}\" does not exist", schema.name)).into());
        }
        self.check(schema, values).map_err(InsertError::Rejected)?;
        if let Some(table) = self.tables.get_mut(schema.name) {
            table.pending.push(values.to_vec());
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.events.push(SinkEvent::Commit);
        for table in self.tables.values_mut() {
            let pending = std::mem::take(&mut table.pending);
            table.committed.extend(pending);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.events.push(SinkEvent::Close);
        for table in self.tables.values_mut() {
            table.pending.clear();
        }
        Ok(())
    }
}
