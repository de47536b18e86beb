//! Dataset descriptors
//!
//! A descriptor pins every on-disk artifact of one remote dataset to a
//! deterministic path derived from its URL, so re-running the pipeline
//! always looks for the same files.

use imdb_common::{IngestError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// Literal pattern.
#[allow(clippy::unwrap_used)]
fn archive_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(.+)\.(.+)\.tsv\.gz$").unwrap())
}

/// Which stage artifacts currently exist on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactPresence {
    pub compressed: bool,
    pub decompressed: bool,
    pub cleaned: bool,
}

/// Immutable description of one remote dataset and its local artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    url: String,
    base_name: String,
    compressed_path: PathBuf,
    decompressed_path: PathBuf,
    cleaned_path: PathBuf,
}

impl DatasetDescriptor {
    /// Derive a descriptor from a dataset URL such as
    /// `https://datasets.imdbws.com/title.basics.tsv.gz`.
    ///
    /// The archive `title.basics.tsv.gz` yields base name `title_basics`,
    /// decompressed file `title_basics.tsv` and cleaned file `title_basics.csv`.
    pub fn from_url(url: &str, data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let archive = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| IngestError::config(format!("No file name in dataset URL: {}", url)))?;

        let captures = archive_name_pattern().captures(archive).ok_or_else(|| {
            IngestError::config(format!(
                "Dataset file '{}' does not match <name>.<part>.tsv.gz",
                archive
            ))
        })?;
        let base_name = format!("{}_{}", &captures[1], &captures[2]);

        Ok(Self {
            url: url.to_string(),
            compressed_path: data_dir.join(archive),
            decompressed_path: data_dir.join(format!("{}.tsv", base_name)),
            cleaned_path: data_dir.join(format!("{}.csv", base_name)),
            base_name,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Base name shared by the artifacts and the target table
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn compressed_path(&self) -> &Path {
        &self.compressed_path
    }

    pub fn decompressed_path(&self) -> &Path {
        &self.decompressed_path
    }

    pub fn cleaned_path(&self) -> &Path {
        &self.cleaned_path
    }

    pub fn artifacts(&self) -> ArtifactPresence {
        ArtifactPresence {
            compressed: self.compressed_path.exists(),
            decompressed: self.decompressed_path.exists(),
            cleaned: self.cleaned_path.exists(),
        }
    }
}
