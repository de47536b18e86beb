//! Archive decompression

use flate2::read::GzDecoder;
use imdb_common::{IngestError, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expands a compressed artifact into a plain file
pub trait Decompressor: Send + Sync {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<PathBuf>;
}

/// Streaming gzip decoder
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipDecompressor;

impl Decompressor for GzipDecompressor {
    fn decompress(&self, source: &Path, destination: &Path) -> Result<PathBuf> {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(source)?));
        let mut output = BufWriter::new(File::create(destination)?);
        let mut buffer = vec![0u8; 64 * 1024];
        let mut total = 0u64;

        loop {
            let read = decoder.read(&mut buffer).map_err(|e| IngestError::CorruptArchive {
                path: source.display().to_string(),
                reason: e.to_string(),
            })?;
            if read == 0 {
                break;
            }
            output.write_all(&buffer[..read])?;
            total += read as u64;
        }
        output.flush()?;

        debug!(
            source = %source.display(),
            destination = %destination.display(),
            bytes = total,
            "Decompressed archive"
        );
        Ok(destination.to_path_buf())
    }
}
