//! Dataset download

use async_trait::async_trait;
use futures::StreamExt;
use imdb_common::{IngestError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Retrieves a remote file into a local path
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf>;
}

/// Streams an HTTP(S) response body to disk
pub struct HttpFetcher {
    client: reqwest::Client,
    show_progress: bool,
}

impl HttpFetcher {
    pub fn new(show_progress: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("imdb-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            show_progress,
        })
    }

    fn progress_bar(&self, total_size: u64, destination: &Path) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total_size);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("Downloading {}", display_name(destination)));
        pb
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<PathBuf> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(IngestError::DownloadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let pb = self.progress_bar(response.content_length().unwrap_or(0), destination);

        let mut file = std::io::BufWriter::new(std::fs::File::create(destination)?);
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        file.flush()?;

        pb.finish_with_message(format!("Downloaded {}", display_name(destination)));
        info!(url, bytes = downloaded, path = %destination.display(), "Downloaded dataset");

        Ok(destination.to_path_buf())
    }
}
