//! Streaming file downloads.

use std::path::Path;

use futures::StreamExt;
use reqwest::Client;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};

/// Streams remote files to local paths.
#[derive(Debug, Clone)]
pub struct Downloader {
    http: Client,
}

impl Downloader {
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    /// Download `url` into `dest`, returning the number of bytes written.
    ///
    /// On failure the partially written file is removed and
    /// [`Error::DownloadFailed`] carries the original URL.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        match self.stream_to_file(url, dest).await {
            Ok(written) => {
                debug!("Downloaded {} ({} bytes) -> {}", url, written, dest.display());
                Ok(written)
            }
            Err(err) => {
                let _ = fs::remove_file(dest).await;
                let reason = match err {
                    Error::DownloadFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                Err(Error::DownloadFailed {
                    url: url.to_string(),
                    reason,
                })
            }
        }
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
