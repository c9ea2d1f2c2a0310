//! Default [`Downloader`] backed by `reqwest`, streaming to a temp file
//! with a running byte counter.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::collaborators::Downloader;
use crate::error::HandlerError;

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .expect("reqwest client builds with static config");
        Self { client }
    }
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, max_bytes: u64) -> Result<(std::path::PathBuf, u64), HandlerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HandlerError::transient_io(format!("download request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(HandlerError::provider(
                Some(status),
                format!("download of {url} failed with status {status}"),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(HandlerError::validation(format!(
                    "declared Content-Length {len} exceeds ceiling {max_bytes}"
                )));
            }
        }

        let temp = tempfile::NamedTempFile::new()
            .map_err(|e| HandlerError::storage(format!("could not create temp file: {e}")))?;
        let (std_file, path) = temp.keep().map_err(|e| HandlerError::storage(e.to_string()))?;
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| HandlerError::transient_io(format!("download stream error: {e}")))?;
            written += chunk.len() as u64;
            if written > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(HandlerError::validation(format!(
                    "streamed bytes exceeded ceiling {max_bytes} for {url}"
                )));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| HandlerError::storage(format!("writing downloaded bytes: {e}")))?;
        }
        file.flush()
            .await
            .map_err(|e| HandlerError::storage(format!("flushing downloaded file: {e}")))?;

        Ok((path, written))
    }
}
