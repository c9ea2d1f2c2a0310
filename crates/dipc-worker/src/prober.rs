//! Default [`ProbeFile`] implementation: HEAD request (GET fallback) for
//! `http(s)://` URLs, a direct `stat` for the `local://` scheme used by
//! files C7 extracts from an archive onto local disk.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{FileProbe, ProbeFile};
use crate::error::HandlerError;

pub struct DefaultFileProber {
    client: reqwest::Client,
}

impl DefaultFileProber {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");
        Self { client }
    }

    fn filename_from_url(url: &str) -> String {
        url.rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("unknown_file")
            .to_string()
    }

    async fn probe_local(&self, path: &str) -> Result<FileProbe, HandlerError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| HandlerError::validation(format!("local file {path} not accessible: {e}")))?;
        let filename = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("unknown_file")
            .to_string();
        Ok(FileProbe {
            filename,
            size_bytes: metadata.len(),
            content_type: None,
        })
    }

    async fn probe_http(&self, url: &str) -> Result<FileProbe, HandlerError> {
        let filename = Self::filename_from_url(url);

        let head = self.client.head(url).send().await;
        if let Ok(response) = head {
            if response.status().is_success() {
                if let Some(len) = response.content_length() {
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    return Ok(FileProbe {
                        filename,
                        size_bytes: len,
                        content_type,
                    });
                }
            }
        }

        // HEAD didn't yield a usable length; fetch once and size
        // the body directly.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HandlerError::transient_io(format!("probe request failed for {url}: {e}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(HandlerError::provider(Some(status), format!("probe of {url} failed with status {status}")));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HandlerError::transient_io(format!("probe body read failed for {url}: {e}")))?;
        Ok(FileProbe {
            filename,
            size_bytes: bytes.len() as u64,
            content_type,
        })
    }
}

impl Default for DefaultFileProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeFile for DefaultFileProber {
    async fn probe(&self, file_url: &str) -> Result<FileProbe, HandlerError> {
        if let Some(path) = file_url.strip_prefix("local://") {
            self.probe_local(path).await
        } else {
            self.probe_http(file_url).await
        }
    }
}
