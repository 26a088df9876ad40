use super::{MediaError, MediaKind, MediaSource};
use crate::config::FrigateConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;

/// HTTP client for the Frigate events API
pub struct FrigateClient {
    client: reqwest::Client,
    base_url: String,
}

impl FrigateClient {
    /// Create a new client for the configured Frigate instance
    pub fn new(config: &FrigateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Media(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// URL of a media file, e.g. `/api/events/<id>/thumbnail.jpg`
    pub fn media_url(&self, event_id: &str, kind: MediaKind) -> String {
        format!(
            "{}/api/events/{}/{}",
            self.base_url,
            event_id,
            kind.file_name()
        )
    }
}

#[async_trait]
impl MediaSource for FrigateClient {
    async fn fetch(&self, event_id: &str, kind: MediaKind) -> Result<Vec<u8>, MediaError> {
        let url = self.media_url(event_id, kind);
        debug!("Fetching {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MediaError::Request(e.to_string()))?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(MediaError::Status(resp.status().as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| MediaError::Request(e.to_string()))?;

        Ok(body.to_vec())
    }
}
