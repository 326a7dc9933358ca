//! HTTP image downloads used when pulling cloud images back to the device.

use async_trait::async_trait;

use super::ImageDownloader;
use crate::Result;

#[derive(Debug, Clone)]
pub struct HttpImageDownloader {
    client: reqwest::Client,
}

impl HttpImageDownloader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageDownloader for HttpImageDownloader {
    async fn download(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Skipping image {}: HTTP {}", url, status.as_u16());
            return Ok(None);
        }

        let bytes = response.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }
}
