use async_trait::async_trait;
use common::{ArchiveMetadata, Camera, CameraDataResponse, PlayerError, Result};
use reqwest::Client;
use tracing::{debug, warn};

use crate::archive::source::metadata_url;
use crate::config::ServerConfig;

/// Source of recording metadata for a camera
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch_archive_metadata(&self, camera: &Camera) -> Result<ArchiveMetadata>;
}

pub struct HttpDataProvider {
    client: Client,
}

impl HttpDataProvider {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| PlayerError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl DataProvider for HttpDataProvider {
    async fn fetch_archive_metadata(&self, camera: &Camera) -> Result<ArchiveMetadata> {
        let url = metadata_url(camera);
        debug!(camera = %camera.name, "Fetching archive metadata");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PlayerError::MetadataFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), camera = %camera.name, "Metadata request rejected");
            return Err(PlayerError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body: CameraDataResponse = response
            .json()
            .await
            .map_err(|e| PlayerError::MetadataFetch(e.to_string()))?;

        body.into_metadata(camera.real_time)
            .ok_or_else(|| PlayerError::ArchiveDataMissing(camera.name.clone()))
    }
}
