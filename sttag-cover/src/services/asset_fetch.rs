//! Cover image download

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("sttag/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },
}

/// Downloads a remote asset into memory
#[async_trait]
pub trait AssetFetch: Send + Sync {
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed [`AssetFetch`]
pub struct HttpAssetFetcher {
    http_client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl AssetFetch for HttpAssetFetcher {
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(url = %url, "Downloading asset");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::NetworkError(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}
