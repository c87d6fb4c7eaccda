// reqwest-backed HttpFetcher for thumbnails and caption tracks

use std::time::Duration;

use async_trait::async_trait;

use super::errors::DownloadError;
use super::traits::HttpFetcher;

pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Client with a request timeout, routed through `proxy` when given
    pub fn new(timeout_secs: u64, proxy: Option<&str>) -> Result<Self, DownloadError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(timeout_secs));

        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| DownloadError::Http(format!("invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| DownloadError::Http(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DownloadError::Http(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
