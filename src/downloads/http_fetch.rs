use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::traits::{ContentFetch, FetchResponse};
use crate::config::DownloadConfig;

/// `ContentFetch` over HTTP(S) using the server's media download endpoint
#[derive(Debug, Clone)]
pub struct HttpContentFetch {
    client: Client,
}

impl HttpContentFetch {
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// `{server_url}/api/media/{content_id}/download`
    pub fn download_url(server_url: &str, content_id: &str) -> Result<Url> {
        let mut url =
            Url::parse(server_url).with_context(|| format!("Invalid server URL: {}", server_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Server URL cannot be a base: {}", server_url))?
            .pop_if_empty()
            .extend(["api", "media", content_id, "download"]);
        Ok(url)
    }
}

#[async_trait]
impl ContentFetch for HttpContentFetch {
    async fn fetch(
        &self,
        server_url: &str,
        content_id: &str,
        auth_token: &str,
    ) -> Result<FetchResponse> {
        let url = Self::download_url(server_url, content_id)?;
        debug!("Requesting {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(auth_token)
            .send()
            .await
            .context("Failed to send download request")?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!(
            "Download response: status {}, content length {:?}",
            status, content_length
        );

        let body = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Ok(FetchResponse {
            status,
            content_length,
            body,
        })
    }
}
