//! HTTP client for the remote image source.

mod response;

pub use response::HttpResponse;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use crate::services::sync::{FetchError, ImageSource};

/// Default user agent for image requests.
pub const USER_AGENT: &str = concat!("xblsync/", env!("CARGO_PKG_VERSION"));

/// Connection settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Skip server certificate validation.
    ///
    /// The image CDN has been observed serving certificates that fail
    /// validation; this must be opted into explicitly.
    pub accept_invalid_certs: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: USER_AGENT.to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// HTTP client issuing single-attempt GET requests.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self, reqwest::Error> {
        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate validation is disabled for image downloads");
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self { client })
    }

    /// Make a GET request.
    pub async fn get(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).send().await?;
        Ok(HttpResponse::from_response(response))
    }
}

#[async_trait]
impl ImageSource for HttpClient {
    async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(FetchError::Status(response.status.as_u16()));
        }

        let declared = response.content_type().map(str::to_string);
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let detected = infer::get(&bytes).map(|kind| kind.mime_type());
        if !detected.is_some_and(|mime| mime.starts_with("image/")) {
            tracing::debug!(
                "Response from {} does not look like an image (declared {:?}, detected {:?})",
                url,
                declared,
                detected
            );
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates_certificates() {
        let config = HttpClientConfig::default();
        assert!(!config.accept_invalid_certs);
        assert!(config.user_agent.starts_with("xblsync/"));
    }

    #[test]
    fn test_client_builds_with_permissive_tls() {
        let config = HttpClientConfig {
            accept_invalid_certs: true,
            ..Default::default()
        };
        assert!(HttpClient::new(&config).is_ok());
    }
}
