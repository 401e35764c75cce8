use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder};
use url::Url;

use crate::classifier::normalize_scheme_relative;
use crate::config::FetchConfig;
use crate::error::FetchError;

/// Source of raw bytes for pages and assets.
///
/// Implementations must honour `timeout` and must not retry: the only retry in
/// the system is the next scheduled snapshot cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Fetch `url` and decode the body as UTF-8.
pub async fn fetch_text<F>(fetcher: &F, url: &str, timeout: Duration) -> Result<String, FetchError>
where
    F: ContentFetcher + ?Sized,
{
    let bytes = fetcher.fetch(url, timeout).await?;
    String::from_utf8(bytes).map_err(|_| FetchError::Decode {
        url: url.to_string(),
    })
}

/// [`ContentFetcher`] backed by a shared reqwest client.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Self::build_http_client(&config)?;
        Ok(Self { client, config })
    }

    fn build_http_client(config: &FetchConfig) -> Result<Client> {
        let client = ClientBuilder::new()
            .use_rustls_tls()
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(client)
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let url = normalize_scheme_relative(url);
        let parsed = Url::parse(&url).map_err(|e| FetchError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!(%url, ?timeout, "GET");
        let response = self
            .client
            .get(parsed)
            .header(CONTENT_TYPE, self.config.content_type.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&url, e))?;

        Ok(content.to_vec())
    }
}
