//! Page fetching.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::{CrawlError, CrawlResult};

/// Maximum redirects followed for one page.
const MAX_REDIRECTS: usize = 5;

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub html: String,
}

/// Source of HTML pages.
///
/// The production implementation is [`HttpFetcher`]; tests use
/// [`MockFetcher`](crate::testing::MockFetcher).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch one page. Non-success responses are errors.
    async fn fetch(&self, url: &Url) -> CrawlResult<FetchedPage>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, url: &Url) -> CrawlResult<FetchedPage> {
        (**self).fetch(url).await
    }
}

/// Fetcher backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client with the crawl's user agent and request timeout.
    pub fn new(config: &CrawlConfig) -> CrawlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| CrawlError::Http(Box::new(e)))?;

        Ok(Self { client })
    }

    /// Use a preconfigured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> CrawlResult<FetchedPage> {
        debug!(url = %url, "HTTP fetch starting");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "HTTP request failed");
            CrawlError::Http(Box::new(e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let html = response.text().await.map_err(|e| CrawlError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!(url = %final_url, bytes = html.len(), "HTTP fetch complete");
        Ok(FetchedPage {
            url: final_url,
            html,
        })
    }
}
