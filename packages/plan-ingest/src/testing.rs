//! Testing utilities including mock implementations.
//!
//! These let the pipeline run end to end without network, AI or database.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use url::Url;

use crate::ai::Embedder;
use crate::config::DEFAULT_EMBEDDING_MODEL;
use crate::crawler::{FetchedPage, Fetcher};
use crate::enricher::Classifier;
use crate::error::{ClassifyError, CrawlError, CrawlResult, StoreResult};
use crate::types::document::Metadata;
use crate::types::plan::Plan;

pub use crate::stores::MemoryStore;

/// A fetcher serving pages from memory.
///
/// Unknown URLs answer with HTTP 404.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, String>,
    redirects: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<String>>>,
    in_flight: InFlight,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` for `url`.
    pub fn with_page(mut self, url: &str, html: impl Into<String>) -> Self {
        self.pages.insert(normalize(url), html.into());
        self
    }

    /// Answer requests for `from` with the page served at `to`, the way a
    /// client following a redirect would.
    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(normalize(from), normalize(to));
        self
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }

    /// Highest number of fetches that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.peak()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> CrawlResult<FetchedPage> {
        self.calls.write().unwrap().push(url.to_string());
        let _guard = self.in_flight.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let target = match self.redirects.get(url.as_str()) {
            Some(to) => Url::parse(to).map_err(|_| CrawlError::InvalidUrl { url: to.clone() })?,
            None => url.clone(),
        };

        match self.pages.get(target.as_str()) {
            Some(html) => Ok(FetchedPage {
                url: target,
                html: html.clone(),
            }),
            None => Err(CrawlError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// A classifier returning fixed metadata.
#[derive(Default)]
pub struct MockClassifier {
    failing_urls: HashSet<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: InFlight,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The metadata every successful call returns.
    pub fn metadata() -> Metadata {
        Metadata {
            stroke: "freestyle".into(),
            focus: "endurance".into(),
            level: "intermediate".into(),
            target_group: "masters".into(),
            equipment: vec!["pull buoy".into()],
            keywords: vec!["ga1".into()],
        }
    }

    /// Fail classification of the plan from `url`.
    pub fn with_failing_url(mut self, url: impl Into<String>) -> Self {
        self.failing_urls.insert(url.into());
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of classifications that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.peak()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, plan: &Plan) -> Result<Metadata, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.in_flight.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_urls.contains(&plan.url) {
            return Err(ClassifyError::Malformed(format!(
                "mock failure for {}",
                plan.url
            )));
        }
        Ok(Self::metadata())
    }
}

/// Deterministic embeddings derived from the text bytes.
pub struct MockEmbedder {
    model: String,
    dim: usize,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dim: 8,
        }
    }

    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let seed = text
            .bytes()
            .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        (0..self.dim)
            .map(|i| ((seed.wrapping_add(i as u64 * 7919)) % 1000) as f32 / 1000.0)
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> StoreResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

/// Counts concurrent calls and remembers the peak.
#[derive(Default)]
struct InFlight {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self.current.clone())
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn normalize(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}
