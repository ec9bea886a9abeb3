//! Typed errors for the ingestion pipeline.
//!
//! Errors are split along the three failure classes of a run:
//! - per-page failures ([`PageFailure`]) are collected and logged, never fatal
//! - store and ingestion failures ([`StoreError`], [`IngestError`]) abort the commit
//! - [`ScrapeError`] is the single reason handed back to whoever triggered the run

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur while fetching a page.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Server answered with a non-success status
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// Invalid URL format
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// URL is outside the crawl scope (wrong host or scheme)
    #[error("URL outside allowed domain {domain}: {url}")]
    OutOfScope { url: String, domain: String },

    /// Response body could not be read
    #[error("failed to read body of {url}: {reason}")]
    Body { url: String, reason: String },
}

/// Errors returned by a [`Classifier`](crate::enricher::Classifier).
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Provider request failed (network, non-2xx)
    #[error("classifier request failed: {0}")]
    Request(String),

    /// Provider answered with something that is not valid metadata
    #[error("malformed classifier output: {0}")]
    Malformed(String),

    /// Missing API key or model
    #[error("classifier config error: {0}")]
    Config(String),
}

/// Errors produced by an enrichment task.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The run was cancelled while the classifier call was in flight
    #[error("enrichment cancelled")]
    Cancelled,
}

/// A recoverable failure for a single page.
///
/// Sent on the run's error channel and collected by the aggregator.
#[derive(Debug, Error)]
pub enum PageFailure {
    #[error("fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: CrawlError,
    },

    #[error("enrich {url}: {source}")]
    Enrich {
        url: String,
        #[source]
        source: EnrichError,
    },
}

impl PageFailure {
    /// URL of the page that failed.
    pub fn url(&self) -> &str {
        match self {
            Self::Fetch { url, .. } | Self::Enrich { url, .. } => url,
        }
    }
}

/// Errors raised by the vector and relational stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Embedding provider failed or returned the wrong number of vectors
    #[error("embedding error: {0}")]
    Embedding(String),
}

/// Errors that abort a commit.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Batched vector write failed; nothing was written to the relational store
    #[error("vector store write failed: {0}")]
    VectorStore(#[source] StoreError),

    /// No collection exists for the embedding model
    #[error("no collection for embedding model {model}")]
    MissingCollection { model: String },

    /// Collection lookup failed
    #[error("collection lookup failed: {0}")]
    Collection(#[source] StoreError),

    /// A per-document transaction failed
    #[error("failed to commit plan {plan_id} ({url}): {source}")]
    Document {
        url: String,
        plan_id: Uuid,
        #[source]
        source: StoreError,
    },
}

/// Run-level failures surfaced to the caller of `scrape_url`.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The seed URL could not be visited at all
    #[error("cannot visit seed {url}: {source}")]
    Seed {
        url: String,
        #[source]
        source: CrawlError,
    },

    /// Visited history could not be loaded
    #[error("failed to load visited history: {0}")]
    History(#[source] StoreError),

    #[error("ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    /// The run exceeded its wall-clock ceiling
    #[error("scrape exceeded {0:?}")]
    DeadlineExceeded(Duration),

    /// The caller cancelled the run
    #[error("scrape cancelled")]
    Cancelled,
}

/// Result type alias for fetch operations.
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
