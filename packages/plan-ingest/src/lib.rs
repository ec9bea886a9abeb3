//! Training-plan ingestion.
//!
//! Crawls one swim-training site, turns every plan table it finds into a
//! structured [`Plan`], classifies it, and commits the result to Postgres
//! (pgvector embeddings plus relational rows) with replace-on-conflict
//! semantics keyed by URL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use plan_ingest::{CrawlConfig, HttpFetcher, IngestionWriter, PipelineConfig, Scraper};
//! use plan_ingest::testing::{MemoryStore, MockClassifier};
//!
//! let config = PipelineConfig::new(CrawlConfig::new("swim.example"));
//! let store = MemoryStore::new();
//! let writer = IngestionWriter::new(store.clone(), store, "text-embedding-3-small");
//! let scraper = Scraper::new(
//!     HttpFetcher::new(&config.crawl)?,
//!     Arc::new(MockClassifier::new()),
//!     writer,
//!     config,
//! );
//!
//! let report = scraper.scrape_url(&CancellationToken::new(), "https://swim.example/").await?;
//! ```
//!
//! # Modules
//!
//! - [`types`] - Rows, tables, plans and documents
//! - [`extractor`] - HTML table heuristics
//! - [`crawler`] - Domain-locked, depth-bounded crawl
//! - [`enricher`] - Classification of plans
//! - [`aggregator`] - Collects a run's documents and failures
//! - [`writer`] - Transactional commit to the stores
//! - [`stores`] - Memory and Postgres storage
//! - [`ai`] - OpenAI client
//! - [`pipeline`] - One scrape run end to end
//! - [`testing`] - Mock implementations for testing

pub mod aggregator;
pub mod ai;
pub mod config;
pub mod crawler;
pub mod enricher;
pub mod error;
pub mod extractor;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod types;
pub mod visited;
pub mod writer;

pub use aggregator::{aggregate, Aggregate, AggregateOutcome};
pub use ai::{Embedder, OpenAI};
pub use config::{Config, CrawlConfig, PipelineConfig};
pub use crawler::{CrawlRun, CrawlStats, Crawler, Fetcher, HttpFetcher, UrlScope};
pub use enricher::{enrich, Classifier, EnrichmentPool};
pub use error::{
    ClassifyError, CrawlError, EnrichError, IngestError, PageFailure, ScrapeError, StoreError,
};
pub use extractor::{extract, ExtractedPage};
pub use pipeline::{ScrapeReport, Scraper};
pub use stores::{MemoryStore, PgVectorStore, PlanStore, PostgresPlanStore, VectorStore};
pub use types::document::{Document, Metadata};
pub use types::plan::{Plan, Row, Table};
pub use visited::VisitedSet;
pub use writer::IngestionWriter;
