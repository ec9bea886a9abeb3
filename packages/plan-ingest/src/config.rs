//! Configuration.
//!
//! [`CrawlConfig`] and [`PipelineConfig`] are plain library types with
//! builder setters. [`Config`] is the process-level configuration the
//! binary loads from the environment.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default embedding model; also names the vector collection.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default model used for classification.
pub const DEFAULT_CLASSIFIER_MODEL: &str = "gpt-4o-mini";

const DEFAULT_USER_AGENT: &str = "SwimPlanBot/1.0";

/// Configuration for a crawl.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Host the crawl is locked to (sub-domains included)
    pub allowed_domain: String,

    /// Maximum link hops from the seed
    pub max_depth: usize,

    /// Maximum concurrent page fetches
    pub parallelism: usize,

    pub user_agent: String,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl CrawlConfig {
    pub fn new(allowed_domain: impl Into<String>) -> Self {
        Self {
            allowed_domain: allowed_domain.into(),
            max_depth: 2,
            parallelism: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the fetch concurrency (at least 1).
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Configuration for a full scrape run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub crawl: CrawlConfig,

    /// Maximum concurrent classifier calls
    pub enrich_parallelism: usize,

    /// Wall-clock ceiling for crawl + enrichment
    pub run_timeout: Duration,

    /// How far back the URL history reaches
    pub history_window: chrono::Duration,
}

impl PipelineConfig {
    pub fn new(crawl: CrawlConfig) -> Self {
        Self {
            crawl,
            enrich_parallelism: 4,
            run_timeout: Duration::from_secs(300),
            history_window: chrono::Duration::days(30),
        }
    }

    /// Set the classifier concurrency (at least 1).
    pub fn with_enrich_parallelism(mut self, parallelism: usize) -> Self {
        self.enrich_parallelism = parallelism.max(1);
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_history_window(mut self, window: chrono::Duration) -> Self {
        self.history_window = window;
        self
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub openai_api_key: String,
    pub embedding_model: String,
    pub classifier_model: String,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let crawl = CrawlConfig::new(
            env::var("ALLOWED_DOMAIN").context("ALLOWED_DOMAIN must be set")?,
        )
        .with_max_depth(parse_or("MAX_DEPTH", 2)?)
        .with_parallelism(parse_or("PARALLELISM", 4)?)
        .with_user_agent(env::var("USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()))
        .with_request_timeout(Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 30)?));

        let pipeline = PipelineConfig::new(crawl)
            .with_enrich_parallelism(parse_or("ENRICH_PARALLELISM", 4)?)
            .with_run_timeout(Duration::from_secs(parse_or("RUN_TIMEOUT_SECS", 300)?))
            .with_history_window(chrono::Duration::days(parse_or("HISTORY_WINDOW_DAYS", 30)?));

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string()),
            classifier_model: env::var("CLASSIFIER_MODEL")
                .unwrap_or_else(|_| DEFAULT_CLASSIFIER_MODEL.to_string()),
            pipeline,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}
