//! One scrape run: history → crawl + enrich → aggregate → commit.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, instrument, warn};

use crate::aggregator::{aggregate, AggregateOutcome};
use crate::config::PipelineConfig;
use crate::crawler::{CrawlRun, Crawler, Fetcher};
use crate::enricher::{Classifier, EnrichmentPool};
use crate::error::{PageFailure, ScrapeError};
use crate::stores::{PlanStore, VectorStore};
use crate::visited::VisitedSet;
use crate::writer::IngestionWriter;

/// Capacity of the document and error channels.
const CHANNEL_CAPACITY: usize = 1;

/// Summary of a finished run.
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub pages_visited: usize,
    /// Non-empty documents produced
    pub documents: usize,
    /// Documents written to the stores
    pub committed: usize,
    pub failures: Vec<PageFailure>,
}

/// Runs scrapes against one domain and one pair of stores.
pub struct Scraper<F, V, P> {
    crawler: Crawler<F>,
    classifier: Arc<dyn Classifier>,
    writer: IngestionWriter<V, P>,
    config: PipelineConfig,
}

impl<F, V, P> Scraper<F, V, P>
where
    F: Fetcher + 'static,
    V: VectorStore,
    P: PlanStore,
{
    pub fn new(
        fetcher: F,
        classifier: Arc<dyn Classifier>,
        writer: IngestionWriter<V, P>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            crawler: Crawler::new(fetcher, config.crawl.clone()),
            classifier,
            writer,
            config,
        }
    }

    pub fn writer(&self) -> &IngestionWriter<V, P> {
        &self.writer
    }

    /// Crawl from `seed`, enrich every plan found and commit the result.
    ///
    /// Per-page failures are logged and returned in the report. The run
    /// fails only when the seed cannot be visited, the history cannot be
    /// read, the commit fails, the run exceeds its timeout, or `cancel`
    /// fires. On timeout the documents gathered so far are still committed.
    /// On cancellation nothing is committed.
    #[instrument(skip(self, cancel))]
    pub async fn scrape_url(
        &self,
        cancel: &CancellationToken,
        seed: &str,
    ) -> Result<ScrapeReport, ScrapeError> {
        let since = Utc::now() - self.config.history_window;
        let history = self
            .writer
            .history(since)
            .await
            .map_err(ScrapeError::History)?;
        info!(history = history.len(), "Loaded visited history");
        let visited = Arc::new(history.into_iter().collect::<VisitedSet>());

        let run_cancel = cancel.child_token();
        let (doc_tx, doc_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let tracker = TaskTracker::new();

        let run = CrawlRun {
            visited,
            enrichment: EnrichmentPool::new(
                self.classifier.clone(),
                tracker.clone(),
                self.config.enrich_parallelism,
                doc_tx,
                err_tx.clone(),
                run_cancel.clone(),
            ),
            errors: err_tx,
            cancel: run_cancel.clone(),
        };

        let (crawled, collected) = tokio::join!(
            self.crawler.run(seed, run),
            aggregate(doc_rx, err_rx, &run_cancel, self.config.run_timeout),
        );

        // Stop whatever is still running before deciding the outcome
        run_cancel.cancel();
        tracker.close();
        tracker.wait().await;

        // Only the seed can fail a crawl
        let stats = crawled.map_err(|source| ScrapeError::Seed {
            url: seed.to_string(),
            source,
        })?;

        if collected.outcome == AggregateOutcome::Cancelled {
            warn!("Scrape cancelled, nothing committed");
            return Err(ScrapeError::Cancelled);
        }

        self.writer.commit(&collected.documents).await?;

        let report = ScrapeReport {
            pages_visited: stats.pages_visited,
            documents: collected.documents.len(),
            committed: collected.documents.len(),
            failures: collected.errors,
        };

        if collected.outcome == AggregateOutcome::DeadlineExceeded {
            warn!(
                committed = report.committed,
                timeout = ?self.config.run_timeout,
                "Scrape timed out, partial results committed"
            );
            return Err(ScrapeError::DeadlineExceeded(self.config.run_timeout));
        }

        info!(
            pages_visited = report.pages_visited,
            committed = report.committed,
            failures = report.failures.len(),
            "Scrape finished"
        );
        Ok(report)
    }
}
