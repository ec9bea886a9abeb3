//! Plan enrichment through an external classifier.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::aggregator::send_or_cancel;
use crate::error::{ClassifyError, EnrichError, PageFailure};
use crate::types::document::{Document, Metadata};
use crate::types::plan::Plan;

/// Attaches classification metadata to a plan.
///
/// Implementations must treat output that does not deserialize into
/// [`Metadata`] as an error.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, plan: &Plan) -> Result<Metadata, ClassifyError>;
}

/// Classify one plan, giving up as soon as `cancel` fires.
pub async fn enrich(
    cancel: &CancellationToken,
    classifier: &dyn Classifier,
    plan: Plan,
) -> Result<Document, EnrichError> {
    let metadata = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(EnrichError::Cancelled),
        result = classifier.classify(&plan) => result?,
    };
    Ok(Document::new(plan, metadata))
}

/// Spawns one enrichment task per plan on the run's task tracker.
///
/// Tasks are limited by a semaphore so a large crawl cannot flood the
/// classifier. Each task sends either one document or one failure; both
/// sends race against the run's cancellation token.
#[derive(Clone)]
pub struct EnrichmentPool {
    classifier: Arc<dyn Classifier>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    documents: mpsc::Sender<Document>,
    errors: mpsc::Sender<PageFailure>,
    cancel: CancellationToken,
}

impl EnrichmentPool {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        tracker: TaskTracker,
        parallelism: usize,
        documents: mpsc::Sender<Document>,
        errors: mpsc::Sender<PageFailure>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            classifier,
            tracker,
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
            documents,
            errors,
            cancel,
        }
    }

    /// Start enriching `plan` in the background.
    pub fn spawn(&self, plan: Plan) {
        let pool = self.clone();
        self.tracker.spawn(async move { pool.enrich_one(plan).await });
    }

    async fn enrich_one(self, plan: Plan) {
        let url = plan.url.clone();

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        match enrich(&self.cancel, self.classifier.as_ref(), plan).await {
            Ok(document) => {
                debug!(url = %url, "Plan enriched");
                send_or_cancel(&self.documents, &self.cancel, document).await;
            }
            Err(EnrichError::Cancelled) => {
                debug!(url = %url, "Enrichment cancelled");
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Enrichment failed");
                let failure = PageFailure::Enrich { url, source: e };
                send_or_cancel(&self.errors, &self.cancel, failure).await;
            }
        }
    }
}
