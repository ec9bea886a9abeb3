//! Collects documents and per-page failures from a run.
//!
//! The aggregator is the only consumer of the run's two channels. It stops
//! when both channels are closed, when the wall-clock ceiling elapses, or
//! when the run is cancelled, whichever comes first. It never waits on a
//! producer that has stopped making progress.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::PageFailure;
use crate::types::document::Document;

/// Why aggregation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOutcome {
    /// Every producer finished
    Drained,
    /// The ceiling elapsed; the run token has been cancelled
    DeadlineExceeded,
    /// The run was cancelled from outside
    Cancelled,
}

/// What a run produced.
#[derive(Debug)]
pub struct Aggregate {
    /// Non-empty documents in arrival order
    pub documents: Vec<Document>,
    pub errors: Vec<PageFailure>,
    pub outcome: AggregateOutcome,
}

/// Drain `documents` and `errors` until done, timed out or cancelled.
///
/// On timeout `cancel` is cancelled so every producer of the run stops.
/// Documents whose table has no exercise rows are dropped.
pub async fn aggregate(
    mut documents: mpsc::Receiver<Document>,
    mut errors: mpsc::Receiver<PageFailure>,
    cancel: &CancellationToken,
    ceiling: Duration,
) -> Aggregate {
    let deadline = tokio::time::sleep(ceiling);
    tokio::pin!(deadline);

    let mut collected = Collected::default();
    let mut documents_open = true;
    let mut errors_open = true;

    let outcome = loop {
        if !documents_open && !errors_open {
            break AggregateOutcome::Drained;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break AggregateOutcome::Cancelled,
            _ = &mut deadline => {
                cancel.cancel();
                break AggregateOutcome::DeadlineExceeded;
            }
            document = documents.recv(), if documents_open => match document {
                Some(document) => collected.document(document),
                None => documents_open = false,
            },
            failure = errors.recv(), if errors_open => match failure {
                Some(failure) => collected.errors.push(failure),
                None => errors_open = false,
            },
        }
    };

    // Keep whatever was already buffered when the run stopped early
    if outcome == AggregateOutcome::DeadlineExceeded {
        while let Ok(document) = documents.try_recv() {
            collected.document(document);
        }
        while let Ok(failure) = errors.try_recv() {
            collected.errors.push(failure);
        }
    }

    if !collected.errors.is_empty() {
        warn!(count = collected.errors.len(), "Run finished with page failures");
        for failure in &collected.errors {
            warn!(url = %failure.url(), error = %failure, "Page failure");
        }
    }

    info!(
        documents = collected.documents.len(),
        errors = collected.errors.len(),
        dropped_empty = collected.dropped_empty,
        outcome = ?outcome,
        "Aggregation finished"
    );

    Aggregate {
        documents: collected.documents,
        errors: collected.errors,
        outcome,
    }
}

#[derive(Default)]
struct Collected {
    documents: Vec<Document>,
    errors: Vec<PageFailure>,
    dropped_empty: usize,
}

impl Collected {
    fn document(&mut self, document: Document) {
        if document.is_empty() {
            debug!(url = %document.plan.url, "Dropping plan without rows");
            self.dropped_empty += 1;
        } else {
            self.documents.push(document);
        }
    }
}

/// Send `value` unless the run is cancelled first.
///
/// Returns `false` when the value was not delivered (cancelled, or the
/// aggregator is gone).
pub(crate) async fn send_or_cancel<T>(
    tx: &mpsc::Sender<T>,
    cancel: &CancellationToken,
    value: T,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassifyError, EnrichError};
    use crate::types::document::Metadata;
    use crate::types::plan::{Plan, Row, Table};
    use std::time::Instant;

    fn document(url: &str, rows: usize) -> Document {
        let mut table = Table::new();
        for _ in 0..rows {
            table.push(Row::new(1, 100, "Kraul"));
        }
        table.add_sum();
        table.update_sum();
        Document::new(Plan::new(url, "t", "", table), Metadata::default())
    }

    fn classifier_failure(url: &str) -> PageFailure {
        PageFailure::Enrich {
            url: url.to_string(),
            source: EnrichError::Classify(ClassifyError::Request("boom".into())),
        }
    }

    #[tokio::test]
    async fn test_drains_until_channels_close() {
        let (doc_tx, doc_rx) = mpsc::channel(1);
        let (err_tx, err_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let producer = tokio::spawn(async move {
            doc_tx.send(document("https://swim.example/1", 2)).await.unwrap();
            err_tx.send(classifier_failure("https://swim.example/2")).await.unwrap();
            doc_tx.send(document("https://swim.example/3", 1)).await.unwrap();
            doc_tx.send(document("https://swim.example/empty", 0)).await.unwrap();
        });

        let result = aggregate(doc_rx, err_rx, &cancel, Duration::from_secs(5)).await;
        producer.await.unwrap();

        assert_eq!(result.outcome, AggregateOutcome::Drained);
        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].url(), "https://swim.example/2");
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_returns_without_closed_channels() {
        let (doc_tx, doc_rx) = mpsc::channel(1);
        let (_err_tx, err_rx) = mpsc::channel::<PageFailure>(1);
        let cancel = CancellationToken::new();

        doc_tx.send(document("https://swim.example/1", 1)).await.unwrap();

        let started = Instant::now();
        let result = aggregate(doc_rx, err_rx, &cancel, Duration::from_millis(100)).await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.outcome, AggregateOutcome::DeadlineExceeded);
        assert_eq!(result.documents.len(), 1);
        assert!(cancel.is_cancelled());
        drop(doc_tx);
    }

    #[tokio::test]
    async fn test_cancellation_stops_aggregation() {
        let (_doc_tx, doc_rx) = mpsc::channel::<Document>(1);
        let (_err_tx, err_rx) = mpsc::channel::<PageFailure>(1);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = aggregate(doc_rx, err_rx, &cancel, Duration::from_secs(30)).await;
        assert_eq!(result.outcome, AggregateOutcome::Cancelled);
        assert!(result.documents.is_empty());
    }

    #[tokio::test]
    async fn test_send_or_cancel_gives_up_when_cancelled() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        tokio_test::assert_ok!(tx.try_send(1));
        cancel.cancel();

        // Channel is full; only cancellation can unblock the send
        assert!(!send_or_cancel(&tx, &cancel, 2).await);
    }
}
