//! Commits a run's documents to the vector and relational stores.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::{IngestError, StoreError};
use crate::stores::{PlanStore, VectorStore};
use crate::types::document::Document;

/// Writes documents to both stores.
///
/// Vectors go first in one batch. Each plan is then committed in its own
/// transaction, so a failure part-way leaves earlier plans committed and
/// the vectors of later ones orphaned until the next run rewrites them.
pub struct IngestionWriter<V, P> {
    vectors: V,
    plans: P,
    embedding_model: String,
}

impl<V: VectorStore, P: PlanStore> IngestionWriter<V, P> {
    pub fn new(vectors: V, plans: P, embedding_model: impl Into<String>) -> Self {
        Self {
            vectors,
            plans,
            embedding_model: embedding_model.into(),
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Store `documents`. Re-committing the same documents is a no-op in
    /// effect: one registry row per URL, one plan row per id.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    pub async fn commit(&self, documents: &[Document]) -> Result<(), IngestError> {
        if documents.is_empty() {
            return Ok(());
        }

        self.vectors
            .add_documents(documents)
            .await
            .map_err(IngestError::VectorStore)?;

        let collection_id = self
            .plans
            .collection_id(&self.embedding_model)
            .await
            .map_err(IngestError::Collection)?
            .ok_or_else(|| IngestError::MissingCollection {
                model: self.embedding_model.clone(),
            })?;

        for document in documents {
            let plan = &document.plan;
            self.plans
                .replace_plan(collection_id, plan)
                .await
                .map_err(|source| IngestError::Document {
                    url: plan.url.clone(),
                    plan_id: plan.id,
                    source,
                })?;
        }

        info!(committed = documents.len(), "Documents committed");
        Ok(())
    }

    /// URLs ingested since `since`; empty when nothing was ever ingested.
    pub async fn history(&self, since: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        match self.plans.collection_id(&self.embedding_model).await? {
            Some(collection_id) => self.plans.visited_urls(collection_id, since).await,
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_EMBEDDING_MODEL;
    use crate::stores::MemoryStore;
    use crate::types::document::Metadata;
    use crate::types::plan::{plan_id, Plan, Row, Table};

    fn document(url: &str) -> Document {
        let mut table = Table::new();
        table.push(Row::new(2, 100, "Kraul"));
        table.add_sum();
        table.update_sum();
        Document::new(Plan::new(url, "Plan", "", table), Metadata::default())
    }

    fn writer(store: &MemoryStore) -> IngestionWriter<MemoryStore, MemoryStore> {
        IngestionWriter::new(store.clone(), store.clone(), DEFAULT_EMBEDDING_MODEL)
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let store = MemoryStore::new();
        let writer = writer(&store);
        let docs = vec![document("https://swim.example/1"), document("https://swim.example/2")];

        writer.commit(&docs).await.unwrap();
        writer.commit(&docs).await.unwrap();

        assert_eq!(store.plan_count(), 2);
        assert_eq!(store.vector_count(), 2);
        assert_eq!(store.registry_entries("https://swim.example/1").len(), 1);
        let stored = store.plan(plan_id("https://swim.example/1")).unwrap();
        assert_eq!(stored.table, docs[0].plan.table);
    }

    #[tokio::test]
    async fn test_commit_failure_names_url() {
        let store = MemoryStore::new().with_failing_url("https://swim.example/2");
        let writer = writer(&store);
        let docs = vec![document("https://swim.example/1"), document("https://swim.example/2")];

        let err = writer.commit(&docs).await.unwrap_err();
        match err {
            IngestError::Document { url, .. } => assert_eq!(url, "https://swim.example/2"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.plan_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let vectors = MemoryStore::with_collection("other-model");
        let writer = IngestionWriter::new(vectors, MemoryStore::new(), DEFAULT_EMBEDDING_MODEL);

        let err = writer.commit(&[document("https://swim.example/1")]).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingCollection { .. }));
    }

    #[tokio::test]
    async fn test_empty_commit_and_history() {
        let store = MemoryStore::new();
        let writer = writer(&store);

        tokio_test::assert_ok!(writer.commit(&[]).await);
        assert_eq!(store.vector_count(), 0);
        assert!(writer.history(Utc::now()).await.unwrap().is_empty());
    }
}
