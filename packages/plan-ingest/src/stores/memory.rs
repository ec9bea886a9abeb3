//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use super::{PlanStore, VectorStore};
use crate::config::DEFAULT_EMBEDDING_MODEL;
use crate::error::{StoreError, StoreResult};
use crate::types::document::Document;
use crate::types::plan::Plan;

/// A URL registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub plan_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Uuid>,
    vectors: HashMap<(Uuid, Uuid), Document>,
    plans: HashMap<Uuid, Plan>,
    registry: HashMap<(String, Uuid), RegistryEntry>,
    failing_urls: HashSet<String>,
}

/// In-memory vector and plan store.
///
/// Clones share the same data, so one instance can serve as both the
/// [`VectorStore`] and the [`PlanStore`] of an
/// [`IngestionWriter`](crate::writer::IngestionWriter). Data is lost when
/// the last clone is dropped.
#[derive(Clone)]
pub struct MemoryStore {
    collection: String,
    inner: Arc<RwLock<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store whose vector collection is named after the
    /// default embedding model.
    pub fn new() -> Self {
        Self::with_collection(DEFAULT_EMBEDDING_MODEL)
    }

    pub fn with_collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Make `replace_plan` fail for `url`.
    pub fn with_failing_url(self, url: impl Into<String>) -> Self {
        self.inner.write().unwrap().failing_urls.insert(url.into());
        self
    }

    /// Create the collection up front and return its id.
    pub fn ensure_collection(&self) -> Uuid {
        let mut inner = self.inner.write().unwrap();
        *inner
            .collections
            .entry(self.collection.clone())
            .or_insert_with(Uuid::new_v4)
    }

    /// Register `url` as ingested at `created_at` without storing a plan.
    pub fn record_visit(&self, url: impl Into<String>, created_at: DateTime<Utc>) {
        let collection_id = self.ensure_collection();
        let url = url.into();
        let mut inner = self.inner.write().unwrap();
        inner.registry.insert(
            (url.clone(), collection_id),
            RegistryEntry {
                plan_id: crate::types::plan::plan_id(&url),
                created_at,
            },
        );
    }

    pub fn plan_count(&self) -> usize {
        self.inner.read().unwrap().plans.len()
    }

    pub fn vector_count(&self) -> usize {
        self.inner.read().unwrap().vectors.len()
    }

    pub fn plan(&self, plan_id: Uuid) -> Option<Plan> {
        self.inner.read().unwrap().plans.get(&plan_id).cloned()
    }

    /// Registry rows for `url` across all collections.
    pub fn registry_entries(&self, url: &str) -> Vec<RegistryEntry> {
        self.inner
            .read()
            .unwrap()
            .registry
            .iter()
            .filter(|((u, _), _)| u == url)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn add_documents(&self, documents: &[Document]) -> StoreResult<Vec<Uuid>> {
        let collection_id = self.ensure_collection();
        let mut inner = self.inner.write().unwrap();

        Ok(documents
            .iter()
            .map(|doc| {
                inner
                    .vectors
                    .insert((collection_id, doc.plan.id), doc.clone());
                doc.plan.id
            })
            .collect())
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn collection_id(&self, name: &str) -> StoreResult<Option<Uuid>> {
        Ok(self.inner.read().unwrap().collections.get(name).copied())
    }

    async fn visited_urls(
        &self,
        collection_id: Uuid,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .registry
            .iter()
            .filter(|((_, c), entry)| *c == collection_id && entry.created_at >= since)
            .map(|((url, _), _)| url.clone())
            .collect())
    }

    async fn replace_plan(&self, collection_id: Uuid, plan: &Plan) -> StoreResult<()> {
        let mut inner = self.inner.write().unwrap();

        if inner.failing_urls.contains(&plan.url) {
            return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                "injected failure for {}",
                plan.url
            ))));
        }

        let key = (plan.url.clone(), collection_id);
        if let Some(old) = inner.registry.get(&key).map(|e| e.plan_id) {
            inner.plans.remove(&old);
        }
        inner.registry.insert(
            key,
            RegistryEntry {
                plan_id: plan.id,
                created_at: Utc::now(),
            },
        );
        inner.plans.entry(plan.id).or_insert_with(|| plan.clone());

        Ok(())
    }
}
