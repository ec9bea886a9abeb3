//! Storage seams.
//!
//! - [`VectorStore`]: embeddings plus their filterable attributes, batched
//! - [`PlanStore`]: plan rows, the URL registry and collection lookup
//!
//! [`MemoryStore`] implements both for tests and development; the Postgres
//! implementations share one pool.

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, RegistryEntry};
pub use postgres::{PgVectorStore, PostgresPlanStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreResult;
use crate::types::document::Document;
use crate::types::plan::Plan;

/// Batched, all-or-nothing vector writes.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store documents and return their ids (the plan ids), in input order.
    ///
    /// Creates the collection on first write. Re-adding a document replaces
    /// its previous vector.
    async fn add_documents(&self, documents: &[Document]) -> StoreResult<Vec<Uuid>>;
}

/// Relational side of the ingestion.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Id of the collection named `name`, if it exists.
    async fn collection_id(&self, name: &str) -> StoreResult<Option<Uuid>>;

    /// URLs registered in `collection_id` at or after `since`.
    async fn visited_urls(&self, collection_id: Uuid, since: DateTime<Utc>)
        -> StoreResult<Vec<String>>;

    /// Replace whatever plan is registered for `plan.url` with `plan`.
    ///
    /// Runs as one transaction: delete the old plan row, point the registry
    /// entry at the new id, insert the new plan row if it does not exist.
    async fn replace_plan(&self, collection_id: Uuid, plan: &Plan) -> StoreResult<()>;
}
