//! AI provider seams: embeddings here, classification in [`crate::enricher`].

pub mod openai;
pub mod schema;

pub use openai::OpenAI;
pub use schema::StructuredOutput;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Turns document text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model name; the vector collection is named after it.
    fn model(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> StoreResult<Vec<Vec<f32>>>;
}
