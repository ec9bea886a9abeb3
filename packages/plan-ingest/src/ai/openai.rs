//! OpenAI REST client for classification and embeddings.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::schema::StructuredOutput;
use super::Embedder;
use crate::config::{DEFAULT_CLASSIFIER_MODEL, DEFAULT_EMBEDDING_MODEL};
use crate::enricher::Classifier;
use crate::error::{ClassifyError, StoreError, StoreResult};
use crate::types::document::Metadata;
use crate::types::plan::Plan;

const CLASSIFY_SYSTEM_PROMPT: &str = "You classify swim training plans. \
Read the plan title, description and exercise table and describe the plan \
with the requested attributes. Use lowercase English values.";

#[derive(Debug, thiserror::Error)]
enum OpenAIError {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<OpenAIError> for ClassifyError {
    fn from(e: OpenAIError) -> Self {
        match e {
            OpenAIError::Config(msg) => ClassifyError::Config(msg),
            OpenAIError::Parse(msg) => ClassifyError::Malformed(msg),
            e => ClassifyError::Request(e.to_string()),
        }
    }
}

impl From<OpenAIError> for StoreError {
    fn from(e: OpenAIError) -> Self {
        StoreError::Embedding(e.to_string())
    }
}

/// OpenAI client.
///
/// ```rust,ignore
/// let openai = OpenAI::from_env()?.with_model("gpt-4o-mini");
/// let metadata = openai.classify(&plan).await?;
/// ```
#[derive(Clone)]
pub struct OpenAI {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OpenAI {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }

    /// Create from environment variable `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, ClassifyError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ClassifyError::Config("OPENAI_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }

    /// Set the chat model used for classification.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Set a custom base URL (for Azure, proxies, etc.).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Chat completion constrained to the JSON schema of `T`.
    async fn structured_output<T: StructuredOutput>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, OpenAIError> {
        if self.api_key.is_empty() {
            return Err(OpenAIError::Config("empty API key".into()));
        }

        let request = StructuredRequest {
            model: &self.model,
            messages: vec![
                Message { role: "system", content: system },
                Message { role: "user", content: user },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: T::type_name(),
                    schema: T::openai_schema(),
                    strict: true,
                },
            },
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Structured output request failed");
                OpenAIError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(OpenAIError::Api(format!(
                "OpenAI structured output error: {}",
                error_text
            )));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| OpenAIError::Api("No response from OpenAI".into()))?;

        serde_json::from_str(&content).map_err(|e| OpenAIError::Parse(e.to_string()))
    }

    /// Embed several texts in one request.
    async fn create_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, OpenAIError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };

        let response = self
            .http_client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Embedding request failed");
                OpenAIError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(error = %error_text, "OpenAI embedding error");
            return Err(OpenAIError::Api(format!("OpenAI embedding error: {}", error_text)));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| OpenAIError::Parse(e.to_string()))?;

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Classifier for OpenAI {
    async fn classify(&self, plan: &Plan) -> Result<Metadata, ClassifyError> {
        debug!(url = %plan.url, model = %self.model, "Classifying plan");
        Ok(self
            .structured_output::<Metadata>(CLASSIFY_SYSTEM_PROMPT, &plan.text())
            .await?)
    }
}

#[async_trait]
impl Embedder for OpenAI {
    fn model(&self) -> &str {
        &self.embedding_model
    }

    async fn embed_batch(&self, texts: &[String]) -> StoreResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.create_embeddings(texts).await?)
    }
}

#[derive(Serialize)]
struct StructuredRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    schema: Value,
    strict: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}
