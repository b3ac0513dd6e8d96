//! HTTP provider clients
//!
//! Thin reqwest wrappers over the common embedding and rerank endpoint
//! shapes: the OpenAI-compatible `/embeddings` contract (served by OpenAI,
//! DashScope/Qwen, and most gateways), Gemini's `embedContent`, and the
//! Jina/Cohere `/rerank` contract.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{EmbeddingProvider, EmbeddingSettings, ProviderError, RankedDoc, RerankProvider,
    RerankSettings};

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const DASHSCOPE_BASE: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";
const JINA_BASE: &str = "https://api.jina.ai/v1";
const COHERE_BASE: &str = "https://api.cohere.com/v2";

fn request_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Request(e.to_string())
}

// ============================================================================
// OPENAI-COMPATIBLE EMBEDDINGS
// ============================================================================

/// OpenAI-compatible `/embeddings` client. Also serves Qwen via the
/// DashScope compatible-mode endpoint.
pub struct OpenAiCompatEmbeddings {
    client: reqwest::Client,
    id: String,
    model: String,
    base_url: String,
    api_key: String,
    instruction_prefix: Option<String>,
}

impl OpenAiCompatEmbeddings {
    pub fn new(settings: &EmbeddingSettings) -> std::result::Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("missing embeddings API key".into()))?;
        let base_url = settings.base_url.clone().unwrap_or_else(|| {
            match settings.provider.as_str() {
                "qwen" | "dashscope" | "tongyi" => DASHSCOPE_BASE.to_string(),
                _ => OPENAI_BASE.to_string(),
            }
        });
        Ok(Self {
            client: reqwest::Client::new(),
            id: settings.provider.clone(),
            model: settings.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            instruction_prefix: settings.instruction_prefix(),
        })
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingData>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatEmbeddings {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn instruction_prefix(&self) -> Option<&str> {
        self.instruction_prefix.as_deref()
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": [text] }))
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        let body: OpenAiEmbeddingResponse = response.json().await.map_err(request_error)?;
        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("empty data array".into()))
    }
}

// ============================================================================
// GEMINI EMBEDDINGS
// ============================================================================

/// Gemini `embedContent` client. No instruction prefix by default.
pub struct GeminiEmbeddings {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    instruction_prefix: Option<String>,
}

impl GeminiEmbeddings {
    pub fn new(settings: &EmbeddingSettings) -> std::result::Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("missing Gemini API key".into()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            model: settings.model.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            instruction_prefix: settings.instruction_prefix(),
        })
    }
}

#[derive(Deserialize)]
struct GeminiEmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingValues,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddings {
    fn id(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn instruction_prefix(&self) -> Option<&str> {
        self.instruction_prefix.as_deref()
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        let url = format!(
            "{}/v1beta/models/{}:embedContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(url)
            .json(&json!({ "content": { "parts": [{ "text": text }] } }))
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        let body: GeminiEmbeddingResponse = response.json().await.map_err(request_error)?;
        Ok(body.embedding.values)
    }
}

// ============================================================================
// RERANK
// ============================================================================

/// Jina/Cohere-shaped `/rerank` client: both take `{model, query,
/// documents}` and answer `{results: [{index, relevance_score}]}`.
pub struct HttpRerank {
    client: reqwest::Client,
    id: String,
    model: String,
    base_url: String,
    api_key: String,
}

impl HttpRerank {
    pub fn new(settings: &RerankSettings) -> std::result::Result<Self, ProviderError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("missing rerank API key".into()))?;
        let base_url = settings.base_url.clone().unwrap_or_else(|| {
            match settings.provider.as_str() {
                "cohere" => COHERE_BASE.to_string(),
                _ => JINA_BASE.to_string(),
            }
        });
        Ok(Self {
            client: reqwest::Client::new(),
            id: settings.provider.clone(),
            model: settings.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct RerankResultItem {
    index: usize,
    relevance_score: f64,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultItem>,
}

#[async_trait]
impl RerankProvider for HttpRerank {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
    ) -> std::result::Result<Vec<RankedDoc>, ProviderError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "query": query,
                "documents": documents,
            }))
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?;

        let body: RerankResponse = response.json().await.map_err(request_error)?;
        Ok(body
            .results
            .into_iter()
            .map(|r| RankedDoc {
                index: r.index,
                relevance_score: r.relevance_score,
            })
            .collect())
    }
}
