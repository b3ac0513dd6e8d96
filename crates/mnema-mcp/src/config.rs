//! Configuration-by-environment
//!
//! Everything the server needs arrives through environment variables,
//! resolved once at startup:
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `AGENT_MEMORY_DB` | Durable file path (default `./agent-memory.db`) |
//! | `AGENT_MEMORY_AGENT_ID` | Tenant scope (default `default`) |
//! | `AGENT_MEMORY_EMBEDDINGS_PROVIDER` | `none`/`openai`/`gemini`/`google`/`qwen`/`dashscope`/`tongyi` |
//! | `AGENT_MEMORY_EMBEDDINGS_MODEL` | Embedding model id |
//! | `AGENT_MEMORY_EMBEDDINGS_INSTRUCTION` | Query instruction override; `none` disables |
//! | `AGENT_MEMORY_RERANK_PROVIDER` | `none`/`openai`/`jina`/`cohere` |
//! | `AGENT_MEMORY_RERANK_MODEL` / `_API_KEY` / `_BASE_URL` | Reranker endpoint |
//!
//! Credentials fall back to the provider-family variables
//! (`OPENAI_API_KEY`, `GEMINI_API_KEY`, `DASHSCOPE_API_KEY`, and their
//! `_BASE_URL` counterparts).

use std::path::PathBuf;

use mnema_core::{EmbeddingSettings, ProviderSet, RerankSettings, DEFAULT_AGENT_ID};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub agent_id: String,
    pub embeddings: Option<EmbeddingSettings>,
    pub rerank: Option<RerankSettings>,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary lookup (testable).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = get("AGENT_MEMORY_DB")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./agent-memory.db"));

        let agent_id = get("AGENT_MEMORY_AGENT_ID")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT_ID.to_string());

        Self {
            db_path,
            agent_id,
            embeddings: embedding_settings(&get),
            rerank: rerank_settings(&get),
        }
    }

    /// Construct the providers this configuration names. Failures are
    /// logged and leave the corresponding capability absent.
    pub fn build_providers(&self) -> ProviderSet {
        let mut providers = ProviderSet::none();

        #[cfg(feature = "remote-providers")]
        {
            use mnema_core::providers::{GeminiEmbeddings, HttpRerank, OpenAiCompatEmbeddings};

            if let Some(settings) = &self.embeddings {
                let built: Result<Box<dyn mnema_core::EmbeddingProvider>, _> =
                    if settings.provider == "gemini" {
                        GeminiEmbeddings::new(settings).map(|p| Box::new(p) as _)
                    } else {
                        OpenAiCompatEmbeddings::new(settings).map(|p| Box::new(p) as _)
                    };
                match built {
                    Ok(provider) => providers.embedding = Some(provider),
                    Err(e) => warn!("embeddings provider disabled: {}", e),
                }
            }

            if let Some(settings) = &self.rerank {
                match HttpRerank::new(settings) {
                    Ok(provider) => providers.rerank = Some(Box::new(provider)),
                    Err(e) => warn!("rerank provider disabled: {}", e),
                }
            }
        }

        #[cfg(not(feature = "remote-providers"))]
        if self.embeddings.is_some() || self.rerank.is_some() {
            warn!("providers configured but the remote-providers feature is off");
        }

        providers
    }
}

fn embedding_settings(get: &impl Fn(&str) -> Option<String>) -> Option<EmbeddingSettings> {
    let provider = get("AGENT_MEMORY_EMBEDDINGS_PROVIDER")?.to_lowercase();
    let provider = match provider.as_str() {
        "" | "none" => return None,
        "google" => "gemini".to_string(),
        other => other.to_string(),
    };

    let (key_var, url_var, default_model) = match provider.as_str() {
        "gemini" => ("GEMINI_API_KEY", "GEMINI_BASE_URL", "gemini-embedding-001"),
        "qwen" | "dashscope" | "tongyi" => {
            ("DASHSCOPE_API_KEY", "DASHSCOPE_BASE_URL", "text-embedding-v3")
        }
        _ => ("OPENAI_API_KEY", "OPENAI_BASE_URL", "text-embedding-3-small"),
    };

    Some(EmbeddingSettings {
        model: get("AGENT_MEMORY_EMBEDDINGS_MODEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default_model.to_string()),
        api_key: get(key_var),
        base_url: get(url_var),
        instruction: get("AGENT_MEMORY_EMBEDDINGS_INSTRUCTION"),
        provider,
    })
}

fn rerank_settings(get: &impl Fn(&str) -> Option<String>) -> Option<RerankSettings> {
    let provider = get("AGENT_MEMORY_RERANK_PROVIDER")?.to_lowercase();
    if provider.is_empty() || provider == "none" {
        return None;
    }

    let default_model = match provider.as_str() {
        "cohere" => "rerank-v3.5",
        _ => "jina-reranker-v2-base-multilingual",
    };
    let api_key = get("AGENT_MEMORY_RERANK_API_KEY").or_else(|| match provider.as_str() {
        "openai" => get("OPENAI_API_KEY"),
        _ => None,
    });
    let base_url = get("AGENT_MEMORY_RERANK_BASE_URL").or_else(|| match provider.as_str() {
        "openai" => get("OPENAI_BASE_URL"),
        _ => None,
    });

    Some(RerankSettings {
        model: get("AGENT_MEMORY_RERANK_MODEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default_model.to_string()),
        api_key,
        base_url,
        provider,
    })
}

// ============================================================================
// TESTS
// ============================================================================
