//! Provider settings and instruction-prefix policy

/// Default query instruction for Qwen-family embedding models.
///
/// Retrieval quality measurably improves for Qwen with the instruct
/// wrapper and degrades for Gemini, hence the per-family default.
pub const QWEN_INSTRUCTION: &str =
    "Given a query, retrieve the most semantically relevant document";

/// Resolved configuration for an embedding provider.
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
    /// Provider id ("openai", "gemini", "qwen", "dashscope", ...)
    pub provider: String,
    /// Model name embeddings are stored under
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Raw instruction override; `"none"` disables the prefix outright
    pub instruction: Option<String>,
}

impl EmbeddingSettings {
    /// The query instruction prefix this configuration resolves to.
    pub fn instruction_prefix(&self) -> Option<String> {
        resolve_instruction_prefix(&self.model, self.instruction.as_deref())
    }
}

/// Resolved configuration for an external reranker.
#[derive(Debug, Clone)]
pub struct RerankSettings {
    /// Provider id ("jina", "cohere", "openai")
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Instruction-prefix policy:
///
/// 1. An explicit override wins; the literal `"none"` disables the prefix.
/// 2. Qwen-family models default to [`QWEN_INSTRUCTION`].
/// 3. Everything else (Gemini included) defaults to no prefix.
pub fn resolve_instruction_prefix(model: &str, override_value: Option<&str>) -> Option<String> {
    match override_value {
        Some("none") => None,
        Some(explicit) if !explicit.is_empty() => Some(explicit.to_string()),
        _ => {
            let model = model.to_lowercase();
            if model.contains("qwen") {
                Some(QWEN_INSTRUCTION.to_string())
            } else {
                None
            }
        }
    }
}
