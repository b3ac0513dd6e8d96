//! remember - admit one write through the Write Guard

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use mnema_core::{sleep, MemoryType, WriteInput};

use crate::engine::Engine;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "content": {
                "type": "string",
                "description": "The text to remember"
            },
            "type": {
                "type": "string",
                "enum": ["identity", "emotion", "knowledge", "event"],
                "description": "Lifecycle type (default: knowledge)"
            },
            "uri": {
                "type": "string",
                "description": "Optional URI anchor, e.g. core://agent/identity"
            },
            "emotion_val": {
                "type": "number",
                "minimum": -1.0,
                "maximum": 1.0,
                "description": "Emotional valence (default: 0)"
            },
            "source": {
                "type": "string",
                "description": "Free-form origin tag"
            }
        },
        "required": ["content"]
    })
}

#[derive(Debug, Deserialize)]
struct RememberArgs {
    content: String,
    #[serde(rename = "type")]
    memory_type: Option<String>,
    uri: Option<String>,
    emotion_val: Option<f64>,
    source: Option<String>,
}

pub async fn execute(engine: &Engine, args: Option<Value>) -> Result<Value, String> {
    let args: RememberArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    if args.content.trim().is_empty() {
        return Err("Content cannot be empty".to_string());
    }

    let input = WriteInput {
        content: args.content,
        memory_type: args
            .memory_type
            .as_deref()
            .map(MemoryType::parse_name)
            .unwrap_or_default(),
        uri: args.uri,
        priority: None,
        emotion_val: args.emotion_val.unwrap_or(0.0),
        source: args.source,
    };

    let report = sleep::sync(&engine.store, &engine.agent_id, std::slice::from_ref(&input))
        .map_err(|e| e.to_string())?;
    let outcome = report
        .outcomes
        .into_iter()
        .next()
        .ok_or_else(|| "Empty sync report".to_string())?;

    // Opportunistic embedding; never blocks the write path
    if let (Some(provider), Some(memory_id)) =
        (engine.providers.embedding.as_deref(), outcome.memory_id.as_deref())
    {
        if let Some(memory) = engine
            .store
            .get_memory(&engine.agent_id, memory_id)
            .map_err(|e| e.to_string())?
        {
            match provider.embed(&memory.content).await {
                Ok(vector) => {
                    if let Err(e) = engine.store.upsert_embedding(
                        &engine.agent_id,
                        memory_id,
                        provider.model(),
                        &vector,
                    ) {
                        warn!("failed to store embedding for {}: {}", memory_id, e);
                    }
                }
                Err(e) => warn!("opportunistic embedding failed for {}: {}", memory_id, e),
            }
        }
    }

    Ok(json!({
        "action": outcome.action.as_str(),
        "memoryId": outcome.memory_id,
        "reason": outcome.reason,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use mnema_core::{ProviderSet, Store};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn temp_engine() -> (TempDir, Engine) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(Some(dir.path().join("tool.db"))).unwrap());
        let engine = Engine::new(store, ProviderSet::none(), "default".to_string());
        (dir, engine)
    }

    #[tokio::test]
    async fn test_remember_add() {
        let (_dir, engine) = temp_engine();
        let result = execute(
            &engine,
            Some(json!({"content": "The sky was orange tonight", "type": "event"})),
        )
        .await
        .unwrap();
        assert_eq!(result["action"], "add");
        assert!(result["memoryId"].is_string());
    }

    #[tokio::test]
    async fn test_remember_duplicate_skips() {
        let (_dir, engine) = temp_engine();
        let args = json!({"content": "The sky was orange tonight", "type": "event"});
        execute(&engine, Some(args.clone())).await.unwrap();
        let result = execute(&engine, Some(args)).await.unwrap();
        assert_eq!(result["action"], "skip");
    }

    #[tokio::test]
    async fn test_remember_rejects_empty() {
        let (_dir, engine) = temp_engine();
        assert!(execute(&engine, Some(json!({"content": "   "}))).await.is_err());
        assert!(execute(&engine, None).await.is_err());
    }
}
