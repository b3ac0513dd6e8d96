//! recall - hybrid retrieval with intent-aware weighting
//!
//! Every returned memory is strengthened: recall rewards memory, slowing
//! its future decay.

use serde::Deserialize;
use serde_json::{json, Value};

use mnema_core::search;

use crate::engine::Engine;

/// Stability growth applied to recalled memories.
const RECALL_GROWTH: f64 = 1.5;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "What to recall"
            },
            "limit": {
                "type": "integer",
                "minimum": 1,
                "maximum": 50,
                "description": "Maximum results; defaults to the intent's own limit"
            }
        },
        "required": ["query"]
    })
}

#[derive(Debug, Deserialize)]
struct RecallArgs {
    query: String,
    limit: Option<usize>,
}

pub async fn execute(engine: &Engine, args: Option<Value>) -> Result<Value, String> {
    let args: RecallArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    if args.query.trim().is_empty() {
        return Err("Query cannot be empty".to_string());
    }

    let result = search::recall(
        &engine.store,
        &engine.providers,
        &engine.searcher,
        &engine.agent_id,
        &args.query,
        args.limit.map(|l| l.clamp(1, 50)),
    )
    .await
    .map_err(|e| e.to_string())?;

    // Strengthen everything surfaced
    let ids: Vec<&str> = result.hits.iter().map(|h| h.memory.id.as_str()).collect();
    engine
        .store
        .record_access_batch(&engine.agent_id, &ids, RECALL_GROWTH)
        .map_err(|e| e.to_string())?;

    let hits: Vec<Value> = result
        .hits
        .iter()
        .map(|hit| {
            json!({
                "id": hit.memory.id,
                "content": hit.memory.content,
                "type": hit.memory.memory_type.as_str(),
                "priority": hit.memory.priority,
                "vitality": hit.memory.vitality,
                "score": hit.score,
                "matchReason": hit.match_reason,
                "updatedAt": hit.memory.updated_at,
            })
        })
        .collect();

    Ok(json!({
        "query": args.query,
        "intent": result.intent.intent.as_str(),
        "confidence": result.intent.confidence,
        "total": hits.len(),
        "results": hits,
    }))
}
