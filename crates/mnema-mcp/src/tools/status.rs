//! status - store-wide counts for the current agent

use serde_json::{json, Value};

use crate::engine::Engine;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute(engine: &Engine, _args: Option<Value>) -> Result<Value, String> {
    let stats = engine
        .store
        .stats(&engine.agent_id)
        .map_err(|e| e.to_string())?;

    let embeddings = engine.providers.embedding.as_deref().map(|p| {
        json!({ "provider": p.id(), "model": p.model() })
    });
    let rerank = engine.providers.rerank.as_deref().map(|p| {
        json!({ "provider": p.id(), "model": p.model() })
    });

    Ok(json!({
        "agentId": engine.agent_id,
        "stats": stats,
        "embeddings": embeddings,
        "rerank": rerank,
    }))
}
