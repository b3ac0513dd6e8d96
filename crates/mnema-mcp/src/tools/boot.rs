//! boot - surface the identity working set at session start

use serde_json::{json, Value};

use mnema_core::sleep;

use crate::engine::Engine;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

pub async fn execute(engine: &Engine, _args: Option<Value>) -> Result<Value, String> {
    let result = sleep::boot(&engine.store, &engine.agent_id).map_err(|e| e.to_string())?;

    let memories: Vec<Value> = result
        .memories
        .iter()
        .map(|memory| {
            json!({
                "id": memory.id,
                "content": memory.content,
                "type": memory.memory_type.as_str(),
                "priority": memory.priority,
            })
        })
        .collect();

    Ok(json!({
        "total": memories.len(),
        "memories": memories,
        "honoredUris": result.honored_uris,
    }))
}
