//! recall_path - stable URI addressing into the memory graph

use serde::Deserialize;
use serde_json::{json, Value};

use mnema_core::Memory;

use crate::engine::Engine;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "uri": {
                "type": "string",
                "description": "Exact URI (core://agent/identity) or prefix (knowledge://)"
            },
            "traverse_hops": {
                "type": "integer",
                "minimum": 1,
                "maximum": 5,
                "description": "Also return linked memories up to this many hops"
            }
        },
        "required": ["uri"]
    })
}

#[derive(Debug, Deserialize)]
struct RecallPathArgs {
    uri: String,
    traverse_hops: Option<usize>,
}

fn memory_json(memory: &Memory) -> Value {
    json!({
        "id": memory.id,
        "content": memory.content,
        "type": memory.memory_type.as_str(),
        "priority": memory.priority,
        "vitality": memory.vitality,
        "updatedAt": memory.updated_at,
    })
}

pub async fn execute(engine: &Engine, args: Option<Value>) -> Result<Value, String> {
    let args: RecallPathArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };

    let agent = &engine.agent_id;

    // Exact hit first
    if let Some(path) = engine.store.get_path(agent, &args.uri).map_err(|e| e.to_string())? {
        let memory = engine
            .store
            .get_memory(agent, &path.memory_id)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("Path {} points at a missing memory", args.uri))?;

        let mut neighbors = Vec::new();
        if let Some(hops) = args.traverse_hops {
            let nodes = engine
                .store
                .traverse(agent, &memory.id, hops.clamp(1, 5))
                .map_err(|e| e.to_string())?;
            for node in nodes {
                if let Some(neighbor) = engine
                    .store
                    .get_memory(agent, &node.id)
                    .map_err(|e| e.to_string())?
                {
                    neighbors.push(json!({
                        "hop": node.hop,
                        "relation": node.relation.as_str(),
                        "memory": memory_json(&neighbor),
                    }));
                }
            }
        }

        return Ok(json!({
            "match": "exact",
            "uri": args.uri,
            "memory": memory_json(&memory),
            "neighbors": neighbors,
        }));
    }

    // Prefix scan otherwise
    let paths = engine
        .store
        .list_paths_by_prefix(agent, &args.uri)
        .map_err(|e| e.to_string())?;
    let mut entries = Vec::new();
    for path in paths {
        if let Some(memory) = engine
            .store
            .get_memory(agent, &path.memory_id)
            .map_err(|e| e.to_string())?
        {
            entries.push(json!({
                "uri": path.uri,
                "memory": memory_json(&memory),
            }));
        }
    }

    if entries.is_empty() {
        return Err(format!("No memory anchored at {}", args.uri));
    }

    Ok(json!({
        "match": "prefix",
        "uri": args.uri,
        "total": entries.len(),
        "entries": entries,
    }))
}
