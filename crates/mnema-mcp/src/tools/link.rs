//! link - create, query, and traverse the association graph

use serde::Deserialize;
use serde_json::{json, Value};

use mnema_core::LinkRelation;

use crate::engine::Engine;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["create", "query", "traverse"],
                "description": "What to do"
            },
            "source_id": {
                "type": "string",
                "description": "Source memory (create)"
            },
            "target_id": {
                "type": "string",
                "description": "Target memory (create)"
            },
            "relation": {
                "type": "string",
                "enum": ["related", "caused", "reminds", "evolved", "contradicts"],
                "description": "Edge relation (create; default related)"
            },
            "weight": {
                "type": "number",
                "description": "Edge weight (create; default 1.0)"
            },
            "memory_id": {
                "type": "string",
                "description": "Focus memory (query filter / traverse start)"
            },
            "max_hops": {
                "type": "integer",
                "minimum": 1,
                "maximum": 5,
                "description": "Traversal depth (default 2)"
            }
        },
        "required": ["action"]
    })
}

#[derive(Debug, Deserialize)]
struct LinkArgs {
    action: String,
    source_id: Option<String>,
    target_id: Option<String>,
    relation: Option<String>,
    weight: Option<f64>,
    memory_id: Option<String>,
    max_hops: Option<usize>,
}

pub async fn execute(engine: &Engine, args: Option<Value>) -> Result<Value, String> {
    let args: LinkArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    let agent = &engine.agent_id;

    match args.action.as_str() {
        "create" => {
            let source = args.source_id.ok_or("create requires source_id")?;
            let target = args.target_id.ok_or("create requires target_id")?;
            let relation = args
                .relation
                .as_deref()
                .map(LinkRelation::parse_name)
                .unwrap_or_default();
            let link = engine
                .store
                .create_link(agent, &source, &target, relation, args.weight.unwrap_or(1.0))
                .map_err(|e| e.to_string())?;
            Ok(json!({
                "created": true,
                "sourceId": link.source_id,
                "targetId": link.target_id,
                "relation": link.relation.as_str(),
                "weight": link.weight,
            }))
        }
        "query" => {
            let links = engine
                .store
                .list_links(agent, args.memory_id.as_deref())
                .map_err(|e| e.to_string())?;
            let entries: Vec<Value> = links
                .iter()
                .map(|link| {
                    json!({
                        "sourceId": link.source_id,
                        "targetId": link.target_id,
                        "relation": link.relation.as_str(),
                        "weight": link.weight,
                    })
                })
                .collect();
            Ok(json!({ "total": entries.len(), "links": entries }))
        }
        "traverse" => {
            let start = args.memory_id.ok_or("traverse requires memory_id")?;
            let hops = args.max_hops.unwrap_or(2).clamp(1, 5);
            let nodes = engine
                .store
                .traverse(agent, &start, hops)
                .map_err(|e| e.to_string())?;
            let entries: Vec<Value> = nodes
                .iter()
                .map(|node| {
                    json!({
                        "id": node.id,
                        "hop": node.hop,
                        "relation": node.relation.as_str(),
                    })
                })
                .collect();
            Ok(json!({ "start": start, "maxHops": hops, "total": entries.len(), "nodes": entries }))
        }
        other => Err(format!("Unknown link action '{}'", other)),
    }
}
