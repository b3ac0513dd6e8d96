//! forget - soft-fade or hard-delete a memory

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::Engine;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Memory id"
            },
            "hard": {
                "type": "boolean",
                "description": "true: delete with a tombstone snapshot; false: damp vitality to a tenth (default)"
            }
        },
        "required": ["id"]
    })
}

#[derive(Debug, Deserialize)]
struct ForgetArgs {
    id: String,
    #[serde(default)]
    hard: bool,
}

pub async fn execute(engine: &Engine, args: Option<Value>) -> Result<Value, String> {
    let args: ForgetArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };

    let memory = engine
        .store
        .forget_memory(&engine.agent_id, &args.id, args.hard)
        .map_err(|e| e.to_string())?;

    Ok(if args.hard {
        json!({ "id": args.id, "hard": true, "deleted": true })
    } else {
        json!({ "id": args.id, "hard": false, "vitality": memory.vitality })
    })
}
