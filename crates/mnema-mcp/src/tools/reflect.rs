//! reflect - run sleep-cycle maintenance phases

use serde::Deserialize;
use serde_json::{json, Value};

use mnema_core::{embed_missing, sleep};

use crate::engine::Engine;

/// How many missing embeddings one `embed` phase call will generate.
const EMBED_SWEEP_LIMIT: i64 = 100;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "phase": {
                "type": "string",
                "enum": ["decay", "tidy", "govern", "all", "reindex", "embed"],
                "description": "Maintenance phase to run (default: all)"
            }
        }
    })
}

#[derive(Debug, Deserialize)]
struct ReflectArgs {
    phase: Option<String>,
}

pub async fn execute(engine: &Engine, args: Option<Value>) -> Result<Value, String> {
    let args: ReflectArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => ReflectArgs { phase: None },
    };
    let agent = Some(engine.agent_id.as_str());
    let phase = args.phase.as_deref().unwrap_or("all");

    match phase {
        "decay" => {
            let report = sleep::decay(&engine.store, agent).map_err(|e| e.to_string())?;
            Ok(json!({ "phase": "decay", "report": report }))
        }
        "tidy" => {
            let report = sleep::tidy(&engine.store, agent).map_err(|e| e.to_string())?;
            Ok(json!({ "phase": "tidy", "report": report }))
        }
        "govern" => {
            let report = sleep::govern(&engine.store, agent).map_err(|e| e.to_string())?;
            Ok(json!({ "phase": "govern", "report": report }))
        }
        "all" => {
            let report = sleep::run_all(&engine.store, agent).map_err(|e| e.to_string())?;
            Ok(json!({ "phase": "all", "report": report }))
        }
        "reindex" => {
            let rebuilt = engine.store.reindex().map_err(|e| e.to_string())?;
            Ok(json!({ "phase": "reindex", "report": { "rebuilt": rebuilt } }))
        }
        "embed" => {
            let Some(provider) = engine.providers.embedding.as_deref() else {
                return Err("No embeddings provider configured".to_string());
            };
            let report = embed_missing(&engine.store, provider, &engine.agent_id, EMBED_SWEEP_LIMIT)
                .await
                .map_err(|e| e.to_string())?;
            Ok(json!({ "phase": "embed", "report": report }))
        }
        other => Err(format!("Unknown phase '{}'", other)),
    }
}
