//! snapshot - inspect and restore memory history

use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::Engine;

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "enum": ["list", "rollback"],
                "description": "What to do"
            },
            "memory_id": {
                "type": "string",
                "description": "Memory whose snapshots to list"
            },
            "snapshot_id": {
                "type": "string",
                "description": "Snapshot to roll back to"
            }
        },
        "required": ["action"]
    })
}

#[derive(Debug, Deserialize)]
struct SnapshotArgs {
    action: String,
    memory_id: Option<String>,
    snapshot_id: Option<String>,
}

pub async fn execute(engine: &Engine, args: Option<Value>) -> Result<Value, String> {
    let args: SnapshotArgs = match args {
        Some(v) => serde_json::from_value(v).map_err(|e| format!("Invalid arguments: {}", e))?,
        None => return Err("Missing arguments".to_string()),
    };
    let agent = &engine.agent_id;

    match args.action.as_str() {
        "list" => {
            let memory_id = args.memory_id.ok_or("list requires memory_id")?;
            let snapshots = engine
                .store
                .list_snapshots(agent, &memory_id)
                .map_err(|e| e.to_string())?;
            let entries: Vec<Value> = snapshots
                .iter()
                .map(|snapshot| {
                    json!({
                        "id": snapshot.id,
                        "content": snapshot.content,
                        "action": snapshot.action.as_str(),
                        "changedBy": snapshot.changed_by,
                        "createdAt": snapshot.created_at,
                    })
                })
                .collect();
            Ok(json!({ "memoryId": memory_id, "total": entries.len(), "snapshots": entries }))
        }
        "rollback" => {
            let snapshot_id = args.snapshot_id.ok_or("rollback requires snapshot_id")?;
            let restored = engine
                .store
                .rollback_snapshot(agent, &snapshot_id)
                .map_err(|e| e.to_string())?;
            Ok(json!({
                "restored": true,
                "memoryId": restored.id,
                "content": restored.content,
            }))
        }
        other => Err(format!("Unknown snapshot action '{}'", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use mnema_core::{MemoryType, MemoryUpdate, ProviderSet, SnapshotAction, Store, WriteInput};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_and_rollback() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(Some(dir.path().join("tool.db"))).unwrap());
        let engine = Engine::new(store, ProviderSet::none(), "default".to_string());

        let memory = engine
            .store
            .create_memory(
                "default",
                &WriteInput {
                    content: "original wording".to_string(),
                    memory_type: MemoryType::Knowledge,
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        engine
            .store
            .record_snapshot("default", &memory.id, Some("sync"), SnapshotAction::Update)
            .unwrap();
        engine
            .store
            .update_memory("default", &memory.id, &MemoryUpdate::content("revised wording"))
            .unwrap();

        let listed = execute(&engine, Some(json!({"action": "list", "memory_id": memory.id})))
            .await
            .unwrap();
        assert_eq!(listed["total"], 1);
        let snapshot_id = listed["snapshots"][0]["id"].as_str().unwrap().to_string();

        let rolled = execute(
            &engine,
            Some(json!({"action": "rollback", "snapshot_id": snapshot_id})),
        )
        .await
        .unwrap();
        assert_eq!(rolled["content"], "original wording");
    }
}
