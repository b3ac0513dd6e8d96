//! Sleep phase implementations

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::guard::{self, GuardAction};
use crate::memory::{vitality_floor, Memory, MemoryUpdate, SnapshotAction, WriteInput};
use crate::storage::sqlite::{
    archive_memory_in, create_memory_in, create_path_in, get_memory_in, get_path_in,
    record_access_in, record_snapshot_in, row_to_memory, update_memory_in,
};
use crate::storage::{Result, Store, StoreError};

use super::{
    BOOT_GROWTH, BOOT_MANIFEST_URI, DECAY_NOISE, DEFAULT_BOOT_URIS, MAX_SNAPSHOTS_PER_MEMORY,
    VITALITY_THRESHOLD,
};

// ============================================================================
// REPORTS
// ============================================================================

/// What happened to one sync item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub action: GuardAction,
    /// New memory for adds; target memory for update/merge/duplicate-skip
    pub memory_id: Option<String>,
    pub reason: String,
}

/// Result of a sync pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub added: i64,
    pub updated: i64,
    pub merged: i64,
    pub skipped: i64,
    pub outcomes: Vec<SyncOutcome>,
}

/// Result of a decay pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayReport {
    /// Rows whose vitality moved more than the noise gate
    pub updated: i64,
    /// Rows whose vitality strictly decreased
    pub decayed: i64,
    /// Rows that crossed below the forgotten threshold this pass
    pub below_threshold: i64,
}

/// Result of a tidy pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TidyReport {
    pub archived: i64,
    pub orphans_cleaned: i64,
    pub snapshots_pruned: i64,
}

/// Result of a govern pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernReport {
    pub orphan_paths: i64,
    pub orphan_links: i64,
    pub empty_memories: i64,
}

/// Combined report for a full maintenance run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepReport {
    pub decay: DecayReport,
    pub tidy: TidyReport,
    pub govern: GovernReport,
}

/// Memories surfaced at boot plus the URIs that resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootResult {
    pub memories: Vec<Memory>,
    pub honored_uris: Vec<String>,
}

// ============================================================================
// SYNC
// ============================================================================

/// Admit a batch of writes. The whole batch runs in one transaction:
/// either every item's decision is applied or none is. Guard evaluation
/// happens on the same connection, so later items observe earlier ones.
pub fn sync(store: &Store, agent_id: &str, items: &[WriteInput]) -> Result<SyncReport> {
    let mut writer = store.write()?;
    let tx = writer.transaction()?;
    let tokenizer = store.tokenizer();
    let mut report = SyncReport::default();

    for item in items {
        let decision = guard::evaluate_in(&tx, tokenizer, agent_id, item)?;
        let outcome = match decision.action {
            GuardAction::Add => {
                let created = create_memory_in(&tx, tokenizer, agent_id, item)?;
                match created {
                    Some(memory) => {
                        if let Some(uri) = item.uri.as_deref() {
                            match create_path_in(&tx, agent_id, &memory.id, uri, None, None) {
                                Ok(_) => {}
                                // A colliding URI does not fail the write
                                Err(StoreError::Database(rusqlite::Error::SqliteFailure(e, _)))
                                    if e.code == rusqlite::ErrorCode::ConstraintViolation => {}
                                Err(e) => return Err(e),
                            }
                        }
                        report.added += 1;
                        SyncOutcome {
                            action: GuardAction::Add,
                            memory_id: Some(memory.id),
                            reason: decision.reason,
                        }
                    }
                    // Guard already screens duplicates; a raced hash hit
                    // still classifies as a skip
                    None => {
                        report.skipped += 1;
                        SyncOutcome {
                            action: GuardAction::Skip,
                            memory_id: None,
                            reason: "duplicate content".to_string(),
                        }
                    }
                }
            }
            GuardAction::Update | GuardAction::Merge => {
                let target_id = decision.target_id.clone().ok_or_else(|| {
                    StoreError::Validation("guard returned update without target".into())
                })?;
                let target = get_memory_in(&tx, agent_id, &target_id)?
                    .ok_or_else(|| StoreError::NotFound(format!("Memory {}", target_id)))?;

                let (snapshot_action, new_content) = match decision.action {
                    GuardAction::Merge => (
                        SnapshotAction::Merge,
                        decision
                            .merged_content
                            .clone()
                            .unwrap_or_else(|| item.content.clone()),
                    ),
                    _ => (SnapshotAction::Update, item.content.clone()),
                };

                record_snapshot_in(&tx, &target, Some("sync"), snapshot_action)?;
                update_memory_in(
                    &tx,
                    tokenizer,
                    agent_id,
                    &target_id,
                    &MemoryUpdate::content(new_content),
                )?;

                if decision.action == GuardAction::Merge {
                    report.merged += 1;
                } else {
                    report.updated += 1;
                }
                SyncOutcome {
                    action: decision.action,
                    memory_id: Some(target_id),
                    reason: decision.reason,
                }
            }
            GuardAction::Skip => {
                report.skipped += 1;
                SyncOutcome {
                    action: GuardAction::Skip,
                    memory_id: decision.target_id,
                    reason: decision.reason,
                }
            }
        };
        report.outcomes.push(outcome);
    }

    tx.commit()?;
    Ok(report)
}

// ============================================================================
// DECAY
// ============================================================================

/// Ebbinghaus decay over every memory with priority > 0 in scope.
///
/// `retention = exp(-days_since_reference / stability)` where the
/// reference is the last recall, falling back to creation. Forgetting
/// restarts on every recall, so oft-recalled memories decay slowly.
pub fn decay(store: &Store, agent_id: Option<&str>) -> Result<DecayReport> {
    let mut writer = store.write()?;
    let tx = writer.transaction()?;
    let now = Utc::now();
    let mut report = DecayReport::default();

    let rows: Vec<Memory> = {
        let (sql, scope) = match agent_id {
            Some(agent) => (
                "SELECT * FROM memories WHERE priority > 0 AND agent_id = ?1",
                Some(agent),
            ),
            None => ("SELECT * FROM memories WHERE priority > 0", None),
        };
        let mut stmt = tx.prepare(sql)?;
        let mapped = match scope {
            Some(agent) => stmt.query_map(params![agent], row_to_memory)?,
            None => stmt.query_map([], row_to_memory)?,
        };
        mapped.collect::<rusqlite::Result<Vec<_>>>()?
    };

    {
        let mut update = tx.prepare("UPDATE memories SET vitality = ?1 WHERE id = ?2")?;
        for memory in rows {
            let reference = memory.last_accessed.unwrap_or(memory.created_at);
            let days = (now - reference).num_seconds() as f64 / 86_400.0;
            let retention = (-days.max(0.0) / memory.stability.max(0.01)).exp();
            let new_vitality = retention.max(vitality_floor(memory.priority));

            if (new_vitality - memory.vitality).abs() <= DECAY_NOISE {
                continue;
            }
            update.execute(params![new_vitality, memory.id])?;
            report.updated += 1;
            if new_vitality < memory.vitality {
                report.decayed += 1;
            }
            if memory.vitality >= VITALITY_THRESHOLD && new_vitality < VITALITY_THRESHOLD {
                report.below_threshold += 1;
            }
        }
    }

    tx.commit()?;
    debug!(
        updated = report.updated,
        decayed = report.decayed,
        below_threshold = report.below_threshold,
        "decay pass complete"
    );
    Ok(report)
}

// ============================================================================
// TIDY
// ============================================================================

/// Archive collapsed P3 memories, clean orphan paths, prune snapshots.
pub fn tidy(store: &Store, agent_id: Option<&str>) -> Result<TidyReport> {
    let mut writer = store.write()?;
    let tx = writer.transaction()?;
    let mut report = TidyReport::default();

    // 1. Archive: only events (priority >= 3) are ever deleted by decay
    let candidates: Vec<Memory> = {
        let (sql, scope) = match agent_id {
            Some(agent) => (
                "SELECT * FROM memories WHERE vitality < ?1 AND priority >= 3 AND agent_id = ?2",
                Some(agent),
            ),
            None => (
                "SELECT * FROM memories WHERE vitality < ?1 AND priority >= 3",
                None,
            ),
        };
        let mut stmt = tx.prepare(sql)?;
        let mapped = match scope {
            Some(agent) => stmt.query_map(params![VITALITY_THRESHOLD, agent], row_to_memory)?,
            None => stmt.query_map(params![VITALITY_THRESHOLD], row_to_memory)?,
        };
        mapped.collect::<rusqlite::Result<Vec<_>>>()?
    };

    for memory in candidates {
        // Tombstone is best effort; archival proceeds regardless
        if let Err(e) = record_snapshot_in(&tx, &memory, Some("tidy"), SnapshotAction::Delete) {
            tracing::warn!("tombstone snapshot failed for {}: {}", memory.id, e);
        }
        if archive_memory_in(&tx, &memory.agent_id, &memory.id)? {
            report.archived += 1;
        }
    }

    // 2. Orphan paths
    report.orphans_cleaned = delete_orphan_paths(&tx, agent_id)? as i64;

    // 3. Snapshot cap per memory, newest kept
    let pruned = match agent_id {
        Some(agent) => tx.execute(
            "DELETE FROM snapshots WHERE id IN (
                SELECT id FROM (
                    SELECT s.id,
                           ROW_NUMBER() OVER (
                               PARTITION BY s.memory_id
                               ORDER BY s.created_at DESC, s.id DESC
                           ) AS rn
                    FROM snapshots s
                    JOIN memories m ON m.id = s.memory_id
                    WHERE m.agent_id = ?1
                ) WHERE rn > ?2
            )",
            params![agent, MAX_SNAPSHOTS_PER_MEMORY],
        )?,
        None => tx.execute(
            "DELETE FROM snapshots WHERE id IN (
                SELECT id FROM (
                    SELECT id,
                           ROW_NUMBER() OVER (
                               PARTITION BY memory_id
                               ORDER BY created_at DESC, id DESC
                           ) AS rn
                    FROM snapshots
                ) WHERE rn > ?1
            )",
            params![MAX_SNAPSHOTS_PER_MEMORY],
        )?,
    };
    report.snapshots_pruned = pruned as i64;

    tx.commit()?;
    info!(
        archived = report.archived,
        orphans = report.orphans_cleaned,
        snapshots_pruned = report.snapshots_pruned,
        "tidy pass complete"
    );
    Ok(report)
}

// ============================================================================
// GOVERN
// ============================================================================

/// Integrity sweep: orphan paths, dangling links, empty memories.
/// Running it twice in a row leaves the second run a no-op.
pub fn govern(store: &Store, agent_id: Option<&str>) -> Result<GovernReport> {
    let mut writer = store.write()?;
    let tx = writer.transaction()?;
    let mut report = GovernReport::default();

    report.orphan_paths = delete_orphan_paths(&tx, agent_id)? as i64;

    report.orphan_links = match agent_id {
        Some(agent) => tx.execute(
            "DELETE FROM links WHERE agent_id = ?1 AND (
                source_id NOT IN (SELECT id FROM memories)
                OR target_id NOT IN (SELECT id FROM memories)
            )",
            params![agent],
        )?,
        None => tx.execute(
            "DELETE FROM links WHERE
                source_id NOT IN (SELECT id FROM memories)
                OR target_id NOT IN (SELECT id FROM memories)",
            [],
        )?,
    } as i64;

    // Empty memories: purge the full-text mirror first, then the rows
    let empty_ids: Vec<String> = {
        let (sql, scope) = match agent_id {
            Some(agent) => (
                "SELECT id FROM memories WHERE TRIM(content) = '' AND agent_id = ?1",
                Some(agent),
            ),
            None => ("SELECT id FROM memories WHERE TRIM(content) = ''", None),
        };
        let mut stmt = tx.prepare(sql)?;
        match scope {
            Some(agent) => stmt
                .query_map(params![agent], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        }
    };
    for id in &empty_ids {
        tx.execute("DELETE FROM memories_fts WHERE id = ?1", params![id])?;
        tx.execute("DELETE FROM snapshots WHERE memory_id = ?1", params![id])?;
        tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
    }
    report.empty_memories = empty_ids.len() as i64;

    tx.commit()?;
    Ok(report)
}

fn delete_orphan_paths(
    tx: &rusqlite::Transaction<'_>,
    agent_id: Option<&str>,
) -> Result<usize> {
    let deleted = match agent_id {
        Some(agent) => tx.execute(
            "DELETE FROM paths WHERE agent_id = ?1
             AND memory_id NOT IN (SELECT id FROM memories)",
            params![agent],
        )?,
        None => tx.execute(
            "DELETE FROM paths WHERE memory_id NOT IN (SELECT id FROM memories)",
            [],
        )?,
    };
    Ok(deleted)
}

/// Run decay, tidy, and govern in order, each in its own transaction.
pub fn run_all(store: &Store, agent_id: Option<&str>) -> Result<SleepReport> {
    Ok(SleepReport {
        decay: decay(store, agent_id)?,
        tidy: tidy(store, agent_id)?,
        govern: govern(store, agent_id)?,
    })
}

// ============================================================================
// BOOT
// ============================================================================

/// Surface the identity working set: every P0 memory plus whatever the
/// default core URIs and the `system://boot` manifest point at. Every
/// surfaced memory is gently strengthened.
pub fn boot(store: &Store, agent_id: &str) -> Result<BootResult> {
    let mut writer = store.write()?;
    let tx = writer.transaction()?;

    let mut ids: Vec<String> = Vec::new();
    let mut honored = Vec::new();

    // All identity-class memories
    {
        let mut stmt = tx.prepare(
            "SELECT id FROM memories WHERE agent_id = ?1 AND priority = 0
             ORDER BY updated_at DESC",
        )?;
        let mapped = stmt.query_map(params![agent_id], |row| row.get::<_, String>(0))?;
        for id in mapped {
            ids.push(id?);
        }
    }

    // Default core URIs plus the boot manifest's extra lines
    let mut uris: Vec<String> = DEFAULT_BOOT_URIS.iter().map(|u| u.to_string()).collect();
    if let Some(manifest_path) = get_path_in(&tx, agent_id, BOOT_MANIFEST_URI)? {
        if let Some(manifest) = get_memory_in(&tx, agent_id, &manifest_path.memory_id)? {
            for line in manifest.content.lines() {
                let line = line.trim();
                if !line.is_empty() {
                    uris.push(line.to_string());
                }
            }
        }
    }

    for uri in uris {
        if let Some(path) = get_path_in(&tx, agent_id, &uri)? {
            if get_memory_in(&tx, agent_id, &path.memory_id)?.is_some() {
                if !ids.contains(&path.memory_id) {
                    ids.push(path.memory_id.clone());
                }
                honored.push(uri);
            }
        }
    }

    // Gentle strengthening, then return the post-strengthen rows
    let mut memories = Vec::new();
    for id in &ids {
        record_access_in(&tx, agent_id, id, BOOT_GROWTH)?;
        if let Some(memory) = get_memory_in(&tx, agent_id, id)? {
            memories.push(memory);
        }
    }

    tx.commit()?;
    Ok(BootResult {
        memories,
        honored_uris: honored,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ListFilter, MemoryType, DEFAULT_AGENT_ID};
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(Some(dir.path().join("sleep.db"))).unwrap();
        (dir, store)
    }

    fn input(content: &str, memory_type: MemoryType) -> WriteInput {
        WriteInput {
            content: content.to_string(),
            memory_type,
            ..Default::default()
        }
    }

    fn set_state(store: &Store, id: &str, vitality: f64, stability: Option<f64>) {
        store
            .update_memory(
                DEFAULT_AGENT_ID,
                id,
                &MemoryUpdate {
                    vitality: Some(vitality),
                    stability,
                    ..Default::default()
                },
            )
            .unwrap();
    }

    fn backdate(store: &Store, id: &str, days: i64) {
        let past = Utc::now() - chrono::Duration::days(days);
        store
            .write()
            .unwrap()
            .execute(
                "UPDATE memories SET created_at = ?1, last_accessed = NULL WHERE id = ?2",
                params![past, id],
            )
            .unwrap();
    }

    // ========================= SYNC =========================

    #[test]
    fn test_sync_add_creates_memory_and_path() {
        let (_dir, store) = temp_store();
        let mut item = input("The agent's designation is Unit 7", MemoryType::Identity);
        item.uri = Some("core://agent/identity".to_string());

        let report = sync(&store, DEFAULT_AGENT_ID, &[item]).unwrap();
        assert_eq!(report.added, 1);
        let path = store
            .get_path(DEFAULT_AGENT_ID, "core://agent/identity")
            .unwrap()
            .unwrap();
        let memory = store.get_memory(DEFAULT_AGENT_ID, &path.memory_id).unwrap().unwrap();
        assert_eq!(memory.content, "The agent's designation is Unit 7");
    }

    #[test]
    fn test_sync_twice_is_idempotent() {
        let (_dir, store) = temp_store();
        let mut item = input("Persistent configuration value 42", MemoryType::Knowledge);
        item.uri = Some("knowledge://config/answer".to_string());

        sync(&store, DEFAULT_AGENT_ID, &[item.clone()]).unwrap();
        let report = sync(&store, DEFAULT_AGENT_ID, &[item]).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.skipped, 1);

        let memories = store
            .list_memories(DEFAULT_AGENT_ID, &ListFilter::default())
            .unwrap();
        assert_eq!(memories.len(), 1);
        let paths = store
            .list_paths_by_prefix(DEFAULT_AGENT_ID, "knowledge://")
            .unwrap();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn test_sync_uri_conflict_updates_with_snapshot() {
        let (_dir, store) = temp_store();
        let mut first = input("Noah is a succubus", MemoryType::Identity);
        first.uri = Some("core://agent/identity".to_string());
        sync(&store, DEFAULT_AGENT_ID, &[first]).unwrap();

        let mut second = input("Noah is a demon", MemoryType::Identity);
        second.uri = Some("core://agent/identity".to_string());
        let report = sync(&store, DEFAULT_AGENT_ID, &[second]).unwrap();
        assert_eq!(report.updated, 1);

        let path = store
            .get_path(DEFAULT_AGENT_ID, "core://agent/identity")
            .unwrap()
            .unwrap();
        let memory = store.get_memory(DEFAULT_AGENT_ID, &path.memory_id).unwrap().unwrap();
        assert_eq!(memory.content, "Noah is a demon");

        // Snapshot of the pre-update content, tagged by sync
        let snapshots = store.list_snapshots(DEFAULT_AGENT_ID, &memory.id).unwrap();
        assert!(snapshots
            .iter()
            .any(|s| s.content == "Noah is a succubus" && s.changed_by.as_deref() == Some("sync")));

        // Rolling that snapshot back restores the original content
        let snapshot = snapshots
            .iter()
            .find(|s| s.content == "Noah is a succubus")
            .unwrap();
        let restored = store
            .rollback_snapshot(DEFAULT_AGENT_ID, &snapshot.id)
            .unwrap();
        assert_eq!(restored.content, "Noah is a succubus");
    }

    #[test]
    fn test_sync_batch_single_memory_for_duplicates() {
        let (_dir, store) = temp_store();
        let item = input("Batch deduplicated entry", MemoryType::Knowledge);
        let report = sync(&store, DEFAULT_AGENT_ID, &[item.clone(), item]).unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(report.skipped, 1);
    }

    // ========================= DECAY =========================

    #[test]
    fn test_decay_respects_priority_floor() {
        let (_dir, store) = temp_store();
        let memory = store
            .create_memory(DEFAULT_AGENT_ID, &input("ancient emotion entry", MemoryType::Emotion))
            .unwrap()
            .unwrap();
        // Stability 365, created 9999 days ago, never accessed
        backdate(&store, &memory.id, 9999);

        let report = decay(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.decayed, 1);

        let decayed = store.get_memory(DEFAULT_AGENT_ID, &memory.id).unwrap().unwrap();
        // e^(-9999/365) is effectively zero; the P1 floor holds at 0.3
        assert!((decayed.vitality - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_decay_never_touches_p0() {
        let (_dir, store) = temp_store();
        let memory = store
            .create_memory(DEFAULT_AGENT_ID, &input("core identity fact", MemoryType::Identity))
            .unwrap()
            .unwrap();
        backdate(&store, &memory.id, 9999);

        decay(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        let untouched = store.get_memory(DEFAULT_AGENT_ID, &memory.id).unwrap().unwrap();
        assert_eq!(untouched.vitality, 1.0);
    }

    #[test]
    fn test_decay_clocks_from_last_access() {
        let (_dir, store) = temp_store();
        let memory = store
            .create_memory(DEFAULT_AGENT_ID, &input("recently recalled event", MemoryType::Event))
            .unwrap()
            .unwrap();
        backdate(&store, &memory.id, 100);
        // A recall now restarts the forgetting clock
        store.record_access(DEFAULT_AGENT_ID, &memory.id, 1.5).unwrap();

        let report = decay(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        // Zero elapsed days: retention 1.0, no noticeable change
        assert_eq!(report.decayed, 0);
        let fresh = store.get_memory(DEFAULT_AGENT_ID, &memory.id).unwrap().unwrap();
        assert!(fresh.vitality > 0.99);
    }

    #[test]
    fn test_decay_reports_threshold_crossings() {
        let (_dir, store) = temp_store();
        let memory = store
            .create_memory(DEFAULT_AGENT_ID, &input("fast fading event", MemoryType::Event))
            .unwrap()
            .unwrap();
        // Stability 14, 100 days old: e^(-100/14) ≈ 0.0008 < 0.05
        backdate(&store, &memory.id, 100);

        let report = decay(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        assert_eq!(report.below_threshold, 1);
    }

    // ========================= TIDY =========================

    #[test]
    fn test_tidy_archives_only_p3() {
        let (_dir, store) = temp_store();
        let identity = store
            .create_memory(DEFAULT_AGENT_ID, &input("identity to keep", MemoryType::Identity))
            .unwrap()
            .unwrap();
        let event = store
            .create_memory(DEFAULT_AGENT_ID, &input("event to archive", MemoryType::Event))
            .unwrap()
            .unwrap();
        // Force both below the threshold (update bypasses decay floors)
        set_state(&store, &identity.id, 0.01, None);
        set_state(&store, &event.id, 0.01, None);

        let report = tidy(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        assert_eq!(report.archived, 1);

        // The identity memory survives regardless of vitality
        assert!(store.get_memory(DEFAULT_AGENT_ID, &identity.id).unwrap().is_some());
        assert!(store.get_memory(DEFAULT_AGENT_ID, &event.id).unwrap().is_none());

        // A delete tombstone snapshot was written for the archived event
        let tombstones: i64 = store
            .read()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM snapshots WHERE memory_id = ?1 AND action = 'delete'",
                params![event.id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tombstones, 1);
    }

    #[test]
    fn test_tidy_prunes_snapshots_to_cap() {
        let (_dir, store) = temp_store();
        let memory = store
            .create_memory(DEFAULT_AGENT_ID, &input("snapshot heavy memory", MemoryType::Knowledge))
            .unwrap()
            .unwrap();
        for i in 0..15 {
            store
                .update_memory(
                    DEFAULT_AGENT_ID,
                    &memory.id,
                    &MemoryUpdate::content(format!("revision {}", i)),
                )
                .unwrap();
            store
                .record_snapshot(DEFAULT_AGENT_ID, &memory.id, None, SnapshotAction::Update)
                .unwrap();
        }

        let report = tidy(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        assert_eq!(report.snapshots_pruned, 5);
        let remaining = store.list_snapshots(DEFAULT_AGENT_ID, &memory.id).unwrap();
        assert_eq!(remaining.len(), 10);
    }

    // ========================= GOVERN =========================

    #[test]
    fn test_govern_twice_second_is_noop() {
        let (_dir, store) = temp_store();
        let memory = store
            .create_memory(DEFAULT_AGENT_ID, &input("linked and pathed", MemoryType::Knowledge))
            .unwrap()
            .unwrap();
        let other = store
            .create_memory(DEFAULT_AGENT_ID, &input("the other endpoint", MemoryType::Knowledge))
            .unwrap()
            .unwrap();
        store
            .create_path(DEFAULT_AGENT_ID, &memory.id, "knowledge://pathed", None, None)
            .unwrap();
        store
            .create_link(DEFAULT_AGENT_ID, &memory.id, &other.id, Default::default(), 1.0)
            .unwrap();

        // Orphan everything by deleting the memory rows directly, bypassing
        // entity-level cascades
        store
            .write()
            .unwrap()
            .execute_batch("PRAGMA foreign_keys = OFF; DELETE FROM memories; PRAGMA foreign_keys = ON;")
            .unwrap();

        let first = govern(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        assert_eq!(first.orphan_paths, 1);
        assert_eq!(first.orphan_links, 1);

        let second = govern(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        assert_eq!(second.orphan_paths, 0);
        assert_eq!(second.orphan_links, 0);
        assert_eq!(second.empty_memories, 0);
    }

    #[test]
    fn test_govern_removes_empty_memories() {
        let (_dir, store) = temp_store();
        let memory = store
            .create_memory(DEFAULT_AGENT_ID, &input("soon to be blank", MemoryType::Knowledge))
            .unwrap()
            .unwrap();
        store
            .write()
            .unwrap()
            .execute(
                "UPDATE memories SET content = '   ' WHERE id = ?1",
                params![memory.id],
            )
            .unwrap();

        let report = govern(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        assert_eq!(report.empty_memories, 1);
        assert!(store.get_memory(DEFAULT_AGENT_ID, &memory.id).unwrap().is_none());
    }

    // ========================= BOOT =========================

    #[test]
    fn test_boot_surfaces_identity_and_manifest_uris() {
        let (_dir, store) = temp_store();
        let mut identity = input("I am the default agent", MemoryType::Identity);
        identity.uri = Some("core://agent/identity".to_string());
        sync(&store, DEFAULT_AGENT_ID, &[identity]).unwrap();

        let mut pinned = input("Pinned operating knowledge", MemoryType::Knowledge);
        pinned.uri = Some("knowledge://ops/pinned".to_string());
        sync(&store, DEFAULT_AGENT_ID, &[pinned]).unwrap();

        let mut manifest = input("knowledge://ops/pinned", MemoryType::Knowledge);
        manifest.uri = Some(BOOT_MANIFEST_URI.to_string());
        sync(&store, DEFAULT_AGENT_ID, &[manifest]).unwrap();

        let result = boot(&store, DEFAULT_AGENT_ID).unwrap();
        assert!(result
            .honored_uris
            .iter()
            .any(|u| u == "core://agent/identity"));
        assert!(result.honored_uris.iter().any(|u| u == "knowledge://ops/pinned"));
        assert!(result
            .memories
            .iter()
            .any(|m| m.content == "Pinned operating knowledge"));

        // Every surfaced memory was strengthened
        for memory in &result.memories {
            assert!(memory.access_count >= 1);
            assert!(memory.last_accessed.is_some());
        }
    }

    #[test]
    fn test_boot_is_tenant_scoped() {
        let (_dir, store) = temp_store();
        sync(
            &store,
            "other",
            &[input("Other tenant identity", MemoryType::Identity)],
        )
        .unwrap();

        let result = boot(&store, DEFAULT_AGENT_ID).unwrap();
        assert!(result.memories.is_empty());
    }

    // ========================= ALL =========================

    #[test]
    fn test_run_all_chains_phases() {
        let (_dir, store) = temp_store();
        let event = store
            .create_memory(DEFAULT_AGENT_ID, &input("stale event for the chain", MemoryType::Event))
            .unwrap()
            .unwrap();
        backdate(&store, &event.id, 365);

        let report = run_all(&store, Some(DEFAULT_AGENT_ID)).unwrap();
        // Decay collapses it, tidy archives it
        assert_eq!(report.decay.below_threshold, 1);
        assert_eq!(report.tidy.archived, 1);
        assert!(store.get_memory(DEFAULT_AGENT_ID, &event.id).unwrap().is_none());
    }
}
