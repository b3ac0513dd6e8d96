//! SQLite store implementation
//!
//! Dual reader/writer connections behind mutexes so the store is
//! `Send + Sync` and the tool layer can hold an `Arc<Store>`. Every
//! mutating operation runs inside a single transaction on the writer;
//! readers proceed concurrently under WAL.
//!
//! The full-text mirror stores the *tokenized* form of memory content, so
//! it is maintained here by the entity operations rather than by SQL
//! triggers, always inside the same transaction as the row mutation.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use uuid::Uuid;

use crate::memory::{
    content_hash, uri, EmbeddingRecord, LinkRelation, ListFilter, Memory, MemoryLink, MemoryPath,
    MemoryStats, MemoryType, MemoryUpdate, Snapshot, SnapshotAction, TraversalNode, WriteInput,
    STABILITY_CEILING,
};
use crate::tokenizer::Tokenizer;

use super::migrations;
use super::Result;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Entity not found in the caller's tenant
    #[error("Not found: {0}")]
    NotFound(String),
    /// Input failed validation
    #[error("Validation error: {0}")]
    Validation(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Default growth factor applied to stability on recall.
pub const ACCESS_GROWTH: f64 = 1.5;

// ============================================================================
// STORE
// ============================================================================

/// The durable store: one SQLite file plus WAL sidecars.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    tokenizer: Tokenizer,
    schema_version: u32,
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) a store at the given path.
    ///
    /// With no path, a platform data directory is used.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("ai", "mnema", "mnema").ok_or_else(|| {
                    StoreError::Init("Could not determine project directories".to_string())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("agent-memory.db")
            }
        };

        let writer = Connection::open(&path)?;
        Self::configure_connection(&writer)?;
        let schema_version = migrations::apply_migrations(&writer)?;

        let reader = Connection::open(&path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            tokenizer: Tokenizer::new(),
            schema_version,
        })
    }

    /// The tokenizer shared by indexing and querying
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Durable schema version the store was opened at
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub(crate) fn read(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StoreError::Init("Reader lock poisoned".into()))
    }

    pub(crate) fn write(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StoreError::Init("Writer lock poisoned".into()))
    }

    // ========================================================================
    // MEMORIES
    // ========================================================================

    /// Create a memory, deduplicating on `(hash, agent_id)`.
    ///
    /// Returns `None` when an identical memory already exists - dedup is a
    /// no-op, not an error.
    pub fn create_memory(&self, agent_id: &str, input: &WriteInput) -> Result<Option<Memory>> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let created = create_memory_in(&tx, &self.tokenizer, agent_id, input)?;
        tx.commit()?;
        Ok(created)
    }

    /// Fetch a memory by id within a tenant
    pub fn get_memory(&self, agent_id: &str, id: &str) -> Result<Option<Memory>> {
        let reader = self.read()?;
        get_memory_in(&reader, agent_id, id)
    }

    /// Fetch a memory by content hash within a tenant
    pub fn get_memory_by_hash(&self, agent_id: &str, hash: &str) -> Result<Option<Memory>> {
        let reader = self.read()?;
        let mut stmt =
            reader.prepare("SELECT * FROM memories WHERE agent_id = ?1 AND hash = ?2")?;
        Ok(stmt
            .query_row(params![agent_id, hash], row_to_memory)
            .optional()?)
    }

    /// Apply a typed partial update. Content changes re-hash the row and
    /// refresh the full-text mirror in the same transaction.
    pub fn update_memory(
        &self,
        agent_id: &str,
        id: &str,
        update: &MemoryUpdate,
    ) -> Result<Memory> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let updated = update_memory_in(&tx, &self.tokenizer, agent_id, id, update)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Delete a memory; paths, links, snapshots, embeddings, and the
    /// full-text row all go with it.
    pub fn delete_memory(&self, agent_id: &str, id: &str) -> Result<bool> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let deleted = delete_memory_in(&tx, agent_id, id)?;
        tx.commit()?;
        Ok(deleted)
    }

    /// List memories with optional filters, ordered
    /// `priority ASC, updated_at DESC`.
    pub fn list_memories(&self, agent_id: &str, filter: &ListFilter) -> Result<Vec<Memory>> {
        let reader = self.read()?;
        let mut sql = String::from("SELECT * FROM memories WHERE agent_id = ?1");
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(agent_id.to_string())];

        if let Some(memory_type) = filter.memory_type {
            args.push(Box::new(memory_type.as_str().to_string()));
            sql.push_str(&format!(" AND memory_type = ?{}", args.len()));
        }
        if let Some(priority) = filter.priority {
            args.push(Box::new(priority));
            sql.push_str(&format!(" AND priority = ?{}", args.len()));
        }
        if let Some(min_vitality) = filter.min_vitality {
            args.push(Box::new(min_vitality));
            sql.push_str(&format!(" AND vitality >= ?{}", args.len()));
        }

        sql.push_str(" ORDER BY priority ASC, updated_at DESC");
        args.push(Box::new(filter.limit.unwrap_or(50).clamp(1, 500)));
        sql.push_str(&format!(" LIMIT ?{}", args.len()));
        args.push(Box::new(filter.offset.unwrap_or(0).max(0)));
        sql.push_str(&format!(" OFFSET ?{}", args.len()));

        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
            row_to_memory,
        )?;
        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }

    /// Recall strengthening: raise stability and vitality, bump the access
    /// counter, and restart the decay clock.
    ///
    /// Returns false when the memory is not in the caller's tenant.
    pub fn record_access(&self, agent_id: &str, id: &str, growth: f64) -> Result<bool> {
        let writer = self.write()?;
        record_access_in(&writer, agent_id, id, growth)
    }

    /// Strengthen a batch of recalled memories, skipping unknown ids.
    pub fn record_access_batch(&self, agent_id: &str, ids: &[&str], growth: f64) -> Result<usize> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let mut strengthened = 0;
        for id in ids {
            if record_access_in(&tx, agent_id, id, growth)? {
                strengthened += 1;
            }
        }
        tx.commit()?;
        Ok(strengthened)
    }

    /// Forget a memory.
    ///
    /// Hard: snapshot with `action = delete`, then remove the row and all
    /// its dependents. Soft: damp vitality to a tenth, clamped to the
    /// priority floor (a soft forget of an identity memory is a no-op).
    pub fn forget_memory(&self, agent_id: &str, id: &str, hard: bool) -> Result<Memory> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let memory = get_memory_in(&tx, agent_id, id)?
            .ok_or_else(|| StoreError::NotFound(format!("Memory {}", id)))?;

        let outcome = if hard {
            record_snapshot_in(&tx, &memory, Some("forget"), SnapshotAction::Delete)?;
            archive_memory_in(&tx, agent_id, id)?;
            memory
        } else {
            let floor = crate::memory::vitality_floor(memory.priority);
            let damped = (memory.vitality * 0.1).max(floor);
            update_memory_in(
                &tx,
                &self.tokenizer,
                agent_id,
                id,
                &MemoryUpdate {
                    vitality: Some(damped),
                    ..Default::default()
                },
            )?
        };
        tx.commit()?;
        Ok(outcome)
    }

    // ========================================================================
    // PATHS
    // ========================================================================

    /// Anchor a memory at a URI. Validates the grammar and domain set and
    /// enforces same-tenant ownership.
    pub fn create_path(
        &self,
        agent_id: &str,
        memory_id: &str,
        uri_str: &str,
        alias: Option<&str>,
        allowed_domains: Option<&[&str]>,
    ) -> Result<MemoryPath> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let path = create_path_in(&tx, agent_id, memory_id, uri_str, alias, allowed_domains)?;
        tx.commit()?;
        Ok(path)
    }

    /// Exact URI lookup within a tenant
    pub fn get_path(&self, agent_id: &str, uri_str: &str) -> Result<Option<MemoryPath>> {
        let reader = self.read()?;
        get_path_in(&reader, agent_id, uri_str)
    }

    /// Prefix URI scan within a tenant, ordered by URI
    pub fn list_paths_by_prefix(&self, agent_id: &str, prefix: &str) -> Result<Vec<MemoryPath>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT * FROM paths WHERE agent_id = ?1 AND uri LIKE ?2 || '%' ORDER BY uri",
        )?;
        let rows = stmt.query_map(params![agent_id, prefix], row_to_path)?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }

    // ========================================================================
    // LINKS
    // ========================================================================

    /// Create (or refresh) the directed edge between two same-tenant
    /// memories. Cross-tenant links are rejected.
    pub fn create_link(
        &self,
        agent_id: &str,
        source_id: &str,
        target_id: &str,
        relation: LinkRelation,
        weight: f64,
    ) -> Result<MemoryLink> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        for endpoint in [source_id, target_id] {
            if get_memory_in(&tx, agent_id, endpoint)?.is_none() {
                return Err(StoreError::Validation(format!(
                    "Link endpoint {} is not a memory of agent {}",
                    endpoint, agent_id
                )));
            }
        }
        let link = MemoryLink {
            agent_id: agent_id.to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            relation,
            weight,
            created_at: Utc::now(),
        };
        tx.execute(
            "INSERT INTO links (agent_id, source_id, target_id, relation, weight, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(agent_id, source_id, target_id)
             DO UPDATE SET relation = excluded.relation, weight = excluded.weight",
            params![
                link.agent_id,
                link.source_id,
                link.target_id,
                link.relation.as_str(),
                link.weight,
                link.created_at,
            ],
        )?;
        tx.commit()?;
        Ok(link)
    }

    /// List links touching a memory (both directions), or all links for
    /// the tenant when no memory is given.
    pub fn list_links(&self, agent_id: &str, memory_id: Option<&str>) -> Result<Vec<MemoryLink>> {
        let reader = self.read()?;
        let mut links = Vec::new();
        match memory_id {
            Some(id) => {
                let mut stmt = reader.prepare(
                    "SELECT * FROM links
                     WHERE agent_id = ?1 AND (source_id = ?2 OR target_id = ?2)
                     ORDER BY created_at",
                )?;
                let rows = stmt.query_map(params![agent_id, id], row_to_link)?;
                for row in rows {
                    links.push(row?);
                }
            }
            None => {
                let mut stmt =
                    reader.prepare("SELECT * FROM links WHERE agent_id = ?1 ORDER BY created_at")?;
                let rows = stmt.query_map(params![agent_id], row_to_link)?;
                for row in rows {
                    links.push(row?);
                }
            }
        }
        Ok(links)
    }

    /// BFS over the link graph from a start memory, both directions,
    /// bounded to one tenant. The start node is not included.
    pub fn traverse(
        &self,
        agent_id: &str,
        start_id: &str,
        max_hops: usize,
    ) -> Result<Vec<TraversalNode>> {
        let reader = self.read()?;
        if get_memory_in(&reader, agent_id, start_id)?.is_none() {
            return Err(StoreError::NotFound(format!("Memory {}", start_id)));
        }

        let mut stmt = reader.prepare(
            "SELECT target_id, relation FROM links WHERE agent_id = ?1 AND source_id = ?2
             UNION
             SELECT source_id, relation FROM links WHERE agent_id = ?1 AND target_id = ?2",
        )?;

        let mut visited: std::collections::HashSet<String> =
            std::collections::HashSet::from([start_id.to_string()]);
        let mut frontier = vec![start_id.to_string()];
        let mut results = Vec::new();

        for hop in 1..=max_hops {
            let mut next_frontier = Vec::new();
            for node in &frontier {
                let neighbors = stmt.query_map(params![agent_id, node], |row| {
                    let id: String = row.get(0)?;
                    let relation: String = row.get(1)?;
                    Ok((id, relation))
                })?;
                for neighbor in neighbors {
                    let (id, relation) = neighbor?;
                    if visited.insert(id.clone()) {
                        results.push(TraversalNode {
                            id: id.clone(),
                            hop,
                            relation: LinkRelation::parse_name(&relation),
                        });
                        next_frontier.push(id);
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok(results)
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    /// Record a snapshot of a memory's current content.
    pub fn record_snapshot(
        &self,
        agent_id: &str,
        memory_id: &str,
        changed_by: Option<&str>,
        action: SnapshotAction,
    ) -> Result<Snapshot> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        let memory = get_memory_in(&tx, agent_id, memory_id)?
            .ok_or_else(|| StoreError::NotFound(format!("Memory {}", memory_id)))?;
        let snapshot = record_snapshot_in(&tx, &memory, changed_by, action)?;
        tx.commit()?;
        Ok(snapshot)
    }

    /// Snapshots of one memory, newest first
    pub fn list_snapshots(&self, agent_id: &str, memory_id: &str) -> Result<Vec<Snapshot>> {
        let reader = self.read()?;
        if get_memory_in(&reader, agent_id, memory_id)?.is_none() {
            return Err(StoreError::NotFound(format!("Memory {}", memory_id)));
        }
        let mut stmt = reader.prepare(
            "SELECT * FROM snapshots WHERE memory_id = ?1 ORDER BY created_at DESC, id",
        )?;
        let rows = stmt.query_map(params![memory_id], row_to_snapshot)?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok(snapshots)
    }

    /// Fetch a snapshot, verifying the owning memory is in the tenant
    pub fn get_snapshot(&self, agent_id: &str, snapshot_id: &str) -> Result<Option<Snapshot>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT s.* FROM snapshots s
             JOIN memories m ON m.id = s.memory_id
             WHERE s.id = ?1 AND m.agent_id = ?2",
        )?;
        Ok(stmt
            .query_row(params![snapshot_id, agent_id], row_to_snapshot)
            .optional()?)
    }

    /// Restore a memory to a snapshot's content.
    ///
    /// The pre-rollback state is snapshotted first, so rollback itself can
    /// be rolled back.
    pub fn rollback_snapshot(&self, agent_id: &str, snapshot_id: &str) -> Result<Memory> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;

        let snapshot: Snapshot = {
            let mut stmt = tx.prepare(
                "SELECT s.* FROM snapshots s
                 JOIN memories m ON m.id = s.memory_id
                 WHERE s.id = ?1 AND m.agent_id = ?2",
            )?;
            stmt.query_row(params![snapshot_id, agent_id], row_to_snapshot)
                .optional()?
                .ok_or_else(|| StoreError::NotFound(format!("Snapshot {}", snapshot_id)))?
        };

        let memory = get_memory_in(&tx, agent_id, &snapshot.memory_id)?
            .ok_or_else(|| StoreError::NotFound(format!("Memory {}", snapshot.memory_id)))?;

        record_snapshot_in(&tx, &memory, Some("rollback"), SnapshotAction::Update)?;
        let restored = update_memory_in(
            &tx,
            &self.tokenizer,
            agent_id,
            &memory.id,
            &MemoryUpdate::content(snapshot.content.clone()),
        )?;
        tx.commit()?;
        Ok(restored)
    }

    // ========================================================================
    // EMBEDDINGS
    // ========================================================================

    /// Upsert the embedding row for `(agent_id, memory_id, model)`.
    pub fn upsert_embedding(
        &self,
        agent_id: &str,
        memory_id: &str,
        model: &str,
        vector: &[f32],
    ) -> Result<()> {
        let now = Utc::now();
        let writer = self.write()?;
        writer.execute(
            "INSERT INTO embeddings (agent_id, memory_id, model, dim, vector, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(agent_id, memory_id, model)
             DO UPDATE SET dim = excluded.dim, vector = excluded.vector, updated_at = excluded.updated_at",
            params![
                agent_id,
                memory_id,
                model,
                vector.len() as i64,
                vector_to_bytes(vector),
                now,
            ],
        )?;
        Ok(())
    }

    /// Fetch one embedding vector
    pub fn get_embedding(
        &self,
        agent_id: &str,
        memory_id: &str,
        model: &str,
    ) -> Result<Option<Vec<f32>>> {
        let reader = self.read()?;
        let bytes: Option<Vec<u8>> = reader
            .query_row(
                "SELECT vector FROM embeddings
                 WHERE agent_id = ?1 AND memory_id = ?2 AND model = ?3",
                params![agent_id, memory_id, model],
                |row| row.get(0),
            )
            .optional()?;
        Ok(bytes.map(|b| vector_from_bytes(&b)))
    }

    /// All embedding vectors stored for `(agent_id, model)`.
    pub fn list_embeddings(&self, agent_id: &str, model: &str) -> Result<Vec<(String, Vec<f32>)>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT memory_id, vector FROM embeddings WHERE agent_id = ?1 AND model = ?2",
        )?;
        let rows = stmt.query_map(params![agent_id, model], |row| {
            let memory_id: String = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((memory_id, bytes))
        })?;
        let mut embeddings = Vec::new();
        for row in rows {
            let (memory_id, bytes) = row?;
            embeddings.push((memory_id, vector_from_bytes(&bytes)));
        }
        Ok(embeddings)
    }

    /// Memories in scope lacking an embedding row under the given model.
    pub fn memories_missing_embedding(
        &self,
        agent_id: &str,
        model: &str,
        limit: i64,
    ) -> Result<Vec<Memory>> {
        let reader = self.read()?;
        let mut stmt = reader.prepare(
            "SELECT m.* FROM memories m
             WHERE m.agent_id = ?1
             AND NOT EXISTS (
                 SELECT 1 FROM embeddings e
                 WHERE e.agent_id = m.agent_id AND e.memory_id = m.id AND e.model = ?2
             )
             ORDER BY m.updated_at DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![agent_id, model, limit], row_to_memory)?;
        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Drop and rebuild the full-text index from current memory content.
    ///
    /// Returns the number of rows reindexed.
    pub fn reindex(&self) -> Result<i64> {
        let mut writer = self.write()?;
        let tx = writer.transaction()?;
        tx.execute("DELETE FROM memories_fts", [])?;
        let mut count = 0i64;
        {
            let mut stmt = tx.prepare("SELECT id, content FROM memories")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let content: String = row.get(1)?;
                Ok((id, content))
            })?;
            let mut insert =
                tx.prepare("INSERT INTO memories_fts (id, content) VALUES (?1, ?2)")?;
            for row in rows {
                let (id, content) = row?;
                insert.execute(params![id, self.tokenizer.index_text(&content)])?;
                count += 1;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    /// Aggregate counts for the status tool.
    pub fn stats(&self, agent_id: &str) -> Result<MemoryStats> {
        let reader = self.read()?;
        let mut stats = MemoryStats {
            schema_version: self.schema_version,
            ..Default::default()
        };

        stats.total_memories = reader.query_row(
            "SELECT COUNT(*) FROM memories WHERE agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;

        let mut stmt = reader.prepare(
            "SELECT memory_type, COUNT(*) FROM memories WHERE agent_id = ?1 GROUP BY memory_type",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (memory_type, count) = row?;
            stats.by_type.insert(memory_type, count);
        }

        let mut stmt = reader.prepare(
            "SELECT priority, COUNT(*) FROM memories WHERE agent_id = ?1 GROUP BY priority",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (priority, count) = row?;
            stats.by_priority.insert(priority.to_string(), count);
        }

        stats.total_paths = reader.query_row(
            "SELECT COUNT(*) FROM paths WHERE agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;
        stats.total_links = reader.query_row(
            "SELECT COUNT(*) FROM links WHERE agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;
        stats.total_snapshots = reader.query_row(
            "SELECT COUNT(*) FROM snapshots s JOIN memories m ON m.id = s.memory_id
             WHERE m.agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;
        stats.low_vitality = reader.query_row(
            "SELECT COUNT(*) FROM memories WHERE agent_id = ?1 AND vitality < 0.2",
            params![agent_id],
            |row| row.get(0),
        )?;
        stats.embedded_memories = reader.query_row(
            "SELECT COUNT(DISTINCT memory_id) FROM embeddings WHERE agent_id = ?1",
            params![agent_id],
            |row| row.get(0),
        )?;

        Ok(stats)
    }
}

// ============================================================================
// CONNECTION-LEVEL OPERATIONS
//
// Used by the store methods above and composed into larger transactions by
// the guard and sleep modules.
// ============================================================================

pub(crate) fn create_memory_in(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    input: &WriteInput,
) -> Result<Option<Memory>> {
    if input.content.trim().is_empty() {
        return Err(StoreError::Validation("Memory content is empty".into()));
    }
    let hash = content_hash(&input.content);
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM memories WHERE agent_id = ?1 AND hash = ?2",
            params![agent_id, hash],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(None);
    }

    let memory = Memory::from_input(input, agent_id);
    conn.execute(
        "INSERT INTO memories (
            id, content, memory_type, priority, emotion_val, vitality, stability,
            access_count, last_accessed, created_at, updated_at, source, agent_id, hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            memory.id,
            memory.content,
            memory.memory_type.as_str(),
            memory.priority,
            memory.emotion_val,
            memory.vitality,
            memory.stability,
            memory.access_count,
            memory.last_accessed,
            memory.created_at,
            memory.updated_at,
            memory.source,
            memory.agent_id,
            memory.hash,
        ],
    )?;
    conn.execute(
        "INSERT INTO memories_fts (id, content) VALUES (?1, ?2)",
        params![memory.id, tokenizer.index_text(&memory.content)],
    )?;
    Ok(Some(memory))
}

pub(crate) fn get_memory_in(
    conn: &Connection,
    agent_id: &str,
    id: &str,
) -> Result<Option<Memory>> {
    let mut stmt = conn.prepare("SELECT * FROM memories WHERE id = ?1 AND agent_id = ?2")?;
    Ok(stmt
        .query_row(params![id, agent_id], row_to_memory)
        .optional()?)
}

pub(crate) fn update_memory_in(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    id: &str,
    update: &MemoryUpdate,
) -> Result<Memory> {
    let existing = get_memory_in(conn, agent_id, id)?
        .ok_or_else(|| StoreError::NotFound(format!("Memory {}", id)))?;
    if update.is_empty() {
        return Ok(existing);
    }

    let mut sets: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(content) = &update.content {
        if content.trim().is_empty() {
            return Err(StoreError::Validation("Memory content is empty".into()));
        }
        args.push(Box::new(content.clone()));
        sets.push(format!("content = ?{}", args.len()));
        args.push(Box::new(content_hash(content)));
        sets.push(format!("hash = ?{}", args.len()));
    }
    if let Some(priority) = update.priority {
        args.push(Box::new(priority.clamp(0, 3)));
        sets.push(format!("priority = ?{}", args.len()));
    }
    if let Some(emotion_val) = update.emotion_val {
        args.push(Box::new(emotion_val.clamp(-1.0, 1.0)));
        sets.push(format!("emotion_val = ?{}", args.len()));
    }
    if let Some(vitality) = update.vitality {
        args.push(Box::new(vitality.clamp(0.0, 1.0)));
        sets.push(format!("vitality = ?{}", args.len()));
    }
    if let Some(stability) = update.stability {
        args.push(Box::new(stability.clamp(0.01, STABILITY_CEILING)));
        sets.push(format!("stability = ?{}", args.len()));
    }
    if let Some(source) = &update.source {
        args.push(Box::new(source.clone()));
        sets.push(format!("source = ?{}", args.len()));
    }

    args.push(Box::new(Utc::now()));
    sets.push(format!("updated_at = ?{}", args.len()));

    args.push(Box::new(id.to_string()));
    let id_pos = args.len();
    args.push(Box::new(agent_id.to_string()));
    let agent_pos = args.len();

    let sql = format!(
        "UPDATE memories SET {} WHERE id = ?{} AND agent_id = ?{}",
        sets.join(", "),
        id_pos,
        agent_pos,
    );
    conn.execute(
        &sql,
        rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
    )?;

    if let Some(content) = &update.content {
        conn.execute("DELETE FROM memories_fts WHERE id = ?1", params![id])?;
        conn.execute(
            "INSERT INTO memories_fts (id, content) VALUES (?1, ?2)",
            params![id, tokenizer.index_text(content)],
        )?;
    }

    get_memory_in(conn, agent_id, id)?
        .ok_or_else(|| StoreError::NotFound(format!("Memory {}", id)))
}

pub(crate) fn delete_memory_in(conn: &Connection, agent_id: &str, id: &str) -> Result<bool> {
    let deleted = archive_memory_in(conn, agent_id, id)?;
    if deleted {
        // Paths, links, and embeddings cascade; snapshot history is purged
        // here so nothing referencing the id survives an entity delete.
        conn.execute("DELETE FROM snapshots WHERE memory_id = ?1", params![id])?;
    }
    Ok(deleted)
}

/// Delete a memory row and its full-text mirror but keep its snapshots.
///
/// Used by tidy archival and hard forget, which record a "delete"
/// tombstone snapshot immediately beforehand.
pub(crate) fn archive_memory_in(conn: &Connection, agent_id: &str, id: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM memories WHERE id = ?1 AND agent_id = ?2",
        params![id, agent_id],
    )?;
    if deleted > 0 {
        conn.execute("DELETE FROM memories_fts WHERE id = ?1", params![id])?;
    }
    Ok(deleted > 0)
}

pub(crate) fn record_access_in(
    conn: &Connection,
    agent_id: &str,
    id: &str,
    growth: f64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE memories SET
            stability = MIN(?1, stability * ?2),
            vitality = MIN(1.0, vitality * 1.2),
            access_count = access_count + 1,
            last_accessed = ?3
         WHERE id = ?4 AND agent_id = ?5",
        params![STABILITY_CEILING, growth.max(1.0), Utc::now(), id, agent_id],
    )?;
    Ok(updated > 0)
}

pub(crate) fn create_path_in(
    conn: &Connection,
    agent_id: &str,
    memory_id: &str,
    uri_str: &str,
    alias: Option<&str>,
    allowed_domains: Option<&[&str]>,
) -> Result<MemoryPath> {
    let allowed = allowed_domains.unwrap_or(uri::DEFAULT_DOMAINS);
    let (domain, _) = uri::validate_uri(uri_str, allowed).map_err(StoreError::Validation)?;
    let domain = domain.to_string();

    if get_memory_in(conn, agent_id, memory_id)?.is_none() {
        return Err(StoreError::NotFound(format!("Memory {}", memory_id)));
    }
    let path = MemoryPath {
        id: Uuid::new_v4().to_string(),
        memory_id: memory_id.to_string(),
        agent_id: agent_id.to_string(),
        uri: uri_str.to_string(),
        alias: alias.map(str::to_string),
        domain,
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO paths (id, memory_id, agent_id, uri, alias, domain, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            path.id,
            path.memory_id,
            path.agent_id,
            path.uri,
            path.alias,
            path.domain,
            path.created_at,
        ],
    )?;
    Ok(path)
}

pub(crate) fn get_path_in(
    conn: &Connection,
    agent_id: &str,
    uri_str: &str,
) -> Result<Option<MemoryPath>> {
    let mut stmt = conn.prepare("SELECT * FROM paths WHERE agent_id = ?1 AND uri = ?2")?;
    Ok(stmt
        .query_row(params![agent_id, uri_str], row_to_path)
        .optional()?)
}

pub(crate) fn record_snapshot_in(
    conn: &Connection,
    memory: &Memory,
    changed_by: Option<&str>,
    action: SnapshotAction,
) -> Result<Snapshot> {
    let snapshot = Snapshot {
        id: Uuid::new_v4().to_string(),
        memory_id: memory.id.clone(),
        content: memory.content.clone(),
        changed_by: changed_by.map(str::to_string),
        action,
        created_at: Utc::now(),
    };
    conn.execute(
        "INSERT INTO snapshots (id, memory_id, content, changed_by, action, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            snapshot.id,
            snapshot.memory_id,
            snapshot.content,
            snapshot.changed_by,
            snapshot.action.as_str(),
            snapshot.created_at,
        ],
    )?;
    Ok(snapshot)
}

// ============================================================================
// ROW MAPPING
// ============================================================================

pub(crate) fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let memory_type: String = row.get("memory_type")?;
    Ok(Memory {
        id: row.get("id")?,
        content: row.get("content")?,
        memory_type: MemoryType::parse_name(&memory_type),
        priority: row.get("priority")?,
        emotion_val: row.get("emotion_val")?,
        vitality: row.get("vitality")?,
        stability: row.get("stability")?,
        access_count: row.get("access_count")?,
        last_accessed: row.get("last_accessed")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        source: row.get("source")?,
        agent_id: row.get("agent_id")?,
        hash: row.get("hash")?,
    })
}

fn row_to_path(row: &rusqlite::Row) -> rusqlite::Result<MemoryPath> {
    Ok(MemoryPath {
        id: row.get("id")?,
        memory_id: row.get("memory_id")?,
        agent_id: row.get("agent_id")?,
        uri: row.get("uri")?,
        alias: row.get("alias")?,
        domain: row.get("domain")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_link(row: &rusqlite::Row) -> rusqlite::Result<MemoryLink> {
    let relation: String = row.get("relation")?;
    Ok(MemoryLink {
        agent_id: row.get("agent_id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        relation: LinkRelation::parse_name(&relation),
        weight: row.get("weight")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<Snapshot> {
    let action: String = row.get("action")?;
    Ok(Snapshot {
        id: row.get("id")?,
        memory_id: row.get("memory_id")?,
        content: row.get("content")?,
        changed_by: row.get("changed_by")?,
        action: SnapshotAction::parse_name(&action),
        created_at: row.get("created_at")?,
    })
}

/// Pack a vector as little-endian f32 bytes
pub(crate) fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Unpack little-endian f32 bytes
pub(crate) fn vector_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Embedding row helper used by the backfill sweep
#[allow(dead_code)]
pub(crate) fn row_to_embedding(row: &rusqlite::Row) -> rusqlite::Result<EmbeddingRecord> {
    let bytes: Vec<u8> = row.get("vector")?;
    Ok(EmbeddingRecord {
        agent_id: row.get("agent_id")?,
        memory_id: row.get("memory_id")?,
        model: row.get("model")?,
        dim: row.get("dim")?,
        vector: vector_from_bytes(&bytes),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
