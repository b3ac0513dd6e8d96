//! Schema creation and forward migrations
//!
//! The durable layout is versioned through the `schema_meta` table
//! (`('version', '3')`). A fresh store is created directly at the current
//! version; older stores are walked forward one migration at a time, each
//! inside its own transaction with referential integrity relaxed, so a
//! failure leaves the store at the prior version.
//!
//! Version history:
//! - v1: memories carry `agent_id`, but `paths` and `links` do not;
//!   `paths.uri` is globally unique.
//! - v2: `paths` and `links` rebuilt tenant-aware; path uniqueness becomes
//!   `(agent_id, uri)`; cross-tenant links are no longer representable.
//! - v3: additive `embeddings` table.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 3;

/// Full schema at the current version, created idempotently.
const SCHEMA_V3: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    memory_type TEXT NOT NULL DEFAULT 'knowledge',
    priority INTEGER NOT NULL DEFAULT 2,
    emotion_val REAL NOT NULL DEFAULT 0.0,
    vitality REAL NOT NULL DEFAULT 1.0,
    stability REAL NOT NULL DEFAULT 90.0,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    source TEXT,
    agent_id TEXT NOT NULL DEFAULT 'default',
    hash TEXT NOT NULL,
    UNIQUE (hash, agent_id)
);

CREATE INDEX IF NOT EXISTS idx_memories_agent ON memories(agent_id);
CREATE INDEX IF NOT EXISTS idx_memories_type ON memories(agent_id, memory_type);
CREATE INDEX IF NOT EXISTS idx_memories_priority ON memories(priority, updated_at);
CREATE INDEX IF NOT EXISTS idx_memories_vitality ON memories(vitality);

CREATE TABLE IF NOT EXISTS paths (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    agent_id TEXT NOT NULL DEFAULT 'default',
    uri TEXT NOT NULL,
    alias TEXT,
    domain TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (agent_id, uri)
);

CREATE INDEX IF NOT EXISTS idx_paths_memory ON paths(memory_id);

CREATE TABLE IF NOT EXISTS links (
    agent_id TEXT NOT NULL DEFAULT 'default',
    source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    relation TEXT NOT NULL DEFAULT 'related',
    weight REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (agent_id, source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_id);

-- No foreign key: a "delete" snapshot must survive its memory as a
-- tombstone when the tidy phase or a hard forget archives the row.
-- The entity-level delete purges snapshot history explicitly.
CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL,
    content TEXT NOT NULL,
    changed_by TEXT,
    action TEXT NOT NULL DEFAULT 'update',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_snapshots_memory ON snapshots(memory_id, created_at);

CREATE TABLE IF NOT EXISTS embeddings (
    agent_id TEXT NOT NULL,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    dim INTEGER NOT NULL,
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (agent_id, memory_id, model)
);

CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id UNINDEXED,
    content,
    tokenize='unicode61'
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// v1 -> v2: rebuild `paths` and `links` tenant-aware.
///
/// Path tenancy is derived from the owning memory (`'default'` for
/// orphans); link tenancy from the source endpoint. Links whose endpoints
/// disagree on tenant, and links with a missing endpoint, are dropped.
const MIGRATION_V1_TO_V2: &str = r#"
CREATE TABLE paths_v2 (
    id TEXT PRIMARY KEY,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    agent_id TEXT NOT NULL DEFAULT 'default',
    uri TEXT NOT NULL,
    alias TEXT,
    domain TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (agent_id, uri)
);

INSERT OR IGNORE INTO paths_v2 (id, memory_id, agent_id, uri, alias, domain, created_at)
SELECT p.id, p.memory_id, COALESCE(m.agent_id, 'default'), p.uri, p.alias, p.domain, p.created_at
FROM paths p
LEFT JOIN memories m ON m.id = p.memory_id;

DROP TABLE paths;
ALTER TABLE paths_v2 RENAME TO paths;
CREATE INDEX IF NOT EXISTS idx_paths_memory ON paths(memory_id);

CREATE TABLE links_v2 (
    agent_id TEXT NOT NULL DEFAULT 'default',
    source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    relation TEXT NOT NULL DEFAULT 'related',
    weight REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (agent_id, source_id, target_id)
);

INSERT OR IGNORE INTO links_v2 (agent_id, source_id, target_id, relation, weight, created_at)
SELECT s.agent_id, l.source_id, l.target_id, l.relation, l.weight, l.created_at
FROM links l
JOIN memories s ON s.id = l.source_id
JOIN memories t ON t.id = l.target_id
WHERE s.agent_id = t.agent_id;

DROP TABLE links;
ALTER TABLE links_v2 RENAME TO links;
CREATE INDEX IF NOT EXISTS idx_links_source ON links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_id);
"#;

/// v2 -> v3: additive embeddings table, no data rewrite.
const MIGRATION_V2_TO_V3: &str = r#"
CREATE TABLE IF NOT EXISTS embeddings (
    agent_id TEXT NOT NULL,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    model TEXT NOT NULL,
    dim INTEGER NOT NULL,
    vector BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (agent_id, memory_id, model)
);
"#;

/// Check whether a table exists.
fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Check whether a table carries a named column.
fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Recorded schema version, if any.
fn recorded_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    if !table_exists(conn, "schema_meta")? {
        return Ok(None);
    }
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}

/// Infer the version structurally when no `schema_meta` row exists.
///
/// 0 means "empty store": no data tables at all.
fn infer_version(conn: &Connection) -> rusqlite::Result<u32> {
    if !table_exists(conn, "memories")? {
        return Ok(0);
    }
    if !column_exists(conn, "paths", "agent_id")? {
        return Ok(1);
    }
    if !table_exists(conn, "embeddings")? {
        return Ok(2);
    }
    Ok(SCHEMA_VERSION)
}

fn set_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES ('version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![version.to_string()],
    )?;
    Ok(())
}

/// Run one migration batch inside a transaction with foreign keys off.
///
/// The version row is updated in the same transaction as the rewrite, and
/// foreign-key enforcement is restored afterwards even on failure.
fn run_migration(conn: &Connection, sql: &str, to_version: u32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "OFF")?;
    let result = (|| {
        conn.execute_batch("BEGIN IMMEDIATE")?;
        match conn
            .execute_batch(sql)
            .and_then(|_| set_version(conn, to_version))
        {
            Ok(()) => conn.execute_batch("COMMIT"),
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    })();
    conn.pragma_update(None, "foreign_keys", "ON")?;
    result
}

/// Bring the store to the current schema version.
///
/// Idempotent: opening a current-version store performs no structural
/// change. Returns the version the store ended at.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<u32> {
    let mut version = match recorded_version(conn)? {
        Some(v) => v,
        None => infer_version(conn)?,
    };

    if version == 0 {
        conn.execute_batch(SCHEMA_V3)?;
        set_version(conn, SCHEMA_VERSION)?;
        return Ok(SCHEMA_VERSION);
    }

    // schema_meta may be absent in inferred pre-v3 stores
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
    )?;

    if version == 1 {
        info!("Applying migration v1 -> v2: tenant-aware paths and links");
        run_migration(conn, MIGRATION_V1_TO_V2, 2)?;
        version = 2;
    }

    if version == 2 {
        info!("Applying migration v2 -> v3: embeddings table");
        run_migration(conn, MIGRATION_V2_TO_V3, 3)?;
        version = 3;
    }

    // Structures that postdate v1 fixtures but are version-independent
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
            id UNINDEXED, content, tokenize='unicode61');",
    )?;

    Ok(version)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_row(conn: &Connection, id: &str, agent: &str) {
        conn.execute(
            "INSERT INTO memories (id, content, memory_type, priority, created_at, updated_at, agent_id, hash)
             VALUES (?1, ?2, 'knowledge', 2, '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', ?3, ?4)",
            params![id, format!("content {}", id), agent, format!("hash{}", id)],
        )
        .unwrap();
    }

    /// Build a v1-layout store: memories with agent_id, paths/links without.
    fn v1_store(conn: &Connection) {
        conn.execute_batch(
            r#"
            CREATE TABLE memories (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                memory_type TEXT NOT NULL,
                priority INTEGER NOT NULL,
                emotion_val REAL NOT NULL DEFAULT 0.0,
                vitality REAL NOT NULL DEFAULT 1.0,
                stability REAL NOT NULL DEFAULT 90.0,
                access_count INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                source TEXT,
                agent_id TEXT NOT NULL DEFAULT 'default',
                hash TEXT NOT NULL,
                UNIQUE (hash, agent_id)
            );
            CREATE TABLE paths (
                id TEXT PRIMARY KEY,
                memory_id TEXT NOT NULL,
                uri TEXT NOT NULL UNIQUE,
                alias TEXT,
                domain TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE links (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relation TEXT NOT NULL,
                weight REAL NOT NULL DEFAULT 1.0,
                created_at TEXT NOT NULL,
                PRIMARY KEY (source_id, target_id)
            );
            "#,
        )
        .unwrap();
    }

    #[test]
    fn test_fresh_store_created_at_v3() {
        let conn = Connection::open_in_memory().unwrap();
        let version = apply_migrations(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        assert!(table_exists(&conn, "memories").unwrap());
        assert!(table_exists(&conn, "embeddings").unwrap());
        assert!(column_exists(&conn, "paths", "agent_id").unwrap());
        assert_eq!(recorded_version(&conn).unwrap(), Some(3));
    }

    #[test]
    fn test_reopen_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        memory_row(&conn, "m1", "default");
        let version = apply_migrations(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_v1_migrates_to_v3_and_drops_cross_tenant_links() {
        let conn = Connection::open_in_memory().unwrap();
        v1_store(&conn);
        memory_row(&conn, "a", "tenant-a");
        memory_row(&conn, "b", "tenant-b");
        memory_row(&conn, "c", "tenant-a");
        conn.execute(
            "INSERT INTO paths (id, memory_id, uri, domain, created_at)
             VALUES ('p1', 'a', 'core://x', 'core', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        // Cross-tenant link: must be dropped by the rebuild
        conn.execute(
            "INSERT INTO links (source_id, target_id, relation, created_at)
             VALUES ('a', 'b', 'related', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        // Same-tenant link: must survive with derived agent_id
        conn.execute(
            "INSERT INTO links (source_id, target_id, relation, created_at)
             VALUES ('a', 'c', 'caused', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();

        let version = apply_migrations(&conn).unwrap();
        assert_eq!(version, 3);

        let link_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM links", [], |r| r.get(0))
            .unwrap();
        assert_eq!(link_count, 1);
        let agent: String = conn
            .query_row("SELECT agent_id FROM links", [], |r| r.get(0))
            .unwrap();
        assert_eq!(agent, "tenant-a");

        let path_agent: String = conn
            .query_row("SELECT agent_id FROM paths WHERE id = 'p1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(path_agent, "tenant-a");

        // Same URI may now exist once per tenant
        conn.execute(
            "INSERT INTO paths (id, memory_id, agent_id, uri, domain, created_at)
             VALUES ('p2', 'b', 'tenant-b', 'core://x', 'core', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_v2_store_gains_embeddings_only() {
        let conn = Connection::open_in_memory().unwrap();
        // v2: current layout minus the embeddings table
        conn.execute_batch(SCHEMA_V3).unwrap();
        conn.execute_batch("DROP TABLE embeddings").unwrap();
        set_version(&conn, 2).unwrap();

        let version = apply_migrations(&conn).unwrap();
        assert_eq!(version, 3);
        assert!(table_exists(&conn, "embeddings").unwrap());
    }
}
