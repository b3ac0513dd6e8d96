//! Opening pre-v3 store files walks them forward to the current schema

use rusqlite::{params, Connection};
use tempfile::TempDir;

use mnema_core::{ListFilter, Store, SCHEMA_VERSION};

/// Lay down a v1-layout store file: memories carry agent_id, paths and
/// links do not, and a cross-tenant link exists.
fn write_v1_fixture(path: &std::path::Path) {
    let conn = Connection::open(path).unwrap();
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

    let now = "2024-06-01T00:00:00+00:00";
    for (id, content, agent, hash) in [
        ("mem-a", "memory of tenant a", "tenant-a", "hash-a"),
        ("mem-b", "memory of tenant b", "tenant-b", "hash-b"),
        ("mem-c", "second memory of tenant a", "tenant-a", "hash-c"),
    ] {
        conn.execute(
            "INSERT INTO memories (id, content, memory_type, priority, created_at, updated_at, agent_id, hash)
             VALUES (?1, ?2, 'knowledge', 2, ?3, ?3, ?4, ?5)",
            params![id, content, now, agent, hash],
        )
        .unwrap();
    }

    conn.execute(
        "INSERT INTO paths (id, memory_id, uri, domain, created_at)
         VALUES ('path-1', 'mem-a', 'knowledge://shared/slot', 'knowledge', ?1)",
        params![now],
    )
    .unwrap();

    // Cross-tenant link: representable at v1, dropped by the migration
    conn.execute(
        "INSERT INTO links (source_id, target_id, relation, created_at)
         VALUES ('mem-a', 'mem-b', 'related', ?1)",
        params![now],
    )
    .unwrap();
    // Same-tenant link: survives with the derived agent_id
    conn.execute(
        "INSERT INTO links (source_id, target_id, relation, created_at)
         VALUES ('mem-a', 'mem-c', 'caused', ?1)",
        params![now],
    )
    .unwrap();
}

#[test]
fn v1_store_opens_at_v3_with_tenant_aware_tables() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("legacy.db");
    write_v1_fixture(&db_path);

    let store = Store::open(Some(db_path.clone())).unwrap();
    assert_eq!(store.schema_version(), SCHEMA_VERSION);

    // Data survived
    let memories = store.list_memories("tenant-a", &ListFilter::default()).unwrap();
    assert_eq!(memories.len(), 2);

    // The cross-tenant link is gone; the same-tenant link survived
    let links = store.list_links("tenant-a", None).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target_id, "mem-c");
    assert!(store.list_links("tenant-b", None).unwrap().is_empty());

    // Path tenancy was derived from the owning memory
    let path = store.get_path("tenant-a", "knowledge://shared/slot").unwrap().unwrap();
    assert_eq!(path.memory_id, "mem-a");

    // The same URI may now exist once per tenant
    let other = store
        .create_memory(
            "tenant-b",
            &mnema_core::WriteInput {
                content: "tenant b wants the same slot".to_string(),
                ..Default::default()
            },
        )
        .unwrap()
        .unwrap();
    store
        .create_path("tenant-b", &other.id, "knowledge://shared/slot", None, None)
        .unwrap();
}

#[test]
fn reopening_a_migrated_store_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("legacy.db");
    write_v1_fixture(&db_path);

    {
        let store = Store::open(Some(db_path.clone())).unwrap();
        assert_eq!(store.schema_version(), SCHEMA_VERSION);
    }

    // Second open: migration-complete store, version sticks, data intact
    let store = Store::open(Some(db_path)).unwrap();
    assert_eq!(store.schema_version(), SCHEMA_VERSION);
    let memories = store.list_memories("tenant-a", &ListFilter::default()).unwrap();
    assert_eq!(memories.len(), 2);
}

#[test]
fn fresh_store_records_version_three() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("fresh.db");
    {
        let _store = Store::open(Some(db_path.clone())).unwrap();
    }

    let conn = Connection::open(&db_path).unwrap();
    let version: String = conn
        .query_row(
            "SELECT value FROM schema_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(version, "3");
}
