//! Memory module - core types and data structures
//!
//! Implements the durable memory model:
//! - Memory records with priority-derived stability and vitality
//! - URI paths for stable addressing
//! - Typed directed links between memories
//! - Append-only snapshots taken before destructive operations
//! - Per-model embedding rows

mod record;
pub mod uri;

pub use record::{
    content_hash, initial_stability, vitality_floor, ListFilter, Memory, MemoryType, MemoryUpdate,
    WriteInput, DEFAULT_AGENT_ID, STABILITY_CEILING,
};
pub use uri::{parse_uri, validate_uri, DEFAULT_DOMAINS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// PATHS
// ============================================================================

/// A URI anchor onto a memory, unique per `(agent_id, uri)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPath {
    pub id: String,
    pub memory_id: String,
    pub agent_id: String,
    pub uri: String,
    pub alias: Option<String>,
    pub domain: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// LINKS
// ============================================================================

/// Relation type of a directed edge between two memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkRelation {
    /// Generic association
    #[default]
    Related,
    /// Source caused target
    Caused,
    /// Source reminds of target
    Reminds,
    /// Target evolved from source
    Evolved,
    /// Source contradicts target
    Contradicts,
}

impl LinkRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkRelation::Related => "related",
            LinkRelation::Caused => "caused",
            LinkRelation::Reminds => "reminds",
            LinkRelation::Evolved => "evolved",
            LinkRelation::Contradicts => "contradicts",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "caused" => LinkRelation::Caused,
            "reminds" => LinkRelation::Reminds,
            "evolved" => LinkRelation::Evolved,
            "contradicts" => LinkRelation::Contradicts,
            _ => LinkRelation::Related,
        }
    }
}

impl std::fmt::Display for LinkRelation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, typed edge between two memories of the same agent.
///
/// `(agent_id, source_id, target_id)` is the primary key - at most one edge
/// per ordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryLink {
    pub agent_id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation: LinkRelation,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

/// One node emitted by graph traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalNode {
    /// Reached memory id
    pub id: String,
    /// Distance from the start node (1-based)
    pub hop: usize,
    /// Relation of the first edge followed to reach this node
    pub relation: LinkRelation,
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// What kind of mutation a snapshot precedes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotAction {
    Create,
    Update,
    Delete,
    Merge,
}

impl SnapshotAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotAction::Create => "create",
            SnapshotAction::Update => "update",
            SnapshotAction::Delete => "delete",
            SnapshotAction::Merge => "merge",
        }
    }

    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "create" => SnapshotAction::Create,
            "delete" => SnapshotAction::Delete,
            "merge" => SnapshotAction::Merge,
            _ => SnapshotAction::Update,
        }
    }
}

/// An immutable historical copy of a memory's content.
///
/// Recorded immediately before any content-mutating or destructive
/// operation; pruned by the tidy phase to a per-memory cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub memory_id: String,
    pub content: String,
    /// Which subsystem took the snapshot ("sync", "tidy", "rollback", ...)
    pub changed_by: Option<String>,
    pub action: SnapshotAction,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// EMBEDDINGS
// ============================================================================

/// A dense vector attached to one memory under one embedding model.
///
/// Keyed by `(agent_id, memory_id, model)`; the vector is stored as packed
/// little-endian f32.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub agent_id: String,
    pub memory_id: String,
    pub model: String,
    pub dim: i64,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// STATISTICS
// ============================================================================

/// Aggregate counts for the `status` tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Total memories in scope
    pub total_memories: i64,
    /// Counts keyed by memory type name
    pub by_type: std::collections::BTreeMap<String, i64>,
    /// Counts keyed by priority (as string, "0".."3")
    pub by_priority: std::collections::BTreeMap<String, i64>,
    /// Total paths in scope
    pub total_paths: i64,
    /// Total links in scope
    pub total_links: i64,
    /// Total snapshots for memories in scope
    pub total_snapshots: i64,
    /// Memories with vitality below the warning band (0.2)
    pub low_vitality: i64,
    /// Memories carrying at least one embedding row
    pub embedded_memories: i64,
    /// Durable schema version
    pub schema_version: u32,
}
