//! Memory record - the atomic unit of agent memory
//!
//! Each memory carries:
//! - Content, lifecycle type, and tenant scope
//! - Priority (durability class) and the derived stability/vitality state
//! - Access bookkeeping that feeds the Ebbinghaus decay model
//! - A content-hash prefix used for exact deduplication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Tenant scope used when none is configured.
pub const DEFAULT_AGENT_ID: &str = "default";

/// Stability value treated as "never decays" (priority-0 sentinel).
pub const STABILITY_CEILING: f64 = 999_999.0;

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Lifecycle type of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Who the agent is - never decays
    Identity,
    /// Emotional state and affect
    Emotion,
    /// Facts and learned information
    #[default]
    Knowledge,
    /// Things that happened - the most transient class
    Event,
}

impl MemoryType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Identity => "identity",
            MemoryType::Emotion => "emotion",
            MemoryType::Knowledge => "knowledge",
            MemoryType::Event => "event",
        }
    }

    /// Parse from string name, defaulting to knowledge
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "identity" => MemoryType::Identity,
            "emotion" => MemoryType::Emotion,
            "knowledge" => MemoryType::Knowledge,
            "event" => MemoryType::Event,
            _ => MemoryType::Knowledge,
        }
    }

    /// Default durability class for this type
    pub fn default_priority(&self) -> i64 {
        match self {
            MemoryType::Identity => 0,
            MemoryType::Emotion => 1,
            MemoryType::Knowledge => 2,
            MemoryType::Event => 3,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PRIORITY-DERIVED PARAMETERS
// ============================================================================

/// Initial Ebbinghaus stability (half-life in days) for a durability class.
///
/// Priority 0 gets the "infinite" sentinel; such memories never decay.
pub fn initial_stability(priority: i64) -> f64 {
    match priority {
        0 => STABILITY_CEILING,
        1 => 365.0,
        2 => 90.0,
        _ => 14.0,
    }
}

/// Vitality floor for a durability class. Decay never pushes below this.
pub fn vitality_floor(priority: i64) -> f64 {
    match priority {
        0 => 1.0,
        1 => 0.3,
        2 => 0.1,
        _ => 0.0,
    }
}

/// 16-hex-character prefix of SHA-256 over the trimmed content.
///
/// `(hash, agent_id)` is the exact-dedup key across the store.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.trim().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

// ============================================================================
// MEMORY
// ============================================================================

/// A single memory row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// The memory text
    pub content: String,
    /// Lifecycle type
    pub memory_type: MemoryType,
    /// Durability class 0..3 (0 = most durable)
    pub priority: i64,
    /// Emotional valence, -1.0 to 1.0
    pub emotion_val: f64,
    /// How alive the memory currently is, 0.0 to 1.0
    pub vitality: f64,
    /// Ebbinghaus half-life parameter in days
    pub stability: f64,
    /// Number of recalls
    pub access_count: i64,
    /// Last recall time; decay restarts from here
    pub last_accessed: Option<DateTime<Utc>>,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
    /// When the memory was last modified
    pub updated_at: DateTime<Utc>,
    /// Free-form origin tag
    pub source: Option<String>,
    /// Tenant scope
    pub agent_id: String,
    /// 16-hex content hash prefix
    pub hash: String,
}

impl Memory {
    /// Build a fresh memory from a write input, deriving priority,
    /// stability, and the content hash.
    pub fn from_input(input: &WriteInput, agent_id: &str) -> Self {
        let now = Utc::now();
        let priority = input
            .priority
            .unwrap_or_else(|| input.memory_type.default_priority())
            .clamp(0, 3);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: input.content.clone(),
            memory_type: input.memory_type,
            priority,
            emotion_val: input.emotion_val.clamp(-1.0, 1.0),
            vitality: 1.0,
            stability: initial_stability(priority),
            access_count: 0,
            last_accessed: None,
            created_at: now,
            updated_at: now,
            source: input.source.clone(),
            agent_id: agent_id.to_string(),
            hash: content_hash(&input.content),
        }
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for an incoming write, evaluated by the Write Guard.
///
/// Uses `deny_unknown_fields` so malformed tool calls fail loudly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteInput {
    /// The content to remember
    pub content: String,
    /// Lifecycle type
    #[serde(default)]
    pub memory_type: MemoryType,
    /// Optional URI anchor for the memory
    #[serde(default)]
    pub uri: Option<String>,
    /// Durability class override; derived from the type when absent
    #[serde(default)]
    pub priority: Option<i64>,
    /// Emotional valence, -1.0 to 1.0
    #[serde(default)]
    pub emotion_val: f64,
    /// Free-form origin tag
    #[serde(default)]
    pub source: Option<String>,
}

impl Default for WriteInput {
    fn default() -> Self {
        Self {
            content: String::new(),
            memory_type: MemoryType::Knowledge,
            uri: None,
            priority: None,
            emotion_val: 0.0,
            source: None,
        }
    }
}

/// Typed per-field-optional update for a memory row.
///
/// Only the populated fields become SET clauses; `updated_at` is always
/// refreshed. Content updates re-hash and re-index in the same transaction.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub priority: Option<i64>,
    pub emotion_val: Option<f64>,
    pub vitality: Option<f64>,
    pub stability: Option<f64>,
    pub source: Option<String>,
}

impl MemoryUpdate {
    /// An update that only replaces content
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// True when no field is populated
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.priority.is_none()
            && self.emotion_val.is_none()
            && self.vitality.is_none()
            && self.stability.is_none()
            && self.source.is_none()
    }
}

/// Filters for listing memories
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListFilter {
    #[serde(default)]
    pub memory_type: Option<MemoryType>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub min_vitality: Option<f64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

// ============================================================================
// TESTS
// ============================================================================
