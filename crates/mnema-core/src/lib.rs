//! # mnema-core
//!
//! Persistent memory engine for autonomous agents:
//!
//! - **Durable store**: single SQLite file (WAL) holding memories, URI
//!   paths, typed links, snapshots, and per-model embeddings, all scoped
//!   by an `agent_id` tenant
//! - **Write Guard**: every incoming write is classified as
//!   add/update/merge/skip before anything mutates
//! - **Hybrid retrieval**: BM25 over a CJK-aware tokenized full-text
//!   index, fused with dense cosine search via Reciprocal Rank Fusion,
//!   then intent-aware weighting by priority, recency, and vitality
//! - **Sleep cycle**: sync, Ebbinghaus decay, tidy, and govern
//!   maintenance phases, each transactional
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mnema_core::{sleep, Store, WriteInput, MemoryType};
//!
//! # fn main() -> Result<(), mnema_core::StoreError> {
//! let store = Store::open(None)?;
//!
//! let report = sleep::sync(&store, "default", &[WriteInput {
//!     content: "The mitochondria is the powerhouse of the cell".to_string(),
//!     memory_type: MemoryType::Knowledge,
//!     ..Default::default()
//! }])?;
//! println!("added {}", report.added);
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod guard;
pub mod memory;
pub mod providers;
pub mod search;
pub mod sleep;
pub mod storage;
pub mod tokenizer;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory types
pub use memory::{
    content_hash, initial_stability, parse_uri, validate_uri, vitality_floor, EmbeddingRecord,
    LinkRelation, ListFilter, Memory, MemoryLink, MemoryPath, MemoryStats, MemoryType,
    MemoryUpdate, Snapshot, SnapshotAction, TraversalNode, WriteInput, DEFAULT_AGENT_ID,
    DEFAULT_DOMAINS, STABILITY_CEILING,
};

// Storage layer
pub use storage::{Result, Store, StoreError, SCHEMA_VERSION};

// Write Guard
pub use guard::{GuardAction, GuardDecision};

// Retrieval
pub use search::{
    classify_intent, recall, search_bm25, HybridConfig, HybridSearcher, IntentResult, QueryIntent,
    RecallResult, SearchHit, SearchStrategy,
};

// Providers
pub use providers::{
    cosine_similarity, embed_missing, resolve_instruction_prefix, EmbedReport, EmbeddingProvider,
    EmbeddingSettings, ProviderError, ProviderSet, RankedDoc, RerankProvider, RerankSettings,
};

// Sleep cycle
pub use sleep::{BootResult, DecayReport, GovernReport, SleepReport, SyncReport, TidyReport};

// Tokenizer
pub use tokenizer::Tokenizer;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
