//! Write Guard - admission control for incoming writes
//!
//! Every write is classified before anything is mutated:
//!
//! 1. Exact duplicate (same content hash in tenant) -> skip
//! 2. URI conflict (path already anchored in tenant) -> update
//! 3. High lexical similarity to a same-type memory -> merge
//! 4. Four-criterion quality gate (specificity, novelty, relevance,
//!    coherence) -> add when all pass, skip otherwise
//!
//! The guard never mutates and never raises for classification outcomes;
//! callers apply the decision, snapshotting before any destructive step.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::memory::{content_hash, WriteInput};
use crate::storage::sqlite::get_path_in;
use crate::storage::{Result, Store};
use crate::tokenizer::Tokenizer;

/// BM25 rank units per query token required to call two memories "the
/// same". Calibrated against SQLite's FTS5 bm25() scale; recalibrate when
/// changing the lexical backend.
pub const MERGE_RANK_PER_TOKEN: f64 = 1.5;

/// How much of the incoming content feeds the similarity probe.
const SIMILARITY_PREFIX_CHARS: usize = 200;

/// Maximum tokens in the similarity probe query.
const SIMILARITY_MAX_TOKENS: usize = 8;

// ============================================================================
// DECISION TYPES
// ============================================================================

/// What the caller should do with the write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardAction {
    /// Create a new memory
    Add,
    /// Overwrite the targeted memory's content (snapshot first)
    Update,
    /// Overwrite the targeted memory with the merged content (snapshot first)
    Merge,
    /// Do nothing; `target_id` names the existing memory when relevant
    Skip,
}

impl GuardAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardAction::Add => "add",
            GuardAction::Update => "update",
            GuardAction::Merge => "merge",
            GuardAction::Skip => "skip",
        }
    }
}

/// The guard's classification of one incoming write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardDecision {
    pub action: GuardAction,
    /// Human-readable rationale
    pub reason: String,
    /// Existing memory the action targets (update/merge/skip-duplicate)
    pub target_id: Option<String>,
    /// Pre-merged content for `Merge`
    pub merged_content: Option<String>,
}

impl GuardDecision {
    fn add() -> Self {
        Self {
            action: GuardAction::Add,
            reason: "passed admission pipeline".to_string(),
            target_id: None,
            merged_content: None,
        }
    }

    fn skip(reason: String, target_id: Option<String>) -> Self {
        Self {
            action: GuardAction::Skip,
            reason,
            target_id,
            merged_content: None,
        }
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

/// Classify a write against committed state.
pub fn evaluate(store: &Store, agent_id: &str, input: &WriteInput) -> Result<GuardDecision> {
    let conn = store.read()?;
    evaluate_in(&conn, store.tokenizer(), agent_id, input)
}

/// Classify a write on an explicit connection.
///
/// Batch sync calls this inside its transaction so later items observe
/// earlier items' uncommitted writes.
pub(crate) fn evaluate_in(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    input: &WriteInput,
) -> Result<GuardDecision> {
    // Stage 1: exact duplicate by content hash
    let hash = content_hash(&input.content);
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM memories WHERE agent_id = ?1 AND hash = ?2",
            params![agent_id, hash],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(GuardDecision::skip(
            format!("exact duplicate of {}", id),
            Some(id),
        ));
    }

    // Stage 2: URI conflict -> update the memory behind the path
    if let Some(uri) = input.uri.as_deref() {
        if let Some(path) = get_path_in(conn, agent_id, uri)? {
            return Ok(GuardDecision {
                action: GuardAction::Update,
                reason: format!("uri {} already anchors {}", uri, path.memory_id),
                target_id: Some(path.memory_id),
                merged_content: None,
            });
        }
    }

    // Stage 3: similarity-triggered merge
    if let Some(decision) = similarity_merge(conn, tokenizer, agent_id, input)? {
        return Ok(decision);
    }

    // Stage 4: quality gate
    let failures = quality_gate(tokenizer, input);
    if !failures.is_empty() {
        return Ok(GuardDecision::skip(
            format!("quality gate failed: {}", failures.join(", ")),
            None,
        ));
    }

    Ok(GuardDecision::add())
}

/// Probe the full-text index with the head of the incoming content. A
/// sufficiently strong same-type match becomes a merge target.
fn similarity_merge(
    conn: &Connection,
    tokenizer: &Tokenizer,
    agent_id: &str,
    input: &WriteInput,
) -> Result<Option<GuardDecision>> {
    let prefix: String = input.content.chars().take(SIMILARITY_PREFIX_CHARS).collect();
    let tokens: Vec<String> = tokenizer
        .tokenize(&prefix)
        .into_iter()
        .take(SIMILARITY_MAX_TOKENS)
        .collect();
    if tokens.is_empty() {
        return Ok(None);
    }

    let query = Tokenizer::fts_query(&tokens);
    let matches: rusqlite::Result<Vec<(String, String, String, f64)>> = (|| {
        let mut stmt = conn.prepare(
            "SELECT m.id, m.memory_type, m.content, fts.rank
             FROM memories_fts fts
             JOIN memories m ON m.id = fts.id
             WHERE memories_fts MATCH ?1 AND m.agent_id = ?2
             ORDER BY fts.rank
             LIMIT 3",
        )?;
        let rows = stmt.query_map(params![query, agent_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        rows.collect()
    })();

    // A malformed probe must not fail classification
    let matches = match matches {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("similarity probe failed, continuing to quality gate: {}", e);
            return Ok(None);
        }
    };

    let Some((id, memory_type, content, rank)) = matches.into_iter().next() else {
        return Ok(None);
    };

    let top_rank = rank.abs();
    let threshold = tokens.len() as f64 * MERGE_RANK_PER_TOKEN;
    if top_rank > threshold && memory_type == input.memory_type.as_str() {
        let merged = format!("{}\n\n[Updated] {}", content, input.content);
        return Ok(Some(GuardDecision {
            action: GuardAction::Merge,
            reason: format!(
                "high similarity to {} (rank {:.2} > threshold {:.2})",
                id, top_rank, threshold
            ),
            target_id: Some(id),
            merged_content: Some(merged),
        }));
    }

    Ok(None)
}

/// Four-criterion quality gate; returns the list of failing criteria.
fn quality_gate(tokenizer: &Tokenizer, input: &WriteInput) -> Vec<&'static str> {
    let mut failures = Vec::new();
    let content = input.content.trim();
    let priority = input
        .priority
        .unwrap_or_else(|| input.memory_type.default_priority());

    // Specificity: high-priority memories may be terse
    let min_len = if priority <= 1 { 4 } else { 8 };
    if content.chars().count() < min_len {
        failures.push("specificity");
    }

    // Novelty: at least one non-stopword token
    if tokenizer.tokenize(content).is_empty() {
        failures.push("novelty");
    }

    // Relevance: any concrete signal
    let has_cjk = content.chars().any(is_cjk_char);
    let has_capitalized = content
        .split_whitespace()
        .any(|w| w.chars().next().is_some_and(|c| c.is_uppercase()));
    let has_digit = content.chars().any(|c| c.is_ascii_digit());
    let uri_like = content.contains("://");
    let has_entity_marker = content.contains('@') || content.contains('#');
    let long_enough = content.chars().count() >= 15;
    if !(has_cjk || has_capitalized || has_digit || uri_like || has_entity_marker || long_enough) {
        failures.push("relevance");
    }

    // Coherence: penalize degenerate shapes
    if coherence_score(content) < 0.3 {
        failures.push("coherence");
    }

    failures
}

fn coherence_score(content: &str) -> f64 {
    let mut score = 1.0;
    let char_count = content.chars().count();

    // All-caps monolith
    if char_count > 20
        && content
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == ' ')
    {
        score -= 0.5;
    }

    // Long run with neither whitespace nor punctuation
    if char_count > 20
        && !content.chars().any(|c| c.is_whitespace())
        && !content.chars().any(|c| c.is_ascii_punctuation())
    {
        score -= 0.3;
    }

    // Any character repeated 10+ times in a row
    let mut run = 0usize;
    let mut prev: Option<char> = None;
    for c in content.chars() {
        if Some(c) == prev {
            run += 1;
            if run >= 10 {
                score -= 0.5;
                break;
            }
        } else {
            prev = Some(c);
            run = 1;
        }
    }

    score
}

fn is_cjk_char(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3040}'..='\u{309F}'
        | '\u{30A0}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryType, DEFAULT_AGENT_ID};
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(Some(dir.path().join("guard.db"))).unwrap();
        (dir, store)
    }

    fn input(content: &str, memory_type: MemoryType) -> WriteInput {
        WriteInput {
            content: content.to_string(),
            memory_type,
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_duplicate_skips() {
        let (_dir, store) = temp_store();
        let existing = store
            .create_memory(DEFAULT_AGENT_ID, &input("Noah prefers green tea", MemoryType::Knowledge))
            .unwrap()
            .unwrap();

        let decision = evaluate(
            &store,
            DEFAULT_AGENT_ID,
            &input("  Noah prefers green tea  ", MemoryType::Knowledge),
        )
        .unwrap();
        assert_eq!(decision.action, GuardAction::Skip);
        assert_eq!(decision.target_id.as_deref(), Some(existing.id.as_str()));
    }

    #[test]
    fn test_uri_conflict_updates() {
        let (_dir, store) = temp_store();
        let existing = store
            .create_memory(DEFAULT_AGENT_ID, &input("Noah is a succubus", MemoryType::Identity))
            .unwrap()
            .unwrap();
        store
            .create_path(DEFAULT_AGENT_ID, &existing.id, "core://agent/identity", None, None)
            .unwrap();

        let mut incoming = input("Noah is a demon", MemoryType::Identity);
        incoming.uri = Some("core://agent/identity".to_string());
        let decision = evaluate(&store, DEFAULT_AGENT_ID, &incoming).unwrap();
        assert_eq!(decision.action, GuardAction::Update);
        assert_eq!(decision.target_id.as_deref(), Some(existing.id.as_str()));
    }

    #[test]
    fn test_uri_conflict_is_tenant_scoped() {
        let (_dir, store) = temp_store();
        let existing = store
            .create_memory("a", &input("Agent A identity", MemoryType::Identity))
            .unwrap()
            .unwrap();
        store
            .create_path("a", &existing.id, "core://agent/identity", None, None)
            .unwrap();

        let mut incoming = input("Agent B identity", MemoryType::Identity);
        incoming.uri = Some("core://agent/identity".to_string());
        let decision = evaluate(&store, "b", &incoming).unwrap();
        assert_eq!(decision.action, GuardAction::Add);
    }

    #[test]
    fn test_quality_gate_rejects_noise() {
        let (_dir, store) = temp_store();

        // Too short for a knowledge write
        let decision = evaluate(&store, DEFAULT_AGENT_ID, &input("ok", MemoryType::Knowledge)).unwrap();
        assert_eq!(decision.action, GuardAction::Skip);
        assert!(decision.reason.contains("specificity"));

        // Character spam fails coherence
        let decision = evaluate(
            &store,
            DEFAULT_AGENT_ID,
            &input("aaaaaaaaaaaaaaaaaaaaaaaa", MemoryType::Knowledge),
        )
        .unwrap();
        assert_eq!(decision.action, GuardAction::Skip);
        assert!(decision.reason.contains("coherence"));
    }

    #[test]
    fn test_short_identity_write_passes_specificity() {
        let (_dir, store) = temp_store();
        let decision = evaluate(&store, DEFAULT_AGENT_ID, &input("Noah", MemoryType::Identity)).unwrap();
        assert_eq!(decision.action, GuardAction::Add);
    }

    #[test]
    fn test_clean_write_adds() {
        let (_dir, store) = temp_store();
        let decision = evaluate(
            &store,
            DEFAULT_AGENT_ID,
            &input("Rust uses ownership to manage memory", MemoryType::Knowledge),
        )
        .unwrap();
        assert_eq!(decision.action, GuardAction::Add);
    }

    /// BM25 rank magnitudes only clear the merge threshold once term IDF is
    /// meaningful, so these tests seed a filler corpus first.
    fn seed_filler(store: &Store, count: usize) {
        for i in 0..count {
            store
                .create_memory(
                    DEFAULT_AGENT_ID,
                    &input(
                        &format!("Background reading list entry {} covering topic{}", i, i),
                        MemoryType::Knowledge,
                    ),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_merge_on_high_overlap_same_type() {
        let (_dir, store) = temp_store();
        seed_filler(&store, 80);
        store
            .create_memory(
                DEFAULT_AGENT_ID,
                &input(
                    "quarterly planning meeting moved thursday afternoon",
                    MemoryType::Event,
                ),
            )
            .unwrap()
            .unwrap();

        let decision = evaluate(
            &store,
            DEFAULT_AGENT_ID,
            &input(
                "quarterly planning meeting moved thursday afternoon into room four",
                MemoryType::Event,
            ),
        )
        .unwrap();
        // Heavy token overlap with one indexed memory triggers the merge arm
        assert_eq!(decision.action, GuardAction::Merge);
        let merged = decision.merged_content.unwrap();
        assert!(merged.contains("[Updated]"));
        assert!(merged.starts_with("quarterly planning meeting"));
    }

    #[test]
    fn test_type_mismatch_blocks_merge() {
        let (_dir, store) = temp_store();
        seed_filler(&store, 80);
        store
            .create_memory(
                DEFAULT_AGENT_ID,
                &input(
                    "quarterly planning meeting moved thursday afternoon",
                    MemoryType::Event,
                ),
            )
            .unwrap()
            .unwrap();

        let decision = evaluate(
            &store,
            DEFAULT_AGENT_ID,
            &input(
                "quarterly planning meeting moved thursday afternoon into room four",
                MemoryType::Knowledge,
            ),
        )
        .unwrap();
        assert_ne!(decision.action, GuardAction::Merge);
    }
}
