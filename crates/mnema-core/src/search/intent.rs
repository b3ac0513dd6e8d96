//! Query intent classification and intent-aware final weighting
//!
//! Four intent buckets are scored with bilingual pattern sets; the winning
//! intent selects a retrieval strategy (recency boost, priority boost, hard
//! limit). The local reranker then weights every candidate by priority,
//! recency, and vitality before the final truncation.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::keyword::SearchHit;

// ============================================================================
// INTENT TYPES
// ============================================================================

/// What kind of answer the query is after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// A specific fact ("what is X", "是什么")
    Factual,
    /// Time-anchored recall ("when", "昨天", dates)
    Temporal,
    /// Cause and effect ("why", "为什么")
    Causal,
    /// Open-ended browsing ("tell me about", "聊聊")
    Exploratory,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Factual => "factual",
            QueryIntent::Temporal => "temporal",
            QueryIntent::Causal => "causal",
            QueryIntent::Exploratory => "exploratory",
        }
    }

    /// Retrieval strategy for this intent.
    pub fn strategy(&self) -> SearchStrategy {
        match self {
            QueryIntent::Factual => SearchStrategy {
                boost_recent: false,
                boost_priority: true,
                limit: 5,
            },
            QueryIntent::Temporal => SearchStrategy {
                boost_recent: true,
                boost_priority: false,
                limit: 10,
            },
            QueryIntent::Causal => SearchStrategy {
                boost_recent: false,
                boost_priority: false,
                limit: 10,
            },
            QueryIntent::Exploratory => SearchStrategy {
                boost_recent: false,
                boost_priority: false,
                limit: 15,
            },
        }
    }
}

/// How the final weighting pass should behave
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchStrategy {
    pub boost_recent: bool,
    pub boost_priority: bool,
    pub limit: usize,
}

/// Classified intent with confidence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    pub intent: QueryIntent,
    /// `min(0.95, max_score / total_score)`, or 0.5 when nothing matched
    pub confidence: f64,
}

// ============================================================================
// PATTERN SETS
// ============================================================================

struct Bucket {
    intent: QueryIntent,
    /// Each match adds 1.0
    patterns: Vec<Regex>,
    /// Anchored structural boosts, each adds 0.5
    anchors: Vec<Regex>,
}

fn buckets() -> &'static [Bucket] {
    static BUCKETS: OnceLock<Vec<Bucket>> = OnceLock::new();
    BUCKETS.get_or_init(|| {
        let build = |patterns: &[&str], anchors: &[&str], intent| Bucket {
            intent,
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p).expect("static intent pattern"))
                .collect(),
            anchors: anchors
                .iter()
                .map(|p| Regex::new(p).expect("static intent anchor"))
                .collect(),
        };
        vec![
            build(
                &[
                    r"(?i)\b(what|who|where|which|define|definition|meaning)\b",
                    r"是什么|是谁|在哪|哪里|多少|几个|什么意思",
                ],
                &[r"(?i)^(what|who|where|which)\b", r"^(是什么|谁是)"],
                QueryIntent::Factual,
            ),
            build(
                &[
                    r"(?i)\b(when|yesterday|today|tomorrow|recently|ago|last\s+(week|month|year)|history|timeline)\b",
                    r"\d{4}[-/年]",
                    r"\d{1,2}[月日号]",
                    r"昨天|今天|明天|最近|上周|上个月|去年|什么时候|时间线",
                ],
                &[r"(?i)^when\b", r"^什么时候"],
                QueryIntent::Temporal,
            ),
            build(
                &[
                    r"(?i)\b(why|because|reason|cause[ds]?|leads?\s+to|result(ed)?\s+in)\b",
                    r"为什么|为啥|因为|原因|导致|怎么会",
                ],
                &[r"(?i)^why\b", r"^为什么|^为啥"],
                QueryIntent::Causal,
            ),
            build(
                &[
                    r"(?i)\b(tell\s+me\s+about|show|list|explore|overview|browse|related\s+to|everything\s+about)\b",
                    r"看看|聊聊|有什么|介绍|相关|了解一下",
                ],
                &[r"(?i)^(tell|show|list|explore)\b", r"^(看看|聊聊|介绍)"],
                QueryIntent::Exploratory,
            ),
        ]
    })
}

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Score the query against every bucket and pick a winner.
///
/// With no pattern match at all, short queries (<= 3 tokens) read as
/// factual lookups and longer free text as exploratory, both at the
/// zero-signal confidence of 0.5.
pub fn classify_intent(query: &str, token_count: usize) -> IntentResult {
    let mut scores: Vec<(QueryIntent, f64)> = Vec::new();
    for bucket in buckets() {
        let mut score = 0.0;
        for pattern in &bucket.patterns {
            if pattern.is_match(query) {
                score += 1.0;
            }
        }
        for anchor in &bucket.anchors {
            if anchor.is_match(query.trim()) {
                score += 0.5;
            }
        }
        scores.push((bucket.intent, score));
    }

    let total: f64 = scores.iter().map(|(_, s)| s).sum();
    if total == 0.0 {
        let intent = if token_count <= 3 {
            QueryIntent::Factual
        } else {
            QueryIntent::Exploratory
        };
        return IntentResult {
            intent,
            confidence: 0.5,
        };
    }

    let (intent, max_score) = scores
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("bucket list is non-empty");

    IntentResult {
        intent,
        confidence: (max_score / total).min(0.95),
    }
}

// ============================================================================
// LOCAL RERANKER
// ============================================================================

/// Priority weight table: P0 memories count 4x, P3 1x.
const PRIORITY_WEIGHT: [f64; 4] = [4.0, 3.0, 2.0, 1.0];

/// Weight every candidate by priority, recency, and vitality, then sort
/// and truncate.
pub fn local_rerank(
    mut hits: Vec<SearchHit>,
    strategy: &SearchStrategy,
    limit: usize,
) -> Vec<SearchHit> {
    let now = Utc::now();
    for hit in &mut hits {
        let mut score = hit.score;
        if strategy.boost_priority {
            let priority = hit.memory.priority.clamp(0, 3) as usize;
            score *= PRIORITY_WEIGHT[priority];
        }
        if strategy.boost_recent {
            let days = (now - hit.memory.updated_at).num_seconds() as f64 / 86_400.0;
            score *= (1.0 / (1.0 + 0.1 * days.max(0.0))).max(0.1);
        }
        score *= hit.memory.vitality.max(0.1);
        hit.score = score;
    }
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(limit);
    hits
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Memory, MemoryType, WriteInput};

    #[test]
    fn test_factual_queries() {
        assert_eq!(classify_intent("what is the deploy password", 5).intent, QueryIntent::Factual);
        assert_eq!(classify_intent("谁是项目负责人", 3).intent, QueryIntent::Factual);
    }

    #[test]
    fn test_temporal_queries() {
        assert_eq!(classify_intent("when did we ship v2", 5).intent, QueryIntent::Temporal);
        assert_eq!(classify_intent("昨天发生了什么事故", 4).intent, QueryIntent::Temporal);
        assert_eq!(classify_intent("2024年的发布记录", 3).intent, QueryIntent::Temporal);
    }

    #[test]
    fn test_causal_queries() {
        assert_eq!(classify_intent("why did the build break", 5).intent, QueryIntent::Causal);
        assert_eq!(classify_intent("为什么服务崩了", 4).intent, QueryIntent::Causal);
    }

    #[test]
    fn test_exploratory_queries() {
        assert_eq!(
            classify_intent("tell me about the migration plan", 6).intent,
            QueryIntent::Exploratory
        );
        // 聊聊 matches a pattern and the start anchor, outscoring 最近
        assert_eq!(classify_intent("聊聊最近的项目", 4).intent, QueryIntent::Exploratory);
    }

    #[test]
    fn test_short_unmatched_defaults_factual() {
        let result = classify_intent("rust lifetimes", 2);
        assert_eq!(result.intent, QueryIntent::Factual);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn test_confidence_capped() {
        let result = classify_intent("why", 1);
        assert!(result.confidence <= 0.95);
        assert!(result.confidence > 0.5);
    }

    #[test]
    fn test_strategy_table() {
        assert!(QueryIntent::Factual.strategy().boost_priority);
        assert!(!QueryIntent::Factual.strategy().boost_recent);
        assert_eq!(QueryIntent::Factual.strategy().limit, 5);

        assert!(QueryIntent::Temporal.strategy().boost_recent);
        assert_eq!(QueryIntent::Temporal.strategy().limit, 10);

        assert_eq!(QueryIntent::Causal.strategy().limit, 10);
        assert_eq!(QueryIntent::Exploratory.strategy().limit, 15);
    }

    fn hit(priority: i64, vitality: f64, score: f64) -> SearchHit {
        let mut memory = Memory::from_input(
            &WriteInput {
                content: format!("memory p{priority}"),
                memory_type: MemoryType::Knowledge,
                priority: Some(priority),
                ..Default::default()
            },
            "default",
        );
        memory.vitality = vitality;
        SearchHit {
            memory,
            score,
            match_reason: "bm25".to_string(),
        }
    }

    #[test]
    fn test_priority_boost_reorders() {
        let strategy = SearchStrategy {
            boost_recent: false,
            boost_priority: true,
            limit: 5,
        };
        let hits = local_rerank(vec![hit(3, 1.0, 1.0), hit(0, 1.0, 0.5)], &strategy, 5);
        // 0.5 * 4.0 = 2.0 beats 1.0 * 1.0
        assert_eq!(hits[0].memory.priority, 0);
    }

    #[test]
    fn test_vitality_always_applies() {
        let strategy = SearchStrategy {
            boost_recent: false,
            boost_priority: false,
            limit: 5,
        };
        let hits = local_rerank(vec![hit(2, 0.05, 1.0), hit(2, 1.0, 0.5)], &strategy, 5);
        // Vitality floor of 0.1: 1.0 * 0.1 = 0.1 < 0.5 * 1.0
        assert_eq!(hits[1].memory.vitality, 0.05);
    }

    #[test]
    fn test_limit_truncates() {
        let strategy = SearchStrategy {
            boost_recent: false,
            boost_priority: false,
            limit: 1,
        };
        let hits = local_rerank(vec![hit(2, 1.0, 1.0), hit(2, 1.0, 0.9)], &strategy, 1);
        assert_eq!(hits.len(), 1);
    }
}
