//! CJK-aware tokenization
//!
//! Produces the deterministic token stream used on both sides of the
//! full-text index: `index_text` feeds the FTS mirror at write time and
//! `tokenize` feeds query construction at search time, so the two always
//! agree on segmentation.
//!
//! Latin/numeric words pass through lowercased; CJK runs are segmented with
//! jieba in search mode when the `segmentation` feature is enabled, falling
//! back to the union of unigrams and consecutive bigrams otherwise.

#[cfg(feature = "segmentation")]
use std::sync::OnceLock;

/// Hard cap on tokens emitted per text.
pub const MAX_TOKENS: usize = 30;

/// Common Chinese function words removed from every token stream.
const STOPWORDS: &[&str] = &[
    "的", "了", "在", "是", "我", "有", "和", "就", "不", "人", "都", "一", "一个", "上", "也",
    "很", "到", "说", "要", "去", "你", "会", "着", "没有", "看", "好", "这",
];

/// Tokenizer handle owned by the store.
///
/// The jieba dictionary is heavyweight, so it is loaded lazily on the first
/// CJK run rather than at construction time.
pub struct Tokenizer {
    #[cfg(feature = "segmentation")]
    segmenter: OnceLock<jieba_rs::Jieba>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "segmentation")]
            segmenter: OnceLock::new(),
        }
    }

    /// Tokenize text into a deduplicated list of at most [`MAX_TOKENS`]
    /// tokens with stopwords removed.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned: String = text
            .chars()
            .map(|c| {
                if is_word_char(c) || is_cjk(c) || c.is_whitespace() {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let mut tokens: Vec<String> = Vec::new();
        let mut latin = String::new();
        let mut cjk_run = String::new();

        let mut flush_latin = |buf: &mut String, out: &mut Vec<String>| {
            if buf.chars().count() > 1 {
                out.push(buf.to_lowercase());
            }
            buf.clear();
        };

        for c in cleaned.chars() {
            if is_cjk(c) {
                flush_latin(&mut latin, &mut tokens);
                cjk_run.push(c);
            } else if is_word_char(c) {
                self.flush_cjk(&mut cjk_run, &mut tokens);
                latin.push(c);
            } else {
                flush_latin(&mut latin, &mut tokens);
                self.flush_cjk(&mut cjk_run, &mut tokens);
            }
        }
        flush_latin(&mut latin, &mut tokens);
        self.flush_cjk(&mut cjk_run, &mut tokens);

        // Stopwords, then dedup preserving first occurrence, then cap
        let mut seen = std::collections::HashSet::new();
        tokens
            .into_iter()
            .filter(|t| !STOPWORDS.contains(&t.as_str()))
            .filter(|t| seen.insert(t.clone()))
            .take(MAX_TOKENS)
            .collect()
    }

    /// Tokenization for the full-text index: the token list joined with
    /// single spaces, so the FTS tokenizer sees pre-segmented terms.
    pub fn index_text(&self, text: &str) -> String {
        self.tokenize(text).join(" ")
    }

    /// Build an FTS OR-query from tokens. Terms are quoted, so any FTS
    /// query syntax inside them is inert.
    pub fn fts_query(tokens: &[String]) -> String {
        tokens
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn flush_cjk(&self, run: &mut String, out: &mut Vec<String>) {
        if run.is_empty() {
            return;
        }
        out.extend(self.segment_cjk(run));
        run.clear();
    }

    /// Segment one contiguous CJK run.
    #[cfg(feature = "segmentation")]
    fn segment_cjk(&self, run: &str) -> Vec<String> {
        let jieba = self.segmenter.get_or_init(jieba_rs::Jieba::new);
        jieba
            .cut_for_search(run, true)
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    /// Fallback segmentation: the union of unigrams and consecutive
    /// bigrams over the run.
    #[cfg(not(feature = "segmentation"))]
    fn segment_cjk(&self, run: &str) -> Vec<String> {
        ngram_fallback(run)
    }
}

/// Unigrams followed by consecutive bigrams over a CJK run.
#[allow(dead_code)]
fn ngram_fallback(run: &str) -> Vec<String> {
    let chars: Vec<char> = run.chars().collect();
    let mut out: Vec<String> = chars.iter().map(|c| c.to_string()).collect();
    for pair in chars.windows(2) {
        out.push(pair.iter().collect());
    }
    out
}

/// Word characters: ASCII alphanumerics and underscore.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// CJK Unified Ideographs, Hiragana, Katakana, and Hangul syllables.
fn is_cjk(c: char) -> bool {
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

    #[test]
    fn test_latin_words() {
        let tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("Rust is a systems language");
        assert!(tokens.contains(&"rust".to_string()));
        assert!(tokens.contains(&"systems".to_string()));
        // Single-character words are dropped
        assert!(!tokens.contains(&"a".to_string()));
    }

    #[test]
    fn test_punctuation_stripped() {
        let tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("hello, world! foo@bar.com");
        assert!(tokens.contains(&"hello".to_string()));
        assert!(tokens.contains(&"world".to_string()));
        assert!(tokens.contains(&"foo".to_string()));
    }

    #[test]
    fn test_cjk_segmented() {
        let tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("今天天气不错");
        assert!(!tokens.is_empty());
        // Every token must come from the original run
        for t in &tokens {
            assert!("今天天气不错".contains(t.as_str()), "unexpected token {t}");
        }
    }

    #[test]
    fn test_stopwords_removed() {
        let tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("我的了");
        assert!(!tokens.contains(&"的".to_string()));
        assert!(!tokens.contains(&"了".to_string()));
        assert!(!tokens.contains(&"我".to_string()));
    }

    #[test]
    fn test_dedup_and_cap() {
        let tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("echo echo echo echo");
        assert_eq!(tokens, vec!["echo".to_string()]);

        let long: String = (0..100).map(|i| format!("word{} ", i)).collect();
        assert_eq!(tokenizer.tokenize(&long).len(), MAX_TOKENS);
    }

    #[test]
    fn test_mixed_script() {
        let tokenizer = Tokenizer::new();
        let tokens = tokenizer.tokenize("rust很棒 awesome");
        assert!(tokens.contains(&"rust".to_string()));
        assert!(tokens.contains(&"awesome".to_string()));
        assert!(tokens.iter().any(|t| t.contains('棒')));
    }

    #[test]
    fn test_ngram_fallback() {
        let grams = ngram_fallback("天气好");
        assert!(grams.contains(&"天".to_string()));
        assert!(grams.contains(&"天气".to_string()));
        assert!(grams.contains(&"气好".to_string()));
    }

    #[test]
    fn test_index_text_is_joined_tokens() {
        let tokenizer = Tokenizer::new();
        let indexed = tokenizer.index_text("Hello World");
        assert_eq!(indexed, "hello world");
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        let query = Tokenizer::fts_query(&["hello".to_string(), "world".to_string()]);
        assert_eq!(query, "\"hello\" OR \"world\"");
    }

    #[test]
    fn test_empty_input() {
        let tokenizer = Tokenizer::new();
        assert!(tokenizer.tokenize("").is_empty());
        assert!(tokenizer.tokenize("!!! ???").is_empty());
    }
}
