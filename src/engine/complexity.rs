// ── omem Engine: Query Complexity Estimation ────────────────────────────────
//
// Rule-based scoring of how hard a query is to answer, plus query-type
// classification and keyword/entity extraction. Keyword heuristics only —
// no ML model, fast and deterministic.
//
// The aggregate drives dynamic K: deeper retrieval for harder queries.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::atoms::types::{ComplexityReport, QueryType};

// ═══════════════════════════════════════════════════════════════════════════
// Signal vocabularies
// ═══════════════════════════════════════════════════════════════════════════

const HARD_QUESTION_WORDS: &[&str] = &["why", "how", "explain", "describe", "reason", "cause"];

const MEDIUM_QUESTION_WORDS: &[&str] = &["when", "where", "which", "whose"];

const EASY_QUESTION_WORDS: &[&str] = &["what", "who", "is", "are", "do", "does", "did", "was", "were", "can"];

const TEMPORAL_WORDS: &[&str] = &[
    "today", "yesterday", "tomorrow", "week", "month", "year", "ago", "last", "next",
    "recently", "earlier", "later", "now", "morning", "afternoon", "evening", "night",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

const NEGATION_WORDS: &[&str] = &[
    "not", "never", "no", "don't", "doesn't", "didn't", "won't", "can't", "isn't",
    "aren't", "wasn't", "weren't", "without",
];

const COMPARISON_WORDS: &[&str] = &[
    "compare", "compared", "comparison", "difference", "different", "similar",
    "between", "versus", "vs", "better", "worse", "prefer",
];

const CONDITIONAL_WORDS: &[&str] = &[
    "if", "would", "could", "might", "suppose", "assuming", "unless", "whether",
];

/// Words that never count as query keywords or entities.
const QUERY_STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "do", "does", "did", "will", "would", "could", "should", "may",
    "might", "can", "i", "me", "my", "we", "our", "you", "your", "he", "she", "it",
    "they", "them", "their", "this", "that", "these", "those", "what", "which",
    "who", "whom", "whose", "when", "where", "why", "how", "and", "or", "but",
    "not", "no", "so", "to", "of", "in", "on", "at", "by", "for", "with", "from",
    "about", "into", "as", "tell", "give", "please",
];

static PROPER_NOUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").expect("proper noun regex"));

static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("quoted regex"));

// ═══════════════════════════════════════════════════════════════════════════
// Estimator
// ═══════════════════════════════════════════════════════════════════════════

/// Pure-function complexity estimator. Holds only the dynamic-K knobs.
#[derive(Debug, Clone)]
pub struct ComplexityEstimator {
    default_top_k: usize,
    max_top_k: usize,
    complexity_delta: f64,
}

impl ComplexityEstimator {
    pub fn new(default_top_k: usize, max_top_k: usize, complexity_delta: f64) -> Self {
        ComplexityEstimator {
            default_top_k,
            max_top_k,
            complexity_delta,
        }
    }

    /// Score one query and derive its retrieval parameters.
    pub fn estimate(&self, query: &str) -> ComplexityReport {
        let lower = query.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();

        let entities = extract_query_entities(query);
        let keywords = extract_keywords(&lower);
        let temporal_refs = count_matches(&words, TEMPORAL_WORDS);
        let negations = count_matches(&words, NEGATION_WORDS);
        let comparisons = count_matches(&words, COMPARISON_WORDS);
        let conditionals = count_matches(&words, CONDITIONAL_WORDS);

        let length_score = match words.len() {
            0..=4 => 0.1,
            5..=9 => 0.3,
            10..=14 => 0.5,
            15..=24 => 0.7,
            _ => 0.9,
        };
        let entity_score = match entities.len() {
            0 => 0.1,
            1 => 0.2,
            2 => 0.4,
            3 => 0.6,
            _ => 0.8,
        };
        let temporal_score = match temporal_refs {
            0 => 0.0,
            1 => 0.3,
            2 => 0.5,
            _ => 0.7,
        };
        let question_score = question_type_score(&lower, &words);
        let negation_score = match negations {
            0 => 0.0,
            1 => 0.2,
            2 => 0.4,
            _ => 0.6,
        };
        let comparison_score = match comparisons {
            0 => 0.0,
            1 => 0.4,
            2 => 0.6,
            _ => 0.8,
        };
        let conditional_score = match conditionals {
            0 => 0.0,
            1 => 0.3,
            _ => 0.5,
        };

        let score = (0.15 * length_score
            + 0.25 * entity_score
            + 0.15 * temporal_score
            + 0.20 * question_score
            + 0.05 * negation_score
            + 0.10 * comparison_score
            + 0.10 * conditional_score)
            .clamp(0.0, 1.0);

        let query_type = classify(&lower, &words, temporal_refs, comparisons);
        let dynamic_k = self.dynamic_k(score);

        ComplexityReport {
            score,
            query_type,
            entities,
            keywords,
            dynamic_k,
        }
    }

    /// `round(default_top_k · (1 + delta · complexity))`, clamped to
    /// `max_top_k`. Always ≥ `default_top_k` for complexity in [0,1].
    pub fn dynamic_k(&self, complexity: f64) -> usize {
        let k = (self.default_top_k as f64 * (1.0 + self.complexity_delta * complexity)).round()
            as usize;
        k.clamp(self.default_top_k, self.max_top_k)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Scoring pieces
// ═══════════════════════════════════════════════════════════════════════════

fn count_matches(words: &[&str], vocabulary: &[&str]) -> usize {
    words
        .iter()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\''))
        .filter(|w| vocabulary.contains(w))
        .count()
}

fn contains_word(words: &[&str], vocabulary: &[&str]) -> bool {
    count_matches(words, vocabulary) > 0
}

fn question_type_score(lower: &str, words: &[&str]) -> f64 {
    if contains_word(words, HARD_QUESTION_WORDS) {
        0.8
    } else if contains_word(words, MEDIUM_QUESTION_WORDS) {
        0.5
    } else if contains_word(words, EASY_QUESTION_WORDS) {
        0.3
    } else if !lower.trim_end().ends_with('?') {
        0.2
    } else {
        0.4
    }
}

/// First-match classification. A causal marker outranks a comparison one so
/// that "why … compared to …" reads as a causal question.
fn classify(lower: &str, words: &[&str], temporal_refs: usize, comparisons: usize) -> QueryType {
    if contains_word(words, HARD_QUESTION_WORDS) {
        QueryType::Causal
    } else if comparisons > 0 {
        QueryType::Comparison
    } else if words.iter().any(|w| *w == "when") || temporal_refs > 0 {
        QueryType::Temporal
    } else if words.iter().any(|w| *w == "where") {
        QueryType::Spatial
    } else if contains_word(words, EASY_QUESTION_WORDS) && lower.trim_end().ends_with('?') {
        QueryType::Factual
    } else {
        QueryType::Open
    }
}

/// Proper nouns plus quoted strings, minus the query stop words.
pub fn extract_query_entities(query: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    for m in PROPER_NOUN_RE.find_iter(query) {
        let candidate = m.as_str().trim();
        if QUERY_STOP_WORDS.contains(&candidate.to_lowercase().as_str()) {
            continue;
        }
        if !out.iter().any(|e| e.eq_ignore_ascii_case(candidate)) {
            out.push(candidate.to_string());
        }
    }

    for cap in QUOTED_RE.captures_iter(query) {
        let quoted = cap
            .get(1)
            .or_else(|| cap.get(2))
            .map(|m| m.as_str().trim())
            .unwrap_or("");
        if !quoted.is_empty() && !out.iter().any(|e| e.eq_ignore_ascii_case(quoted)) {
            out.push(quoted.to_string());
        }
    }

    out
}

/// Stop-word-filtered lowercase keywords, insertion order, deduped.
pub fn extract_keywords(lower: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in lower.split(|c: char| !c.is_alphanumeric()) {
        if raw.len() < 2 || QUERY_STOP_WORDS.contains(&raw) {
            continue;
        }
        if !out.iter().any(|k| k == raw) {
            out.push(raw.to_string());
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> ComplexityEstimator {
        ComplexityEstimator::new(5, 20, 2.0)
    }

    #[test]
    fn short_factual_query_is_simple() {
        let report = estimator().estimate("What is my name?");
        assert!(report.score < 0.4, "got {}", report.score);
        assert_eq!(report.query_type, QueryType::Factual);
        assert_eq!(report.keywords, vec!["name"]);
    }

    #[test]
    fn causal_comparative_query_is_harder() {
        let report = estimator().estimate(
            "Why do I prefer working from home compared to the office, given what I said yesterday?",
        );
        assert_eq!(report.query_type, QueryType::Causal);
        assert!(report.score > 0.3, "got {}", report.score);
        assert!(report.dynamic_k > 5, "got k={}", report.dynamic_k);
        assert!(report.dynamic_k <= 20);
    }

    #[test]
    fn dynamic_k_bounds_hold_across_complexities() {
        let est = estimator();
        for c in [0.0, 0.1, 0.3, 0.5, 0.7, 0.9, 1.0] {
            let k = est.dynamic_k(c);
            assert!((5..=20).contains(&k), "k={k} at complexity {c}");
        }
        assert_eq!(est.dynamic_k(0.0), 5);
        assert_eq!(est.dynamic_k(1.0), 15); // 5·(1+2) = 15, under the cap
    }

    #[test]
    fn dynamic_k_saturates_at_max() {
        let est = ComplexityEstimator::new(10, 20, 2.0);
        assert_eq!(est.dynamic_k(1.0), 20); // 10·3 = 30, clamped
    }

    #[test]
    fn fixed_k_pins_depth() {
        let est = ComplexityEstimator::new(5, 20, 0.0);
        assert_eq!(est.dynamic_k(0.0), 5);
        assert_eq!(est.dynamic_k(1.0), 5);
    }

    #[test]
    fn classify_temporal() {
        let report = estimator().estimate("When did I move to Lisbon?");
        assert_eq!(report.query_type, QueryType::Temporal);
    }

    #[test]
    fn classify_spatial() {
        let report = estimator().estimate("Where does Alice live?");
        // "where" is a medium question word; no temporal or causal markers.
        assert_eq!(report.query_type, QueryType::Spatial);
    }

    #[test]
    fn classify_comparison_without_causal_marker() {
        let report = estimator().estimate("What is the difference between tea and coffee?");
        assert_eq!(report.query_type, QueryType::Comparison);
    }

    #[test]
    fn classify_open_for_statements() {
        let report = estimator().estimate("summarize everything");
        assert_eq!(report.query_type, QueryType::Open);
    }

    #[test]
    fn entities_capture_proper_nouns_and_quotes() {
        let entities = extract_query_entities("Did Alice Johnson mention \"project omega\"?");
        assert!(entities.iter().any(|e| e == "Alice Johnson"));
        assert!(entities.iter().any(|e| e == "project omega"));
        // Sentence-lead "Did" is a stop word, not an entity.
        assert!(!entities.iter().any(|e| e == "Did"));
    }

    #[test]
    fn keywords_drop_stop_words_and_short_tokens() {
        let keywords = extract_keywords("what is my favorite tea in a mug");
        assert_eq!(keywords, vec!["favorite", "tea", "mug"]);
    }

    #[test]
    fn more_entities_raise_the_score() {
        let est = estimator();
        let low = est.estimate("do I like tea?");
        let high = est.estimate("Did Alice and Bob visit Paris with Carol Smith?");
        assert!(high.score > low.score);
    }
}
