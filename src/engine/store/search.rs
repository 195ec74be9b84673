// ── FactStore: Search Primitives ────────────────────────────────────────────
//
// Semantic search is a linear scan over a sliding candidate window of the
// most recent embedded facts — a cost cap, not a correctness constraint.
// Lexical search uses the FTS5/BM25 index when available and otherwise a
// simple case-insensitive substring scorer.

use super::facts::{fact_from_row, FACT_COLUMNS};
use super::vector::{normalize, normalized_query_similarity};
use super::FactStore;
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::ScoredFact;
use log::warn;
use rusqlite::params;

/// Semantic search scans at most this many of the most recent embedded,
/// non-obsolete facts. Raising it trades latency for recall.
pub const SEMANTIC_CANDIDATE_WINDOW: usize = 100;

impl FactStore {
    /// Dense-vector search.
    ///
    /// The query vector is L2-normalized once; each candidate is scored
    /// `dot(q̂, d) / ‖d‖` (cosine similarity). Returns the top `limit`
    /// candidates, best first.
    pub fn semantic_search(&self, query_vec: &[f32], limit: usize) -> MemoryResult<Vec<ScoredFact>> {
        if query_vec.is_empty() {
            return Err(MemoryError::invalid("query embedding must not be empty"));
        }
        let mut query = query_vec.to_vec();
        normalize(&mut query);

        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {FACT_COLUMNS} FROM omem_facts \
             WHERE is_obsolete = 0 AND embedding IS NOT NULL \
             ORDER BY created_at DESC, id DESC LIMIT {SEMANTIC_CANDIDATE_WINDOW}"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut scored: Vec<ScoredFact> = stmt
            .query_map([], fact_from_row)?
            .filter_map(|r| r.ok())
            .filter_map(|fact| {
                let score = fact
                    .embedding
                    .as_ref()
                    .map(|emb| normalized_query_similarity(&query, emb));
                score.map(|score| ScoredFact { score, fact })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Lexical search over (keywords, atomic_text).
    ///
    /// BM25 via the FTS5 index when it was created; the simple scorer
    /// otherwise (and as a safety net when the FTS query itself fails).
    pub fn fts_search(&self, query: &str, limit: usize) -> MemoryResult<Vec<ScoredFact>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        if self.fts_enabled {
            match self.bm25_search(query, limit) {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    warn!("[store] BM25 search failed, using lexical fallback: {e}");
                }
            }
        }
        self.lexical_search(query, limit)
    }

    /// BM25 ranking via FTS5. `rank` is negative (lower = better); scores
    /// are exported as `-rank`.
    fn bm25_search(&self, query: &str, limit: usize) -> MemoryResult<Vec<ScoredFact>> {
        let match_query = build_match_query(query);
        if match_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {cols}, fts.rank
             FROM omem_facts f
             JOIN omem_facts_fts fts ON f.id = fts.fact_id
             WHERE fts MATCH ?1 AND f.is_obsolete = 0
             ORDER BY fts.rank
             LIMIT ?2",
            cols = FACT_COLUMNS
                .split(", ")
                .map(|c| format!("f.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![match_query, limit as i64], |row| {
                let fact = fact_from_row(row)?;
                let rank: f64 = row.get(17)?;
                Ok(ScoredFact { fact, score: -rank })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Simple lexical scorer: split the query on whitespace into lowercase
    /// words; a candidate matches when at least one word appears
    /// (case-insensitive substring) in its atomic text or keywords.
    /// Score = (1.0 per atomic-text hit + 0.5 per keyword hit) / |words|.
    /// Ties break by importance desc, then created_at desc.
    fn lexical_search(&self, query: &str, limit: usize) -> MemoryResult<Vec<ScoredFact>> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let sql = format!("SELECT {FACT_COLUMNS} FROM omem_facts WHERE is_obsolete = 0");
        let mut stmt = conn.prepare(&sql)?;
        let mut scored: Vec<ScoredFact> = stmt
            .query_map([], fact_from_row)?
            .filter_map(|r| r.ok())
            .filter_map(|fact| {
                let atomic = fact.atomic_text.to_lowercase();
                let keywords = fact.keywords.join(" ").to_lowercase();
                let mut hits = 0.0f64;
                for word in &words {
                    if atomic.contains(word.as_str()) {
                        hits += 1.0;
                    }
                    if keywords.contains(word.as_str()) {
                        hits += 0.5;
                    }
                }
                if hits > 0.0 {
                    Some(ScoredFact {
                        score: hits / words.len() as f64,
                        fact,
                    })
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.fact
                        .importance
                        .partial_cmp(&a.fact.importance)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(b.fact.created_at.cmp(&a.fact.created_at))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Build a safe FTS5 MATCH expression: alphanumeric words OR-ed together.
/// Raw user text may contain `?`, quotes, or operators that FTS5 rejects.
fn build_match_query(query: &str) -> String {
    let words: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w.to_lowercase()))
        .collect();
    words.join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::super::testing::{store, store_no_fts};
    use super::*;
    use crate::atoms::types::Fact;

    fn embedded_fact(text: &str, embedding: Vec<f32>) -> Fact {
        let mut f = Fact::new(text);
        f.embedding = Some(embedding);
        f
    }

    #[test]
    fn semantic_search_rejects_empty_query() {
        let s = store();
        assert!(s.semantic_search(&[], 5).is_err());
    }

    #[test]
    fn semantic_search_ranks_by_cosine() {
        let s = store();
        s.insert_fact(&embedded_fact("aligned", vec![1.0, 0.0, 0.0]))
            .unwrap();
        s.insert_fact(&embedded_fact("orthogonal", vec![0.0, 1.0, 0.0]))
            .unwrap();
        s.insert_fact(&embedded_fact("diagonal", vec![1.0, 1.0, 0.0]))
            .unwrap();

        let hits = s.semantic_search(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].fact.text, "aligned");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits.last().unwrap().fact.text, "orthogonal");
    }

    #[test]
    fn semantic_search_skips_obsolete_and_unembedded() {
        let s = store();
        let id = s
            .insert_fact(&embedded_fact("obsolete", vec![1.0, 0.0]))
            .unwrap();
        s.mark_obsolete(id, None).unwrap();
        s.insert_fact(&Fact::new("no embedding")).unwrap();
        s.insert_fact(&embedded_fact("live", vec![1.0, 0.0])).unwrap();

        let hits = s.semantic_search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fact.text, "live");
    }

    #[test]
    fn semantic_score_is_doc_norm_scaled_dot() {
        // Unit query q, doc d: score must equal dot(q, d) / ||d|| within 1e-6.
        let s = store();
        s.insert_fact(&embedded_fact("doc", vec![3.0, 4.0])).unwrap();
        let hits = s.semantic_search(&[1.0, 0.0], 1).unwrap();
        // dot([1,0],[3,4]) / ||[3,4]|| = 3/5
        assert!((hits[0].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn bm25_search_finds_keyword_matches() {
        let s = store();
        let mut f = Fact::new("I adopted a golden retriever named Biscuit");
        f.keywords = vec!["golden".into(), "retriever".into(), "biscuit".into()];
        s.insert_fact(&f).unwrap();
        let mut other = Fact::new("The weather in Lisbon is sunny");
        other.keywords = vec!["weather".into(), "lisbon".into(), "sunny".into()];
        s.insert_fact(&other).unwrap();

        let hits = s.fts_search("retriever", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].fact.text.contains("Biscuit"));
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn bm25_excludes_obsolete() {
        let s = store();
        let mut f = Fact::new("unique zanzibar detail");
        f.keywords = vec!["zanzibar".into()];
        let id = s.insert_fact(&f).unwrap();
        s.mark_obsolete(id, None).unwrap();
        let hits = s.fts_search("zanzibar", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn bm25_tolerates_operator_characters() {
        let s = store();
        s.insert_fact(&Fact::new("what is my name")).unwrap();
        // Raw '?' would be an FTS5 syntax error without sanitization.
        let hits = s.fts_search("name?", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn lexical_fallback_scores_hits_over_query_words() {
        let s = store_no_fts();
        let mut f = Fact::new("Alice enjoys hiking in the mountains");
        f.keywords = vec!["alice".into(), "hike".into(), "mountain".into()];
        s.insert_fact(&f).unwrap();

        // Two query words; "alice" hits atomic (1.0) + keywords (0.5),
        // "skiing" hits nothing → (1.0 + 0.5) / 2 = 0.75.
        let hits = s.fts_search("alice skiing", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn lexical_fallback_breaks_ties_by_importance() {
        let s = store_no_fts();
        let mut low = Fact::new("tea is fine");
        low.importance = 0.2;
        let mut high = Fact::new("tea is essential");
        high.importance = 0.9;
        s.insert_fact(&low).unwrap();
        s.insert_fact(&high).unwrap();

        let hits = s.fts_search("tea", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].fact.text, "tea is essential");
    }

    #[test]
    fn empty_query_returns_empty() {
        let s = store();
        assert!(s.fts_search("   ", 10).unwrap().is_empty());
    }

    #[test]
    fn build_match_query_sanitizes() {
        assert_eq!(build_match_query("What's my name?"), "\"what\" OR \"s\" OR \"my\" OR \"name\"");
        assert_eq!(build_match_query("???"), "");
    }
}
