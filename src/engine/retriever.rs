// ── omem Engine: Adaptive Retriever ─────────────────────────────────────────
//
// Hybrid retrieval pipeline:
//   1. complexity estimate → dynamic K, query type, keywords, entities
//   2. over-retrieve 3·K per signal (semantic ∪ lexical ∪ entity)
//   3. dedup by fact id, per-signal max merge
//   4. graph boost for entity-adjacent facts
//   5. weighted fusion + importance/recency/access boosts, clamp [0,1]
//   6. min-score filter, sort, top-K, token-budget truncation
//   7. fire-and-forget access bumps for the included facts
//
// Every signal may be absent (no embedder, no keywords, no graph); with
// all three empty the result is an empty fact list, not an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::atoms::config::EngineConfig;
use crate::atoms::error::MemoryResult;
use crate::atoms::types::{
    Fact, QueryType, RetrievalRequest, RetrievalResult, RetrievedFact,
};
use crate::engine::complexity::ComplexityEstimator;
use crate::engine::graph::EntityGraph;
use crate::engine::store::{parse_ts, FactStore};
use crate::engine::tokenizer::Tokenizer;
use crate::providers::Embedder;

/// Over-retrieval factor: each signal fetches this many × topK candidates.
const OVER_RETRIEVE_FACTOR: usize = 3;

/// Seed symbolic score for facts reached through a query entity.
const ENTITY_SEED_SCORE: f64 = 0.5;

/// Access boost saturates at this access count.
const ACCESS_SATURATION: f64 = 100.0;

#[derive(Default)]
struct Candidate {
    fact: Option<Fact>,
    semantic: f64,
    lexical: f64,
    symbolic: f64,
    graph: f64,
}

pub struct AdaptiveRetriever {
    store: Arc<FactStore>,
    graph: Option<Arc<EntityGraph>>,
    embedder: Option<Arc<dyn Embedder>>,
    estimator: ComplexityEstimator,
    tokenizer: Tokenizer,
    cfg: RetrieverConfig,
}

/// The retrieval-relevant slice of the engine configuration.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub min_score: f64,
    pub max_context_tokens: usize,
    pub semantic_weight: f64,
    pub lexical_weight: f64,
    pub symbolic_weight: f64,
    pub importance_weight: f64,
    pub recency_weight: f64,
    pub recency_half_life_hours: f64,
    pub access_frequency_weight: f64,
}

impl RetrieverConfig {
    pub fn from_engine(cfg: &EngineConfig) -> Self {
        RetrieverConfig {
            min_score: cfg.min_score,
            max_context_tokens: cfg.max_context_tokens,
            semantic_weight: cfg.semantic_weight,
            lexical_weight: cfg.lexical_weight,
            symbolic_weight: cfg.symbolic_weight,
            importance_weight: cfg.importance_weight,
            recency_weight: cfg.recency_weight,
            recency_half_life_hours: cfg.recency_half_life_hours,
            access_frequency_weight: cfg.access_frequency_weight,
        }
    }
}

impl AdaptiveRetriever {
    pub fn new(
        store: Arc<FactStore>,
        graph: Option<Arc<EntityGraph>>,
        embedder: Option<Arc<dyn Embedder>>,
        estimator: ComplexityEstimator,
        cfg: RetrieverConfig,
    ) -> Self {
        AdaptiveRetriever {
            store,
            graph,
            embedder,
            estimator,
            tokenizer: Tokenizer::heuristic(),
            cfg,
        }
    }

    /// Run one retrieval request end to end.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> MemoryResult<RetrievalResult> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(RetrievalResult::default());
        }

        // ── Complexity, depth, signals ───────────────────────────────
        let report = self.estimator.estimate(query);
        let top_k = request.top_k.unwrap_or(report.dynamic_k).max(1);
        let fetch_limit = top_k * OVER_RETRIEVE_FACTOR;
        let max_tokens = if request.max_tokens == 0 {
            self.cfg.max_context_tokens
        } else {
            request.max_tokens
        };
        let min_score = request.min_score.unwrap_or(self.cfg.min_score);
        let now = request.current_time.unwrap_or_else(Utc::now);

        let mut candidates: HashMap<i64, Candidate> = HashMap::new();

        // ── Semantic ─────────────────────────────────────────────────
        if let Some(embedder) = &self.embedder {
            match embedder.embed(query).await {
                Ok(query_vec) => match self.store.semantic_search(&query_vec, fetch_limit) {
                    Ok(hits) => {
                        for hit in hits {
                            let entry = candidates.entry(hit.fact.id).or_default();
                            entry.semantic = entry.semantic.max(hit.score);
                            entry.fact.get_or_insert(hit.fact);
                        }
                    }
                    Err(e) => warn!("[retriever] Semantic search failed: {e}"),
                },
                Err(e) => warn!("[retriever] Query embedding failed, skipping semantic: {e}"),
            }
        }

        // ── Lexical ──────────────────────────────────────────────────
        if !report.keywords.is_empty() {
            let joined = report.keywords.join(" ");
            match self.store.fts_search(&joined, fetch_limit) {
                Ok(hits) => {
                    // BM25 scores are unbounded; min-max normalize within
                    // the result set so fusion weights stay meaningful.
                    // Scores already in [0,1] (the simple scorer, mostly)
                    // pass through untouched.
                    let max = hits.iter().map(|h| h.score).fold(f64::MIN, f64::max);
                    let min = hits.iter().map(|h| h.score).fold(f64::MAX, f64::min);
                    let range = max - min;
                    for hit in hits {
                        let normalized = if max <= 1.0 && min >= 0.0 {
                            hit.score
                        } else if range.abs() < 1e-12 {
                            1.0
                        } else {
                            (hit.score - min) / range
                        };
                        let entry = candidates.entry(hit.fact.id).or_default();
                        entry.lexical = entry.lexical.max(normalized);
                        entry.fact.get_or_insert(hit.fact);
                    }
                }
                Err(e) => warn!("[retriever] Lexical search failed: {e}"),
            }
        }

        // ── Entity ───────────────────────────────────────────────────
        if let Some(graph) = &self.graph {
            if !report.entities.is_empty() {
                match graph.get_facts_for_entities(&report.entities) {
                    Ok(fact_ids) => {
                        match self.store.get_facts_by_ids(&fact_ids) {
                            Ok(facts) => {
                                for fact in facts {
                                    let entry = candidates.entry(fact.id).or_default();
                                    entry.symbolic = entry.symbolic.max(ENTITY_SEED_SCORE);
                                    entry.fact.get_or_insert(fact);
                                }
                            }
                            Err(e) => warn!("[retriever] Entity fact fetch failed: {e}"),
                        }
                    }
                    Err(e) => warn!("[retriever] Entity lookup failed: {e}"),
                }
            }
        }

        let total_candidates = candidates.len();
        if total_candidates == 0 {
            return Ok(RetrievalResult {
                complexity: report.score,
                query_type: report.query_type,
                strategy: strategy_string(report.query_type, report.score, top_k),
                ..Default::default()
            });
        }

        // ── Graph boost ──────────────────────────────────────────────
        if let Some(graph) = &self.graph {
            if !report.entities.is_empty() {
                let ids: Vec<i64> = candidates.keys().copied().collect();
                match graph.score_by_graph(&report.entities, &ids) {
                    Ok(boosts) => {
                        for (fid, boost) in boosts {
                            if let Some(entry) = candidates.get_mut(&fid) {
                                entry.graph += boost;
                            }
                        }
                    }
                    Err(e) => warn!("[retriever] Graph scoring failed: {e}"),
                }
            }
        }

        // ── Final scoring ────────────────────────────────────────────
        let mut scored: Vec<RetrievedFact> = candidates
            .into_values()
            .filter_map(|c| {
                let fact = c.fact?;
                let multi_view = self.cfg.semantic_weight * c.semantic
                    + self.cfg.lexical_weight * c.lexical
                    + self.cfg.symbolic_weight * c.symbolic;
                let importance_boost = fact.importance as f64 * self.cfg.importance_weight;
                let recency_boost = recency_score(fact.last_accessed.as_deref(), now, self.cfg.recency_half_life_hours)
                    * self.cfg.recency_weight;
                let access_boost = ((fact.access_count as f64).ln_1p()
                    / ACCESS_SATURATION.ln_1p())
                .min(1.0)
                    * self.cfg.access_frequency_weight;

                let score = (multi_view + c.graph + importance_boost + recency_boost + access_boost)
                    .clamp(0.0, 1.0);

                let token_cost = self.tokenizer.count_tokens(&fact.atomic_text);
                Some(RetrievedFact {
                    fact,
                    score,
                    semantic_score: c.semantic,
                    lexical_score: c.lexical,
                    symbolic_score: c.symbolic,
                    graph_score: c.graph,
                    token_cost,
                })
            })
            .filter(|r| r.score >= min_score)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.fact.id.cmp(&b.fact.id))
        });
        scored.truncate(top_k);

        // ── Token budget ─────────────────────────────────────────────
        // Include facts in rank order while the cumulative estimate fits;
        // stop at the first fact that would exceed the budget.
        let selected = scored.len();
        let mut included: Vec<RetrievedFact> = Vec::with_capacity(selected);
        let mut total_tokens = 0usize;
        for fact in scored {
            if total_tokens + fact.token_cost > max_tokens {
                break;
            }
            total_tokens += fact.token_cost;
            included.push(fact);
        }
        let truncated_count = selected - included.len();

        // ── Fire-and-forget access bumps ─────────────────────────────
        let ids: Vec<i64> = included.iter().map(|r| r.fact.id).collect();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            for id in ids {
                if let Err(e) = store.update_access(id) {
                    debug!("[retriever] Access bump failed for fact {id}: {e}");
                }
            }
        });

        debug!(
            "[retriever] {} candidates → {} included ({} truncated, {} tokens)",
            total_candidates,
            included.len(),
            truncated_count,
            total_tokens
        );

        Ok(RetrievalResult {
            facts: included,
            complexity: report.score,
            query_type: report.query_type,
            total_candidates,
            truncated_count,
            total_tokens,
            strategy: strategy_string(report.query_type, report.score, top_k),
        })
    }
}

/// `type:<qt>,complexity:{low|medium|high},k:<n>` with
/// low ≤ 0.3 < medium ≤ 0.6 < high.
fn strategy_string(query_type: QueryType, complexity: f64, k: usize) -> String {
    let band = if complexity <= 0.3 {
        "low"
    } else if complexity <= 0.6 {
        "medium"
    } else {
        "high"
    };
    format!("type:{},complexity:{},k:{}", query_type.as_str(), band, k)
}

/// Half-life decay over hours since last access; 0 when never accessed.
fn recency_score(last_accessed: Option<&str>, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    let Some(ts) = last_accessed.and_then(parse_ts) else {
        return 0.0;
    };
    let hours = (now - ts).num_minutes() as f64 / 60.0;
    if hours <= 0.0 {
        return 1.0;
    }
    (-(std::f64::consts::LN_2) * hours / half_life_hours).exp()
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::config::EngineConfig;
    use crate::atoms::types::Fact;
    use crate::providers::testing::HashEmbedder;

    fn build(
        cfg: &EngineConfig,
        store: Arc<FactStore>,
        with_embedder: bool,
        with_graph: bool,
    ) -> AdaptiveRetriever {
        let graph = with_graph.then(|| {
            Arc::new(EntityGraph::new(
                Arc::clone(&store),
                cfg.max_hops,
                cfg.graph_boost_weight,
                cfg.entity_resolution,
                cfg.similarity_threshold,
            ))
        });
        let embedder: Option<Arc<dyn Embedder>> = with_embedder
            .then(|| Arc::new(HashEmbedder::new(cfg.embedding_dim)) as Arc<dyn Embedder>);
        AdaptiveRetriever::new(
            store,
            graph,
            embedder,
            ComplexityEstimator::new(cfg.default_top_k, cfg.max_top_k, cfg.complexity_delta),
            RetrieverConfig::from_engine(cfg),
        )
    }

    fn config() -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.validate().unwrap();
        cfg
    }

    #[tokio::test]
    async fn empty_query_is_empty_result() {
        let cfg = config();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        let retriever = build(&cfg, store, true, true);

        let result = retriever
            .retrieve(&RetrievalRequest::new("   ", 512))
            .await
            .unwrap();
        assert!(result.facts.is_empty());
        assert_eq!(result.total_candidates, 0);
    }

    #[tokio::test]
    async fn lexical_only_retrieval_works_without_embedder() {
        let cfg = config();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        let mut fact = Fact::new("I adopted a golden retriever");
        fact.keywords = vec!["adopt".into(), "golden".into(), "retriever".into()];
        store.insert_fact(&fact).unwrap();

        let retriever = build(&cfg, store, false, false);
        let mut request = RetrievalRequest::new("tell me about the golden retriever", 512);
        request.min_score = Some(0.0);
        let result = retriever.retrieve(&request).await.unwrap();
        assert_eq!(result.facts.len(), 1);
        assert!(result.facts[0].lexical_score > 0.0);
        assert_eq!(result.facts[0].semantic_score, 0.0);
    }

    #[tokio::test]
    async fn min_score_filter_can_empty_the_result() {
        let cfg = config();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        let mut fact = Fact::new("I adopted a golden retriever");
        fact.keywords = vec!["golden".into(), "retriever".into()];
        store.insert_fact(&fact).unwrap();

        let retriever = build(&cfg, store, false, false);
        let mut request = RetrievalRequest::new("golden retriever", 512);
        request.min_score = Some(0.99);
        let result = retriever.retrieve(&request).await.unwrap();
        assert!(result.facts.is_empty());
        assert!(result.total_candidates > 0);
    }

    #[tokio::test]
    async fn token_budget_truncates_in_rank_order() {
        let mut cfg = config();
        cfg.enable_fts = false;
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        // 20 facts of 400 chars ≈ 100 tokens each; all match "marathon".
        for i in 0..20 {
            let body = format!("marathon note {i:02} {}", "x".repeat(400));
            let mut fact = Fact::new(&body[..400]);
            fact.keywords = vec!["marathon".into()];
            store.insert_fact(&fact).unwrap();
        }

        let retriever = build(&cfg, store, false, false);
        let mut request = RetrievalRequest::new("marathon", 250);
        request.min_score = Some(0.0);
        request.top_k = Some(20);
        let result = retriever.retrieve(&request).await.unwrap();

        assert_eq!(result.facts.len(), 2, "two 100-token facts fit in 250");
        assert_eq!(result.truncated_count, 18);
        assert!(result.total_tokens <= 250);
    }

    #[tokio::test]
    async fn zero_max_tokens_uses_config_default() {
        let cfg = config();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        let mut fact = Fact::new("short fact about tea");
        fact.keywords = vec!["tea".into()];
        store.insert_fact(&fact).unwrap();

        let retriever = build(&cfg, store, false, false);
        let mut request = RetrievalRequest::new("tea", 0);
        request.min_score = Some(0.0);
        let result = retriever.retrieve(&request).await.unwrap();
        assert_eq!(result.facts.len(), 1);
        assert!(result.total_tokens <= cfg.max_context_tokens);
    }

    #[tokio::test]
    async fn top_k_override_caps_results() {
        let cfg = config();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        for i in 0..10 {
            let mut fact = Fact::new(format!("tea note {i}"));
            fact.keywords = vec!["tea".into()];
            store.insert_fact(&fact).unwrap();
        }

        let retriever = build(&cfg, store, false, false);
        let mut request = RetrievalRequest::new("tea", 4096);
        request.min_score = Some(0.0);
        request.top_k = Some(3);
        let result = retriever.retrieve(&request).await.unwrap();
        assert_eq!(result.facts.len(), 3);
    }

    #[tokio::test]
    async fn graph_boost_raises_entity_adjacent_facts() {
        let cfg = config();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        let graph = Arc::new(EntityGraph::new(
            Arc::clone(&store),
            cfg.max_hops,
            cfg.graph_boost_weight,
            cfg.entity_resolution,
            cfg.similarity_threshold,
        ));

        let mut f1 = Fact::new("Alice works at Google");
        f1.keywords = vec!["alice".into(), "work".into(), "google".into()];
        let id1 = store.insert_fact(&f1).unwrap();
        let mut f2 = Fact::new("Google is in Mountain View");
        f2.keywords = vec!["google".into(), "mountain".into(), "view".into()];
        let id2 = store.insert_fact(&f2).unwrap();

        use crate::atoms::types::EntityType;
        graph.upsert_entity("Google", EntityType::Organization, Some(id1)).unwrap();
        graph.upsert_entity("Google", EntityType::Organization, Some(id2)).unwrap();

        let retriever = AdaptiveRetriever::new(
            Arc::clone(&store),
            Some(graph),
            None,
            ComplexityEstimator::new(cfg.default_top_k, cfg.max_top_k, cfg.complexity_delta),
            RetrieverConfig::from_engine(&cfg),
        );

        let mut request = RetrievalRequest::new("What do I know about Google?", 512);
        request.min_score = Some(0.0);
        let result = retriever.retrieve(&request).await.unwrap();

        assert_eq!(result.facts.len(), 2);
        for fact in &result.facts {
            assert!(fact.graph_score > 0.0, "fact {} missing boost", fact.fact.id);
        }
    }

    #[tokio::test]
    async fn score_monotone_in_importance() {
        let cfg = config();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        let mut low = Fact::new("tea fact plain");
        low.keywords = vec!["tea".into()];
        low.importance = 0.1;
        let mut high = Fact::new("tea fact plain");
        high.keywords = vec!["tea".into()];
        high.importance = 0.9;
        store.insert_fact(&low).unwrap();
        store.insert_fact(&high).unwrap();

        let retriever = build(&cfg, store, false, false);
        let mut request = RetrievalRequest::new("tea", 4096);
        request.min_score = Some(0.0);
        let result = retriever.retrieve(&request).await.unwrap();

        let low_score = result.facts.iter().find(|f| f.fact.importance < 0.5).unwrap().score;
        let high_score = result.facts.iter().find(|f| f.fact.importance > 0.5).unwrap().score;
        assert!(high_score > low_score);
    }

    #[tokio::test]
    async fn strategy_string_format() {
        let cfg = config();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        let retriever = build(&cfg, store, false, false);
        let result = retriever
            .retrieve(&RetrievalRequest::new("what is my name?", 512))
            .await
            .unwrap();
        assert!(result.strategy.starts_with("type:factual,complexity:low,k:"));
    }

    #[test]
    fn recency_decays_by_half_life() {
        let now = Utc::now();
        let twelve_hours_ago = (now - chrono::Duration::hours(12))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
        let score = recency_score(Some(&twelve_hours_ago), now, 12.0);
        assert!((score - 0.5).abs() < 0.01);
        assert_eq!(recency_score(None, now, 12.0), 0.0);
    }
}
