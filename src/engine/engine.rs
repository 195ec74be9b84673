// ── omem Engine: Orchestrator ───────────────────────────────────────────────
//
// Wires the components together and owns the two end-to-end paths:
//
//   write  ProcessConversation: turns → encoder → per-fact multi-view
//          index → store insert → graph upserts → episode bookkeeping →
//          summary dirty marks. Partial failures degrade, never abort the
//          whole call.
//
//   read   GetContextForPrompt: adaptive retrieval + optional external RAG
//          + rolling summary, formatted into one prompt-ready block.
//
// `initialize` is idempotent; `close` stops the summary worker, drains the
// pool under its deadline, and releases the store.

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::atoms::config::EngineConfig;
use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::types::{
    ContextResult, EngineStats, EntityRef, Episode, Fact, FactCategory, ProcessingResult,
    RetrievalRequest, RollingSummary, Turn,
};
use crate::engine::complexity::ComplexityEstimator;
use crate::engine::encoder::AtomicEncoder;
use crate::engine::episodes::EpisodeManager;
use crate::engine::graph::{self, EntityGraph};
use crate::engine::indexer::MultiViewIndexer;
use crate::engine::pool::WorkerPool;
use crate::engine::retriever::{AdaptiveRetriever, RetrieverConfig};
use crate::engine::store::FactStore;
use crate::engine::summary::RollingSummaryManager;
use crate::engine::tokenizer::Tokenizer;
use crate::providers::{Embedder, ExternalRetriever, Generator};

/// External documents fetched per read-path call.
const EXTERNAL_TOP_K: usize = 5;

#[derive(Clone)]
struct Components {
    store: Arc<FactStore>,
    encoder: Option<Arc<AtomicEncoder>>,
    indexer: Arc<MultiViewIndexer>,
    graph: Option<Arc<EntityGraph>>,
    retriever: Arc<AdaptiveRetriever>,
    summary: Option<Arc<RollingSummaryManager>>,
    episodes: Option<Arc<EpisodeManager>>,
    pool: Arc<WorkerPool>,
    embedder: Option<Arc<dyn Embedder>>,
}

pub struct Engine {
    cfg: EngineConfig,
    components: RwLock<Option<Components>>,
    external: Mutex<Option<Arc<dyn ExternalRetriever>>>,
    tokenizer: Tokenizer,
}

impl Engine {
    /// Validate the configuration and build an unwired engine.
    pub fn new(mut cfg: EngineConfig) -> MemoryResult<Self> {
        cfg.validate()?;
        Ok(Engine {
            cfg,
            components: RwLock::new(None),
            external: Mutex::new(None),
            tokenizer: Tokenizer::heuristic(),
        })
    }

    /// Wire all components. Idempotent — a second call is a no-op.
    /// Both providers are optional; every path degrades without them.
    pub async fn initialize(
        &self,
        generator: Option<Arc<dyn Generator>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> MemoryResult<()> {
        if self.components.read().is_some() {
            return Ok(());
        }

        if let Some(embedder) = &embedder {
            if embedder.dimension() != self.cfg.embedding_dim {
                return Err(MemoryError::Config(format!(
                    "embedder dimension {} does not match configured {}",
                    embedder.dimension(),
                    self.cfg.embedding_dim
                )));
            }
        }

        let store = Arc::new(FactStore::open(&self.cfg)?);

        let encoder = self.cfg.enable_atomic_encoder.then(|| {
            Arc::new(AtomicEncoder::new(
                generator.clone(),
                self.cfg.max_facts_per_turn,
                self.cfg.min_fact_importance,
            ))
        });

        let indexer = Arc::new(MultiViewIndexer::new(
            embedder.clone(),
            self.cfg.max_keywords_per_fact,
        ));

        let graph = self.cfg.enable_graph.then(|| {
            Arc::new(EntityGraph::new(
                Arc::clone(&store),
                self.cfg.max_hops,
                self.cfg.graph_boost_weight,
                self.cfg.entity_resolution,
                self.cfg.similarity_threshold,
            ))
        });

        let retriever = Arc::new(AdaptiveRetriever::new(
            Arc::clone(&store),
            graph.clone(),
            embedder.clone(),
            ComplexityEstimator::new(
                self.cfg.default_top_k,
                self.cfg.max_top_k,
                self.cfg.complexity_delta,
            ),
            RetrieverConfig::from_engine(&self.cfg),
        ));

        let summary = if self.cfg.summary_enabled {
            let manager = Arc::new(RollingSummaryManager::new(
                Arc::clone(&store),
                generator.clone(),
                self.cfg.min_new_facts_for_update,
                self.cfg.incremental_update,
                self.cfg.summary_max_facts,
            )?);
            if self.cfg.summary_async {
                manager.start_worker(self.cfg.summary_refresh_interval_secs);
            }
            Some(manager)
        } else {
            None
        };

        let episodes = self.cfg.enable_episodes.then(|| {
            Arc::new(EpisodeManager::new(
                Arc::clone(&store),
                generator,
                self.cfg.session_timeout_secs,
                self.cfg.max_episodes_in_cache,
                self.cfg.track_entity_mentions,
                self.cfg.summary_on_close,
            ))
        });

        let pool = Arc::new(WorkerPool::new(
            self.cfg.worker_pool_size,
            self.cfg.worker_queue_size,
        ));

        *self.components.write() = Some(Components {
            store,
            encoder,
            indexer,
            graph,
            retriever,
            summary,
            episodes,
            pool,
            embedder,
        });

        info!("[engine] Initialized at {}", self.cfg.db_path);
        Ok(())
    }

    fn components(&self) -> MemoryResult<Components> {
        self.components
            .read()
            .clone()
            .ok_or(MemoryError::NotInitialized)
    }

    // ════════════════════════════════════════════════════════════════════
    // Write path
    // ════════════════════════════════════════════════════════════════════

    /// Ingest a batch of conversation turns.
    pub async fn process_conversation(&self, turns: &[Turn]) -> MemoryResult<ProcessingResult> {
        let c = self.components()?;

        // Single-turn inputs use the raw content directly — prefixing the
        // role would pollute the query-side embedding match.
        let single_turn = turns.len() == 1;
        let input = if single_turn {
            turns[0].content.trim().to_string()
        } else {
            turns
                .iter()
                .map(|t| format!("{}: {}", t.role, t.content))
                .collect::<Vec<_>>()
                .join("\n")
        };
        if input.trim().is_empty() {
            return Err(MemoryError::invalid("conversation is empty"));
        }

        let now = Utc::now();
        let turn_id = Uuid::new_v4().to_string();
        let mut result = ProcessingResult::default();

        // ── Encode ───────────────────────────────────────────────────
        let encoded = match &c.encoder {
            Some(encoder) => encoder.encode(&input, now).await,
            None => crate::atoms::types::EncodedTurn::passthrough(&input),
        };
        let atomic_text = if encoded.atomic_text.is_empty() {
            input.clone()
        } else {
            encoded.atomic_text.clone()
        };

        // ── Episode (id first, so fact rows carry it) ────────────────
        let episode_id = match &c.episodes {
            Some(episodes) => match episodes.ensure_current().await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("[engine] Episode rotation failed: {e}");
                    None
                }
            },
            None => None,
        };
        result.episode_id = episode_id;

        // ── Facts to store ───────────────────────────────────────────
        // No extraction (or a failed one) falls back to one synthetic fact
        // carrying the atomic text; the importance threshold does not
        // apply to it.
        let synthetic = encoded.facts.is_empty();
        let planned: Vec<(String, String, FactCategory, f32)> = if synthetic {
            vec![(input.clone(), atomic_text.clone(), FactCategory::Other, 0.5)]
        } else {
            encoded
                .facts
                .iter()
                .map(|f| (f.text.clone(), f.text.clone(), f.category, f.importance))
                .collect()
        };

        let mut entity_names: Vec<String> = Vec::new();
        for (text, atomic, category, importance) in planned {
            // The dense view of the synthetic single-turn fact embeds the
            // raw user content; extracted facts embed their own text.
            let embed_override = (synthetic && single_turn).then(|| turns[0].content.as_str());
            let views = c.indexer.index(&atomic, embed_override).await;

            let mut entities: Vec<EntityRef> = Vec::new();
            for discovered in MultiViewIndexer::discovered_entities(&views) {
                if !entities.iter().any(|e| e.name.eq_ignore_ascii_case(&discovered.name)) {
                    entities.push(EntityRef {
                        name: discovered.name,
                        kind: discovered.kind,
                    });
                }
            }
            for discovered in &encoded.entities {
                if !entities.iter().any(|e| e.name.eq_ignore_ascii_case(&discovered.name)) {
                    entities.push(EntityRef {
                        name: discovered.name.clone(),
                        kind: discovered.kind,
                    });
                }
            }

            let timestamp_anchor = views
                .symbolic
                .timestamp_anchor
                .clone()
                .or_else(|| AtomicEncoder::anchor_for(&atomic, now));
            let location = views.symbolic.locations.first().cloned();

            let fact = Fact {
                id: 0,
                text,
                atomic_text: atomic.clone(),
                category,
                importance,
                embedding: views.embedding,
                keywords: views.keywords,
                timestamp_anchor,
                location,
                entities: entities.clone(),
                episode_id,
                turn_id: turn_id.clone(),
                created_at: String::new(),
                last_accessed: None,
                access_count: 0,
                is_obsolete: false,
                superseded_by: None,
            };

            let fact_id = match c.store.insert_fact(&fact) {
                Ok(id) => id,
                Err(e) => {
                    warn!("[engine] Fact insert failed, continuing: {e}");
                    result.errors.push(e.to_string());
                    continue;
                }
            };
            result.fact_ids.push(fact_id);

            // ── Graph upserts ────────────────────────────────────────
            if let Some(graph) = &c.graph {
                for entity in &entities {
                    match graph.upsert_entity(&entity.name, entity.kind, Some(fact_id)) {
                        Ok(_) => result.entities_upserted += 1,
                        Err(e) => warn!("[engine] Entity upsert failed: {e}"),
                    }
                    if !entity_names.iter().any(|n| n.eq_ignore_ascii_case(&entity.name)) {
                        entity_names.push(entity.name.clone());
                    }
                }
                for relation in graph::extract_relations(&atomic) {
                    match graph.add_relation(&relation, Some(fact_id)) {
                        Ok(_) => result.relations_added += 1,
                        Err(e) => warn!("[engine] Relation insert failed: {e}"),
                    }
                }
            } else {
                for entity in &entities {
                    if !entity_names.iter().any(|n| n.eq_ignore_ascii_case(&entity.name)) {
                        entity_names.push(entity.name.clone());
                    }
                }
            }
        }

        // ── Generator-proposed relations ─────────────────────────────
        // REL lines from the extraction reply, anchored to the first fact
        // stored this turn. The store dedups against regex-extracted rows.
        if let Some(graph) = &c.graph {
            let anchor_fact = result.fact_ids.first().copied();
            for relation in &encoded.relations {
                match graph.add_relation(relation, anchor_fact) {
                    Ok(_) => result.relations_added += 1,
                    Err(e) => warn!("[engine] Proposed relation insert failed: {e}"),
                }
            }
        }

        // ── Episode + summary bookkeeping ────────────────────────────
        if let Some(episodes) = &c.episodes {
            if let Err(e) = episodes
                .on_turn_processed(result.fact_ids.len(), &entity_names)
                .await
            {
                warn!("[engine] Episode bookkeeping failed: {e}");
            }
        }
        if let Some(summary) = &c.summary {
            if let Err(e) = summary.mark_dirty(&result.fact_ids) {
                warn!("[engine] Summary dirty mark failed: {e}");
            }
        }

        info!(
            "[engine] Processed {} turns → {} facts, {} entities, {} relations",
            turns.len(),
            result.fact_ids.len(),
            result.entities_upserted,
            result.relations_added
        );
        Ok(result)
    }

    /// Single-text convenience wrapper around the write path.
    pub async fn process_text(&self, text: &str) -> MemoryResult<ProcessingResult> {
        self.process_conversation(&[Turn::user(text)]).await
    }

    /// Queue a write on the worker pool. Returns whether it was accepted;
    /// a full queue yields `false`, not an error.
    pub fn process_conversation_async(self: &Arc<Self>, turns: Vec<Turn>) -> MemoryResult<bool> {
        let c = self.components()?;
        let engine = Arc::clone(self);
        Ok(c.pool.submit(async move {
            if let Err(e) = engine.process_conversation(&turns).await {
                warn!("[engine] Async write failed: {e}");
            }
        }))
    }

    // ════════════════════════════════════════════════════════════════════
    // Read path
    // ════════════════════════════════════════════════════════════════════

    /// Assemble a token-budgeted context block for a prompt.
    pub async fn get_context_for_prompt(
        &self,
        prompt: &str,
        max_tokens: usize,
    ) -> MemoryResult<ContextResult> {
        let c = self.components()?;

        let retrieval = c
            .retriever
            .retrieve(&RetrievalRequest::new(prompt, max_tokens))
            .await?;

        let external_docs = {
            let retriever = self.external.lock().clone();
            match retriever {
                Some(external) => match external.retrieve(prompt, EXTERNAL_TOP_K).await {
                    Ok(docs) => docs,
                    Err(e) => {
                        warn!("[engine] External retrieval failed: {e}");
                        Vec::new()
                    }
                },
                None => Vec::new(),
            }
        };

        let summary = match &c.summary {
            Some(manager) => manager.current(),
            None => c.store.get_rolling_summary()?.summary,
        };

        let mut sections: Vec<String> = Vec::new();
        if !summary.is_empty() {
            sections.push(format!("User Summary:\n{summary}"));
        }
        if !external_docs.is_empty() {
            let bullets: Vec<String> = external_docs
                .iter()
                .map(|d| format!("- {}", d.content))
                .collect();
            sections.push(format!("Knowledge Base:\n{}", bullets.join("\n")));
        }
        if !retrieval.facts.is_empty() {
            let bullets: Vec<String> = retrieval
                .facts
                .iter()
                .map(|f| format!("- {}", f.fact.atomic_text))
                .collect();
            sections.push(format!("Relevant Memories:\n{}", bullets.join("\n")));
        }
        let context = sections.join("\n\n");
        let token_estimate = self.tokenizer.count_tokens(&context);

        Ok(ContextResult {
            context,
            token_estimate,
            summary,
            external_docs,
            retrieval,
        })
    }

    // ════════════════════════════════════════════════════════════════════
    // Surface operations
    // ════════════════════════════════════════════════════════════════════

    /// Most recent facts.
    pub fn get_facts(&self, limit: usize) -> MemoryResult<Vec<Fact>> {
        Ok(self.components()?.store.get_recent_facts(limit)?)
    }

    /// Begin (or continue) a named session.
    pub async fn start_session(&self, session_id: &str) -> MemoryResult<Option<i64>> {
        match &self.components()?.episodes {
            Some(episodes) => Ok(Some(episodes.start_session(session_id).await?)),
            None => Ok(None),
        }
    }

    /// Close the current episode, if any.
    pub async fn end_session(&self) -> MemoryResult<Option<Episode>> {
        let c = self.components()?;
        match &c.episodes {
            Some(episodes) => {
                let closed = episodes.close_current().await?;
                match closed {
                    Some(id) => Ok(c.store.get_episode(id)?),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    /// Force a full summary regeneration.
    pub async fn refresh_summary(&self) -> MemoryResult<bool> {
        match &self.components()?.summary {
            Some(summary) => summary.force_refresh().await,
            None => Ok(false),
        }
    }

    /// The current rolling summary row.
    pub fn get_summary(&self) -> MemoryResult<RollingSummary> {
        Ok(self.components()?.store.get_rolling_summary()?)
    }

    /// Counters across all tables.
    pub fn get_stats(&self) -> MemoryResult<EngineStats> {
        let c = self.components()?;
        Ok(EngineStats {
            fact_count: c.store.count_facts()?,
            obsolete_fact_count: c.store.count_obsolete_facts()?,
            entity_count: c.store.count_entities()?,
            relation_count: c.store.count_relations()?,
            episode_count: c.store.count_episodes()?,
            summary_fact_count: c.store.get_rolling_summary()?.fact_count,
        })
    }

    /// Embed facts stored without a dense view (the embedder was absent or
    /// failing at write time). Returns (succeeded, failed) counts; one bad
    /// fact never fails the batch.
    pub async fn backfill_embeddings(&self, limit: usize) -> MemoryResult<(usize, usize)> {
        let c = self.components()?;
        let Some(embedder) = &c.embedder else {
            return Ok((0, 0));
        };

        let facts = c.store.list_facts_without_embeddings(limit)?;
        if facts.is_empty() {
            return Ok((0, 0));
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        for fact in &facts {
            match embedder.embed(&fact.atomic_text).await {
                Ok(embedding) => match c.store.update_fact_embedding(fact.id, &embedding) {
                    Ok(()) => succeeded += 1,
                    Err(e) => {
                        warn!("[engine] Backfill update failed for fact {}: {e}", fact.id);
                        failed += 1;
                    }
                },
                Err(e) => {
                    warn!("[engine] Backfill embed failed for fact {}: {e}", fact.id);
                    failed += 1;
                }
            }
        }
        info!("[engine] Backfill: {succeeded} embedded, {failed} failed");
        Ok((succeeded, failed))
    }

    /// Mark a fact obsolete — the only correction mechanism for stored
    /// facts. Obsolete facts vanish from every default query.
    pub fn mark_fact_obsolete(&self, id: i64, superseded_by: Option<i64>) -> MemoryResult<()> {
        self.components()?.store.mark_obsolete(id, superseded_by)
    }

    /// Prune the fact table down to the configured budget.
    pub fn prune(&self) -> MemoryResult<usize> {
        Ok(self.components()?.store.prune_old_facts()?)
    }

    /// Wire (or clear) an external RAG retriever.
    pub fn set_external_rag(&self, retriever: Option<Arc<dyn ExternalRetriever>>) {
        *self.external.lock() = retriever;
    }

    /// Stop the summary worker, drain the pool, release the store.
    /// In-flight pool jobs keep their component handles through the drain;
    /// only then is the store released.
    pub async fn close(&self) -> MemoryResult<()> {
        let Some(c) = self.components.read().clone() else {
            return Ok(());
        };
        if let Some(summary) = &c.summary {
            summary.stop_worker();
        }
        let drain = c.pool.shutdown().await;
        *self.components.write() = None;
        c.store.close();
        info!("[engine] Closed");
        drain
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{FailingEmbedder, HashEmbedder, ScriptedGenerator};

    fn config() -> EngineConfig {
        EngineConfig {
            db_path: ":memory:".into(),
            summary_async: false,
            ..EngineConfig::default()
        }
    }

    async fn engine_with(
        generator: Option<Arc<dyn Generator>>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Engine {
        let engine = Engine::new(config()).unwrap();
        engine.initialize(generator, embedder).await.unwrap();
        engine
    }

    #[tokio::test]
    async fn uninitialized_engine_errors() {
        let engine = Engine::new(config()).unwrap();
        let err = engine.get_facts(10).unwrap_err();
        assert!(matches!(err, MemoryError::NotInitialized));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let engine = Engine::new(config()).unwrap();
        engine.initialize(None, None).await.unwrap();
        engine.initialize(None, None).await.unwrap();
        engine.process_text("I like tea").await.unwrap();
        assert_eq!(engine.get_stats().unwrap().fact_count, 1);
    }

    #[tokio::test]
    async fn write_path_stores_synthetic_fact_without_generator() {
        let engine = engine_with(None, None).await;
        let result = engine.process_text("I live in Lisbon").await.unwrap();
        assert_eq!(result.fact_ids.len(), 1);

        let facts = engine.get_facts(10).unwrap();
        assert_eq!(facts[0].atomic_text, "I live in Lisbon");
        assert_eq!(facts[0].category, FactCategory::Other);
        assert!((facts[0].importance - 0.5).abs() < 1e-6);
        assert!(facts[0].episode_id.is_some());
    }

    #[tokio::test]
    async fn write_path_uses_generator_extraction() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "FACT|preference|0.8|The user prefers tea over coffee\n\
             FACT|biographical|0.9|The user lives in Lisbon",
        ]));
        let engine = engine_with(Some(generator as Arc<dyn Generator>), None).await;

        let result = engine
            .process_text("I prefer tea over coffee, and I live in Lisbon")
            .await
            .unwrap();
        assert_eq!(result.fact_ids.len(), 2);

        let facts = engine.get_facts(10).unwrap();
        assert!(facts.iter().any(|f| f.category == FactCategory::Preference));
        assert!(facts.iter().any(|f| f.category == FactCategory::Biographical));
    }

    #[tokio::test]
    async fn fact_ids_monotone_within_request() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "FACT|other|0.5|first fact\nFACT|other|0.5|second fact\nFACT|other|0.5|third fact",
        ]));
        let engine = engine_with(Some(generator as Arc<dyn Generator>), None).await;
        let result = engine.process_text("three things happened").await.unwrap();
        assert_eq!(result.fact_ids.len(), 3);
        assert!(result.fact_ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn embedder_failure_still_stores_fact() {
        let embedder = Arc::new(FailingEmbedder::new(384));
        let engine = engine_with(None, Some(embedder as Arc<dyn Embedder>)).await;

        let result = engine.process_text("I live in Lisbon").await.unwrap();
        assert_eq!(result.fact_ids.len(), 1);
        let facts = engine.get_facts(10).unwrap();
        assert!(facts[0].embedding.is_none(), "dense view dropped, fact kept");
    }

    #[tokio::test]
    async fn mismatched_embedder_dimension_rejected() {
        let engine = Engine::new(config()).unwrap();
        let err = engine
            .initialize(None, Some(Arc::new(HashEmbedder::new(128)) as Arc<dyn Embedder>))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }

    #[tokio::test]
    async fn multi_turn_concatenates_roles() {
        let engine = engine_with(None, None).await;
        engine
            .process_conversation(&[
                Turn::user("I adopted a dog"),
                Turn::assistant("What breed?"),
                Turn::user("A golden retriever"),
            ])
            .await
            .unwrap();

        let facts = engine.get_facts(10).unwrap();
        assert_eq!(facts.len(), 1);
        assert!(facts[0].text.contains("user: I adopted a dog"));
        assert!(facts[0].text.contains("assistant: What breed?"));
    }

    #[tokio::test]
    async fn empty_conversation_rejected() {
        let engine = engine_with(None, None).await;
        let err = engine.process_text("   ").await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn write_path_builds_graph() {
        let engine = engine_with(None, None).await;
        let result = engine.process_text("Alice works at Google").await.unwrap();
        assert!(result.entities_upserted > 0);
        assert!(result.relations_added > 0);

        let stats = engine.get_stats().unwrap();
        assert!(stats.entity_count >= 2);
        assert_eq!(stats.relation_count, 1);
    }

    #[tokio::test]
    async fn read_path_formats_sections() {
        let embedder = Arc::new(HashEmbedder::new(384));
        let engine = engine_with(None, Some(embedder as Arc<dyn Embedder>)).await;
        engine.process_text("I live in Lisbon").await.unwrap();

        let ctx = engine
            .get_context_for_prompt("where do I live?", 512)
            .await
            .unwrap();
        assert!(ctx.context.contains("Relevant Memories:"));
        assert!(ctx.context.contains("Lisbon"));
        assert!(!ctx.context.contains("User Summary:")); // no summary yet
        assert!(ctx.token_estimate > 0);
    }

    #[tokio::test]
    async fn read_path_includes_summary_when_present() {
        let generator = Arc::new(ScriptedGenerator::new(vec!["The user lives in Lisbon."]));
        // Encoder off so the single scripted reply feeds the summary.
        let engine = Engine::new(EngineConfig {
            enable_atomic_encoder: false,
            ..config()
        })
        .unwrap();
        engine
            .initialize(Some(generator as Arc<dyn Generator>), None)
            .await
            .unwrap();
        for i in 0..5 {
            engine
                .process_text(&format!("note number {i} about life in Lisbon"))
                .await
                .unwrap();
        }
        engine.refresh_summary().await.unwrap();

        let ctx = engine.get_context_for_prompt("lisbon", 512).await.unwrap();
        assert!(ctx.context.starts_with("User Summary:"));
        assert_eq!(ctx.summary, "The user lives in Lisbon.");
    }

    #[tokio::test]
    async fn external_rag_appears_in_context() {
        use crate::atoms::types::ExternalDoc;
        use async_trait::async_trait;

        struct StubRag;
        #[async_trait]
        impl ExternalRetriever for StubRag {
            async fn retrieve(&self, _q: &str, _k: usize) -> MemoryResult<Vec<ExternalDoc>> {
                Ok(vec![ExternalDoc {
                    content: "External doc about Lisbon".into(),
                    score: 0.9,
                }])
            }
        }

        let engine = engine_with(None, None).await;
        engine.set_external_rag(Some(Arc::new(StubRag)));
        engine.process_text("I live in Lisbon").await.unwrap();

        let ctx = engine.get_context_for_prompt("lisbon", 512).await.unwrap();
        assert!(ctx.context.contains("Knowledge Base:"));
        assert!(ctx.context.contains("External doc about Lisbon"));
    }

    #[tokio::test]
    async fn session_lifecycle_through_engine() {
        let engine = engine_with(None, None).await;
        let first = engine.start_session("s1").await.unwrap().unwrap();
        engine.process_text("session one fact").await.unwrap();

        let closed = engine.end_session().await.unwrap().unwrap();
        assert_eq!(closed.id, first);
        assert!(closed.ended_at.is_some());
        assert_eq!(closed.fact_count, 1);
    }

    #[tokio::test]
    async fn async_write_is_absorbed_by_pool() {
        let engine = Arc::new(engine_with(None, None).await);
        let queued = engine
            .process_conversation_async(vec![Turn::user("queued fact")])
            .unwrap();
        assert!(queued);

        // Drain the pool to make the write visible.
        engine.close().await.unwrap();
    }

    #[tokio::test]
    async fn backfill_embeds_unembedded_facts() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("omem.db").to_string_lossy().to_string();

        {
            let engine = Engine::new(EngineConfig {
                db_path: db_path.clone(),
                summary_async: false,
                ..EngineConfig::default()
            })
            .unwrap();
            engine.initialize(None, None).await.unwrap();
            engine.process_text("I live in Lisbon").await.unwrap();
            engine.close().await.unwrap();
        }

        let engine = Engine::new(EngineConfig {
            db_path,
            summary_async: false,
            ..EngineConfig::default()
        })
        .unwrap();
        engine
            .initialize(None, Some(Arc::new(HashEmbedder::new(384)) as Arc<dyn Embedder>))
            .await
            .unwrap();

        let (succeeded, failed) = engine.backfill_embeddings(100).await.unwrap();
        assert_eq!((succeeded, failed), (1, 0));
        let facts = engine.get_facts(10).unwrap();
        assert_eq!(facts[0].embedding.as_ref().unwrap().len(), 384);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let engine = engine_with(None, None).await;
        engine.close().await.unwrap();
        engine.close().await.unwrap();
        assert!(matches!(
            engine.get_facts(1).unwrap_err(),
            MemoryError::NotInitialized
        ));
    }

    #[tokio::test]
    async fn disabled_subsystems_degrade_cleanly() {
        let engine = Engine::new(EngineConfig {
            db_path: ":memory:".into(),
            ..EngineConfig::minimal()
        })
        .unwrap();
        engine.initialize(None, None).await.unwrap();

        let result = engine.process_text("bare minimum fact").await.unwrap();
        assert_eq!(result.fact_ids.len(), 1);
        assert!(result.episode_id.is_none());
        assert_eq!(result.relations_added, 0);

        assert!(engine.start_session("s").await.unwrap().is_none());
        assert!(!engine.refresh_summary().await.unwrap());
    }
}
