// ── omem Engine: Atomic Encoder ─────────────────────────────────────────────
//
// Turns raw conversation text into atomic form: entity extraction feeds a
// salience cache, pronouns are resolved against it, relative time phrases
// are anchored to absolute dates, and (when a generator is wired) atomic
// facts are extracted from the result.
//
// Everything degrades gracefully: no generator means no extracted facts
// (the engine stores a single synthetic fact instead), and a generator
// failure is logged and treated the same way.

pub mod coref;
pub mod entities;
pub mod extraction;
pub mod temporal;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::RwLock;

use crate::atoms::types::{DiscoveredEntity, EncodedTurn};
use crate::engine::prompts;
use crate::providers::Generator;

use entities::EntityCache;

pub struct AtomicEncoder {
    /// Salience cache for pronoun resolution. Writer lock on updates,
    /// reader lock on resolution.
    cache: RwLock<EntityCache>,
    generator: Option<Arc<dyn Generator>>,
    max_facts_per_turn: usize,
    min_fact_importance: f32,
}

impl AtomicEncoder {
    pub fn new(
        generator: Option<Arc<dyn Generator>>,
        max_facts_per_turn: usize,
        min_fact_importance: f32,
    ) -> Self {
        AtomicEncoder {
            cache: RwLock::new(EntityCache::default()),
            generator,
            max_facts_per_turn,
            min_fact_importance,
        }
    }

    /// Encode one turn batch against a reference instant.
    pub async fn encode(&self, text: &str, now: DateTime<Utc>) -> EncodedTurn {
        let text = text.trim();
        if text.is_empty() {
            return EncodedTurn::default();
        }

        // ── 1. Entity extraction + cache update ──────────────────────
        let mentions = entities::extract_mentions(text);
        {
            let mut cache = self.cache.write();
            for mention in &mentions {
                cache.update(mention, now);
            }
        }

        // ── 2. Coreference resolution ────────────────────────────────
        let resolved = {
            let cache = self.cache.read();
            coref::resolve(text, &cache)
        };

        // The rule-based rewrite can loop the same name into a tight
        // cluster; hand those to the generator with the known-entity list.
        let resolved = if coref::is_pathological(&resolved) {
            match &self.generator {
                Some(generator) => {
                    let known = self.cache.read().known_names();
                    let prompt = prompts::coreference(text, &known);
                    match generator.generate(&prompt).await {
                        Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
                        Ok(_) => resolved,
                        Err(e) => {
                            warn!("[encoder] LLM coreference fallback failed: {e}");
                            resolved
                        }
                    }
                }
                None => resolved,
            }
        } else {
            resolved
        };

        // ── 3. Temporal anchoring ────────────────────────────────────
        let anchored = temporal::anchor(&resolved, now);

        // ── 4. Fact extraction ───────────────────────────────────────
        // The generator may reply with a mix of FACT / ENTITY / REL lines;
        // each tag is parsed tolerantly and the rest is ignored.
        let (facts, llm_entities, relations) = match &self.generator {
            Some(generator) => {
                let prompt = prompts::fact_extraction(&anchored.text, self.max_facts_per_turn);
                match generator.generate(&prompt).await {
                    Ok(reply) => (
                        extraction::parse_fact_lines(
                            &reply,
                            self.max_facts_per_turn,
                            self.min_fact_importance,
                        ),
                        extraction::parse_entity_lines(&reply),
                        extraction::parse_relation_lines(&reply),
                    ),
                    Err(e) => {
                        warn!("[encoder] Fact extraction failed, falling back to synthetic fact: {e}");
                        (Vec::new(), Vec::new(), Vec::new())
                    }
                }
            }
            None => (Vec::new(), Vec::new(), Vec::new()),
        };

        let mut entities: Vec<DiscoveredEntity> = mentions
            .into_iter()
            .map(|m| DiscoveredEntity {
                name: m.name,
                kind: m.kind,
            })
            .collect();
        for entity in llm_entities {
            if !entities.iter().any(|e| e.name.eq_ignore_ascii_case(&entity.name)) {
                entities.push(entity);
            }
        }

        debug!(
            "[encoder] Encoded turn: {} entities, {} facts, {} relations",
            entities.len(),
            facts.len(),
            relations.len()
        );

        EncodedTurn {
            atomic_text: anchored.text,
            facts,
            entities,
            relations,
        }
    }

    /// The first timestamp anchor the temporal pass would produce for this
    /// text, if any. Exposed so the write path can anchor facts without
    /// re-running the full pipeline.
    pub fn anchor_for(text: &str, now: DateTime<Utc>) -> Option<String> {
        temporal::anchor(text, now).anchor
    }
}
