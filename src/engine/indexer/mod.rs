// ── omem Engine: Multi-View Indexer ─────────────────────────────────────────
//
// Builds the three parallel representations of one fact:
//   semantic — dense vector from the configured embedder
//   lexical  — stemmed keyword bag (lexical.rs)
//   symbolic — structured metadata + specificity (symbolic.rs)
//
// The embedder may be absent or fail; the fact is then indexed with the
// other two views only.

pub mod lexical;
pub mod symbolic;

use std::sync::Arc;

use log::warn;

use crate::atoms::types::{DiscoveredEntity, EntityType, FactViews};
use crate::providers::Embedder;

pub struct MultiViewIndexer {
    embedder: Option<Arc<dyn Embedder>>,
    max_keywords: usize,
}

impl MultiViewIndexer {
    pub fn new(embedder: Option<Arc<dyn Embedder>>, max_keywords: usize) -> Self {
        MultiViewIndexer {
            embedder,
            max_keywords,
        }
    }

    /// Build all three views for one fact.
    ///
    /// `embed_text` overrides the text sent to the embedder (the write path
    /// prefers raw user content for single-turn inputs to keep the dense
    /// view aligned with query-side embeddings).
    pub async fn index(&self, text: &str, embed_text: Option<&str>) -> FactViews {
        let embedding = match &self.embedder {
            Some(embedder) => {
                let input = embed_text.unwrap_or(text);
                match embedder.embed(input).await {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!("[indexer] Embedding failed, fact stored without dense view: {e}");
                        None
                    }
                }
            }
            None => None,
        };

        FactViews {
            embedding,
            keywords: lexical::extract_keywords(text, self.max_keywords),
            symbolic: symbolic::extract(text),
        }
    }

    /// Entities surfaced by the symbolic view, for graph upserts.
    pub fn discovered_entities(views: &FactViews) -> Vec<DiscoveredEntity> {
        let mut out = Vec::new();
        for name in &views.symbolic.persons {
            out.push(DiscoveredEntity {
                name: name.clone(),
                kind: EntityType::Person,
            });
        }
        for name in &views.symbolic.organizations {
            out.push(DiscoveredEntity {
                name: name.clone(),
                kind: EntityType::Organization,
            });
        }
        for name in &views.symbolic.locations {
            out.push(DiscoveredEntity {
                name: name.clone(),
                kind: EntityType::Place,
            });
        }
        out
    }
}
