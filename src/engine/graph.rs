// ── omem Engine: Entity Graph ───────────────────────────────────────────────
//
// Lightweight entity/relation graph over the store's entity tables.
// Responsibilities:
//   - Upserts (find-or-insert by normalized name, mention bookkeeping)
//   - Regex relation extraction from fact text with fixed confidences
//   - 1-hop neighborhood lookup in both directions
//   - Adjacency-based scoring for retrieval (graph boost)
//   - Fuzzy entity resolution via trigram Jaccard similarity
//
// Relation rows reference endpoint ids — an arena-of-rows model, no
// pointer cycles.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::atoms::error::MemoryResult;
use crate::atoms::types::{Direction, Entity, EntityType, ExtractedRelation, Neighbor, Relation};
use crate::engine::store::FactStore;

/// Per-fact graph score contributions.
const DIRECT_MATCH_SCORE: f64 = 1.0;
const NEIGHBOR_FACT_FACTOR: f64 = 0.5;
const RELATION_FACT_FACTOR: f64 = 0.3;

/// Prefix length used to gather fuzzy-resolution candidates.
const RESOLUTION_PREFIX_LEN: usize = 3;

// ── Relation extraction patterns ────────────────────────────────────────────

const NAME_PATTERN: &str = r"[A-Z][A-Za-z]+(?:\s+[A-Z][A-Za-z]+)*";

static WORKS_AT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({NAME_PATTERN})\s+(?:works at|works for|is employed by|joined)\s+({NAME_PATTERN})"
    ))
    .expect("works_at regex")
});

static LIVES_IN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({NAME_PATTERN})\s+(?:lives in|is from|moved to|resides in)\s+({NAME_PATTERN})"
    ))
    .expect("lives_in regex")
});

static KNOWS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({NAME_PATTERN})\s+(?:knows|met|befriended)\s+({NAME_PATTERN})"
    ))
    .expect("knows regex")
});

static ROLE_OF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({NAME_PATTERN})\s+is\s+({NAME_PATTERN})'s\s+([a-z]+)"
    ))
    .expect("role regex")
});

static MEMBER_OF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({NAME_PATTERN})\s+is\s+a\s+member\s+of\s+(?:the\s+)?({NAME_PATTERN})"
    ))
    .expect("member_of regex")
});

/// Relations matched by the fixed pattern set, with their confidences.
pub fn extract_relations(text: &str) -> Vec<ExtractedRelation> {
    let mut out = Vec::new();

    for caps in WORKS_AT_RE.captures_iter(text) {
        out.push(ExtractedRelation {
            source: caps[1].to_string(),
            relation_type: "works_at".into(),
            target: caps[2].to_string(),
            confidence: 0.8,
        });
    }
    for caps in LIVES_IN_RE.captures_iter(text) {
        out.push(ExtractedRelation {
            source: caps[1].to_string(),
            relation_type: "lives_in".into(),
            target: caps[2].to_string(),
            confidence: 0.8,
        });
    }
    for caps in KNOWS_RE.captures_iter(text) {
        out.push(ExtractedRelation {
            source: caps[1].to_string(),
            relation_type: "knows".into(),
            target: caps[2].to_string(),
            confidence: 0.7,
        });
    }
    for caps in ROLE_OF_RE.captures_iter(text) {
        out.push(ExtractedRelation {
            source: caps[1].to_string(),
            relation_type: caps[3].to_lowercase(),
            target: caps[2].to_string(),
            confidence: 0.9,
        });
    }
    for caps in MEMBER_OF_RE.captures_iter(text) {
        out.push(ExtractedRelation {
            source: caps[1].to_string(),
            relation_type: "member_of".into(),
            target: caps[2].to_string(),
            confidence: 0.75,
        });
    }

    out
}

// ── Graph ───────────────────────────────────────────────────────────────────

pub struct EntityGraph {
    store: Arc<FactStore>,
    max_hops: usize,
    boost_weight: f64,
    fuzzy_resolution: bool,
    similarity_threshold: f64,
}

impl EntityGraph {
    pub fn new(
        store: Arc<FactStore>,
        max_hops: usize,
        boost_weight: f64,
        fuzzy_resolution: bool,
        similarity_threshold: f64,
    ) -> Self {
        EntityGraph {
            store,
            max_hops,
            boost_weight,
            fuzzy_resolution,
            similarity_threshold,
        }
    }

    /// Find-or-insert an entity by normalized name, recording the mention.
    pub fn upsert_entity(
        &self,
        name: &str,
        kind: EntityType,
        fact_id: Option<i64>,
    ) -> MemoryResult<i64> {
        self.store.upsert_entity(name, kind, fact_id)
    }

    /// Insert a relation between two named entities, creating the endpoints
    /// as needed. Duplicate (source, target, type) rows keep one id with
    /// confidence raised to the max submission.
    pub fn add_relation(
        &self,
        extracted: &ExtractedRelation,
        fact_id: Option<i64>,
    ) -> MemoryResult<i64> {
        let source_id = self.resolve_or_create(&extracted.source, fact_id)?;
        let target_id = self.resolve_or_create(&extracted.target, fact_id)?;

        self.store.upsert_relation(&Relation {
            id: 0,
            source_entity_id: source_id,
            target_entity_id: target_id,
            relation_type: if extracted.relation_type.is_empty() {
                "related_to".into()
            } else {
                extracted.relation_type.clone()
            },
            fact_id,
            confidence: if extracted.confidence > 0.0 {
                extracted.confidence.min(1.0)
            } else {
                0.5
            },
            is_obsolete: false,
        })
    }

    fn resolve_or_create(&self, name: &str, fact_id: Option<i64>) -> MemoryResult<i64> {
        if let Some(entity) = self.resolve_entity(name)? {
            if let Some(fid) = fact_id {
                // Record the mention on the resolved entity.
                self.store.upsert_entity(&entity.name, entity.kind, Some(fid))?;
            }
            return Ok(entity.id);
        }
        self.store.upsert_entity(name, EntityType::Other, fact_id)
    }

    /// 1-hop neighbors in both directions, best-confidence first.
    pub fn get_neighbors(&self, entity_id: i64) -> MemoryResult<Vec<Neighbor>> {
        let relations = self.store.relations_for_entity(entity_id)?;
        let mut neighbors = Vec::with_capacity(relations.len());

        for relation in relations {
            let (other_id, direction) = if relation.source_entity_id == entity_id {
                (relation.target_entity_id, Direction::Outgoing)
            } else {
                (relation.source_entity_id, Direction::Incoming)
            };
            match self.store.get_entity(other_id)? {
                Some(entity) => neighbors.push(Neighbor {
                    entity,
                    relation,
                    direction,
                }),
                None => warn!("[graph] Dangling relation endpoint {other_id}"),
            }
        }
        Ok(neighbors)
    }

    /// Fact ids mentioning any of the named entities.
    pub fn get_facts_for_entities(&self, names: &[String]) -> MemoryResult<Vec<i64>> {
        let mut seen: HashSet<i64> = HashSet::new();
        let mut out = Vec::new();
        for name in names {
            if let Some(entity) = self.resolve_entity(name)? {
                for fid in entity.fact_ids {
                    if seen.insert(fid) {
                        out.push(fid);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Adjacency score per candidate fact.
    ///
    /// For each matched query entity: its own facts score 1.0; with hop
    /// budget, each neighbor's facts add 0.5 × confidence and the
    /// relation's originating fact adds 0.3 × confidence. Per-fact totals
    /// clamp at 1.0 and are scaled by the configured boost weight.
    pub fn score_by_graph(
        &self,
        query_entities: &[String],
        candidate_fact_ids: &[i64],
    ) -> MemoryResult<HashMap<i64, f64>> {
        let mut raw: HashMap<i64, f64> = HashMap::new();

        for name in query_entities {
            let Some(entity) = self.resolve_entity(name)? else {
                continue;
            };

            for fid in &entity.fact_ids {
                *raw.entry(*fid).or_insert(0.0) += DIRECT_MATCH_SCORE;
            }

            if self.max_hops >= 1 {
                for neighbor in self.get_neighbors(entity.id)? {
                    let confidence = neighbor.relation.confidence as f64;
                    for fid in &neighbor.entity.fact_ids {
                        *raw.entry(*fid).or_insert(0.0) += NEIGHBOR_FACT_FACTOR * confidence;
                    }
                    if let Some(fid) = neighbor.relation.fact_id {
                        *raw.entry(fid).or_insert(0.0) += RELATION_FACT_FACTOR * confidence;
                    }
                }
            }
        }

        let candidates: HashSet<i64> = candidate_fact_ids.iter().copied().collect();
        let scores: HashMap<i64, f64> = raw
            .into_iter()
            .filter(|(fid, _)| candidates.contains(fid))
            .map(|(fid, score)| (fid, score.min(1.0) * self.boost_weight))
            .collect();

        debug!(
            "[graph] Scored {} of {} candidates for {} query entities",
            scores.len(),
            candidate_fact_ids.len(),
            query_entities.len()
        );
        Ok(scores)
    }

    /// Resolve a name to an entity: exact normalized match first, then (if
    /// enabled) the best trigram-Jaccard candidate above the threshold
    /// among entities sharing the first three characters.
    pub fn resolve_entity(&self, name: &str) -> MemoryResult<Option<Entity>> {
        let normalized = name.trim().split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if normalized.is_empty() {
            return Ok(None);
        }

        if let Some(entity) = self.store.find_entity_by_normalized_name(&normalized)? {
            return Ok(Some(entity));
        }
        if !self.fuzzy_resolution {
            return Ok(None);
        }

        let prefix: String = normalized.chars().take(RESOLUTION_PREFIX_LEN).collect();
        let candidates = self.store.find_entities_by_prefix(&prefix, 50)?;

        let mut best: Option<(f64, Entity)> = None;
        for candidate in candidates {
            let similarity = trigram_jaccard(&normalized, &candidate.normalized_name);
            if similarity >= self.similarity_threshold
                && best.as_ref().map(|(s, _)| similarity > *s).unwrap_or(true)
            {
                best = Some((similarity, candidate));
            }
        }
        Ok(best.map(|(_, e)| e))
    }
}

/// Jaccard similarity over character trigram sets.
pub fn trigram_jaccard(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() && tb.is_empty() {
        return if a == b { 1.0 } else { 0.0 };
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn trigrams(s: &str) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 3 {
        return std::iter::once(s.to_string()).collect();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::config::EngineConfig;
    use crate::engine::store::FactStore;

    fn graph() -> EntityGraph {
        let mut cfg = EngineConfig::default();
        cfg.validate().unwrap();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        EntityGraph::new(store, 2, 0.2, true, 0.85)
    }

    #[test]
    fn extract_works_at_relation() {
        let rels = extract_relations("Alice works at Google");
        assert_eq!(
            rels,
            vec![ExtractedRelation {
                source: "Alice".into(),
                relation_type: "works_at".into(),
                target: "Google".into(),
                confidence: 0.8,
            }]
        );
    }

    #[test]
    fn extract_role_relation() {
        let rels = extract_relations("Maria is Carlos's manager");
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].relation_type, "manager");
        assert!((rels[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn extract_member_and_knows() {
        let rels = extract_relations("Dana is a member of the Chess Club. Dana met Erik.");
        let types: Vec<&str> = rels.iter().map(|r| r.relation_type.as_str()).collect();
        assert!(types.contains(&"member_of"));
        assert!(types.contains(&"knows"));
    }

    #[test]
    fn add_relation_creates_endpoints() {
        let g = graph();
        let rels = extract_relations("Alice works at Google");
        g.add_relation(&rels[0], Some(1)).unwrap();

        let alice = g.resolve_entity("Alice").unwrap().unwrap();
        let google = g.resolve_entity("Google").unwrap().unwrap();
        assert!(alice.fact_ids.contains(&1));
        assert!(google.fact_ids.contains(&1));

        let neighbors = g.get_neighbors(alice.id).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].entity.id, google.id);
        assert_eq!(neighbors[0].direction, Direction::Outgoing);
    }

    #[test]
    fn neighbors_seen_from_both_sides() {
        let g = graph();
        let rels = extract_relations("Alice works at Google");
        g.add_relation(&rels[0], None).unwrap();

        let google = g.resolve_entity("Google").unwrap().unwrap();
        let neighbors = g.get_neighbors(google.id).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].direction, Direction::Incoming);
        assert_eq!(neighbors[0].entity.name, "Alice");
    }

    #[test]
    fn score_by_graph_boosts_anchored_and_adjacent_facts() {
        let g = graph();
        // Fact 1: "Alice works at Google"; fact 2: "Google is in Mountain View".
        g.upsert_entity("Alice", EntityType::Person, Some(1)).unwrap();
        g.upsert_entity("Google", EntityType::Organization, Some(1)).unwrap();
        g.upsert_entity("Google", EntityType::Organization, Some(2)).unwrap();
        g.upsert_entity("Mountain View", EntityType::Place, Some(2)).unwrap();
        g.add_relation(
            &ExtractedRelation {
                source: "Alice".into(),
                relation_type: "works_at".into(),
                target: "Google".into(),
                confidence: 0.8,
            },
            Some(1),
        )
        .unwrap();

        let scores = g
            .score_by_graph(&["Google".into()], &[1, 2])
            .unwrap();
        // Both facts mention Google directly → raw 1.0 each, clamped and
        // scaled by the 0.2 boost weight.
        assert!((scores[&1] - 0.2).abs() < 1e-9);
        assert!((scores[&2] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn score_by_graph_reaches_neighbor_only_facts() {
        let g = graph();
        // Fact 3 mentions only Alice; Google reaches it through the edge.
        g.upsert_entity("Alice", EntityType::Person, Some(3)).unwrap();
        g.upsert_entity("Google", EntityType::Organization, Some(1)).unwrap();
        g.add_relation(
            &ExtractedRelation {
                source: "Alice".into(),
                relation_type: "works_at".into(),
                target: "Google".into(),
                confidence: 0.8,
            },
            Some(1),
        )
        .unwrap();

        let scores = g.score_by_graph(&["Google".into()], &[1, 3]).unwrap();
        // Fact 3: neighbor contribution 0.5 × 0.8 = 0.4 → × 0.2 = 0.08.
        assert!(scores[&3] > 0.0);
        assert!((scores[&3] - 0.08).abs() < 1e-9);
        // Fact 1: direct (1.0) + relation origin (0.3 × 0.8) clamps to 1.0.
        assert!((scores[&1] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn zero_hops_skips_neighbors() {
        let mut cfg = EngineConfig::default();
        cfg.validate().unwrap();
        let store = Arc::new(FactStore::open_in_memory(&cfg).unwrap());
        let g = EntityGraph::new(store, 0, 0.2, true, 0.85);

        g.upsert_entity("Alice", EntityType::Person, Some(3)).unwrap();
        g.upsert_entity("Google", EntityType::Organization, Some(1)).unwrap();
        g.add_relation(
            &ExtractedRelation {
                source: "Alice".into(),
                relation_type: "works_at".into(),
                target: "Google".into(),
                confidence: 0.8,
            },
            Some(1),
        )
        .unwrap();

        let scores = g.score_by_graph(&["Google".into()], &[1, 3]).unwrap();
        assert!(!scores.contains_key(&3));
    }

    #[test]
    fn fuzzy_resolution_matches_near_names() {
        let g = graph();
        g.upsert_entity("Alexander Hamilton", EntityType::Person, None).unwrap();
        let hit = g.resolve_entity("alexander hamiltons").unwrap();
        assert!(hit.is_some(), "trigram match should resolve");
        let miss = g.resolve_entity("alexandra completely different").unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn trigram_jaccard_bounds() {
        assert!((trigram_jaccard("google", "google") - 1.0).abs() < 1e-9);
        assert_eq!(trigram_jaccard("ab", "cd"), 0.0);
        let mid = trigram_jaccard("google", "googles");
        assert!(mid > 0.5 && mid < 1.0);
    }
}
