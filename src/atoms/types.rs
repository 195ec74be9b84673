// ── omem Atoms: Core Types ──────────────────────────────────────────────────
//
// Type definitions for the memory engine. These are pure data types
// (no logic, no DB access, no I/O); behavior lives in engine/.
//
// Timestamps are UTC strings in `%Y-%m-%dT%H:%M:%SZ` format throughout —
// the storage layer owns formatting and lenient parsing.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 1: Facts
// ═══════════════════════════════════════════════════════════════════════════

/// Category of an atomic fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactCategory {
    Preference,
    Belief,
    Biographical,
    Event,
    Relationship,
    Task,
    Knowledge,
    Other,
}

impl Default for FactCategory {
    fn default() -> Self {
        FactCategory::Other
    }
}

impl FactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactCategory::Preference => "preference",
            FactCategory::Belief => "belief",
            FactCategory::Biographical => "biographical",
            FactCategory::Event => "event",
            FactCategory::Relationship => "relationship",
            FactCategory::Task => "task",
            FactCategory::Knowledge => "knowledge",
            FactCategory::Other => "other",
        }
    }

    /// Normalize a free-form category string to the enum. Unknown → Other.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "preference" | "preferences" => FactCategory::Preference,
            "belief" | "beliefs" | "opinion" => FactCategory::Belief,
            "biographical" | "bio" | "personal" => FactCategory::Biographical,
            "event" | "events" => FactCategory::Event,
            "relationship" | "relationships" | "social" => FactCategory::Relationship,
            "task" | "tasks" | "todo" => FactCategory::Task,
            "knowledge" | "fact" | "world" => FactCategory::Knowledge,
            _ => FactCategory::Other,
        }
    }
}

/// An atomic knowledge unit — a self-contained statement understandable
/// without the surrounding conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fact {
    /// Store-assigned monotone id. 0 until inserted.
    pub id: i64,
    /// Original text as captured from the conversation.
    pub text: String,
    /// Text after coreference resolution and temporal anchoring.
    /// Defaults to `text` when the encoder is disabled.
    pub atomic_text: String,
    pub category: FactCategory,
    /// Importance ∈ [0,1]; the store clamps on insert.
    pub importance: f32,
    /// Dense view; fixed dimension across one run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Lexical view — stemmed keyword bag.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Absolute instant this fact is anchored to, when one was parsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_anchor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Entities mentioned by this fact.
    #[serde(default)]
    pub entities: Vec<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<i64>,
    /// Opaque id of the conversation turn that produced this fact.
    #[serde(default)]
    pub turn_id: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
    #[serde(default)]
    pub access_count: i64,
    #[serde(default)]
    pub is_obsolete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<i64>,
}

impl Fact {
    /// Build a fact from bare text with engine defaults applied.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        Fact {
            atomic_text: text.clone(),
            text,
            importance: 0.5,
            ..Default::default()
        }
    }
}

/// A fact returned from a search primitive with its raw signal score.
#[derive(Debug, Clone)]
pub struct ScoredFact {
    pub fact: Fact,
    pub score: f64,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 2: Entities & Relations
// ═══════════════════════════════════════════════════════════════════════════

/// Entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Place,
    Organization,
    Concept,
    Thing,
    Time,
    Other,
}

impl Default for EntityType {
    fn default() -> Self {
        EntityType::Other
    }
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Place => "place",
            EntityType::Organization => "organization",
            EntityType::Concept => "concept",
            EntityType::Thing => "thing",
            EntityType::Time => "time",
            EntityType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "person" | "people" => EntityType::Person,
            "place" | "location" => EntityType::Place,
            "organization" | "org" | "company" => EntityType::Organization,
            "concept" => EntityType::Concept,
            "thing" | "object" => EntityType::Thing,
            "time" | "date" => EntityType::Time,
            _ => EntityType::Other,
        }
    }
}

/// A `{name, type}` pair embedded in a fact row (`entities_json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntityType,
}

/// Graph node — one row in the entity table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    /// Display name as first seen.
    pub name: String,
    /// Lowercased, whitespace-collapsed equality key. Unique.
    pub normalized_name: String,
    pub kind: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Facts mentioning this entity (deduped, insertion order).
    #[serde(default)]
    pub fact_ids: Vec<i64>,
    pub mention_count: i64,
}

/// Directed edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub source_entity_id: i64,
    pub target_entity_id: i64,
    /// Free-form relation label; `related_to` when nothing better is known.
    pub relation_type: String,
    /// Fact this relation was extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_id: Option<i64>,
    /// Confidence ∈ (0,1].
    pub confidence: f32,
    #[serde(default)]
    pub is_obsolete: bool,
}

/// Direction of a 1-hop neighbor relative to the queried entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A 1-hop neighbor: the adjacent entity plus the connecting relation.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub entity: Entity,
    pub relation: Relation,
    pub direction: Direction,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 3: Episodes & Rolling Summary
// ═══════════════════════════════════════════════════════════════════════════

/// A bounded conversational session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub session_id: String,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub fact_count: i64,
    /// Entity names mentioned during this episode.
    #[serde(default)]
    pub entity_mentions: Vec<String>,
}

/// The always-available user-profile paragraph (singleton row, id = 1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollingSummary {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub updated_at: String,
    /// Every fact ever incorporated into the summary.
    #[serde(default)]
    pub source_fact_ids: Vec<i64>,
    /// Delta since the last refresh; cleared atomically with each refresh.
    #[serde(default)]
    pub pending_fact_ids: Vec<i64>,
    #[serde(default)]
    pub fact_count: i64,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 4: Encoding & Indexing
// ═══════════════════════════════════════════════════════════════════════════

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// A fact proposed by the extraction stage, before indexing and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFact {
    pub text: String,
    pub category: FactCategory,
    pub importance: f32,
}

/// An entity surfaced by the rule-based extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredEntity {
    pub name: String,
    pub kind: EntityType,
}

/// A relation proposed before entity resolution, by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRelation {
    pub source: String,
    pub relation_type: String,
    pub target: String,
    pub confidence: f32,
}

/// Output of the atomic encoder for one turn batch.
#[derive(Debug, Clone, Default)]
pub struct EncodedTurn {
    /// Input after coreference resolution and temporal anchoring.
    pub atomic_text: String,
    pub facts: Vec<ExtractedFact>,
    pub entities: Vec<DiscoveredEntity>,
    /// Relations the generator proposed alongside the facts.
    pub relations: Vec<ExtractedRelation>,
}

impl EncodedTurn {
    /// Pass-through encoding used when the atomic encoder is disabled.
    pub fn passthrough(text: &str) -> Self {
        EncodedTurn {
            atomic_text: text.to_string(),
            ..Default::default()
        }
    }
}

/// Structured metadata extracted from a fact's text (the symbolic view).
#[derive(Debug, Clone, Default)]
pub struct SymbolicView {
    pub time_expressions: Vec<String>,
    /// Absolute instant parsed from the text, when one was found.
    pub timestamp_anchor: Option<String>,
    pub locations: Vec<String>,
    pub persons: Vec<String>,
    pub organizations: Vec<String>,
    pub has_numbers: bool,
    pub is_question: bool,
    pub has_negation: bool,
    /// How specific this fact is, ∈ [0,1]. Base 0.5 plus feature bonuses.
    pub specificity: f32,
}

/// The three parallel representations of one fact.
#[derive(Debug, Clone, Default)]
pub struct FactViews {
    pub embedding: Option<Vec<f32>>,
    pub keywords: Vec<String>,
    pub symbolic: SymbolicView,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 5: Retrieval
// ═══════════════════════════════════════════════════════════════════════════

/// Query type assigned by the complexity estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Factual,
    Temporal,
    Causal,
    Comparison,
    Spatial,
    Open,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Factual => "factual",
            QueryType::Temporal => "temporal",
            QueryType::Causal => "causal",
            QueryType::Comparison => "comparison",
            QueryType::Spatial => "spatial",
            QueryType::Open => "open",
        }
    }
}

impl Default for QueryType {
    fn default() -> Self {
        QueryType::Open
    }
}

/// Complexity estimator output for one query.
#[derive(Debug, Clone, Default)]
pub struct ComplexityReport {
    /// Aggregate complexity ∈ [0,1].
    pub score: f64,
    pub query_type: QueryType,
    /// Proper nouns and quoted strings found in the query.
    pub entities: Vec<String>,
    /// Stop-word-filtered query keywords.
    pub keywords: Vec<String>,
    /// Retrieval depth scaled by complexity.
    pub dynamic_k: usize,
}

/// One retrieval request.
#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest {
    pub query: String,
    /// Token budget; 0 falls back to `max_context_tokens`.
    pub max_tokens: usize,
    /// Minimum final score; None uses the configured default.
    pub min_score: Option<f64>,
    /// Fixed retrieval depth; None uses dynamic K.
    pub top_k: Option<usize>,
    /// Reference instant for recency scoring; None = now.
    pub current_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, max_tokens: usize) -> Self {
        RetrievalRequest {
            query: query.into(),
            max_tokens,
            ..Default::default()
        }
    }
}

/// A fact in a retrieval result, with its per-signal score breakdown.
#[derive(Debug, Clone)]
pub struct RetrievedFact {
    pub fact: Fact,
    /// Final fused score ∈ [0,1].
    pub score: f64,
    pub semantic_score: f64,
    pub lexical_score: f64,
    pub symbolic_score: f64,
    pub graph_score: f64,
    pub token_cost: usize,
}

/// Outcome of one retrieval.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub facts: Vec<RetrievedFact>,
    pub complexity: f64,
    pub query_type: QueryType,
    /// Candidates considered before min-score filtering and truncation.
    pub total_candidates: usize,
    /// Facts dropped by the token budget after the top-K cut.
    pub truncated_count: usize,
    pub total_tokens: usize,
    /// `type:<qt>,complexity:{low|medium|high},k:<n>`
    pub strategy: String,
}

// ═══════════════════════════════════════════════════════════════════════════
// SECTION 6: Engine surface
// ═══════════════════════════════════════════════════════════════════════════

/// Result of one write-path call.
#[derive(Debug, Clone, Default)]
pub struct ProcessingResult {
    /// Ids of the facts stored, in turn order (monotonically increasing).
    pub fact_ids: Vec<i64>,
    pub entities_upserted: usize,
    pub relations_added: usize,
    pub episode_id: Option<i64>,
    /// Per-fact storage errors that were logged and skipped.
    pub errors: Vec<String>,
}

/// A document returned by an external RAG retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalDoc {
    pub content: String,
    pub score: f64,
}

/// Result of one read-path call.
#[derive(Debug, Clone, Default)]
pub struct ContextResult {
    /// Formatted context block ready for prompt injection.
    pub context: String,
    pub token_estimate: usize,
    pub summary: String,
    pub external_docs: Vec<ExternalDoc>,
    pub retrieval: RetrievalResult,
}

/// Counters surfaced by `Engine::get_stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub fact_count: usize,
    pub obsolete_fact_count: usize,
    pub entity_count: usize,
    pub relation_count: usize,
    pub episode_count: usize,
    pub summary_fact_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_normalizes() {
        assert_eq!(FactCategory::parse("Preference"), FactCategory::Preference);
        assert_eq!(FactCategory::parse("BIO"), FactCategory::Biographical);
        assert_eq!(FactCategory::parse("nonsense"), FactCategory::Other);
    }

    #[test]
    fn entity_ref_serde_uses_type_key() {
        let r = EntityRef {
            name: "Alice".into(),
            kind: EntityType::Person,
        };
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"type\":\"person\""), "got {json}");
        let back: EntityRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn fact_new_defaults() {
        let f = Fact::new("I like tea");
        assert_eq!(f.atomic_text, "I like tea");
        assert_eq!(f.category, FactCategory::Other);
        assert!((f.importance - 0.5).abs() < f32::EPSILON);
        assert!(!f.is_obsolete);
    }
}
