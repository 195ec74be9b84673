// ── omem Atoms: Engine Configuration ────────────────────────────────────────
//
// One validated struct holding every engine option. `validate()` mutates in
// place: fills derived defaults, normalizes the multi-view weights to sum to
// 1.0, and rejects impossible values. Ablation presets are factory variants
// on the same struct.

use serde::{Deserialize, Serialize};

use crate::atoms::error::{MemoryError, MemoryResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // ── Storage ──
    /// Path to the embedded database file. `:memory:` is allowed.
    pub db_path: String,
    /// Dense-view dimension; must match the embedder across one run.
    pub embedding_dim: usize,
    /// Create the FTS5 index and use BM25 for lexical search.
    /// When off, lexical search uses the simple substring scorer.
    pub enable_fts: bool,

    // ── Atomic encoder ──
    pub enable_atomic_encoder: bool,
    /// Cap on facts extracted from one turn batch.
    pub max_facts_per_turn: usize,
    /// Extracted facts below this importance are dropped.
    /// The synthetic fallback fact is exempt.
    pub min_fact_importance: f32,

    // ── Multi-view indexer ──
    pub max_keywords_per_fact: usize,

    // ── Entity graph ──
    pub enable_graph: bool,
    /// Neighbor expansion depth for graph scoring. Values ≥ 3 are invalid.
    pub max_hops: usize,
    pub graph_boost_weight: f64,
    /// Fuzzy entity resolution by trigram similarity.
    pub entity_resolution: bool,
    pub similarity_threshold: f64,

    // ── Retrieval ──
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Dynamic-K slope; 0.0 pins retrieval depth at `default_top_k`.
    pub complexity_delta: f64,
    pub min_score: f64,
    /// Read-path token budget used when a request passes 0.
    pub max_context_tokens: usize,
    /// Multi-view fusion weights; normalized to sum to 1.0 in validation.
    pub semantic_weight: f64,
    pub lexical_weight: f64,
    pub symbolic_weight: f64,
    pub importance_weight: f64,
    pub recency_weight: f64,
    pub recency_half_life_hours: f64,
    pub access_frequency_weight: f64,

    // ── Rolling summary ──
    pub summary_enabled: bool,
    /// Run the refresh ticker in the background.
    pub summary_async: bool,
    pub summary_refresh_interval_secs: u64,
    /// Dirty gate: refresh is a no-op below this many pending facts.
    pub min_new_facts_for_update: usize,
    /// Prefer the incremental prompt when a summary already exists.
    pub incremental_update: bool,
    /// Window for full regeneration.
    pub summary_max_facts: usize,

    // ── Episodes ──
    pub enable_episodes: bool,
    pub session_timeout_secs: u64,
    pub max_episodes_in_cache: usize,
    pub track_entity_mentions: bool,
    pub summary_on_close: bool,

    // ── Pruning ──
    pub max_facts: usize,
    /// Prune is a no-op while the table holds at most this many rows.
    pub prune_threshold: usize,
    /// Obsolete facts kept on prune = `prune_keep_recent / 4`.
    pub prune_keep_recent: usize,

    // ── Worker pool ──
    pub worker_pool_size: usize,
    pub worker_queue_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            db_path: "omem.db".into(),
            embedding_dim: 384,
            enable_fts: true,

            enable_atomic_encoder: true,
            max_facts_per_turn: 10,
            min_fact_importance: 0.3,

            max_keywords_per_fact: 20,

            enable_graph: true,
            max_hops: 2,
            graph_boost_weight: 0.2,
            entity_resolution: true,
            similarity_threshold: 0.85,

            default_top_k: 5,
            max_top_k: 20,
            complexity_delta: 2.0,
            min_score: 0.3,
            max_context_tokens: 2048,
            semantic_weight: 0.5,
            lexical_weight: 0.3,
            symbolic_weight: 0.2,
            importance_weight: 0.15,
            recency_weight: 0.1,
            recency_half_life_hours: 168.0,
            access_frequency_weight: 0.05,

            summary_enabled: true,
            summary_async: true,
            summary_refresh_interval_secs: 300,
            min_new_facts_for_update: 5,
            incremental_update: true,
            summary_max_facts: 50,

            enable_episodes: true,
            session_timeout_secs: 1800,
            max_episodes_in_cache: 16,
            track_entity_mentions: true,
            summary_on_close: true,

            max_facts: 10_000,
            prune_threshold: 12_000,
            prune_keep_recent: 400,

            worker_pool_size: 0, // resolved to CPU count in validate()
            worker_queue_size: 100,
        }
    }
}

impl EngineConfig {
    /// Validate and normalize in place. Call before constructing the engine;
    /// `Engine::new` calls this itself.
    pub fn validate(&mut self) -> MemoryResult<()> {
        if self.db_path.trim().is_empty() {
            return Err(MemoryError::Config("db_path must not be empty".into()));
        }
        if self.embedding_dim == 0 {
            return Err(MemoryError::Config("embedding_dim must be > 0".into()));
        }
        if self.max_hops >= 3 {
            return Err(MemoryError::Config(format!(
                "max_hops must be < 3, got {}",
                self.max_hops
            )));
        }
        if self.default_top_k == 0 {
            return Err(MemoryError::Config("default_top_k must be > 0".into()));
        }
        if self.max_top_k < self.default_top_k {
            self.max_top_k = self.default_top_k;
        }
        if self.complexity_delta < 0.0 {
            return Err(MemoryError::Config("complexity_delta must be >= 0".into()));
        }
        if self.recency_half_life_hours <= 0.0 {
            return Err(MemoryError::Config(
                "recency_half_life_hours must be > 0".into(),
            ));
        }
        if self.prune_threshold < self.max_facts {
            return Err(MemoryError::Config(
                "prune_threshold must be >= max_facts".into(),
            ));
        }

        // Normalize the multi-view weights to sum to 1.0. A degenerate
        // all-zero triple falls back to the defaults.
        let sum = self.semantic_weight + self.lexical_weight + self.symbolic_weight;
        if sum.abs() < 1e-9 {
            self.semantic_weight = 0.5;
            self.lexical_weight = 0.3;
            self.symbolic_weight = 0.2;
        } else if (sum - 1.0).abs() > 1e-9 {
            self.semantic_weight /= sum;
            self.lexical_weight /= sum;
            self.symbolic_weight /= sum;
        }

        if self.worker_pool_size == 0 {
            self.worker_pool_size = num_cpus::get();
        }
        if self.worker_queue_size == 0 {
            self.worker_queue_size = 100;
        }

        Ok(())
    }

    // ── Ablation presets ────────────────────────────────────────────────────
    // Factory variants on the default struct, used by benchmark drivers to
    // measure what each subsystem contributes.

    /// Everything on (the default).
    pub fn full() -> Self {
        Self::default()
    }

    /// Raw turns go straight to storage; no coreference, anchoring, or
    /// fact extraction.
    pub fn no_atomic_encoder() -> Self {
        EngineConfig {
            enable_atomic_encoder: false,
            ..Self::default()
        }
    }

    /// Dense vectors only: lexical and symbolic signals are zeroed and the
    /// graph is off.
    pub fn semantic_only() -> Self {
        EngineConfig {
            enable_fts: false,
            enable_graph: false,
            semantic_weight: 1.0,
            lexical_weight: 0.0,
            symbolic_weight: 0.0,
            ..Self::default()
        }
    }

    /// No entity graph, no graph boost.
    pub fn no_graph() -> Self {
        EngineConfig {
            enable_graph: false,
            graph_boost_weight: 0.0,
            ..Self::default()
        }
    }

    /// No rolling summary.
    pub fn no_summary() -> Self {
        EngineConfig {
            summary_enabled: false,
            summary_async: false,
            ..Self::default()
        }
    }

    /// Retrieval depth pinned at `default_top_k`.
    pub fn fixed_k() -> Self {
        EngineConfig {
            complexity_delta: 0.0,
            ..Self::default()
        }
    }

    /// No episode tracking.
    pub fn no_episodes() -> Self {
        EngineConfig {
            enable_episodes: false,
            ..Self::default()
        }
    }

    /// Bare store + retriever: every optional subsystem off.
    pub fn minimal() -> Self {
        EngineConfig {
            enable_atomic_encoder: false,
            enable_graph: false,
            graph_boost_weight: 0.0,
            summary_enabled: false,
            summary_async: false,
            enable_episodes: false,
            complexity_delta: 0.0,
            ..Self::default()
        }
    }
}
