// omem — Conversational Memory Engine
//
// Turns a stream of conversation turns into a queryable knowledge store:
// atomic, self-contained facts plus a lightweight entity/relation graph,
// episode tracking, and a rolling user-profile summary — all persisted in
// a single embedded SQLite file. Prompts are answered with a ranked,
// token-budgeted bundle of relevant facts.
//
// Crate layout (structs in atoms/, impls in engine/):
//   atoms/      — pure data types, error enum, configuration
//   engine/     — fact store, encoder, indexer, graph, retriever,
//                 summary manager, episode manager, orchestrator
//   providers/  — Embedder / Generator / ExternalRetriever traits and the
//                 optional Ollama / OpenAI-compatible HTTP implementations

pub mod atoms;
pub mod engine;
pub mod providers;

// ── Re-exports (primary embedding surface) ──────────────────────────────────

pub use atoms::config::EngineConfig;
pub use atoms::error::{MemoryError, MemoryResult};
pub use atoms::types::{
    ContextResult, Entity, EntityType, Episode, ExternalDoc, Fact, FactCategory,
    ProcessingResult, QueryType, Relation, RetrievalRequest, RetrievalResult, RetrievedFact,
    RollingSummary, Turn,
};
pub use engine::engine::Engine;
pub use providers::{Embedder, ExternalRetriever, Generator};
