// omem Providers — capability seams consumed by the engine.
//
// The engine never talks to a model service directly; it consumes three
// narrow traits, all optional at runtime:
//   Embedder          — text → fixed-dimension vector
//   Generator         — prompt → text (fact extraction, coreference
//                       fallback, summaries)
//   ExternalRetriever — query → external documents (RAG over corpora the
//                       engine does not own)
//
// http.rs carries Ollama / OpenAI-compatible implementations; testing.rs
// carries the deterministic stubs used by tests and benchmark adapters.

pub mod http;
pub mod testing;

use async_trait::async_trait;

use crate::atoms::error::MemoryResult;
use crate::atoms::types::ExternalDoc;

/// Produces dense vectors. The dimension must be constant across one run
/// and match the engine's `embedding_dim`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;

    /// The fixed output dimension.
    fn dimension(&self) -> usize;
}

/// Produces text from line-oriented prompts.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> MemoryResult<String>;
}

/// Retrieves documents from an external corpus (filesystem RAG, vector
/// service, …). Wired into the engine via `set_external_rag`.
#[async_trait]
pub trait ExternalRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> MemoryResult<Vec<ExternalDoc>>;
}
