// omem Providers — deterministic stubs.
//
// Used by unit tests, the end-to-end scenarios, and benchmark adapters
// that need embedding-shaped behavior without a model service.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::providers::{Embedder, Generator};

/// Hashed unit-vector embedder.
///
/// Each word FNV-hashes into one bucket and the histogram is
/// L2-normalized. Texts sharing vocabulary land near each other, which is
/// all the retrieval pipeline needs in a benchmark.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashEmbedder { dimension }
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let mut v = vec![0.0f32; self.dimension];
        // Hash per word so shared vocabulary dominates the direction.
        for word in text.to_lowercase().split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            let mut h: u64 = 1469598103934665603; // FNV offset basis
            for b in word.bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            v[(h % self.dimension as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-8 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// An embedder that always fails — exercises degraded write/read paths.
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        FailingEmbedder { dimension }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> MemoryResult<Vec<f32>> {
        Err(MemoryError::dependency("embedder", "stub failure"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Replays scripted replies in order and counts invocations.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<&str>) -> Self {
        ScriptedGenerator {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> MemoryResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut replies = self.replies.lock();
        match replies.pop_front() {
            Some(reply) => Ok(reply),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_is_deterministic_and_unit() {
        let embedder = HashEmbedder::new(384);
        let a = embedder.embed("My name is Alice Johnson").await.unwrap();
        let b = embedder.embed("My name is Alice Johnson").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_words_score_higher_than_disjoint() {
        let embedder = HashEmbedder::new(384);
        let name = embedder.embed("What is my name?").await.unwrap();
        let about_name = embedder.embed("My name is Alice Johnson").await.unwrap();
        let about_work = embedder
            .embed("I work at Google as a software engineer")
            .await
            .unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&name, &about_name) > dot(&name, &about_work));
    }

    #[tokio::test]
    async fn scripted_generator_replays_in_order() {
        let generator = ScriptedGenerator::new(vec!["first", "second"]);
        assert_eq!(generator.generate("p").await.unwrap(), "first");
        assert_eq!(generator.generate("p").await.unwrap(), "second");
        assert_eq!(generator.generate("p").await.unwrap(), "");
        assert_eq!(generator.call_count(), 3);
    }
}
