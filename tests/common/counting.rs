//! Embedding backend that counts calls

use riskgraph::embedding::{Embedder, EmbeddingResult, HashingEmbedder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Delegates to a `HashingEmbedder` and counts batches and texts
#[derive(Clone)]
pub struct CountingEmbedder {
    inner: Arc<HashingEmbedder>,
    calls: Arc<AtomicUsize>,
    texts: Arc<AtomicUsize>,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: Arc::new(HashingEmbedder::new(dimension)),
            calls: Arc::new(AtomicUsize::new(0)),
            texts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "counting"
    }
}
