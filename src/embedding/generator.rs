//! EmbeddingGenerator: content-hash memoization in front of an `Embedder`

use super::{Embedder, EmbeddingError, EmbeddingResult};
use crate::graph::{render_metadata, Node};
use dashmap::DashMap;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

/// SHA-256 of a node's label and rendered metadata
pub type ContentKey = [u8; 32];

/// Default number of texts sent to the backend per call
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Cache key for a node's embeddable content.
///
/// Two nodes with the same label and metadata share a key regardless of id.
pub fn content_key(node: &Node) -> ContentKey {
    let mut hasher = Sha256::new();
    hasher.update(node.label.as_bytes());
    hasher.update([0x1f]);
    hasher.update(render_metadata(&node.metadata).as_bytes());
    hasher.finalize().into()
}

/// Memoizing front end for an embedding backend.
///
/// The cache is keyed by content, so repeated calls and nodes with identical
/// content never reach the backend twice. Safe to share across threads.
pub struct EmbeddingGenerator {
    backend: Arc<dyn Embedder>,
    cache: DashMap<ContentKey, Arc<[f32]>>,
    batch_size: usize,
}

impl EmbeddingGenerator {
    pub fn new(backend: Arc<dyn Embedder>) -> Self {
        Self {
            backend,
            cache: DashMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Vector length produced by the backend
    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Number of distinct contents cached
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Embed a single node's content
    pub fn embed(&self, node: &Node) -> EmbeddingResult<Vec<f32>> {
        let key = content_key(node);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.to_vec());
        }
        let text = node.content_text();
        let mut vectors = self.call_backend(&[text.as_str()])?;
        let vector: Arc<[f32]> = vectors.remove(0).into();
        self.cache.insert(key, Arc::clone(&vector));
        Ok(vector.to_vec())
    }

    /// Embed many nodes, returning vectors in input order.
    ///
    /// Produces exactly what calling `embed` on each node would. Only
    /// contents missing from the cache are sent to the backend, deduplicated
    /// and in batches of `batch_size`.
    pub fn embed_all(&self, nodes: &[&Node]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let keyed: Vec<(ContentKey, &Node)> = nodes
            .par_iter()
            .map(|n| (content_key(n), *n))
            .collect();

        let mut pending: Vec<(ContentKey, String)> = Vec::new();
        let mut queued: HashSet<ContentKey> = HashSet::new();
        for (key, node) in &keyed {
            if !self.cache.contains_key(key) && queued.insert(*key) {
                pending.push((*key, node.content_text()));
            }
        }

        if !pending.is_empty() {
            tracing::debug!(
                backend = self.backend.name(),
                nodes = nodes.len(),
                missing = pending.len(),
                "embedding uncached content"
            );
        }
        for chunk in pending.chunks(self.batch_size) {
            let texts: Vec<&str> = chunk.iter().map(|(_, t)| t.as_str()).collect();
            let vectors = self.call_backend(&texts)?;
            for ((key, _), vector) in chunk.iter().zip(vectors) {
                self.cache.insert(*key, vector.into());
            }
        }

        keyed
            .iter()
            .map(|(key, _)| {
                self.cache
                    .get(key)
                    .map(|v| v.to_vec())
                    .ok_or(EmbeddingError::EmptyResult)
            })
            .collect()
    }

    fn call_backend(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let vectors = self.backend.embed_batch(texts)?;
        if vectors.is_empty() && !texts.is_empty() {
            return Err(EmbeddingError::EmptyResult);
        }
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        let expected = self.backend.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}
