//! Node content embeddings
//!
//! Uses a trait-based embedding backend (`Embedder`) so production code can
//! use fastembed-rs while tests and offline runs use deterministic embedders.
//! `EmbeddingGenerator` sits in front of the backend and memoizes vectors by
//! content hash.

mod generator;
mod hashing;

pub use generator::{content_key, ContentKey, EmbeddingGenerator, DEFAULT_BATCH_SIZE};
pub use hashing::HashingEmbedder;

use std::sync::Arc;
use thiserror::Error;

/// Dimension of the bundled embedding backends
pub const DEFAULT_DIMENSION: usize = 384;

/// Error type for embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The backend could not be loaded or failed during inference
    #[error("embedding backend unavailable: {0}")]
    Unavailable(String),

    /// The backend returned no results
    #[error("embedding returned no results")]
    EmptyResult,

    /// The backend returned a different number of vectors than texts
    #[error("embedding returned {actual} vectors for {expected} texts")]
    CountMismatch { expected: usize, actual: usize },

    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Trait for embedding text into vectors.
///
/// Implementations handle model loading and inference.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one vector per text.
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Length of every vector this backend produces
    fn dimension(&self) -> usize;

    /// Short name for logs
    fn name(&self) -> &str {
        "embedder"
    }
}

/// Build a backend by name.
///
/// `"hashing"` is always available. `"all-minilm-l6-v2"` (alias
/// `"fastembed"`) needs the `embeddings` feature.
pub fn backend_from_name(name: &str, dimension: usize) -> EmbeddingResult<Arc<dyn Embedder>> {
    match name.to_ascii_lowercase().as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(dimension))),
        #[cfg(feature = "embeddings")]
        "all-minilm-l6-v2" | "fastembed" => {
            let backend = FastEmbedEmbedder::default_model()?;
            if backend.dimension() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: backend.dimension(),
                });
            }
            Ok(Arc::new(backend))
        }
        other => Err(EmbeddingError::Unavailable(format!("unknown embedding backend: {}", other))),
    }
}

// ---------------------------------------------------------------------------

#[cfg(feature = "embeddings")]
mod fastembed_impl {
    use super::{Embedder, EmbeddingError, EmbeddingResult, DEFAULT_DIMENSION};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;

    /// Production embedder backed by fastembed (ONNX Runtime).
    ///
    /// Wraps `fastembed::TextEmbedding` in a `Mutex` because its `embed`
    /// method requires `&mut self`, while the `Embedder` trait uses `&self`.
    pub struct FastEmbedEmbedder {
        model: Mutex<TextEmbedding>,
        dimension: usize,
    }

    impl FastEmbedEmbedder {
        /// Load a specific model. `dimension` must match the model's output.
        pub fn new(model: EmbeddingModel, dimension: usize) -> EmbeddingResult<Self> {
            let options = InitOptions::new(model).with_show_download_progress(false);
            let embedding = TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;
            Ok(Self {
                model: Mutex::new(embedding),
                dimension,
            })
        }

        /// all-MiniLM-L6-v2, 384 dimensions
        pub fn default_model() -> EmbeddingResult<Self> {
            Self::new(EmbeddingModel::AllMiniLML6V2, DEFAULT_DIMENSION)
        }
    }

    impl Embedder for FastEmbedEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let mut model = self
                .model
                .lock()
                .map_err(|_| EmbeddingError::Unavailable("model lock poisoned".into()))?;
            let embeddings = model
                .embed(texts.to_vec(), None)
                .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;
            if embeddings.is_empty() {
                return Err(EmbeddingError::EmptyResult);
            }
            Ok(embeddings)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "fastembed"
        }
    }
}

#[cfg(feature = "embeddings")]
pub use fastembed_impl::FastEmbedEmbedder;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_by_name() {
        let backend = backend_from_name("Hashing", 32).unwrap();
        assert_eq!(backend.dimension(), 32);
        assert!(matches!(
            backend_from_name("word2vec", 32),
            Err(EmbeddingError::Unavailable(_))
        ));
    }
}
