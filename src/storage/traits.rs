//! Storage trait definitions

use crate::graph::{Node, NodeId, TemporalGraph};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored graph is inconsistent: {0}")]
    Integrity(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for graph storage backends
///
/// A store holds at most one scored graph. Saving replaces the previous
/// graph wholesale, matching the re-ingestion lifecycle. Implementations must
/// be thread-safe (Send + Sync).
pub trait GraphStore: Send + Sync {
    /// Replace the stored graph
    fn save_graph(&self, graph: &TemporalGraph) -> StorageResult<()>;

    /// Load the stored graph, if one has been saved
    fn load_graph(&self) -> StorageResult<Option<TemporalGraph>>;

    /// Load a single node without rebuilding the whole graph
    fn load_node(&self, id: &NodeId) -> StorageResult<Option<Node>>;

    /// Remove the stored graph. Returns `true` if there was one.
    fn clear(&self) -> StorageResult<bool>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
