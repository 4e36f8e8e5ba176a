//! GraphEngine: holds the current graph and swaps in new versions atomically

use super::edge::EdgeId;
use super::node::NodeId;
use super::temporal::TemporalGraph;
use crate::storage::{GraphStore, StorageError};
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Kind of record an id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Node,
    Edge,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Node => f.write_str("node"),
            RecordKind::Edge => f.write_str("edge"),
        }
    }
}

/// Errors from graph mutation and lookup
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: RecordKind, id: String },

    #[error("edge {edge} references missing node {missing}")]
    DanglingReference { edge: EdgeId, missing: NodeId },

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("graph lock poisoned")]
    LockPoisoned,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Owner of the live graph
///
/// Readers take an `Arc` snapshot and keep it for as long as they like;
/// writers either swap in a whole new graph (`replace`) or apply a small
/// change with copy-on-write (`update`). A reader never sees a half-applied
/// write.
pub struct GraphEngine {
    current: RwLock<Arc<TemporalGraph>>,
    store: Option<Arc<dyn GraphStore>>,
}

impl Default for GraphEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GraphEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphEngine")
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl GraphEngine {
    /// Engine holding an empty graph, without persistence
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(TemporalGraph::new())),
            store: None,
        }
    }

    /// Engine holding `graph`, without persistence
    pub fn with_graph(graph: TemporalGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
            store: None,
        }
    }

    /// Engine that writes every new version through to `store`
    pub fn with_store(store: Arc<dyn GraphStore>) -> Self {
        Self {
            current: RwLock::new(Arc::new(TemporalGraph::new())),
            store: Some(store),
        }
    }

    /// Load the last persisted graph, if the store has one.
    ///
    /// Returns `true` when a graph was loaded.
    pub fn load_persisted(&self) -> GraphResult<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load_graph()? {
            Some(graph) => {
                tracing::info!(
                    nodes = graph.node_count(),
                    edges = graph.edge_count(),
                    "loaded persisted graph"
                );
                *self.current.write().map_err(|_| GraphError::LockPoisoned)? = Arc::new(graph);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The current graph version
    pub fn snapshot(&self) -> GraphResult<Arc<TemporalGraph>> {
        self.current
            .read()
            .map(|g| Arc::clone(&g))
            .map_err(|_| GraphError::LockPoisoned)
    }

    /// Swap in a new graph version. Persisted first when a store is attached,
    /// so a failed write leaves the previous version live.
    pub fn replace(&self, graph: TemporalGraph) -> GraphResult<Arc<TemporalGraph>> {
        if let Some(store) = &self.store {
            store.save_graph(&graph)?;
        }
        let next = Arc::new(graph);
        *self.current.write().map_err(|_| GraphError::LockPoisoned)? = Arc::clone(&next);
        Ok(next)
    }

    /// Apply a change to the current graph.
    ///
    /// With a store attached the change is made on a copy, which becomes
    /// current only once saved. Without one the graph is cloned only if a
    /// reader still holds the current version. `f` must either succeed or
    /// leave the graph untouched.
    pub fn update<F, R>(&self, f: F) -> GraphResult<R>
    where
        F: FnOnce(&mut TemporalGraph) -> GraphResult<R>,
    {
        let mut guard = self.current.write().map_err(|_| GraphError::LockPoisoned)?;
        let Some(store) = &self.store else {
            return f(Arc::make_mut(&mut guard));
        };
        let mut next = (**guard).clone();
        let result = f(&mut next)?;
        store.save_graph(&next)?;
        *guard = Arc::new(next);
        Ok(result)
    }
}
