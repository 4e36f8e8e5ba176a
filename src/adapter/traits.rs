//! DataSource trait: the contract record producers implement
//!
//! A source turns some external system's activity records into normalized
//! nodes and edges. The ingest pipeline owns validation and merging.

use super::report::AdapterError;
use crate::graph::{Edge, Node};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One source's output for a single ingestion run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceBatch {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl SourceBatch {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Total number of records (nodes + edges)
    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// A producer of normalized node and edge records.
///
/// Node ids must be unique within one `produce()` call. Edges may reference
/// nodes from the same batch or from a source registered earlier.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Unique identifier for this source, used in rejection reports
    fn id(&self) -> &str;

    /// Produce this run's records
    async fn produce(&self) -> Result<SourceBatch, AdapterError>;
}
