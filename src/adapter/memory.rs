//! InMemorySource: fixed node and edge lists

use super::report::AdapterError;
use super::traits::{DataSource, SourceBatch};
use crate::graph::{Edge, Node};
use async_trait::async_trait;

/// Source that yields the same records on every run
#[derive(Debug, Clone)]
pub struct InMemorySource {
    id: String,
    batch: SourceBatch,
}

impl InMemorySource {
    pub fn new(id: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            id: id.into(),
            batch: SourceBatch::new(nodes, edges),
        }
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(&self) -> Result<SourceBatch, AdapterError> {
        Ok(self.batch.clone())
    }
}
