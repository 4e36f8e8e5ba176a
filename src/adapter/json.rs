//! JsonFileSource: records read from a `{ "nodes": [...], "edges": [...] }` file

use super::report::AdapterError;
use super::traits::{DataSource, SourceBatch};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Source backed by a JSON document on disk, re-read on every run
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    id: String,
    path: PathBuf,
}

impl JsonFileSource {
    /// Source id defaults to `json:<path>`
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            id: format!("json:{}", path.display()),
            path,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DataSource for JsonFileSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn produce(&self) -> Result<SourceBatch, AdapterError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let batch: SourceBatch = serde_json::from_str(&text)?;
        tracing::debug!(
            source = %self.id,
            nodes = batch.nodes.len(),
            edges = batch.edges.len(),
            "read records"
        );
        Ok(batch)
    }
}
