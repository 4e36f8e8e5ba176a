//! Ingestion outcome and error types

use crate::graph::{GraphError, NodeId, RecordKind};
use thiserror::Error;

/// Why an individual record was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// Id already produced by the same source, or an edge id seen before
    DuplicateId(RecordKind),
    /// Edge references a node no source has produced yet
    DanglingReference(NodeId),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId(kind) => write!(f, "duplicate {} id", kind),
            Self::DanglingReference(id) => write!(f, "missing endpoint {}", id),
        }
    }
}

/// A single rejected record.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Source that produced the record
    pub source: String,
    /// Node or edge id of the record
    pub record_id: String,
    pub reason: RejectionReason,
}

impl Rejection {
    pub fn new(source: impl Into<String>, record_id: impl Into<String>, reason: RejectionReason) -> Self {
        Self {
            source: source.into(),
            record_id: record_id.into(),
            reason,
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} from {}: {}", self.record_id, self.source, self.reason)
    }
}

/// The result of a successful ingestion run.
///
/// Partial success is the normal case: valid records are committed even when
/// some are rejected, as long as the rejection fraction stays under the
/// configured limit.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Number of sources that produced records
    pub sources: usize,
    /// Records produced across all sources
    pub records_produced: usize,
    pub nodes_committed: usize,
    pub edges_committed: usize,
    /// Node records folded into a node another source already produced
    pub nodes_merged: usize,
    pub rejections: Vec<Rejection>,
}

impl IngestReport {
    pub fn rejected(&self) -> usize {
        self.rejections.len()
    }

    /// True if no records were rejected
    pub fn is_fully_committed(&self) -> bool {
        self.rejections.is_empty()
    }

    /// Fraction of produced records that were rejected
    pub fn rejection_fraction(&self) -> f32 {
        if self.records_produced == 0 {
            0.0
        } else {
            self.rejections.len() as f32 / self.records_produced as f32
        }
    }
}

/// Errors a source raises while producing records.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed records: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("source error: {0}")]
    Internal(String),
}

/// Errors that fail a whole ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source {source_id} failed: {error}")]
    Source {
        source_id: String,
        #[source]
        error: AdapterError,
    },

    #[error("{rejected} of {produced} records rejected, above the {max_fraction} limit")]
    TooManyRejections {
        rejected: usize,
        produced: usize,
        max_fraction: f32,
        rejections: Vec<Rejection>,
    },

    #[error("no data sources registered")]
    NoSources,

    #[error("graph assembly failed: {0}")]
    Graph(#[from] GraphError),
}

/// Result type for ingestion
pub type IngestResult<T> = Result<T, IngestError>;
