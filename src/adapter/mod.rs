//! Ingestion layer
//!
//! Data sources produce normalized node and edge records; the ingest
//! pipeline merges them into a single validated `TemporalGraph`.

mod ingest;
mod json;
mod memory;
mod report;
mod traits;

pub use ingest::{IngestPipeline, DEFAULT_MAX_REJECTION_FRACTION};
pub use json::JsonFileSource;
pub use memory::InMemorySource;
pub use report::{
    AdapterError, IngestError, IngestReport, IngestResult, Rejection, RejectionReason,
};
pub use traits::{DataSource, SourceBatch};
