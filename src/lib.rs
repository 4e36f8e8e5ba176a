//! riskgraph: temporal entity graph with graph-neural risk scoring
//!
//! Activity records (email, file access, channel membership) from any number
//! of sources are merged into one temporal graph of actors and artifacts. A
//! message-passing graph neural network then scores every node for risk and
//! relevance, and forecasts risk from each node's activity trend. Investigators
//! query the scored graph through [`InvestigationApi`].
//!
//! # Core Concepts
//!
//! - **Nodes**: actors, artifacts, channels and messages, with scores that are
//!   always clamped to [0, 1]
//! - **Edges**: directed, timestamped interactions
//! - **Critical nodes**: ranked by a weighted blend of risk and relevance
//! - **Investigation paths**: bounded walks through high-risk neighbours
//!
//! # Example
//!
//! ```
//! use riskgraph::{Edge, EdgeType, Node, NodeType, TemporalGraph};
//!
//! let mut graph = TemporalGraph::new();
//! graph.add_node(Node::new("jane", NodeType::Actor, "Jane Smith")).unwrap();
//! graph.add_node(Node::new("q3.xlsx", NodeType::Artifact, "q3.xlsx")).unwrap();
//! graph.add_edge(Edge::new("e1", "jane", "q3.xlsx", EdgeType::Edited)).unwrap();
//! assert_eq!(graph.get_node(&"jane".into()).unwrap().degree(), 1);
//! ```

pub mod adapter;
pub mod api;
pub mod config;
pub mod embedding;
mod graph;
pub mod model;
pub mod processor;
pub mod query;
pub mod storage;

pub use api::{ApiError, ApiResult, InvestigationApi, RebuildSummary, RiskForecast};
pub use config::{ConfigError, Settings};
pub use graph::{
    render_metadata, Direction, Edge, EdgeId, EdgeType, GraphEngine, GraphError, GraphMetadata, GraphResult,
    GraphSnapshot, MetaValue, Metadata, Node, NodeId, NodeType, RecordKind, RiskLevel, TemporalGraph,
};
pub use model::{InferenceModel, ModelConfig, PredictiveGnn};
pub use processor::{GraphProcessor, PipelineError, ProcessReport, ProcessorConfig};
pub use query::{
    CriticalNodeRanker, GraphFilter, GraphStats, GraphView, InvestigationPath, InvestigationPathQuery, NodeDetail,
    QueryError, QueryResult, RankedNode,
};
pub use storage::{GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
