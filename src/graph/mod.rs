//! Core graph data structures

mod edge;
mod engine;
mod metadata;
mod node;
mod temporal;


pub use edge::{Edge, EdgeId, EdgeType};
pub use engine::{GraphEngine, GraphError, GraphResult, RecordKind};
pub use metadata::{render as render_metadata, MetaValue, Metadata};
pub use node::{Node, NodeId, NodeType, RiskLevel};
pub use temporal::{Direction, GraphMetadata, GraphSnapshot, TemporalGraph};

pub(crate) use node::clamp_unit;
pub(crate) use temporal::NodeScores;
