//! Query errors and shared result types

use crate::graph::{Edge, Node, NodeId};
use serde::Serialize;
use thiserror::Error;

pub use crate::graph::Direction;

/// Typed query failures. "Nothing matched" is never an empty `Ok`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("no path from {start} reaches a node with risk >= {min_risk} within {max_depth} hops")]
    NoQualifyingPath {
        start: NodeId,
        max_depth: usize,
        min_risk: f32,
    },
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// A node together with its composite ranking score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedNode {
    pub node: Node,
    /// Weighted blend of risk and relevance
    pub composite: f32,
}

/// Best risk-qualified path found from a start node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvestigationPath {
    /// Start first, chosen endpoint last
    pub nodes: Vec<Node>,
    /// `edges[i]` joins `nodes[i]` and `nodes[i + 1]`
    pub edges: Vec<Edge>,
    /// Sum of risk scores over `nodes`
    pub total_risk: f32,
}

impl InvestigationPath {
    /// Number of hops
    pub fn hops(&self) -> usize {
        self.edges.len()
    }

    pub fn node_ids(&self) -> Vec<&NodeId> {
        self.nodes.iter().map(|n| &n.id).collect()
    }

    /// Human-readable chain of labels, e.g. "Jane Smith -> contract.pdf"
    pub fn describe(&self) -> String {
        self.nodes
            .iter()
            .map(|n| n.label.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
