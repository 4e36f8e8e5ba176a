//! Whole-graph statistics and per-node detail

use super::types::{QueryError, QueryResult};
use crate::graph::{Edge, GraphError, Node, NodeId, NodeType, RiskLevel, TemporalGraph};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary figures for a scored graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Count per risk level; every level is present
    pub risk_distribution: BTreeMap<RiskLevel, usize>,
    pub node_types: BTreeMap<NodeType, usize>,
    pub avg_risk_score: f32,
    pub avg_relevance_score: f32,
    pub critical_nodes: usize,
    pub flagged_nodes: usize,
    pub anomalous_edges: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl GraphStats {
    pub fn compute(graph: &TemporalGraph) -> Self {
        let mut risk_distribution: BTreeMap<RiskLevel, usize> =
            RiskLevel::ALL.iter().map(|l| (*l, 0)).collect();
        let mut node_types = BTreeMap::new();
        let mut risk_sum = 0.0f64;
        let mut relevance_sum = 0.0f64;
        let mut critical_nodes = 0;
        let mut flagged_nodes = 0;

        for node in graph.nodes() {
            *risk_distribution.entry(node.risk_level()).or_insert(0) += 1;
            *node_types.entry(node.node_type).or_insert(0) += 1;
            risk_sum += f64::from(node.risk_score());
            relevance_sum += f64::from(node.relevance_score());
            critical_nodes += usize::from(node.is_critical());
            flagged_nodes += usize::from(node.is_flagged());
        }

        let n = graph.node_count();
        let average = |sum: f64| if n == 0 { 0.0 } else { (sum / n as f64) as f32 };
        let span = graph.time_span();
        Self {
            total_nodes: n,
            total_edges: graph.edge_count(),
            risk_distribution,
            node_types,
            avg_risk_score: average(risk_sum),
            avg_relevance_score: average(relevance_sum),
            critical_nodes,
            flagged_nodes,
            anomalous_edges: graph.edges().filter(|e| e.is_anomalous).count(),
            start: span.map(|(s, _)| s),
            end: span.map(|(_, e)| e),
        }
    }
}

/// Metrics derived for one node
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeMetrics {
    /// Distinct neighbours over both directions
    pub neighbor_count: usize,
    pub edge_count: usize,
    /// Mean risk over distinct neighbours; 0.0 when isolated
    pub avg_neighbor_risk: f32,
}

/// A node with its neighbourhood
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeDetail {
    pub node: Node,
    pub neighbors: Vec<Node>,
    pub edges: Vec<Edge>,
    pub metrics: NodeMetrics,
}

impl NodeDetail {
    pub fn build(graph: &TemporalGraph, id: &NodeId) -> QueryResult<Self> {
        let node = graph
            .get_node(id)
            .ok_or_else(|| QueryError::NodeNotFound(id.clone()))?;
        let not_found = |_: GraphError| QueryError::NodeNotFound(id.clone());
        let neighbors: Vec<Node> = graph
            .distinct_neighbors(id)
            .map_err(not_found)?
            .into_iter()
            .filter_map(|n| graph.get_node(n).cloned())
            .collect();
        let edges: Vec<Edge> = graph
            .incident_edges(id)
            .map_err(not_found)?
            .into_iter()
            .cloned()
            .collect();

        let avg_neighbor_risk = if neighbors.is_empty() {
            0.0
        } else {
            neighbors.iter().map(Node::risk_score).sum::<f32>() / neighbors.len() as f32
        };
        let metrics = NodeMetrics {
            neighbor_count: neighbors.len(),
            edge_count: edges.len(),
            avg_neighbor_risk,
        };
        Ok(Self {
            node: node.clone(),
            neighbors,
            edges,
            metrics,
        })
    }
}
