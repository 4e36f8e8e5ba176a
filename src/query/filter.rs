//! Conjunctive node filters and dangling-free graph views

use crate::graph::{Edge, Node, NodeId, NodeType, RiskLevel, TemporalGraph};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Filter for `get_graph`. Every supplied criterion must hold.
///
/// `start`/`end` bound edge timestamps (inclusive); they do not remove nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphFilter {
    pub min_relevance: Option<f32>,
    pub min_risk: Option<f32>,
    pub flagged_only: bool,
    pub critical_only: bool,
    pub node_types: Option<Vec<NodeType>>,
    pub risk_levels: Option<Vec<RiskLevel>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl GraphFilter {
    /// Filter matching every node
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_relevance(mut self, value: f32) -> Self {
        self.min_relevance = Some(value);
        self
    }

    pub fn min_risk(mut self, value: f32) -> Self {
        self.min_risk = Some(value);
        self
    }

    pub fn flagged_only(mut self) -> Self {
        self.flagged_only = true;
        self
    }

    pub fn critical_only(mut self) -> Self {
        self.critical_only = true;
        self
    }

    pub fn with_node_type(mut self, node_type: NodeType) -> Self {
        self.node_types.get_or_insert_with(Vec::new).push(node_type);
        self
    }

    pub fn with_risk_level(mut self, level: RiskLevel) -> Self {
        self.risk_levels.get_or_insert_with(Vec::new).push(level);
        self
    }

    /// Keep only edges with `start <= timestamp <= end`
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        if let Some(min) = self.min_relevance {
            if node.relevance_score() < min {
                return false;
            }
        }
        if let Some(min) = self.min_risk {
            if node.risk_score() < min {
                return false;
            }
        }
        if self.flagged_only && !node.is_flagged() {
            return false;
        }
        if self.critical_only && !node.is_critical() {
            return false;
        }
        if let Some(types) = &self.node_types {
            if !types.contains(&node.node_type) {
                return false;
            }
        }
        if let Some(levels) = &self.risk_levels {
            if !levels.contains(&node.risk_level()) {
                return false;
            }
        }
        true
    }

    fn edge_in_window(&self, edge: &Edge) -> bool {
        self.start.map_or(true, |s| edge.timestamp >= s) && self.end.map_or(true, |e| edge.timestamp <= e)
    }

    /// Matching nodes, plus the edges whose endpoints both match
    pub fn apply(&self, graph: &TemporalGraph) -> GraphView {
        let nodes: Vec<Node> = graph
            .nodes_matching(|n| self.matches(n))
            .into_iter()
            .cloned()
            .collect();
        let kept: HashSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        let edges = graph
            .edges()
            .filter(|e| kept.contains(&e.source_id) && kept.contains(&e.target_id))
            .filter(|e| self.edge_in_window(e))
            .cloned()
            .collect();
        GraphView { nodes, edges }
    }
}

/// A filtered subgraph. No edge references a node outside `nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphView {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphView {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeType;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn graph() -> TemporalGraph {
        let mut g = TemporalGraph::new();
        g.add_node(Node::new("alice", NodeType::Actor, "Alice").with_risk_score(0.9).with_relevance_score(0.8))
            .unwrap();
        g.add_node(Node::new("bob", NodeType::Actor, "Bob").with_risk_score(0.7).with_relevance_score(0.2))
            .unwrap();
        g.add_node(Node::new("plan.docx", NodeType::Artifact, "plan.docx").with_risk_score(0.3))
            .unwrap();
        g.add_edge(Edge::new("e1", "alice", "bob", EdgeType::Sent).with_timestamp(at(1)))
            .unwrap();
        g.add_edge(Edge::new("e2", "bob", "plan.docx", EdgeType::Accessed).with_timestamp(at(2)))
            .unwrap();
        g.add_edge(Edge::new("e3", "bob", "alice", EdgeType::Received).with_timestamp(at(9)))
            .unwrap();
        g.set_flag(&NodeId::from("bob"), true).unwrap();
        g
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let view = GraphFilter::new().apply(&graph());
        assert_eq!((view.node_count(), view.edge_count()), (3, 3));
    }

    #[test]
    fn filters_are_conjunctive() {
        let g = graph();
        let view = GraphFilter::new().min_risk(0.6).apply(&g);
        assert_eq!(view.node_count(), 2);
        let view = GraphFilter::new().min_risk(0.6).min_relevance(0.5).apply(&g);
        assert_eq!(view.nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), ["alice"]);
        let view = GraphFilter::new().min_risk(0.6).flagged_only().apply(&g);
        assert_eq!(view.nodes[0].id.as_str(), "bob");
        assert!(GraphFilter::new().critical_only().apply(&g).nodes.is_empty());
    }

    #[test]
    fn edges_never_dangle() {
        let view = GraphFilter::new().min_risk(0.6).apply(&graph());
        let ids: HashSet<_> = view.nodes.iter().map(|n| n.id.clone()).collect();
        assert_eq!(view.edge_count(), 2);
        assert!(view
            .edges
            .iter()
            .all(|e| ids.contains(&e.source_id) && ids.contains(&e.target_id)));
    }

    #[test]
    fn type_and_level_filters() {
        let g = graph();
        let view = GraphFilter::new().with_node_type(NodeType::Artifact).apply(&g);
        assert_eq!(view.node_count(), 1);
        assert!(view.edges.is_empty());
        let view = GraphFilter::new()
            .with_risk_level(RiskLevel::Critical)
            .with_risk_level(RiskLevel::High)
            .apply(&g);
        assert_eq!(view.node_count(), 2);
    }

    #[test]
    fn time_window_bounds_edges_inclusively() {
        let view = GraphFilter::new().between(at(1), at(2)).apply(&graph());
        assert_eq!(view.node_count(), 3);
        let ids: Vec<_> = view.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["e1", "e2"]);
    }
}
