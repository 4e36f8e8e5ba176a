//! TemporalGraph: typed nodes and timestamped edges with derived metrics

use super::edge::{Edge, EdgeId};
use super::engine::{GraphError, GraphResult, RecordKind};
use super::node::{Node, NodeId, NodeType};
use crate::query::{CriticalNodeRanker, RankedNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Direction for neighbour lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Follow outgoing edges (source -> target)
    Outgoing,
    /// Follow incoming edges (target <- source)
    Incoming,
    /// Follow edges in both directions
    #[default]
    Both,
}

/// Aggregate metadata maintained alongside the node and edge sets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Earliest edge timestamp
    pub start: Option<DateTime<Utc>>,
    /// Latest edge timestamp
    pub end: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Scores produced by one predictor pass for a single node
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NodeScores {
    pub risk: f32,
    pub relevance: f32,
    pub forecast: Option<f32>,
}

/// Serialized form of a graph. Indices and degrees are rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub metadata: GraphMetadata,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// The full temporal entity graph
///
/// Nodes are kept in id order so every pass over the graph (and every
/// numeric reduction built on it) visits them identically. Edges are stored
/// once, directed; neighbour views come from separate source and target
/// indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphSnapshot", into = "GraphSnapshot")]
pub struct TemporalGraph {
    nodes: BTreeMap<NodeId, Node>,
    edges: Vec<Edge>,
    edge_ids: HashSet<EdgeId>,
    outgoing: HashMap<NodeId, Vec<usize>>,
    incoming: HashMap<NodeId, Vec<usize>>,
    metadata: GraphMetadata,
}

impl TemporalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Fails if the id is already present.
    pub fn add_node(&mut self, mut node: Node) -> GraphResult<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateId {
                kind: RecordKind::Node,
                id: node.id.to_string(),
            });
        }
        node.normalize();
        self.nodes.insert(node.id.clone(), node);
        self.metadata.total_nodes = self.nodes.len();
        self.touch();
        Ok(())
    }

    /// Add an edge. Both endpoints must already exist.
    ///
    /// Degrees of both endpoints are recomputed from the index before
    /// returning.
    pub fn add_edge(&mut self, mut edge: Edge) -> GraphResult<()> {
        edge.normalize();
        if self.edge_ids.contains(&edge.id) {
            return Err(GraphError::DuplicateId {
                kind: RecordKind::Edge,
                id: edge.id.to_string(),
            });
        }
        for endpoint in [&edge.source_id, &edge.target_id] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::DanglingReference {
                    edge: edge.id.clone(),
                    missing: endpoint.clone(),
                });
            }
        }

        let idx = self.edges.len();
        let source = edge.source_id.clone();
        let target = edge.target_id.clone();

        self.metadata.start = Some(match self.metadata.start {
            Some(s) if s <= edge.timestamp => s,
            _ => edge.timestamp,
        });
        self.metadata.end = Some(match self.metadata.end {
            Some(e) if e >= edge.timestamp => e,
            _ => edge.timestamp,
        });

        self.edge_ids.insert(edge.id.clone());
        self.outgoing.entry(source.clone()).or_default().push(idx);
        self.incoming.entry(target.clone()).or_default().push(idx);
        self.edges.push(edge);

        self.recompute_degrees(&source);
        if target != source {
            self.recompute_degrees(&target);
        }
        self.metadata.total_edges = self.edges.len();
        self.touch();
        Ok(())
    }

    fn recompute_degrees(&mut self, id: &NodeId) {
        let out_degree = self.outgoing.get(id).map_or(0, Vec::len);
        let in_degree = self.incoming.get(id).map_or(0, Vec::len);
        if let Some(node) = self.nodes.get_mut(id) {
            node.set_degrees(in_degree, out_degree);
        }
    }

    /// Get a node by ID
    pub fn get_node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes, in id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All edges, in insertion order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    /// Observed edge time span, if any edges exist
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.metadata.start.zip(self.metadata.end)
    }

    /// `(neighbor_id, edge)` pairs for a node.
    ///
    /// Computed from the edge indices on every call. With `Both`, outgoing
    /// pairs come first, then incoming.
    pub fn neighbors<'a>(
        &'a self,
        id: &NodeId,
        direction: Direction,
    ) -> GraphResult<impl Iterator<Item = (&'a NodeId, &'a Edge)> + 'a> {
        if !self.nodes.contains_key(id) {
            return Err(GraphError::NodeNotFound(id.clone()));
        }
        let out = match direction {
            Direction::Outgoing | Direction::Both => self.outgoing.get(id),
            Direction::Incoming => None,
        };
        let inc = match direction {
            Direction::Incoming | Direction::Both => self.incoming.get(id),
            Direction::Outgoing => None,
        };
        let edges = &self.edges;
        let outgoing = out.into_iter().flatten().map(move |&i| {
            let e = &edges[i];
            (&e.target_id, e)
        });
        let incoming = inc.into_iter().flatten().map(move |&i| {
            let e = &edges[i];
            (&e.source_id, e)
        });
        Ok(outgoing.chain(incoming))
    }

    /// Distinct neighbour ids over both directions, sorted, excluding `id`
    pub fn distinct_neighbors(&self, id: &NodeId) -> GraphResult<Vec<&NodeId>> {
        let mut ids: Vec<&NodeId> = self
            .neighbors(id, Direction::Both)?
            .map(|(n, _)| n)
            .filter(|n| *n != id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Edges with `id` as source or target
    pub fn incident_edges(&self, id: &NodeId) -> GraphResult<Vec<&Edge>> {
        let mut seen = HashSet::new();
        Ok(self
            .neighbors(id, Direction::Both)?
            .map(|(_, e)| e)
            .filter(|e| seen.insert(&e.id))
            .collect())
    }

    pub fn nodes_by_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.node_type == node_type)
    }

    /// Nodes satisfying a predicate, in id order
    pub fn nodes_matching<F>(&self, predicate: F) -> Vec<&Node>
    where
        F: Fn(&Node) -> bool,
    {
        self.nodes.values().filter(|n| predicate(n)).collect()
    }

    /// Top `top_k` nodes by `ranker`'s composite score
    pub fn critical_nodes(&self, ranker: &CriticalNodeRanker, top_k: usize) -> Vec<RankedNode> {
        ranker.top_k(self, top_k)
    }

    /// Set or clear the investigation flag on a node
    pub fn set_flag(&mut self, id: &NodeId, flagged: bool) -> GraphResult<()> {
        self.node_mut(id)?.set_flagged(flagged);
        self.touch();
        Ok(())
    }

    /// Append a free-text investigation note to a node
    pub fn append_note(&mut self, id: &NodeId, note: impl Into<String>) -> GraphResult<()> {
        self.node_mut(id)?.push_note(note.into());
        self.touch();
        Ok(())
    }

    fn node_mut(&mut self, id: &NodeId) -> GraphResult<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))
    }

    pub(crate) fn write_scores(&mut self, id: &NodeId, scores: NodeScores) -> GraphResult<()> {
        let node = self.node_mut(id)?;
        node.set_risk_score(scores.risk);
        node.set_relevance_score(scores.relevance);
        node.set_forecasted_risk(scores.forecast);
        Ok(())
    }

    pub(crate) fn set_embedding(&mut self, id: &NodeId, embedding: Vec<f32>) -> GraphResult<()> {
        self.node_mut(id)?.embedding = Some(embedding);
        Ok(())
    }

    pub(crate) fn set_critical(&mut self, id: &NodeId, critical: bool) -> GraphResult<()> {
        self.node_mut(id)?.set_critical(critical);
        Ok(())
    }

    pub(crate) fn edges_mut(&mut self) -> impl Iterator<Item = &mut Edge> {
        self.edges.iter_mut()
    }

    pub(crate) fn touch(&mut self) {
        self.metadata.updated_at = Some(Utc::now());
    }

    /// Export nodes and edges in their serialized form
    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            metadata: self.metadata.clone(),
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.clone(),
        }
    }
}

impl TryFrom<GraphSnapshot> for TemporalGraph {
    type Error = GraphError;

    fn try_from(snapshot: GraphSnapshot) -> Result<Self, Self::Error> {
        let mut graph = TemporalGraph::new();
        for node in snapshot.nodes {
            graph.add_node(node)?;
        }
        for edge in snapshot.edges {
            graph.add_edge(edge)?;
        }
        graph.metadata.updated_at = snapshot.metadata.updated_at;
        Ok(graph)
    }
}

impl From<TemporalGraph> for GraphSnapshot {
    fn from(graph: TemporalGraph) -> Self {
        GraphSnapshot {
            metadata: graph.metadata,
            nodes: graph.nodes.into_values().collect(),
            edges: graph.edges,
        }
    }
}
