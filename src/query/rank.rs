//! Critical node ranking

use super::types::RankedNode;
use crate::graph::{GraphResult, Node, TemporalGraph};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Ranks nodes by `risk_weight * risk + relevance_weight * relevance`.
///
/// Ties fall back to higher total degree, then earlier creation time, then
/// node id, so the order is total and deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriticalNodeRanker {
    pub risk_weight: f32,
    pub relevance_weight: f32,
    /// Composite score at or above which a node is critical
    pub critical_threshold: f32,
}

impl Default for CriticalNodeRanker {
    fn default() -> Self {
        Self {
            risk_weight: 0.6,
            relevance_weight: 0.4,
            critical_threshold: 0.75,
        }
    }
}

impl CriticalNodeRanker {
    pub fn new(risk_weight: f32, relevance_weight: f32, critical_threshold: f32) -> Self {
        Self {
            risk_weight,
            relevance_weight,
            critical_threshold,
        }
    }

    pub fn composite(&self, node: &Node) -> f32 {
        self.risk_weight * node.risk_score() + self.relevance_weight * node.relevance_score()
    }

    pub fn is_critical(&self, node: &Node) -> bool {
        self.composite(node) >= self.critical_threshold
    }

    /// Every node, best first
    pub fn rank(&self, graph: &TemporalGraph) -> Vec<RankedNode> {
        let mut scored: Vec<(f32, &Node)> = graph.nodes().map(|n| (self.composite(n), n)).collect();
        scored.sort_by(|a, b| compare(a, b));
        scored
            .into_iter()
            .map(|(composite, node)| RankedNode {
                node: node.clone(),
                composite,
            })
            .collect()
    }

    /// The first `k` entries of `rank`
    pub fn top_k(&self, graph: &TemporalGraph, k: usize) -> Vec<RankedNode> {
        let mut ranked = self.rank(graph);
        ranked.truncate(k);
        ranked
    }

    /// Recompute `is_critical` on every node. Returns how many are critical.
    pub fn mark_critical(&self, graph: &mut TemporalGraph) -> GraphResult<usize> {
        let verdicts: Vec<_> = graph
            .nodes()
            .map(|n| (n.id.clone(), self.is_critical(n)))
            .collect();
        let mut critical = 0;
        for (id, is_critical) in verdicts {
            graph.set_critical(&id, is_critical)?;
            critical += usize::from(is_critical);
        }
        tracing::debug!(critical, threshold = self.critical_threshold, "marked critical nodes");
        Ok(critical)
    }
}

fn compare(a: &(f32, &Node), b: &(f32, &Node)) -> Ordering {
    b.0.total_cmp(&a.0)
        .then_with(|| b.1.degree().cmp(&a.1.degree()))
        .then_with(|| a.1.created_at.cmp(&b.1.created_at))
        .then_with(|| a.1.id.cmp(&b.1.id))
}
