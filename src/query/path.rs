//! Investigation path finding

use super::types::{InvestigationPath, QueryError, QueryResult};
use crate::graph::{Direction, Edge, NodeId, TemporalGraph};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// Bounded, risk-qualified breadth-first search from a start node.
///
/// Edges are followed in both directions, but only into nodes whose risk is
/// at least `min_risk`; lower-risk nodes are neither expanded nor included.
/// Paths are simple (no node repeats). The result maximises the summed risk
/// of its nodes (start included), preferring fewer hops and then the
/// lexicographically smaller id sequence.
///
/// Each BFS layer keeps only the best path ending at each node, so a search
/// costs O(max_depth² · edges) rather than one branch per simple path. A
/// discarded path to a node is never revisited, even when its extensions
/// could have avoided a node the kept path already uses.
#[derive(Debug, Clone)]
pub struct InvestigationPathQuery {
    pub start: NodeId,
    pub max_depth: usize,
    pub min_risk: f32,
}

/// One hop in the search arena; `parent` points at the previous hop
struct Step<'a> {
    node: &'a NodeId,
    edge: Option<&'a Edge>,
    parent: Option<usize>,
    score: f32,
    hops: usize,
}

/// Arena indices from the start to `idx`
fn trail(arena: &[Step<'_>], idx: usize) -> Vec<usize> {
    let mut out = vec![idx];
    let mut at = idx;
    while let Some(parent) = arena[at].parent {
        out.push(parent);
        at = parent;
    }
    out.reverse();
    out
}

fn on_path(arena: &[Step<'_>], idx: usize, id: &NodeId) -> bool {
    let mut at = Some(idx);
    while let Some(i) = at {
        if arena[i].node == id {
            return true;
        }
        at = arena[i].parent;
    }
    false
}

/// `Less` when the path ending at `a` is the better one
fn rank(arena: &[Step<'_>], a: usize, b: usize) -> Ordering {
    let (x, y) = (&arena[a], &arena[b]);
    y.score
        .total_cmp(&x.score)
        .then_with(|| x.hops.cmp(&y.hops))
        .then_with(|| {
            let xs = trail(arena, a).into_iter().map(|i| arena[i].node);
            let ys = trail(arena, b).into_iter().map(|i| arena[i].node);
            xs.cmp(ys)
        })
}

impl InvestigationPathQuery {
    pub fn starting_at(start: impl Into<NodeId>) -> Self {
        Self {
            start: start.into(),
            max_depth: 3,
            min_risk: 0.5,
        }
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn min_risk(mut self, min_risk: f32) -> Self {
        self.min_risk = min_risk;
        self
    }

    pub fn execute(&self, graph: &TemporalGraph) -> QueryResult<InvestigationPath> {
        let start = graph
            .get_node(&self.start)
            .ok_or_else(|| QueryError::NodeNotFound(self.start.clone()))?;

        let mut arena = vec![Step {
            node: &start.id,
            edge: None,
            parent: None,
            score: start.risk_score(),
            hops: 0,
        }];
        let mut frontier = vec![0usize];
        let mut best: Option<usize> = None;
        let mut explored = 0usize;

        for _ in 0..self.max_depth {
            let mut layer: BTreeMap<&NodeId, usize> = BTreeMap::new();
            for &idx in &frontier {
                let last = arena[idx].node;
                let (score, hops) = (arena[idx].score, arena[idx].hops);
                let neighbors = graph
                    .neighbors(last, Direction::Both)
                    .map_err(|_| QueryError::NodeNotFound(last.clone()))?;

                let mut seen = HashSet::new();
                for (next_id, edge) in neighbors {
                    if !seen.insert(next_id) || on_path(&arena, idx, next_id) {
                        continue;
                    }
                    let Some(next) = graph.get_node(next_id) else {
                        continue;
                    };
                    if next.risk_score() < self.min_risk {
                        continue;
                    }
                    explored += 1;

                    arena.push(Step {
                        node: next_id,
                        edge: Some(edge),
                        parent: Some(idx),
                        score: score + next.risk_score(),
                        hops: hops + 1,
                    });
                    let candidate = arena.len() - 1;
                    let keep = layer
                        .get(next_id)
                        .map_or(true, |&kept| rank(&arena, candidate, kept) == Ordering::Less);
                    if keep {
                        layer.insert(next_id, candidate);
                    }
                }
            }

            frontier = layer.into_values().collect();
            for &idx in &frontier {
                if best.map_or(true, |b| rank(&arena, idx, b) == Ordering::Less) {
                    best = Some(idx);
                }
            }
            if frontier.is_empty() {
                break;
            }
        }

        tracing::debug!(
            start = %self.start,
            max_depth = self.max_depth,
            min_risk = self.min_risk,
            explored,
            "investigation path search finished"
        );

        let best = best.ok_or_else(|| QueryError::NoQualifyingPath {
            start: self.start.clone(),
            max_depth: self.max_depth,
            min_risk: self.min_risk,
        })?;
        let steps = trail(&arena, best);
        Ok(InvestigationPath {
            nodes: steps
                .iter()
                .filter_map(|&i| graph.get_node(arena[i].node).cloned())
                .collect(),
            edges: steps.iter().filter_map(|&i| arena[i].edge.cloned()).collect(),
            total_risk: arena[best].score,
        })
    }
}
