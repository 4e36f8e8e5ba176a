//! GraphProcessor: embed, encode, predict and write scores back
//!
//! A run never touches the caller's graph. It works on a copy and hands the
//! scored copy back, so a failure at any stage leaves the previous scores
//! live and queryable.

use crate::embedding::{EmbeddingError, EmbeddingGenerator};
use crate::graph::{clamp_unit, GraphError, Node, NodeId, NodeScores, RiskLevel, TemporalGraph};
use crate::model::{EncoderInput, InferenceModel, ModelError};
use crate::query::{CriticalNodeRanker, QueryError, QueryResult};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort a scoring run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("model failed: {0}")]
    Model(#[from] ModelError),

    #[error("graph update failed: {0}")]
    Graph(#[from] GraphError),

    #[error("node {node} has a {actual}-wide embedding, model expects {expected}")]
    EmbeddingWidth {
        node: NodeId,
        expected: usize,
        actual: usize,
    },

    #[error("embedding backend produces {backend}-wide vectors, model expects {model}")]
    IncompatibleModel { backend: usize, model: usize },
}

/// Result type for scoring runs
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Tunables for a scoring run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessorConfig {
    /// Periods ahead for the forecasts stored on nodes
    pub forecast_horizon: usize,
    /// Endpoint risk difference above which an edge is marked anomalous
    pub anomaly_gap: f32,
    pub ranker: CriticalNodeRanker,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            forecast_horizon: 3,
            anomaly_gap: 0.4,
            ranker: CriticalNodeRanker::default(),
        }
    }
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub nodes_scored: usize,
    /// Nodes that had no stored embedding before the run
    pub newly_embedded: usize,
    pub forecasts: usize,
    /// Nodes whose classifier level differs from the threshold level
    pub level_disagreements: usize,
    /// Edges newly marked anomalous
    pub anomalies_marked: usize,
    pub critical: usize,
}

/// Scoring orchestrator. Owns the embedding generator and the model.
pub struct GraphProcessor {
    embeddings: Arc<EmbeddingGenerator>,
    model: Arc<dyn InferenceModel>,
    config: ProcessorConfig,
}

impl std::fmt::Debug for GraphProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphProcessor")
            .field("model", &self.model.name())
            .field("dimension", &self.embeddings.dimension())
            .field("config", &self.config)
            .finish()
    }
}

impl GraphProcessor {
    pub fn new(embeddings: Arc<EmbeddingGenerator>, model: Arc<dyn InferenceModel>) -> Self {
        Self {
            embeddings,
            model,
            config: ProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn ranker(&self) -> &CriticalNodeRanker {
        &self.config.ranker
    }

    pub fn embeddings(&self) -> &EmbeddingGenerator {
        &self.embeddings
    }

    pub fn model(&self) -> &dyn InferenceModel {
        self.model.as_ref()
    }

    /// Score a copy of `graph`.
    ///
    /// Nodes without a stored embedding are embedded first; the encoder and
    /// all heads then run once over the whole graph. Flags, notes and degrees
    /// are carried over unchanged. Running twice on the same input gives the
    /// same scores.
    pub fn process(&self, graph: &TemporalGraph) -> PipelineResult<(TemporalGraph, ProcessReport)> {
        let expected = self.model.input_dim();
        if self.embeddings.dimension() != expected {
            return Err(PipelineError::IncompatibleModel {
                backend: self.embeddings.dimension(),
                model: expected,
            });
        }
        tracing::info!(
            model = self.model.name(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "scoring run started"
        );

        let mut scored = graph.clone();
        let mut report = ProcessReport {
            nodes_scored: scored.node_count(),
            ..ProcessReport::default()
        };

        report.newly_embedded = self.embed_missing(&mut scored)?;
        let embeddings = stored_embeddings(&scored, expected)?;

        let input = EncoderInput::from_graph(&scored, &embeddings)?;
        let predictions = self.model.predict(&input)?;
        if predictions.len() != scored.node_count() {
            return Err(ModelError::ShapeMismatch {
                what: "predictions",
                expected: scored.node_count(),
                actual: predictions.len(),
            }
            .into());
        }

        let contributions = risk_contributions(&scored);
        let updates: Vec<(NodeId, NodeScores, RiskLevel)> = scored
            .nodes()
            .zip(&predictions)
            .map(|(node, p)| {
                let boost = contributions.get(&node.id).copied().unwrap_or(0.0);
                let forecast = node
                    .activity_trend
                    .as_deref()
                    .and_then(|t| self.model.forecast(t, self.config.forecast_horizon));
                let scores = NodeScores {
                    risk: p.risk_score + boost,
                    relevance: p.relevance_score,
                    forecast,
                };
                (node.id.clone(), scores, p.risk_class)
            })
            .collect();

        for (id, scores, class_level) in updates {
            report.forecasts += usize::from(scores.forecast.is_some());
            scored.write_scores(&id, scores)?;
            let stored = scored.get_node(&id).map(Node::risk_level).unwrap_or_default();
            if stored != class_level {
                report.level_disagreements += 1;
                tracing::debug!(
                    node = %id,
                    threshold = %stored,
                    classifier = %class_level,
                    "risk level disagreement, threshold kept"
                );
            }
        }

        report.anomalies_marked = mark_anomalies(&mut scored, self.config.anomaly_gap);
        report.critical = self.config.ranker.mark_critical(&mut scored)?;
        scored.touch();

        tracing::info!(
            nodes = report.nodes_scored,
            embedded = report.newly_embedded,
            forecasts = report.forecasts,
            disagreements = report.level_disagreements,
            anomalies = report.anomalies_marked,
            critical = report.critical,
            "scoring run finished"
        );
        Ok((scored, report))
    }

    /// Forecast one node's risk `horizon` periods ahead without storing it.
    ///
    /// `Ok(None)` when the node has no activity trend.
    pub fn forecast(&self, graph: &TemporalGraph, id: &NodeId, horizon: usize) -> QueryResult<Option<f32>> {
        let node = graph.get_node(id).ok_or_else(|| QueryError::NodeNotFound(id.clone()))?;
        Ok(node
            .activity_trend
            .as_deref()
            .and_then(|t| self.model.forecast(t, horizon))
            .map(|f| clamp_unit(f, "forecasted_risk", id.as_str())))
    }

    fn embed_missing(&self, graph: &mut TemporalGraph) -> PipelineResult<usize> {
        let missing: Vec<&Node> = graph
            .nodes()
            .filter(|n| n.embedding.as_ref().map_or(true, Vec::is_empty))
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }
        let vectors = self.embeddings.embed_all(&missing)?;
        let ids: Vec<NodeId> = missing.iter().map(|n| n.id.clone()).collect();
        for (id, vector) in ids.iter().zip(vectors) {
            graph.set_embedding(id, vector)?;
        }
        Ok(ids.len())
    }
}

/// Every node's embedding in node order, checked against the model width
fn stored_embeddings(graph: &TemporalGraph, expected: usize) -> PipelineResult<Vec<Vec<f32>>> {
    graph
        .nodes()
        .map(|n| {
            let vector = n.embedding.clone().unwrap_or_default();
            if vector.len() != expected {
                return Err(PipelineError::EmbeddingWidth {
                    node: n.id.clone(),
                    expected,
                    actual: vector.len(),
                });
            }
            Ok(vector)
        })
        .collect()
}

/// Confidence-weighted sum of `risk_contribution` over each node's edges
fn risk_contributions(graph: &TemporalGraph) -> HashMap<NodeId, f32> {
    let mut sums: HashMap<NodeId, f32> = HashMap::new();
    for edge in graph.edges() {
        let amount = edge.risk_contribution * edge.confidence;
        if amount <= 0.0 {
            continue;
        }
        *sums.entry(edge.source_id.clone()).or_insert(0.0) += amount;
        if edge.target_id != edge.source_id {
            *sums.entry(edge.target_id.clone()).or_insert(0.0) += amount;
        }
    }
    sums
}

/// Mark edges whose endpoint risks differ by more than `gap`. Returns how
/// many were newly marked; existing marks are kept.
fn mark_anomalies(graph: &mut TemporalGraph, gap: f32) -> usize {
    let risk: HashMap<NodeId, f32> = graph.nodes().map(|n| (n.id.clone(), n.risk_score())).collect();
    let mut marked = 0;
    for edge in graph.edges_mut() {
        if edge.is_anomalous {
            continue;
        }
        let (Some(s), Some(t)) = (risk.get(&edge.source_id), risk.get(&edge.target_id)) else {
            continue;
        };
        if (s - t).abs() > gap {
            edge.is_anomalous = true;
            marked += 1;
        }
    }
    marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, EmbeddingResult, HashingEmbedder};
    use crate::graph::{Edge, EdgeType, NodeType};
    use crate::model::{ModelConfig, ModelResult, NodePrediction, PredictiveGnn};

    /// Returns the same prediction for every node
    struct FixedModel {
        risk: f32,
        relevance: f32,
        class: RiskLevel,
    }

    impl InferenceModel for FixedModel {
        fn input_dim(&self) -> usize {
            8
        }

        fn predict(&self, input: &EncoderInput) -> ModelResult<Vec<NodePrediction>> {
            Ok((0..input.node_count())
                .map(|_| NodePrediction {
                    risk_score: self.risk,
                    risk_class: self.class,
                    class_probabilities: [0.25; 4],
                    relevance_score: self.relevance,
                })
                .collect())
        }

        fn forecast(&self, trend: &[f32], _horizon: usize) -> Option<f32> {
            trend.last().copied()
        }
    }

    struct Offline;

    impl Embedder for Offline {
        fn embed_batch(&self, _texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
            Err(EmbeddingError::Unavailable("offline".into()))
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    fn hashing(dim: usize) -> Arc<EmbeddingGenerator> {
        Arc::new(EmbeddingGenerator::new(Arc::new(HashingEmbedder::new(dim))))
    }

    fn fixed(risk: f32, relevance: f32, class: RiskLevel) -> GraphProcessor {
        GraphProcessor::new(hashing(8), Arc::new(FixedModel { risk, relevance, class }))
    }

    fn gnn() -> GraphProcessor {
        let config = ModelConfig {
            input_dim: 16,
            hidden_dim: 8,
            num_layers: 2,
            ..ModelConfig::default()
        };
        GraphProcessor::new(hashing(16), Arc::new(PredictiveGnn::new(config).unwrap()))
    }

    fn graph() -> TemporalGraph {
        let mut g = TemporalGraph::new();
        g.add_node(
            Node::new("jane", NodeType::Actor, "Jane Smith")
                .with_meta("department", "Finance")
                .with_activity_trend(vec![0.2, 0.4, 0.9]),
        )
        .unwrap();
        g.add_node(Node::new("ledger.xlsx", NodeType::Artifact, "ledger.xlsx")).unwrap();
        g.add_node(Node::new("deals", NodeType::Channel, "#deals")).unwrap();
        g.add_node(Node::new("memo", NodeType::Message, "Re: Q3 numbers")).unwrap();
        g.add_edge(Edge::new("e1", "jane", "ledger.xlsx", EdgeType::Edited)).unwrap();
        g.add_edge(Edge::new("e2", "jane", "deals", EdgeType::MemberOf)).unwrap();
        g.add_edge(Edge::new("e3", "memo", "deals", EdgeType::SharedIn)).unwrap();
        g.set_flag(&"memo".into(), true).unwrap();
        g.append_note(&"memo".into(), "mentions offshore account").unwrap();
        g
    }

    #[test]
    fn gnn_scores_are_bounded_and_levels_consistent() {
        let (scored, report) = gnn().process(&graph()).unwrap();
        assert_eq!(report.nodes_scored, 4);
        assert_eq!(report.newly_embedded, 4);
        for node in scored.nodes() {
            assert!((0.0..=1.0).contains(&node.risk_score()));
            assert!((0.0..=1.0).contains(&node.relevance_score()));
            assert_eq!(node.risk_level(), RiskLevel::from_score(node.risk_score()));
            assert_eq!(node.embedding.as_ref().map(Vec::len), Some(16));
        }
    }

    #[test]
    fn rerun_is_bit_identical() {
        let processor = gnn();
        let (first, _) = processor.process(&graph()).unwrap();
        let (second, report) = processor.process(&first).unwrap();
        assert_eq!(report.newly_embedded, 0);
        for (a, b) in first.nodes().zip(second.nodes()) {
            assert_eq!(a.risk_score().to_bits(), b.risk_score().to_bits());
            assert_eq!(a.relevance_score().to_bits(), b.relevance_score().to_bits());
            assert_eq!(a.forecasted_risk(), b.forecasted_risk());
            assert_eq!(a.embedding, b.embedding);
        }
    }

    #[test]
    fn forecast_only_for_nodes_with_trends() {
        let (scored, report) = gnn().process(&graph()).unwrap();
        assert_eq!(report.forecasts, 1);
        assert!(scored.get_node(&"jane".into()).unwrap().forecasted_risk().is_some());
        assert_eq!(scored.get_node(&"deals".into()).unwrap().forecasted_risk(), None);
    }

    #[test]
    fn flags_notes_and_degrees_survive() {
        let g = graph();
        let (scored, _) = fixed(0.3, 0.3, RiskLevel::Low).process(&g).unwrap();
        let memo = scored.get_node(&"memo".into()).unwrap();
        assert!(memo.is_flagged());
        assert_eq!(memo.investigation_notes(), ["mentions offshore account"]);
        for (before, after) in g.nodes().zip(scored.nodes()) {
            assert_eq!(before.degree(), after.degree());
        }
    }

    #[test]
    fn edge_contributions_raise_risk_before_clamping() {
        let mut g = graph();
        g.add_edge(
            Edge::new("hot", "ledger.xlsx", "memo", EdgeType::CollaboratedWith)
                .with_risk_contribution(0.5)
                .with_confidence(0.5),
        )
        .unwrap();
        let (scored, _) = fixed(0.3, 0.3, RiskLevel::Low).process(&g).unwrap();
        let risk = |id: &str| scored.get_node(&id.into()).unwrap().risk_score();
        assert!((risk("ledger.xlsx") - 0.55).abs() < 1e-6);
        assert!((risk("memo") - 0.55).abs() < 1e-6);
        assert!((risk("jane") - 0.3).abs() < 1e-6);

        let (saturated, _) = fixed(0.9, 0.3, RiskLevel::Critical).process(&g).unwrap();
        assert_eq!(saturated.get_node(&"memo".into()).unwrap().risk_score(), 1.0);
    }

    #[test]
    fn threshold_level_wins_over_classifier() {
        let (scored, report) = fixed(0.3, 0.3, RiskLevel::Critical).process(&graph()).unwrap();
        assert_eq!(report.level_disagreements, 4);
        assert!(scored.nodes().all(|n| n.risk_level() == RiskLevel::Low));
    }

    #[test]
    fn anomalies_and_critical_marks() {
        let mut g = graph();
        g.add_edge(
            Edge::new("spike", "jane", "memo", EdgeType::Sent)
                .with_risk_contribution(0.6)
                .with_confidence(1.0),
        )
        .unwrap();
        let (scored, report) = fixed(0.3, 0.9, RiskLevel::Low).process(&g).unwrap();
        // jane and memo are lifted to 0.9; their edges to 0.3 nodes exceed the gap
        assert_eq!(report.anomalies_marked, 3);
        assert!(!scored.edges().find(|e| e.id.as_str() == "spike").unwrap().is_anomalous);
        assert_eq!(report.critical, 2);
        assert!(scored.get_node(&"jane".into()).unwrap().is_critical());
        assert!(!scored.get_node(&"deals".into()).unwrap().is_critical());

        let (_, again) = fixed(0.3, 0.9, RiskLevel::Low).process(&scored).unwrap();
        assert_eq!(again.anomalies_marked, 0);
    }

    #[test]
    fn unavailable_backend_aborts_without_touching_input() {
        let processor = GraphProcessor::new(
            Arc::new(EmbeddingGenerator::new(Arc::new(Offline))),
            Arc::new(FixedModel {
                risk: 0.5,
                relevance: 0.5,
                class: RiskLevel::Medium,
            }),
        );
        let g = graph();
        let err = processor.process(&g).unwrap_err();
        assert!(matches!(err, PipelineError::Embedding(EmbeddingError::Unavailable(_))));
        assert!(g.nodes().all(|n| n.embedding.is_none() && n.risk_score() == 0.0));
    }

    #[test]
    fn stored_embeddings_skip_the_backend() {
        let mut g = TemporalGraph::new();
        g.add_node(Node::new("a", NodeType::Actor, "A").with_embedding(vec![0.1; 8])).unwrap();
        let processor = GraphProcessor::new(
            Arc::new(EmbeddingGenerator::new(Arc::new(Offline))),
            Arc::new(FixedModel {
                risk: 0.5,
                relevance: 0.5,
                class: RiskLevel::Medium,
            }),
        );
        let (_, report) = processor.process(&g).unwrap();
        assert_eq!(report.newly_embedded, 0);
    }

    #[test]
    fn wrong_width_embedding_is_rejected() {
        let mut g = TemporalGraph::new();
        g.add_node(Node::new("a", NodeType::Actor, "A").with_embedding(vec![0.1; 3])).unwrap();
        let err = fixed(0.5, 0.5, RiskLevel::Medium).process(&g).unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingWidth { expected: 8, actual: 3, .. }));
    }

    #[test]
    fn incompatible_backend_is_rejected_up_front() {
        let model = FixedModel {
            risk: 0.5,
            relevance: 0.5,
            class: RiskLevel::Medium,
        };
        let processor = GraphProcessor::new(hashing(4), Arc::new(model));
        assert!(matches!(
            processor.process(&graph()),
            Err(PipelineError::IncompatibleModel { backend: 4, model: 8 })
        ));
    }

    #[test]
    fn forecast_query() {
        let processor = fixed(0.5, 0.5, RiskLevel::Medium);
        let g = graph();
        assert_eq!(processor.forecast(&g, &"jane".into(), 2).unwrap(), Some(0.9));
        assert_eq!(processor.forecast(&g, &"memo".into(), 2).unwrap(), None);
        assert_eq!(
            processor.forecast(&g, &"ghost".into(), 2).unwrap_err(),
            QueryError::NodeNotFound("ghost".into())
        );
    }

    #[test]
    fn out_of_range_forecasts_are_clamped() {
        let mut g = TemporalGraph::new();
        g.add_node(Node::new("hot", NodeType::Actor, "Hot").with_activity_trend(vec![0.2, 1.7]))
            .unwrap();
        g.add_node(Node::new("broken", NodeType::Actor, "Broken").with_activity_trend(vec![0.2, f32::NAN]))
            .unwrap();
        g.add_node(Node::new("cold", NodeType::Actor, "Cold").with_activity_trend(vec![0.2, -0.4]))
            .unwrap();
        let processor = fixed(0.5, 0.5, RiskLevel::Medium);

        assert_eq!(processor.forecast(&g, &"hot".into(), 1).unwrap(), Some(1.0));
        assert_eq!(processor.forecast(&g, &"broken".into(), 1).unwrap(), Some(0.0));
        assert_eq!(processor.forecast(&g, &"cold".into(), 1).unwrap(), Some(0.0));

        let (scored, _) = processor.process(&g).unwrap();
        assert_eq!(scored.get_node(&"broken".into()).unwrap().forecasted_risk(), Some(0.0));
    }
}
