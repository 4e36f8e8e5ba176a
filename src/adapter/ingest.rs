//! Ingest pipeline: sources → one validated TemporalGraph
//!
//! Pipeline steps:
//! 1. Each registered source produces its batch, in registration order
//! 2. Node records are merged by id across sources
//! 3. Edges are checked against the nodes known so far and deduplicated
//! 4. If too large a fraction of records was rejected, the run fails
//! 5. Otherwise the assembled graph and a report are returned

use super::report::{IngestError, IngestReport, IngestResult, Rejection, RejectionReason};
use super::traits::DataSource;
use crate::graph::{Edge, EdgeId, Node, NodeId, RecordKind, TemporalGraph};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Default maximum fraction of rejected records before a run fails
pub const DEFAULT_MAX_REJECTION_FRACTION: f32 = 0.25;

/// Assembles a graph from registered data sources.
///
/// The pipeline never touches a live graph. Callers swap the returned graph
/// in wholesale.
pub struct IngestPipeline {
    sources: Vec<Arc<dyn DataSource>>,
    max_rejection_fraction: f32,
}

impl Default for IngestPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestPipeline {
    /// Create a pipeline with no sources
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            max_rejection_fraction: DEFAULT_MAX_REJECTION_FRACTION,
        }
    }

    /// Register a source. Later sources win metadata conflicts.
    pub fn register_source(&mut self, source: Arc<dyn DataSource>) {
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.register_source(source);
        self
    }

    pub fn with_max_rejection_fraction(mut self, fraction: f32) -> Self {
        self.max_rejection_fraction = fraction;
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Run every source and assemble the result.
    pub async fn ingest(&self) -> IngestResult<(TemporalGraph, IngestReport)> {
        if self.sources.is_empty() {
            return Err(IngestError::NoSources);
        }

        let mut report = IngestReport::default();
        let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();
        let mut edges: Vec<Edge> = Vec::new();
        let mut edge_ids: HashSet<EdgeId> = HashSet::new();

        for source in &self.sources {
            let batch = source.produce().await.map_err(|error| IngestError::Source {
                source_id: source.id().to_string(),
                error,
            })?;
            report.sources += 1;
            report.records_produced += batch.len();

            let mut seen_here: HashSet<NodeId> = HashSet::new();
            for node in batch.nodes {
                if !seen_here.insert(node.id.clone()) {
                    reject(&mut report, source.id(), node.id.as_str(), RejectionReason::DuplicateId(RecordKind::Node));
                    continue;
                }
                match nodes.get_mut(&node.id) {
                    Some(existing) => {
                        merge_node(existing, node);
                        report.nodes_merged += 1;
                    }
                    None => {
                        nodes.insert(node.id.clone(), node);
                    }
                }
            }

            for mut edge in batch.edges {
                edge.normalize();
                if let Some(missing) = [&edge.source_id, &edge.target_id]
                    .into_iter()
                    .find(|id| !nodes.contains_key(*id))
                {
                    let reason = RejectionReason::DanglingReference(missing.clone());
                    reject(&mut report, source.id(), edge.id.as_str(), reason);
                    continue;
                }
                if !edge_ids.insert(edge.id.clone()) {
                    reject(&mut report, source.id(), edge.id.as_str(), RejectionReason::DuplicateId(RecordKind::Edge));
                    continue;
                }
                edges.push(edge);
            }
        }

        let fraction = report.rejection_fraction();
        if fraction > self.max_rejection_fraction {
            tracing::warn!(
                rejected = report.rejected(),
                produced = report.records_produced,
                max_fraction = self.max_rejection_fraction,
                "ingestion aborted"
            );
            return Err(IngestError::TooManyRejections {
                rejected: report.rejected(),
                produced: report.records_produced,
                max_fraction: self.max_rejection_fraction,
                rejections: report.rejections,
            });
        }

        let mut graph = TemporalGraph::new();
        for node in nodes.into_values() {
            graph.add_node(node)?;
        }
        for edge in edges {
            graph.add_edge(edge)?;
        }
        report.nodes_committed = graph.node_count();
        report.edges_committed = graph.edge_count();

        tracing::info!(
            sources = report.sources,
            nodes = report.nodes_committed,
            edges = report.edges_committed,
            merged = report.nodes_merged,
            rejected = report.rejected(),
            "ingestion complete"
        );
        Ok((graph, report))
    }
}

fn reject(report: &mut IngestReport, source: &str, record_id: &str, reason: RejectionReason) {
    tracing::warn!(source, record = record_id, reason = %reason, "record rejected");
    report.rejections.push(Rejection::new(source, record_id, reason));
}

/// Fold a later source's view of a node into the one already collected.
///
/// Metadata keys: last writer wins. Label, type, embedding and trend: last
/// non-empty writer wins. Timestamps keep the earliest creation and the
/// latest update/access. Flags are OR-ed and notes appended.
fn merge_node(existing: &mut Node, incoming: Node) {
    if incoming.is_flagged() {
        existing.set_flagged(true);
    }
    for note in incoming.investigation_notes() {
        existing.push_note(note.clone());
    }
    existing.metadata.extend(incoming.metadata);
    existing.node_type = incoming.node_type;
    if !incoming.label.is_empty() {
        existing.label = incoming.label;
    }
    if incoming.embedding.as_ref().is_some_and(|e| !e.is_empty()) {
        existing.embedding = incoming.embedding;
    }
    if incoming.activity_trend.as_ref().is_some_and(|t| !t.is_empty()) {
        existing.activity_trend = incoming.activity_trend;
    }
    existing.created_at = existing.created_at.min(incoming.created_at);
    existing.updated_at = existing.updated_at.max(incoming.updated_at);
    existing.last_accessed = existing.last_accessed.max(incoming.last_accessed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterError, DataSource, InMemorySource, SourceBatch};
    use crate::graph::{EdgeType, MetaValue, NodeType};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    fn actor(id: &str) -> Node {
        Node::new(id, NodeType::Actor, id)
    }

    fn source(id: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> Arc<dyn DataSource> {
        Arc::new(InMemorySource::new(id, nodes, edges))
    }

    struct FailingSource;

    #[async_trait]
    impl DataSource for FailingSource {
        fn id(&self) -> &str {
            "mail-export"
        }

        async fn produce(&self) -> Result<SourceBatch, AdapterError> {
            Err(AdapterError::Internal("export server unreachable".into()))
        }
    }

    #[tokio::test]
    async fn no_sources_is_an_error() {
        let pipeline = IngestPipeline::new();
        assert!(matches!(pipeline.ingest().await, Err(IngestError::NoSources)));
    }

    #[tokio::test]
    async fn merges_nodes_across_sources() {
        let early = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let from_hr = Node::new("custodian:kim", NodeType::Actor, "Kim Lee")
            .with_meta("department", "Sales")
            .with_meta("title", "Manager")
            .with_created_at(late);
        let from_mail = Node::new("custodian:kim", NodeType::Actor, "")
            .with_meta("department", "Legal")
            .with_created_at(early)
            .with_activity_trend(vec![0.2, 0.4]);

        let pipeline = IngestPipeline::new()
            .with_source(source("hr", vec![from_hr], vec![]))
            .with_source(source("mail", vec![from_mail], vec![]));
        let (graph, report) = pipeline.ingest().await.unwrap();

        assert_eq!(report.nodes_merged, 1);
        assert!(report.is_fully_committed());
        let kim = graph.get_node(&NodeId::from("custodian:kim")).unwrap();
        assert_eq!(kim.label, "Kim Lee");
        assert_eq!(kim.metadata["department"], MetaValue::from("Legal"));
        assert_eq!(kim.metadata["title"], MetaValue::from("Manager"));
        assert_eq!(kim.created_at, early);
        assert_eq!(kim.updated_at, late);
        assert_eq!(kim.activity_trend.as_deref(), Some(&[0.2, 0.4][..]));
    }

    #[tokio::test]
    async fn rejects_bad_records_but_keeps_the_rest() {
        let nodes = vec![actor("a"), actor("b"), actor("c"), actor("d"), actor("a")];
        let edges = vec![
            Edge::new("e1", "a", "b", EdgeType::Sent),
            Edge::new("e2", "b", "c", EdgeType::Sent),
            Edge::new("e3", "c", "d", EdgeType::Sent),
            Edge::new("e4", "d", "a", EdgeType::Sent),
            Edge::new("e5", "a", "ghost", EdgeType::Sent),
            Edge::new("e1", "c", "a", EdgeType::Received),
            Edge::new("e6", "a", "c", EdgeType::CollaboratedWith),
            Edge::new("e7", "b", "d", EdgeType::CollaboratedWith),
            Edge::new("e8", "c", "b", EdgeType::Sent),
        ];
        let pipeline = IngestPipeline::new().with_source(source("s", nodes, edges));
        let (graph, report) = pipeline.ingest().await.unwrap();

        assert_eq!(report.records_produced, 14);
        assert_eq!(report.rejected(), 3);
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 7);
        assert!(report
            .rejections
            .iter()
            .any(|r| r.reason == RejectionReason::DanglingReference(NodeId::from("ghost"))));
        assert!(report
            .rejections
            .iter()
            .any(|r| r.reason == RejectionReason::DuplicateId(RecordKind::Node)));
        assert!(report
            .rejections
            .iter()
            .any(|r| r.reason == RejectionReason::DuplicateId(RecordKind::Edge)));
    }

    #[tokio::test]
    async fn too_many_rejections_fail_the_run() {
        let nodes = vec![actor("a")];
        let edges = vec![
            Edge::new("e1", "a", "x", EdgeType::Sent),
            Edge::new("e2", "a", "y", EdgeType::Sent),
        ];
        let pipeline = IngestPipeline::new().with_source(source("s", nodes, edges));
        match pipeline.ingest().await {
            Err(IngestError::TooManyRejections { rejected, produced, rejections, .. }) => {
                assert_eq!((rejected, produced), (2, 3));
                assert_eq!(rejections.len(), 2);
            }
            other => panic!("expected TooManyRejections, got {:?}", other.map(|(_, r)| r)),
        }
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let nodes = vec![actor("a")];
        let edges = vec![Edge::new("e1", "a", "x", EdgeType::Sent)];
        let pipeline = IngestPipeline::new()
            .with_source(source("s", nodes, edges))
            .with_max_rejection_fraction(0.5);
        let (graph, report) = pipeline.ingest().await.unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(report.rejection_fraction(), 0.5);
    }

    #[tokio::test]
    async fn edges_may_reference_earlier_sources_only() {
        let first = source("people", vec![actor("a")], vec![Edge::new("early", "a", "b", EdgeType::Sent)]);
        let second = source(
            "more-people",
            vec![actor("b"), actor("c"), actor("d"), actor("e"), actor("f")],
            vec![Edge::new("late", "b", "a", EdgeType::Sent)],
        );
        let (graph, report) = IngestPipeline::new()
            .with_source(first)
            .with_source(second)
            .ingest()
            .await
            .unwrap();
        assert_eq!(report.rejected(), 1);
        assert_eq!(report.rejections[0].record_id, "early");
        assert_eq!(graph.edge_count(), 1);
    }

    #[tokio::test]
    async fn source_failure_aborts() {
        let pipeline = IngestPipeline::new()
            .with_source(source("ok", vec![actor("a")], vec![]))
            .with_source(Arc::new(FailingSource));
        match pipeline.ingest().await {
            Err(IngestError::Source { source_id, .. }) => assert_eq!(source_id, "mail-export"),
            other => panic!("expected source failure, got {:?}", other.map(|(_, r)| r)),
        }
    }

    #[tokio::test]
    async fn edges_without_ids_get_stable_ids() {
        let at = Utc.with_ymd_and_hms(2024, 3, 3, 3, 3, 3).unwrap();
        let edge = Edge::new("", "a", "b", EdgeType::Accessed).with_timestamp(at);
        let make = || {
            IngestPipeline::new().with_source(source("s", vec![actor("a"), actor("b")], vec![edge.clone()]))
        };
        let (g1, _) = make().ingest().await.unwrap();
        let (g2, _) = make().ingest().await.unwrap();
        let id1 = g1.edges().next().unwrap().id.clone();
        let id2 = g2.edges().next().unwrap().id.clone();
        assert!(!id1.is_empty());
        assert_eq!(id1, id2);
    }
}
