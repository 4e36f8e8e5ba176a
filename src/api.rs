//! Transport-independent investigation API.
//!
//! `InvestigationApi` is the single entry point for consumers. Transports
//! (CLI, HTTP, anything else) call its methods and never reach into the
//! engine, the ingest pipeline or the processor directly.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::adapter::{IngestError, IngestPipeline, IngestReport};
use crate::graph::{GraphEngine, GraphError, NodeId, TemporalGraph};
use crate::processor::{GraphProcessor, PipelineError, ProcessReport};
use crate::query::{
    GraphFilter, GraphStats, GraphView, InvestigationPath, InvestigationPathQuery, NodeDetail,
    QueryError, RankedNode,
};

/// Errors surfaced to API consumers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("background task failed: {0}")]
    Internal(String),
}

impl ApiError {
    /// True when the request named a node that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ApiError::Graph(GraphError::NodeNotFound(_)) | ApiError::Query(QueryError::NodeNotFound(_))
        )
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Current risk next to a forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskForecast {
    pub node_id: NodeId,
    pub current_risk: f32,
    /// Absent when the node has no activity trend
    pub forecasted_risk: Option<f32>,
    pub periods_ahead: usize,
    /// `forecasted_risk - current_risk`
    pub change: Option<f32>,
}

/// Outcome of a full re-ingestion
#[derive(Debug, Clone)]
pub struct RebuildSummary {
    pub ingest: IngestReport,
    pub scoring: ProcessReport,
}

/// Single entry point for all consumer-facing operations.
#[derive(Clone)]
pub struct InvestigationApi {
    engine: Arc<GraphEngine>,
    pipeline: Arc<IngestPipeline>,
    processor: Arc<GraphProcessor>,
    /// Held by every writer, so a rebuild never races a flag or note
    writer: Arc<Mutex<()>>,
}

impl InvestigationApi {
    pub fn new(engine: Arc<GraphEngine>, pipeline: Arc<IngestPipeline>, processor: Arc<GraphProcessor>) -> Self {
        Self {
            engine,
            pipeline,
            processor,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn engine(&self) -> &GraphEngine {
        &self.engine
    }

    pub fn processor(&self) -> &GraphProcessor {
        &self.processor
    }

    // --- Rebuild ---

    /// Re-run every source, score the result and swap it in.
    ///
    /// The new graph replaces the old one wholesale. On any failure the
    /// previous graph stays live.
    pub async fn reingest(&self) -> ApiResult<RebuildSummary> {
        let _guard = self.writer.lock().await;
        let (graph, ingest) = self.pipeline.ingest().await?;
        let (scored, scoring) = self.score(graph).await?;
        self.engine.replace(scored)?;
        Ok(RebuildSummary { ingest, scoring })
    }

    /// Score the current graph again, e.g. after swapping the model
    pub async fn rescore(&self) -> ApiResult<ProcessReport> {
        let _guard = self.writer.lock().await;
        let current = self.engine.snapshot()?;
        let (scored, report) = self.score(current.as_ref().clone()).await?;
        self.engine.replace(scored)?;
        Ok(report)
    }

    async fn score(&self, graph: TemporalGraph) -> ApiResult<(TemporalGraph, ProcessReport)> {
        let processor = Arc::clone(&self.processor);
        let scored = tokio::task::spawn_blocking(move || processor.process(&graph))
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))??;
        Ok(scored)
    }

    // --- Graph reads ---

    /// Nodes passing every filter, plus the edges between them
    pub fn get_graph(&self, filter: &GraphFilter) -> ApiResult<GraphView> {
        Ok(filter.apply(&*self.engine.snapshot()?))
    }

    pub fn get_node(&self, id: &str) -> ApiResult<NodeDetail> {
        let graph = self.engine.snapshot()?;
        Ok(NodeDetail::build(&graph, &NodeId::from(id))?)
    }

    /// Top `top_k` nodes by composite score, using the processor's weights
    pub fn get_critical_nodes(&self, top_k: usize) -> ApiResult<Vec<RankedNode>> {
        let graph = self.engine.snapshot()?;
        Ok(graph.critical_nodes(self.processor.ranker(), top_k))
    }

    pub fn find_investigation_path(&self, start: &str, max_depth: usize, min_risk: f32) -> ApiResult<InvestigationPath> {
        let graph = self.engine.snapshot()?;
        let path = InvestigationPathQuery::starting_at(start)
            .max_depth(max_depth)
            .min_risk(min_risk)
            .execute(&graph)?;
        Ok(path)
    }

    /// Forecast without storing. The stored forecast is refreshed only by a
    /// scoring run.
    pub fn forecast(&self, id: &str, periods_ahead: usize) -> ApiResult<RiskForecast> {
        let graph = self.engine.snapshot()?;
        let node_id = NodeId::from(id);
        let forecasted_risk = self.processor.forecast(&graph, &node_id, periods_ahead)?;
        let current_risk = graph
            .get_node(&node_id)
            .map(|n| n.risk_score())
            .ok_or_else(|| QueryError::NodeNotFound(node_id.clone()))?;
        Ok(RiskForecast {
            node_id,
            current_risk,
            forecasted_risk,
            periods_ahead,
            change: forecasted_risk.map(|f| f - current_risk),
        })
    }

    pub fn get_stats(&self) -> ApiResult<GraphStats> {
        Ok(GraphStats::compute(&*self.engine.snapshot()?))
    }

    // --- Investigation workflow ---

    pub async fn set_flag(&self, id: &str, flagged: bool) -> ApiResult<()> {
        let _guard = self.writer.lock().await;
        let node_id = NodeId::from(id);
        self.engine.update(|g| g.set_flag(&node_id, flagged))?;
        tracing::info!(node = id, flagged, "investigation flag updated");
        Ok(())
    }

    pub async fn append_note(&self, id: &str, note: &str) -> ApiResult<()> {
        let _guard = self.writer.lock().await;
        let node_id = NodeId::from(id);
        self.engine.update(|g| g.append_note(&node_id, note))?;
        tracing::info!(node = id, "investigation note appended");
        Ok(())
    }
}
