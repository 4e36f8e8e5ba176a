//! Graph and pipeline fixtures

use riskgraph::adapter::SourceBatch;
use riskgraph::embedding::{Embedder, EmbeddingGenerator, HashingEmbedder};
use riskgraph::{Edge, EdgeType, GraphProcessor, ModelConfig, Node, NodeType, PredictiveGnn, TemporalGraph};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Embedding width used by the small test model
pub const TEST_DIM: usize = 16;

/// A seeded model small enough to run in every test
pub fn small_model() -> PredictiveGnn {
    PredictiveGnn::new(ModelConfig {
        input_dim: TEST_DIM,
        hidden_dim: 8,
        num_layers: 2,
        forecast_hidden: 4,
        ..ModelConfig::default()
    })
    .expect("test model config is valid")
}

/// Processor over the small model and a hashing backend
pub fn processor() -> GraphProcessor {
    processor_with(Arc::new(HashingEmbedder::new(TEST_DIM)))
}

pub fn processor_with(backend: Arc<dyn Embedder>) -> GraphProcessor {
    GraphProcessor::new(Arc::new(EmbeddingGenerator::new(backend)), Arc::new(small_model()))
}

/// Actor nodes with preset risk scores and no edges
pub fn graph_with_risks(risks: &[(&str, f32)]) -> TemporalGraph {
    let mut graph = TemporalGraph::new();
    for (id, risk) in risks {
        graph
            .add_node(Node::new(*id, NodeType::Actor, *id).with_risk_score(*risk))
            .expect("fixture ids are unique");
    }
    graph
}

/// `ids[0] -> ids[1] -> ...`, one `Sent` edge per consecutive pair
pub fn chain_graph(risks: &[(&str, f32)]) -> TemporalGraph {
    let mut graph = graph_with_risks(risks);
    for pair in risks.windows(2) {
        let (from, to) = (pair[0].0, pair[1].0);
        graph
            .add_edge(Edge::new(format!("{}-{}", from, to), from, to, EdgeType::Sent))
            .expect("fixture endpoints exist");
    }
    graph
}

/// Write a records file the JSON source can read
pub fn write_records(dir: &Path, name: &str, nodes: Vec<Node>, edges: Vec<Edge>) -> PathBuf {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(&SourceBatch::new(nodes, edges)).expect("records serialize");
    std::fs::write(&path, json).expect("records written");
    path
}
