//! Common test utilities for riskgraph integration tests
//!
//! Graph fixtures, small deterministic models and an embedding backend that
//! counts how often it is called.

#![allow(dead_code)]

pub mod counting;
pub mod fixtures;

pub use counting::CountingEmbedder;
pub use fixtures::{
    chain_graph, graph_with_risks, processor, processor_with, small_model, write_records, TEST_DIM,
};
