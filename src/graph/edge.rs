//! Directed, timestamped interactions between nodes

use super::metadata::{MetaValue, Metadata};
use super::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace for ids derived from edge content
const EDGE_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x1f, 0x4e, 0x2a, 0x93, 0x0c, 0x4d, 0x51, 0xa4, 0x7e, 0x2d, 0x85, 0x11, 0xc9, 0x3b, 0xf0,
]);

/// Unique identifier for an edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EdgeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    #[serde(alias = "sent_email")]
    Sent,
    #[serde(alias = "received_email")]
    Received,
    #[serde(alias = "accessed_file")]
    Accessed,
    #[serde(alias = "edited_file")]
    Edited,
    #[serde(alias = "created_file")]
    Created,
    #[serde(alias = "member_of_channel", alias = "member-of")]
    MemberOf,
    #[serde(alias = "shared_in_channel", alias = "shared-in")]
    SharedIn,
    CollaboratedWith,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Sent => "sent",
            EdgeType::Received => "received",
            EdgeType::Accessed => "accessed",
            EdgeType::Edited => "edited",
            EdgeType::Created => "created",
            EdgeType::MemberOf => "member_of",
            EdgeType::SharedIn => "shared_in",
            EdgeType::CollaboratedWith => "collaborated_with",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_weight() -> f32 {
    1.0
}

fn default_confidence() -> f32 {
    1.0
}

/// A directed, timestamped edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier; records may omit it and receive a derived id
    #[serde(default)]
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub edge_type: EdgeType,
    /// When the interaction occurred
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Interaction strength (non-negative)
    #[serde(default = "default_weight")]
    pub weight: f32,
    /// Confidence in the relationship (0.0 - 1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub is_anomalous: bool,
    /// Extra risk this interaction adds to both endpoints (non-negative)
    #[serde(default)]
    pub risk_contribution: f32,
}

impl Edge {
    /// Create an edge with an explicit id
    pub fn new(
        id: impl Into<EdgeId>,
        source_id: impl Into<NodeId>,
        target_id: impl Into<NodeId>,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            edge_type,
            timestamp: Utc::now(),
            weight: default_weight(),
            confidence: default_confidence(),
            metadata: Metadata::new(),
            is_anomalous: false,
            risk_contribution: 0.0,
        }
    }

    /// Create an edge whose id is derived from its content
    pub fn derived(
        source_id: impl Into<NodeId>,
        target_id: impl Into<NodeId>,
        edge_type: EdgeType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut edge = Self::new(EdgeId::default(), source_id, target_id, edge_type);
        edge.timestamp = timestamp;
        edge.id = edge.content_id();
        edge
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_risk_contribution(mut self, contribution: f32) -> Self {
        self.risk_contribution = contribution;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn anomalous(mut self) -> Self {
        self.is_anomalous = true;
        self
    }

    /// The endpoint opposite `node_id`
    pub fn other_end(&self, node_id: &NodeId) -> &NodeId {
        if &self.source_id == node_id {
            &self.target_id
        } else {
            &self.source_id
        }
    }

    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.source_id == node_id || &self.target_id == node_id
    }

    /// Deterministic v5 id over (source, target, type, timestamp)
    pub fn content_id(&self) -> EdgeId {
        let key = format!(
            "{}|{}|{}|{}",
            self.source_id,
            self.target_id,
            self.edge_type,
            self.timestamp.to_rfc3339()
        );
        EdgeId(format!("edge:{}", Uuid::new_v5(&EDGE_NAMESPACE, key.as_bytes())))
    }

    /// Bring numeric fields into their valid ranges and fill a missing id
    pub(crate) fn normalize(&mut self) {
        if self.id.is_empty() {
            self.id = self.content_id();
        }
        let owner = self.id.as_str().to_string();
        if !(self.weight >= 0.0) {
            tracing::warn!(edge = %owner, weight = self.weight, "negative edge weight, clamped to 0");
            self.weight = 0.0;
        }
        if !(self.risk_contribution >= 0.0) {
            tracing::warn!(
                edge = %owner,
                risk_contribution = self.risk_contribution,
                "negative risk contribution, clamped to 0"
            );
            self.risk_contribution = 0.0;
        }
        self.confidence = super::node::clamp_unit(self.confidence, "confidence", &owner);
    }
}
