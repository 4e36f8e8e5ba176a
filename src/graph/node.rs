//! Node representation in the temporal entity graph

use super::metadata::{self, MetaValue, Metadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node
///
/// Serializes as a plain string (e.g. "custodian:jane.smith", "file:contract-001")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a NodeId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A person (custodian)
    #[serde(alias = "custodian", alias = "person")]
    Actor,
    /// A file or document
    #[serde(alias = "file", alias = "document")]
    Artifact,
    /// A collaboration channel
    Channel,
    /// An email or chat message
    #[serde(alias = "email")]
    Message,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::Actor,
        NodeType::Artifact,
        NodeType::Channel,
        NodeType::Message,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Actor => "actor",
            NodeType::Artifact => "artifact",
            NodeType::Channel => "channel",
            NodeType::Message => "message",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four-value discretization of a risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Threshold table: low < 0.4 <= medium < 0.6 <= high < 0.8 <= critical
    pub fn from_score(score: f32) -> Self {
        if score < 0.4 {
            RiskLevel::Low
        } else if score < 0.6 {
            RiskLevel::Medium
        } else if score < 0.8 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    /// Map a classifier output index (0..4) to a level
    pub fn from_class_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Clamp a score into [0, 1]. Out-of-range and NaN inputs are logged.
pub(crate) fn clamp_unit(value: f32, field: &str, owner: &str) -> f32 {
    if value.is_nan() {
        tracing::warn!(owner, field, "score was NaN, stored as 0.0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&value) {
        let clamped = value.clamp(0.0, 1.0);
        tracing::warn!(owner, field, value, clamped, "score out of range, clamped");
        return clamped;
    }
    value
}

fn default_relevance() -> f32 {
    0.5
}

/// A node in the temporal entity graph
///
/// Score fields are private: every write goes through a clamp, and
/// `risk_level` is always derived from `risk_score`. Degree fields are owned
/// by `TemporalGraph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Kind of entity
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Display label
    pub label: String,
    /// Free-form metadata
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,
    /// Content embedding (model input), filled by the embedding stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Observed activity, one value per period, oldest first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity_trend: Option<Vec<f32>>,

    #[serde(default = "default_relevance")]
    relevance_score: f32,
    #[serde(default)]
    risk_score: f32,
    #[serde(default)]
    risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    forecasted_risk: Option<f32>,

    #[serde(default)]
    degree: usize,
    #[serde(default)]
    in_degree: usize,
    #[serde(default)]
    out_degree: usize,

    #[serde(default)]
    is_flagged: bool,
    #[serde(default)]
    is_critical: bool,
    #[serde(default)]
    investigation_notes: Vec<String>,
}

impl Node {
    /// Create a node with the given id, type and label, timestamped now
    pub fn new(id: impl Into<NodeId>, node_type: NodeType, label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            node_type,
            label: label.into(),
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
            last_accessed: None,
            embedding: None,
            activity_trend: None,
            relevance_score: default_relevance(),
            risk_score: 0.0,
            risk_level: RiskLevel::Low,
            forecasted_risk: None,
            degree: 0,
            in_degree: 0,
            out_degree: 0,
            is_flagged: false,
            is_critical: false,
            investigation_notes: Vec::new(),
        }
    }

    /// Add a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set both creation and update timestamps
    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self
    }

    pub fn with_last_accessed(mut self, at: DateTime<Utc>) -> Self {
        self.last_accessed = Some(at);
        self
    }

    pub fn with_activity_trend(mut self, trend: Vec<f32>) -> Self {
        self.activity_trend = Some(trend);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Seed a prior risk score (clamped, level derived)
    pub fn with_risk_score(mut self, score: f32) -> Self {
        self.set_risk_score(score);
        self
    }

    /// Seed a prior relevance score (clamped)
    pub fn with_relevance_score(mut self, score: f32) -> Self {
        self.relevance_score = clamp_unit(score, "relevance_score", self.id.as_str());
        self
    }

    pub fn relevance_score(&self) -> f32 {
        self.relevance_score
    }

    pub fn risk_score(&self) -> f32 {
        self.risk_score
    }

    pub fn risk_level(&self) -> RiskLevel {
        self.risk_level
    }

    pub fn forecasted_risk(&self) -> Option<f32> {
        self.forecasted_risk
    }

    /// Total degree (in + out)
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn in_degree(&self) -> usize {
        self.in_degree
    }

    pub fn out_degree(&self) -> usize {
        self.out_degree
    }

    pub fn is_flagged(&self) -> bool {
        self.is_flagged
    }

    pub fn is_critical(&self) -> bool {
        self.is_critical
    }

    pub fn investigation_notes(&self) -> &[String] {
        &self.investigation_notes
    }

    /// Text fed to the embedding backend: label plus serialized metadata
    pub fn content_text(&self) -> String {
        if self.metadata.is_empty() {
            self.label.clone()
        } else {
            format!("{} | {}", self.label, metadata::render(&self.metadata))
        }
    }

    pub(crate) fn set_risk_score(&mut self, score: f32) {
        self.risk_score = clamp_unit(score, "risk_score", self.id.as_str());
        self.risk_level = RiskLevel::from_score(self.risk_score);
    }

    pub(crate) fn set_relevance_score(&mut self, score: f32) {
        self.relevance_score = clamp_unit(score, "relevance_score", self.id.as_str());
    }

    pub(crate) fn set_forecasted_risk(&mut self, forecast: Option<f32>) {
        self.forecasted_risk =
            forecast.map(|f| clamp_unit(f, "forecasted_risk", self.id.as_str()));
    }

    pub(crate) fn set_degrees(&mut self, in_degree: usize, out_degree: usize) {
        self.in_degree = in_degree;
        self.out_degree = out_degree;
        self.degree = in_degree + out_degree;
    }

    pub(crate) fn set_flagged(&mut self, flagged: bool) {
        self.is_flagged = flagged;
    }

    pub(crate) fn set_critical(&mut self, critical: bool) {
        self.is_critical = critical;
    }

    pub(crate) fn push_note(&mut self, note: String) {
        self.investigation_notes.push(note);
    }

    /// Re-establish score invariants on a node that arrived from outside
    /// (deserialized records may carry any values).
    pub(crate) fn normalize(&mut self) {
        let risk = self.risk_score;
        self.set_risk_score(risk);
        let relevance = self.relevance_score;
        self.set_relevance_score(relevance);
        let forecast = self.forecasted_risk;
        self.set_forecasted_risk(forecast);
        self.set_degrees(0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.399), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.4), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.59), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.79), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::Critical);
    }

    #[test]
    fn risk_score_is_clamped_and_level_derived() {
        let node = Node::new("n1", NodeType::Artifact, "report.pdf").with_risk_score(1.03);
        assert_eq!(node.risk_score(), 1.0);
        assert_eq!(node.risk_level(), RiskLevel::Critical);

        let node = Node::new("n2", NodeType::Artifact, "memo.docx").with_risk_score(-0.2);
        assert_eq!(node.risk_score(), 0.0);
        assert_eq!(node.risk_level(), RiskLevel::Low);
    }

    #[test]
    fn nan_scores_become_zero() {
        let node = Node::new("n", NodeType::Actor, "x").with_relevance_score(f32::NAN);
        assert_eq!(node.relevance_score(), 0.0);
    }

    #[test]
    fn normalize_repairs_inconsistent_level() {
        let json = serde_json::json!({
            "id": "file:a",
            "type": "file",
            "label": "a.txt",
            "risk_score": 0.85,
            "risk_level": "low",
            "degree": 42
        });
        let mut node: Node = serde_json::from_value(json).unwrap();
        assert_eq!(node.node_type, NodeType::Artifact);
        node.normalize();
        assert_eq!(node.risk_level(), RiskLevel::Critical);
        assert_eq!(node.degree(), 0);
    }

    #[test]
    fn content_text_includes_metadata() {
        let node = Node::new("custodian:jane", NodeType::Actor, "Jane Smith")
            .with_meta("department", "Legal")
            .with_meta("role", "manager");
        assert_eq!(
            node.content_text(),
            "Jane Smith | department: Legal | role: manager"
        );
        let bare = Node::new("c", NodeType::Channel, "#legal");
        assert_eq!(bare.content_text(), "#legal");
    }

    #[test]
    fn original_type_names_are_accepted() {
        let t: NodeType = serde_json::from_str("\"custodian\"").unwrap();
        assert_eq!(t, NodeType::Actor);
        let t: NodeType = serde_json::from_str("\"email\"").unwrap();
        assert_eq!(t, NodeType::Message);
        assert_eq!(serde_json::to_string(&NodeType::Message).unwrap(), "\"message\"");
    }
}
