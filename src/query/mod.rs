//! Read-only queries over a scored graph
//!
//! Filtering, critical-node ranking, investigation paths and summary
//! statistics. Every query takes `&TemporalGraph` and never mutates it,
//! except `CriticalNodeRanker::mark_critical`, which the processor runs after
//! scoring.

mod filter;
mod path;
mod rank;
mod stats;
mod types;

pub use filter::{GraphFilter, GraphView};
pub use path::InvestigationPathQuery;
pub use rank::CriticalNodeRanker;
pub use stats::{GraphStats, NodeDetail, NodeMetrics};
pub use types::{Direction, InvestigationPath, QueryError, QueryResult, RankedNode};
