//! Storage backends for scored graphs
//!
//! The engine works entirely in memory; a `GraphStore` keeps the latest
//! scored graph across process restarts. `SqliteStore` is the bundled
//! implementation.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{GraphStore, OpenStore, StorageError, StorageResult};
