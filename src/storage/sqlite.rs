//! SQLite storage backend for scored graphs

use super::traits::{GraphStore, OpenStore, StorageError, StorageResult};
use crate::graph::{Edge, GraphMetadata, GraphSnapshot, Node, NodeId, TemporalGraph};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const GRAPH_META_KEY: &str = "graph";

/// SQLite-backed graph store
///
/// Nodes and edges are stored one row each, with the full record as JSON and
/// a few columns broken out for ad-hoc SQL inspection. Thread-safe via an
/// internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS graph_meta (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                risk_score REAL NOT NULL,
                relevance_score REAL NOT NULL,
                risk_level TEXT NOT NULL,
                node_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);
            CREATE INDEX IF NOT EXISTS idx_nodes_risk ON nodes(risk_score);

            -- seq preserves edge insertion order across save/load
            CREATE TABLE IF NOT EXISTS edges (
                seq INTEGER PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                edge_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn has_graph(conn: &Connection) -> StorageResult<bool> {
        Ok(conn
            .query_row(
                "SELECT 1 FROM graph_meta WHERE key = ?1",
                params![GRAPH_META_KEY],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    fn save_graph(&self, graph: &TemporalGraph) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM nodes", [])?;

        {
            let mut insert_node = tx.prepare(
                r#"
                INSERT INTO nodes (id, node_type, risk_score, relevance_score, risk_level, node_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for node in graph.nodes() {
                insert_node.execute(params![
                    node.id.as_str(),
                    node.node_type.as_str(),
                    node.risk_score() as f64,
                    node.relevance_score() as f64,
                    node.risk_level().as_str(),
                    serde_json::to_string(node)?,
                ])?;
            }

            let mut insert_edge = tx.prepare(
                r#"
                INSERT INTO edges (seq, id, source_id, target_id, edge_type, timestamp, edge_json)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for (seq, edge) in graph.edges().enumerate() {
                insert_edge.execute(params![
                    seq as i64,
                    edge.id.as_str(),
                    edge.source_id.as_str(),
                    edge.target_id.as_str(),
                    edge.edge_type.as_str(),
                    edge.timestamp.to_rfc3339(),
                    serde_json::to_string(edge)?,
                ])?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO graph_meta (key, value_json) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json
            "#,
            params![GRAPH_META_KEY, serde_json::to_string(graph.metadata())?],
        )?;

        tx.commit()?;
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "saved graph snapshot"
        );
        Ok(())
    }

    fn load_graph(&self) -> StorageResult<Option<TemporalGraph>> {
        let conn = self.lock()?;
        let meta_json: Option<String> = conn
            .query_row(
                "SELECT value_json FROM graph_meta WHERE key = ?1",
                params![GRAPH_META_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let Some(meta_json) = meta_json else {
            return Ok(None);
        };
        let metadata: GraphMetadata = serde_json::from_str(&meta_json)?;

        let mut stmt = conn.prepare("SELECT node_json FROM nodes ORDER BY id")?;
        let nodes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|json| Ok(serde_json::from_str::<Node>(&json?)?))
            .collect::<StorageResult<Vec<_>>>()?;

        let mut stmt = conn.prepare("SELECT edge_json FROM edges ORDER BY seq")?;
        let edges = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|json| Ok(serde_json::from_str::<Edge>(&json?)?))
            .collect::<StorageResult<Vec<_>>>()?;

        let snapshot = GraphSnapshot {
            metadata,
            nodes,
            edges,
        };
        TemporalGraph::try_from(snapshot)
            .map(Some)
            .map_err(|e| StorageError::Integrity(e.to_string()))
    }

    fn load_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.lock()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT node_json FROM nodes WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(StorageError::from)
    }

    fn clear(&self) -> StorageResult<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let existed = Self::has_graph(&tx)?;
        tx.execute("DELETE FROM edges", [])?;
        tx.execute("DELETE FROM nodes", [])?;
        tx.execute("DELETE FROM graph_meta", [])?;
        tx.commit()?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeType, NodeType};
    use chrono::{TimeZone, Utc};

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn create_test_graph() -> TemporalGraph {
        let mut g = TemporalGraph::new();
        g.add_node(
            Node::new("custodian:ann", NodeType::Actor, "Ann")
                .with_meta("department", "Finance")
                .with_risk_score(0.81),
        )
        .unwrap();
        g.add_node(Node::new("file:ledger.xlsx", NodeType::Artifact, "ledger.xlsx").with_risk_score(0.3))
            .unwrap();
        g.add_node(Node::new("channel:audit", NodeType::Channel, "#audit"))
            .unwrap();
        let at = Utc.with_ymd_and_hms(2024, 2, 14, 10, 0, 0).unwrap();
        g.add_edge(Edge::new("e2", "custodian:ann", "file:ledger.xlsx", EdgeType::Edited).with_timestamp(at))
            .unwrap();
        g.add_edge(Edge::new("e1", "custodian:ann", "channel:audit", EdgeType::MemberOf).with_timestamp(at))
            .unwrap();
        g
    }

    #[test]
    fn test_empty_store_has_no_graph() {
        let store = create_test_store();
        assert!(store.load_graph().unwrap().is_none());
        assert!(!store.clear().unwrap());
    }

    #[test]
    fn test_save_and_load_graph() {
        let store = create_test_store();
        let graph = create_test_graph();
        store.save_graph(&graph).unwrap();

        let loaded = store.load_graph().unwrap().unwrap();
        assert_eq!(loaded.node_count(), 3);
        assert_eq!(loaded.edge_count(), 2);
        assert_eq!(
            loaded.nodes().cloned().collect::<Vec<_>>(),
            graph.nodes().cloned().collect::<Vec<_>>()
        );
        let ids: Vec<_> = loaded.edges().map(|e| e.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["e2", "e1"], "edge order must survive a round trip");
    }

    #[test]
    fn test_save_replaces_previous_graph() {
        let store = create_test_store();
        store.save_graph(&create_test_graph()).unwrap();

        let mut smaller = TemporalGraph::new();
        smaller
            .add_node(Node::new("custodian:bo", NodeType::Actor, "Bo"))
            .unwrap();
        store.save_graph(&smaller).unwrap();

        let loaded = store.load_graph().unwrap().unwrap();
        assert_eq!(loaded.node_count(), 1);
        assert!(store.load_node(&NodeId::from("custodian:ann")).unwrap().is_none());
    }

    #[test]
    fn test_load_single_node() {
        let store = create_test_store();
        store.save_graph(&create_test_graph()).unwrap();
        let node = store
            .load_node(&NodeId::from("custodian:ann"))
            .unwrap()
            .unwrap();
        assert_eq!(node.risk_score(), 0.81);
        assert_eq!(node.degree(), 2);
    }

    #[test]
    fn test_clear() {
        let store = create_test_store();
        store.save_graph(&create_test_graph()).unwrap();
        assert!(store.clear().unwrap());
        assert!(store.load_graph().unwrap().is_none());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("graph.db");
        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.save_graph(&create_test_graph()).unwrap();
        }
        let store = SqliteStore::open(&db_path).unwrap();
        let loaded = store.load_graph().unwrap().unwrap();
        assert_eq!(loaded.edge_count(), 2);
    }

    #[test]
    fn test_saved_graph_readable_by_second_connection() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("case.db");
        let store = SqliteStore::open(&db_path).unwrap();
        store.save_graph(&create_test_graph()).unwrap();
        assert!(dir.path().join("case.db-wal").exists());

        // an outside reader sees the committed graph while the store stays open
        let reader = Connection::open(&db_path).unwrap();
        let nodes: i64 = reader
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(nodes, 3);
        drop(reader);
        drop(store);

        let reopened = SqliteStore::open(&db_path).unwrap();
        let mode: String = reopened
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        assert_eq!(reopened.load_graph().unwrap().unwrap().edge_count(), 2);
    }

    #[test]
    fn test_risk_column_supports_sql_inspection() {
        let store = create_test_store();
        store.save_graph(&create_test_graph()).unwrap();
        let high: i64 = store
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM nodes WHERE risk_score >= 0.8", [], |row| row.get(0))
            .unwrap();
        assert_eq!(high, 1);
    }
}
