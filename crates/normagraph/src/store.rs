use std::path::Path;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub const REFERS_TO: &str = "REFERS_TO";

/// One norm in the graph. Field names serialize to the GraphCommons column
/// headers the graph is meant to be imported with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "Type")]
    pub norm_type: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Reference")]
    pub reference: String,
    #[serde(rename = "URN")]
    pub urn: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Scraped")]
    pub scraped: bool,
}

/// One directed reference between two norms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(rename = "From Type")]
    pub from_type: String,
    #[serde(rename = "From Name")]
    pub from_name: String,
    #[serde(rename = "Edge")]
    pub edge: String,
    #[serde(rename = "To Type")]
    pub to_type: String,
    #[serde(rename = "To Name")]
    pub to_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub nodes: usize,
    pub edges: usize,
    pub pending: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Graph:")?;
        writeln!(f, "  Nodes:             {}", self.nodes)?;
        writeln!(f, "  Edges:             {}", self.edges)?;
        writeln!(f, "  Pending (unscraped): {}", self.pending)
    }
}

pub struct GraphStore {
    conn: Connection,
}

impl GraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS nodes (
                id          INTEGER PRIMARY KEY,
                type        TEXT NOT NULL,
                name        TEXT NOT NULL,
                title       TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                image       TEXT NOT NULL DEFAULT '',
                reference   TEXT NOT NULL,
                urn         TEXT NOT NULL,
                year        TEXT NOT NULL DEFAULT '',
                scraped     BOOLEAN NOT NULL DEFAULT 0,
                UNIQUE(type, name)
            );
            CREATE INDEX IF NOT EXISTS idx_nodes_urn ON nodes(urn);
            CREATE INDEX IF NOT EXISTS idx_nodes_scraped ON nodes(scraped);

            CREATE TABLE IF NOT EXISTS edges (
                id        INTEGER PRIMARY KEY,
                from_type TEXT NOT NULL,
                from_name TEXT NOT NULL,
                edge      TEXT NOT NULL,
                to_type   TEXT NOT NULL,
                to_name   TEXT NOT NULL,
                UNIQUE(from_type, from_name, edge, to_type, to_name)
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts a node, replacing the stored row when one with the same
    /// (type, name) key exists. Used for fully scraped norms, where fresher
    /// data always wins over a reference stub.
    pub fn upsert_node(&self, node: &Node) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO nodes (type, name, title, description, image, reference, urn, year, scraped)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(type, name) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 image = excluded.image,
                 reference = excluded.reference,
                 urn = excluded.urn,
                 year = excluded.year,
                 scraped = excluded.scraped",
            params![
                node.norm_type,
                node.name,
                node.title,
                node.description,
                node.image,
                node.reference,
                node.urn,
                node.year,
                node.scraped,
            ],
        )?;
        Ok(())
    }

    /// Inserts a stub node for a referenced norm, but only when no node with
    /// that URN is stored yet. Returns whether a row was inserted. Never
    /// overwrites, so a stub cannot clobber an already-scraped norm.
    pub fn insert_reference_node(&self, node: &Node) -> Result<bool, StoreError> {
        if self.has_urn(&node.urn)? {
            return Ok(false);
        }
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO nodes
                 (type, name, title, description, image, reference, urn, year, scraped)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                node.norm_type,
                node.name,
                node.title,
                node.description,
                node.image,
                node.reference,
                node.urn,
                node.year,
                node.scraped,
            ],
        )?;
        Ok(inserted > 0)
    }

    pub fn has_urn(&self, urn: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM nodes WHERE urn = ?1",
            params![urn],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Inserts an edge if it is not stored yet. Returns whether a row was
    /// inserted.
    pub fn insert_edge(&self, edge: &Edge) -> Result<bool, StoreError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO edges (from_type, from_name, edge, to_type, to_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                edge.from_type,
                edge.from_name,
                edge.edge,
                edge.to_type,
                edge.to_name,
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Reference URLs of every stored norm that has not been scraped yet.
    pub fn unscraped_references(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT reference FROM nodes WHERE scraped = 0 ORDER BY reference")?;
        let refs = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(refs)
    }

    pub fn nodes(&self) -> Result<Vec<Node>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT type, name, title, description, image, reference, urn, year, scraped
             FROM nodes ORDER BY id",
        )?;
        let nodes = stmt
            .query_map([], |row| {
                Ok(Node {
                    norm_type: row.get(0)?,
                    name: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    image: row.get(4)?,
                    reference: row.get(5)?,
                    urn: row.get(6)?,
                    year: row.get(7)?,
                    scraped: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    pub fn edges(&self) -> Result<Vec<Edge>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT from_type, from_name, edge, to_type, to_name FROM edges ORDER BY id",
        )?;
        let edges = stmt
            .query_map([], |row| {
                Ok(Edge {
                    from_type: row.get(0)?,
                    from_name: row.get(1)?,
                    edge: row.get(2)?,
                    to_type: row.get(3)?,
                    to_name: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let count = |sql: &str| -> Result<usize, StoreError> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            nodes: count("SELECT count(*) FROM nodes")?,
            edges: count("SELECT count(*) FROM edges")?,
            pending: count("SELECT count(*) FROM nodes WHERE scraped = 0")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(urn: &str, name: &str, scraped: bool) -> Node {
        Node {
            norm_type: "Legge".to_string(),
            name: name.to_string(),
            title: String::new(),
            description: String::new(),
            image: String::new(),
            reference: format!("https://www.normattiva.it/uri-res/N2Ls?{}", urn),
            urn: urn.to_string(),
            year: "1990".to_string(),
            scraped,
        }
    }

    #[test]
    fn test_upsert_node_replaces_on_same_key() {
        let store = GraphStore::open_in_memory().expect("Failed to open store");

        let mut n = node("urn:nir:stato:legge:1990-08-07;241", "L. 241 del 07/08/1990", true);
        store.upsert_node(&n).expect("Failed to insert");

        n.title = "Nuove norme sul procedimento amministrativo".to_string();
        store.upsert_node(&n).expect("Failed to upsert");

        let nodes = store.nodes().expect("Failed to list nodes");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].title, "Nuove norme sul procedimento amministrativo");
    }

    #[test]
    fn test_reference_stub_does_not_clobber_scraped_node() {
        let store = GraphStore::open_in_memory().expect("Failed to open store");

        let mut scraped = node("urn:nir:stato:legge:1990-08-07;241", "L. 241 del 07/08/1990", true);
        scraped.title = "Titolo".to_string();
        store.upsert_node(&scraped).expect("Failed to insert");

        let stub = node("urn:nir:stato:legge:1990-08-07;241", "L. 241 del 07/08/1990", false);
        let inserted = store
            .insert_reference_node(&stub)
            .expect("Failed to insert stub");

        assert!(!inserted);
        let nodes = store.nodes().expect("Failed to list nodes");
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].scraped);
        assert_eq!(nodes[0].title, "Titolo");
    }

    #[test]
    fn test_reference_stub_inserted_when_urn_absent() {
        let store = GraphStore::open_in_memory().expect("Failed to open store");

        let stub = node("urn:nir:stato:legge:2000;1", "L. 1 del 2000", false);
        assert!(store.insert_reference_node(&stub).expect("Failed to insert"));
        assert!(!store.insert_reference_node(&stub).expect("Failed to re-insert"));

        assert!(store.has_urn("urn:nir:stato:legge:2000;1").expect("has_urn"));
        assert!(!store.has_urn("urn:nir:stato:legge:2000;2").expect("has_urn"));
    }

    #[test]
    fn test_insert_edge_is_idempotent() {
        let store = GraphStore::open_in_memory().expect("Failed to open store");

        let edge = Edge {
            from_type: "Decreto Legislativo".to_string(),
            from_name: "D.L. 50 del 18/03/2016".to_string(),
            edge: REFERS_TO.to_string(),
            to_type: "Legge".to_string(),
            to_name: "L. 241 del 07/08/1990".to_string(),
        };

        assert!(store.insert_edge(&edge).expect("Failed to insert edge"));
        assert!(!store.insert_edge(&edge).expect("Failed to re-insert edge"));
        assert_eq!(store.edges().expect("Failed to list edges").len(), 1);
    }

    #[test]
    fn test_unscraped_references() {
        let store = GraphStore::open_in_memory().expect("Failed to open store");

        store
            .upsert_node(&node("urn:nir:stato:legge:1990-08-07;241", "L. 241", true))
            .expect("Failed to insert");
        store
            .insert_reference_node(&node("urn:nir:stato:legge:2000;1", "L. 1", false))
            .expect("Failed to insert");
        store
            .insert_reference_node(&node("urn:nir:stato:legge:2001;2", "L. 2", false))
            .expect("Failed to insert");

        let refs = store.unscraped_references().expect("Failed to select refs");
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| !r.contains("1990-08-07;241")));
    }

    #[test]
    fn test_stats() {
        let store = GraphStore::open_in_memory().expect("Failed to open store");

        store
            .upsert_node(&node("urn:nir:stato:legge:1990-08-07;241", "L. 241", true))
            .expect("Failed to insert");
        store
            .insert_reference_node(&node("urn:nir:stato:legge:2000;1", "L. 1", false))
            .expect("Failed to insert");
        store
            .insert_edge(&Edge {
                from_type: "Legge".to_string(),
                from_name: "L. 241".to_string(),
                edge: REFERS_TO.to_string(),
                to_type: "Legge".to_string(),
                to_name: "L. 1".to_string(),
            })
            .expect("Failed to insert edge");

        let stats = store.stats().expect("Failed to read stats");
        assert_eq!(stats.nodes, 2);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.pending, 1);
    }
}
