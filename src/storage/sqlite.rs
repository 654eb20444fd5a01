//! SQLite storage implementation

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;

use super::graph::GraphStore;
use super::schema;
use super::symbols::SymbolStore;
use super::tables::SchemaStore;
use crate::Result;

/// Meta key holding the fingerprint of the last projected schema file
pub const META_SCHEMA_FINGERPRINT: &str = "schema_fingerprint";
/// Meta key set while the schema file fails to parse and the stored
/// projection is left from an older version of it
pub const META_SCHEMA_ERROR: &str = "schema_error";
/// Meta key holding the unix time of the last completed run
pub const META_LAST_RUN: &str = "last_run";

/// SQLite-backed store for files, symbols, the graph and schema tables
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database file (creates it and its parent directory if needed)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        self.conn.busy_timeout(Duration::from_secs(5))?;
        self.conn.execute_batch(schema::PRAGMAS)?;
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn symbols(&self) -> SymbolStore<'_> {
        SymbolStore::new(&self.conn)
    }

    pub fn graph(&self) -> GraphStore<'_> {
        GraphStore::new(&self.conn)
    }

    pub fn tables(&self) -> SchemaStore<'_> {
        SchemaStore::new(&self.conn)
    }

    // ========== Transactions ==========

    /// Run `f` inside one transaction. Any error rolls the whole unit back.
    pub fn write<T>(&mut self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let tx = self.conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ========== Meta Operations ==========

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        get_meta(&self.conn, key)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        set_meta(&self.conn, key, value)
    }

    // ========== Bulk Operations ==========

    /// Drop every indexed row. Used by full runs.
    pub fn clear_all(&mut self) -> Result<()> {
        self.write(|tx| clear_all(tx))
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        let last_run = self
            .get_meta(META_LAST_RUN)?
            .and_then(|v| v.parse::<i64>().ok());

        Ok(DbStats {
            files: count("SELECT COUNT(*) FROM files")?,
            symbols: count("SELECT COUNT(*) FROM symbols")?,
            nodes: count("SELECT COUNT(*) FROM nodes")?,
            edges: count("SELECT COUNT(*) FROM edges")?,
            tables: count("SELECT COUNT(*) FROM schema_tables")?,
            columns: count("SELECT COUNT(*) FROM schema_columns")?,
            foreign_keys: count("SELECT COUNT(*) FROM schema_foreign_keys")?,
            files_by_category: self.group_counts("SELECT category, COUNT(*) FROM files GROUP BY category")?,
            symbols_by_kind: self.group_counts("SELECT kind, COUNT(*) FROM symbols GROUP BY kind")?,
            nodes_by_kind: self.group_counts("SELECT kind, COUNT(*) FROM nodes GROUP BY kind")?,
            edges_by_kind: self.group_counts("SELECT kind, COUNT(*) FROM edges GROUP BY kind")?,
            last_run,
        })
    }

    fn group_counts(&self, sql: &str) -> Result<BTreeMap<String, usize>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let n: i64 = row.get(1)?;
            Ok((key, n as usize))
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}

/// Read a meta value on any connection or transaction
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
        .optional()?)
}

pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn delete_meta(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM meta WHERE key = ?1", [key])?;
    Ok(())
}

pub fn clear_all(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DELETE FROM edge_origins;
        DELETE FROM edges;
        DELETE FROM nodes;
        DELETE FROM symbols;
        DELETE FROM files;
        DELETE FROM schema_foreign_keys;
        DELETE FROM schema_indexes;
        DELETE FROM schema_columns;
        DELETE FROM schema_tables;
        DELETE FROM meta;
        "#,
    )?;
    Ok(())
}

/// Current unix time in seconds
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Database statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct DbStats {
    pub files: usize,
    pub symbols: usize,
    pub nodes: usize,
    pub edges: usize,
    pub tables: usize,
    pub columns: usize,
    pub foreign_keys: usize,
    pub files_by_category: BTreeMap<String, usize>,
    pub symbols_by_kind: BTreeMap<String, usize>,
    pub nodes_by_kind: BTreeMap<String, usize>,
    pub edges_by_kind: BTreeMap<String, usize>,
    /// Unix seconds of the last completed run
    pub last_run: Option<i64>,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Symbols: {}", self.symbols)?;
        writeln!(f, "  Nodes: {}", self.nodes)?;
        writeln!(f, "  Edges: {}", self.edges)?;
        writeln!(f, "  Tables: {} ({} columns, {} foreign keys)", self.tables, self.columns, self.foreign_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_meta_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_meta("k").unwrap(), None);
        store.set_meta("k", "one").unwrap();
        store.set_meta("k", "two").unwrap();
        assert_eq!(store.get_meta("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let result: Result<()> = store.write(|tx| {
            set_meta(tx, "k", "v")?;
            Err(Error::InvalidQuery("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.get_meta("k").unwrap(), None);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("index.db");
        let store = SqliteStore::open(&path).unwrap();
        assert!(path.exists());
        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 0);
        assert_eq!(stats.last_run, None);
    }

    #[test]
    fn test_clear_all() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.set_meta(META_LAST_RUN, "5").unwrap();
        assert_eq!(store.stats().unwrap().last_run, Some(5));
        store.clear_all().unwrap();
        assert_eq!(store.get_meta(META_LAST_RUN).unwrap(), None);
    }
}
