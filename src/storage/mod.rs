//! Storage Layer - SQLite-backed persistence
//!
//! System of record is one SQLite database with three groups of tables:
//! - files, symbols (+ `symbols_fts` full-text index)
//! - nodes, edges (the property graph)
//! - schema_tables, schema_columns, schema_indexes, schema_foreign_keys
//!
//! [`SqliteStore`] owns the connection. The per-area stores borrow a
//! `&Connection`, so they work the same on the bare connection and inside a
//! transaction.

pub mod schema;
pub mod sqlite;
pub mod symbols;
pub mod graph;
pub mod tables;

pub use sqlite::{DbStats, SqliteStore};
pub use symbols::{FileRecord, SymbolHit, SymbolStore};
pub use graph::{EdgeCount, GraphStore, NewEdge};
pub use tables::{SchemaStore, TableSummary};
