//! # Repodex - Repository Knowledge Index
//!
//! Turns a source tree (plus an optional `schema.rb` description) into a
//! queryable index for code assistants.
//!
//! Repodex provides:
//! - Fingerprint-based incremental ingestion of per-file parse results
//! - SQLite-backed symbol store with FTS5 full-text search
//! - A typed property graph with deduplicating upserts and bounded traversal
//! - A schema parser and naming-heuristic association/validation mapper
//! - Query operations over all of the above

pub mod inflect;
pub mod args;
pub mod symbol;
pub mod node;
pub mod edge;
pub mod graph;
pub mod schema;
pub mod associations;
pub mod adapter;
pub mod storage;
pub mod builder;
pub mod indexer;
pub mod query;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use symbol::{Symbol, SymbolKind, Visibility};
pub use node::{Anchor, GraphNode, NewNode, NodeKind, NodeSource};
pub use edge::{EdgeKind, GraphEdge};
pub use graph::{Direction, Neighborhood};
pub use storage::SqliteStore;
pub use indexer::{Indexer, IndexReport, RunMode};
pub use query::QueryEngine;

/// Result type alias for Repodex operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Repodex operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse failure in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Schema parse failure: {0}")]
    SchemaParse(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Extractor error: {0}")]
    Extractor(String),
}

/// Status of a file during indexing
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    New,
    Modified,
    Unchanged,
}
