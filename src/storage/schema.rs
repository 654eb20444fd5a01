//! Database schema definitions

/// Connection settings applied on open
pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA temp_store = MEMORY;
"#;

/// SQL to create the files table
pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    fingerprint TEXT NOT NULL,
    category TEXT NOT NULL,
    line_count INTEGER NOT NULL DEFAULT 0,
    mtime INTEGER,
    indexed_at INTEGER NOT NULL
)
"#;

/// SQL to create the symbols table
pub const CREATE_SYMBOLS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    enclosing_name TEXT,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    visibility TEXT NOT NULL DEFAULT 'public',
    signature TEXT,
    documentation TEXT
)
"#;

/// Full-text index over symbols, kept in sync by triggers
pub const CREATE_SYMBOLS_FTS: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
    name,
    documentation,
    signature,
    content='symbols',
    content_rowid='id'
)
"#;

pub const CREATE_FTS_TRIGGERS: &[&str] = &[
    r#"
    CREATE TRIGGER IF NOT EXISTS symbols_ai AFTER INSERT ON symbols BEGIN
        INSERT INTO symbols_fts(rowid, name, documentation, signature)
        VALUES (NEW.id, NEW.name, NEW.documentation, NEW.signature);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS symbols_ad AFTER DELETE ON symbols BEGIN
        INSERT INTO symbols_fts(symbols_fts, rowid, name, documentation, signature)
        VALUES ('delete', OLD.id, OLD.name, OLD.documentation, OLD.signature);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS symbols_au AFTER UPDATE ON symbols BEGIN
        INSERT INTO symbols_fts(symbols_fts, rowid, name, documentation, signature)
        VALUES ('delete', OLD.id, OLD.name, OLD.documentation, OLD.signature);
        INSERT INTO symbols_fts(rowid, name, documentation, signature)
        VALUES (NEW.id, NEW.name, NEW.documentation, NEW.signature);
    END
    "#,
];

/// SQL to create the graph node table
pub const CREATE_NODES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    key TEXT NOT NULL,
    label TEXT NOT NULL,
    source TEXT NOT NULL,
    file_path TEXT,
    start_line INTEGER,
    end_line INTEGER,
    metadata TEXT NOT NULL DEFAULT '{}',
    UNIQUE(kind, key)
)
"#;

/// SQL to create the graph edge table
pub const CREATE_EDGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    src_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    dst_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
    locations TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    origin TEXT,
    UNIQUE(kind, src_id, dst_id)
)
"#;

/// Every projection origin that emitted an edge. An edge lives until its
/// last origin releases it.
pub const CREATE_EDGE_ORIGINS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS edge_origins (
    edge_id INTEGER NOT NULL REFERENCES edges(id) ON DELETE CASCADE,
    origin TEXT NOT NULL,
    PRIMARY KEY (edge_id, origin)
)
"#;

pub const CREATE_SCHEMA_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_tables (
    name TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    primary_key TEXT NOT NULL DEFAULT '[]',
    comment TEXT
)
"#;

pub const CREATE_SCHEMA_COLUMNS: &str = r#"
CREATE TABLE IF NOT EXISTS schema_columns (
    table_name TEXT NOT NULL REFERENCES schema_tables(name) ON DELETE CASCADE,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    sql_type TEXT NOT NULL,
    nullable INTEGER NOT NULL,
    default_value TEXT,
    col_limit INTEGER,
    col_precision INTEGER,
    col_scale INTEGER,
    comment TEXT,
    primary_key INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (table_name, name)
)
"#;

pub const CREATE_SCHEMA_INDEXES: &str = r#"
CREATE TABLE IF NOT EXISTS schema_indexes (
    table_name TEXT NOT NULL REFERENCES schema_tables(name) ON DELETE CASCADE,
    name TEXT NOT NULL,
    position INTEGER NOT NULL,
    columns TEXT NOT NULL,
    is_unique INTEGER NOT NULL DEFAULT 0,
    where_clause TEXT,
    using_method TEXT,
    PRIMARY KEY (table_name, name)
)
"#;

pub const CREATE_SCHEMA_FOREIGN_KEYS: &str = r#"
CREATE TABLE IF NOT EXISTS schema_foreign_keys (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_table TEXT NOT NULL,
    from_column TEXT NOT NULL,
    to_table TEXT NOT NULL,
    to_column TEXT NOT NULL,
    on_delete TEXT,
    on_update TEXT,
    name TEXT
)
"#;

/// Key/value run metadata (schema fingerprint, last run)
pub const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_id)",
    "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name)",
    "CREATE INDEX IF NOT EXISTS idx_nodes_file ON nodes(file_path)",
    "CREATE INDEX IF NOT EXISTS idx_edges_src ON edges(src_id)",
    "CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges(dst_id)",
    "CREATE INDEX IF NOT EXISTS idx_edge_origins_origin ON edge_origins(origin)",
    "CREATE INDEX IF NOT EXISTS idx_fk_from ON schema_foreign_keys(from_table)",
    "CREATE INDEX IF NOT EXISTS idx_fk_to ON schema_foreign_keys(to_table)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_FILES_TABLE,
        CREATE_SYMBOLS_TABLE,
        CREATE_SYMBOLS_FTS,
        CREATE_NODES_TABLE,
        CREATE_EDGES_TABLE,
        CREATE_EDGE_ORIGINS_TABLE,
        CREATE_SCHEMA_TABLES,
        CREATE_SCHEMA_COLUMNS,
        CREATE_SCHEMA_INDEXES,
        CREATE_SCHEMA_FOREIGN_KEYS,
        CREATE_META_TABLE,
    ];
    stmts.extend(CREATE_FTS_TRIGGERS.iter().copied());
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
