//! File records, symbols and full-text search.

use std::collections::HashMap;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::Serialize;

use super::sqlite::unix_now;
use crate::adapter::Category;
use crate::symbol::{Symbol, SymbolKind, Visibility};
use crate::Result;

/// One indexed file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub fingerprint: String,
    pub category: Category,
    pub line_count: u32,
    pub mtime: Option<i64>,
    pub indexed_at: i64,
}

/// A full-text match with its file category and bm25 rank (lower is better)
#[derive(Debug, Clone, Serialize)]
pub struct SymbolHit {
    pub symbol: Symbol,
    pub category: Category,
    pub rank: f64,
}

const SYMBOL_COLUMNS: &str = "s.id, f.path, s.name, s.kind, s.enclosing_name, s.start_line, s.end_line, \
     s.visibility, s.signature, s.documentation";

/// Store for files and their symbols, borrowed from a connection or transaction
pub struct SymbolStore<'c> {
    conn: &'c Connection,
}

impl<'c> SymbolStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    // ========== File Operations ==========

    /// Insert or update a file row. The id is stable across updates.
    pub fn upsert_file(
        &self,
        path: &str,
        fingerprint: &str,
        category: Category,
        line_count: u32,
        mtime: Option<i64>,
    ) -> Result<i64> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO files (path, fingerprint, category, line_count, mtime, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(path) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                category = excluded.category,
                line_count = excluded.line_count,
                mtime = excluded.mtime,
                indexed_at = excluded.indexed_at
            RETURNING id
            "#,
            params![path, fingerprint, category.as_str(), line_count, mtime, unix_now()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, path, fingerprint, category, line_count, mtime, indexed_at FROM files WHERE path = ?1",
                [path],
                row_to_file,
            )
            .optional()?)
    }

    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, fingerprint, category, line_count, mtime, indexed_at FROM files ORDER BY path",
        )?;
        let files = stmt.query_map([], row_to_file)?.collect::<rusqlite::Result<_>>()?;
        Ok(files)
    }

    /// Map of path to stored fingerprint
    pub fn fingerprints(&self) -> Result<HashMap<String, String>> {
        let mut stmt = self.conn.prepare("SELECT path, fingerprint FROM files")?;
        let map = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(map)
    }

    /// Delete a file and its symbols. Returns false when the path was unknown.
    pub fn remove_file(&self, path: &str) -> Result<bool> {
        self.conn.execute(
            "DELETE FROM symbols WHERE file_id IN (SELECT id FROM files WHERE path = ?1)",
            [path],
        )?;
        let removed = self.conn.execute("DELETE FROM files WHERE path = ?1", [path])?;
        Ok(removed > 0)
    }

    // ========== Symbol Operations ==========

    /// Replace every symbol of a file with `symbols`
    pub fn replace_symbols(&self, file_id: i64, symbols: &[Symbol]) -> Result<usize> {
        self.conn.execute("DELETE FROM symbols WHERE file_id = ?1", [file_id])?;
        let mut stmt = self.conn.prepare_cached(
            r#"
            INSERT INTO symbols (file_id, name, kind, enclosing_name, start_line, end_line, visibility, signature, documentation)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )?;
        for symbol in symbols {
            stmt.execute(params![
                file_id,
                symbol.name,
                symbol.kind.as_str(),
                symbol.enclosing_name,
                symbol.start_line,
                symbol.end_line,
                symbol.visibility.as_str(),
                symbol.signature,
                symbol.documentation,
            ])?;
        }
        Ok(symbols.len())
    }

    /// Symbols of one file in line order
    pub fn symbols_in_file(&self, path: &str) -> Result<Vec<Symbol>> {
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols s JOIN files f ON f.id = s.file_id \
             WHERE f.path = ?1 ORDER BY s.start_line, s.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let symbols = stmt.query_map([path], row_to_symbol)?.collect::<rusqlite::Result<_>>()?;
        Ok(symbols)
    }

    /// Exact-name lookup, optionally restricted to one kind
    pub fn find_symbols(&self, name: &str, kind: Option<SymbolKind>) -> Result<Vec<Symbol>> {
        let sql = format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols s JOIN files f ON f.id = s.file_id \
             WHERE s.name = ?1 AND (?2 IS NULL OR s.kind = ?2) ORDER BY f.path, s.start_line"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let symbols = stmt
            .query_map(params![name, kind.map(|k| k.as_str())], row_to_symbol)?
            .collect::<rusqlite::Result<_>>()?;
        Ok(symbols)
    }

    /// Full-text match over name, documentation and signature.
    ///
    /// `fts_query` must already be a valid FTS5 expression. Results are ordered
    /// by bm25 rank.
    pub fn search(
        &self,
        fts_query: &str,
        categories: &[Category],
        kinds: &[SymbolKind],
        limit: usize,
    ) -> Result<Vec<SymbolHit>> {
        let mut sql = format!(
            "SELECT {SYMBOL_COLUMNS}, f.category, bm25(symbols_fts) AS rank \
             FROM symbols_fts JOIN symbols s ON s.id = symbols_fts.rowid \
             JOIN files f ON f.id = s.file_id \
             WHERE symbols_fts MATCH ?"
        );
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(fts_query.to_string())];

        if !categories.is_empty() {
            sql.push_str(&format!(" AND f.category IN ({})", placeholders(categories.len())));
            values.extend(categories.iter().map(|c| SqlValue::Text(c.as_str().to_string())));
        }
        if !kinds.is_empty() {
            sql.push_str(&format!(" AND s.kind IN ({})", placeholders(kinds.len())));
            values.extend(kinds.iter().map(|k| SqlValue::Text(k.as_str().to_string())));
        }
        sql.push_str(" ORDER BY rank LIMIT ?");
        values.push(SqlValue::Integer(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let hits = stmt
            .query_map(params_from_iter(values), |row| {
                let symbol = row_to_symbol(row)?;
                let category: String = row.get(10)?;
                Ok(SymbolHit {
                    symbol,
                    category: category.parse().unwrap_or_default(),
                    rank: row.get(11)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(hits)
    }

    pub fn count_symbols(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Quote each whitespace-separated term and OR them together.
///
/// Returns None when the query has no terms.
pub fn build_fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn conversion_error(idx: usize, e: crate::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    let category: String = row.get(3)?;
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        fingerprint: row.get(2)?,
        category: category.parse().map_err(|e| conversion_error(3, e))?,
        line_count: row.get(4)?,
        mtime: row.get(5)?,
        indexed_at: row.get(6)?,
    })
}

fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
    let kind: String = row.get(3)?;
    let visibility: String = row.get(7)?;
    Ok(Symbol {
        id: Some(row.get(0)?),
        path: row.get(1)?,
        name: row.get(2)?,
        kind: kind.parse::<SymbolKind>().map_err(|e| conversion_error(3, e))?,
        enclosing_name: row.get(4)?,
        start_line: row.get(5)?,
        end_line: row.get(6)?,
        visibility: visibility.parse::<Visibility>().map_err(|e| conversion_error(7, e))?,
        signature: row.get(8)?,
        documentation: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;

    fn user_symbols() -> Vec<Symbol> {
        vec![
            Symbol::new("app/models/user.rb", SymbolKind::Class, "User", 1, 20)
                .with_documentation("An account holder"),
            Symbol::new("app/models/user.rb", SymbolKind::Method, "full_name", 3, 5)
                .with_enclosing("User")
                .with_signature("def full_name"),
            Symbol::new("app/models/user.rb", SymbolKind::Method, "find_by_email", 7, 9)
                .with_enclosing("User"),
        ]
    }

    #[test]
    fn test_upsert_file_keeps_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let symbols = store.symbols();
        let a = symbols.upsert_file("app/models/user.rb", "f1", Category::Model, 20, None).unwrap();
        let b = symbols.upsert_file("app/models/user.rb", "f2", Category::Model, 22, Some(9)).unwrap();
        assert_eq!(a, b);

        let record = symbols.get_file("app/models/user.rb").unwrap().unwrap();
        assert_eq!(record.fingerprint, "f2");
        assert_eq!(record.line_count, 22);
        assert_eq!(record.category, Category::Model);
        assert_eq!(symbols.fingerprints().unwrap().len(), 1);
    }

    #[test]
    fn test_replace_symbols() {
        let store = SqliteStore::open_in_memory().unwrap();
        let symbols = store.symbols();
        let id = symbols.upsert_file("app/models/user.rb", "f1", Category::Model, 20, None).unwrap();
        symbols.replace_symbols(id, &user_symbols()).unwrap();
        assert_eq!(symbols.count_symbols().unwrap(), 3);

        symbols.replace_symbols(id, &user_symbols()[..1]).unwrap();
        let stored = symbols.symbols_in_file("app/models/user.rb").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "User");
        assert_eq!(stored[0].documentation.as_deref(), Some("An account holder"));
    }

    #[test]
    fn test_search_follows_replacements() {
        let store = SqliteStore::open_in_memory().unwrap();
        let symbols = store.symbols();
        let id = symbols.upsert_file("app/models/user.rb", "f1", Category::Model, 20, None).unwrap();
        symbols.replace_symbols(id, &user_symbols()).unwrap();

        let query = build_fts_query("email").unwrap();
        let hits = symbols.search(&query, &[], &[], 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol.name, "find_by_email");
        assert_eq!(hits[0].category, Category::Model);

        symbols.replace_symbols(id, &user_symbols()[..2]).unwrap();
        assert!(symbols.search(&query, &[], &[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let symbols = store.symbols();
        let id = symbols.upsert_file("app/models/user.rb", "f1", Category::Model, 20, None).unwrap();
        symbols.replace_symbols(id, &user_symbols()).unwrap();

        let query = build_fts_query("User account").unwrap();
        assert!(symbols.search(&query, &[Category::Controller], &[], 10).unwrap().is_empty());
        let classes = symbols.search(&query, &[], &[SymbolKind::Class], 10).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].symbol.kind, SymbolKind::Class);
    }

    #[test]
    fn test_remove_file() {
        let store = SqliteStore::open_in_memory().unwrap();
        let symbols = store.symbols();
        let id = symbols.upsert_file("app/models/user.rb", "f1", Category::Model, 20, None).unwrap();
        symbols.replace_symbols(id, &user_symbols()).unwrap();

        assert!(symbols.remove_file("app/models/user.rb").unwrap());
        assert!(!symbols.remove_file("app/models/user.rb").unwrap());
        assert_eq!(symbols.count_symbols().unwrap(), 0);
        let query = build_fts_query("User").unwrap();
        assert!(symbols.search(&query, &[], &[], 10).unwrap().is_empty());
    }

    #[test]
    fn test_build_fts_query() {
        assert_eq!(build_fts_query("  "), None);
        assert_eq!(build_fts_query("user email").unwrap(), "\"user\" OR \"email\"");
        assert_eq!(build_fts_query("say\"hi").unwrap(), "\"say\"\"hi\"");
    }

    #[test]
    fn test_find_symbols() {
        let store = SqliteStore::open_in_memory().unwrap();
        let symbols = store.symbols();
        let id = symbols.upsert_file("app/models/user.rb", "f1", Category::Model, 20, None).unwrap();
        symbols.replace_symbols(id, &user_symbols()).unwrap();
        assert_eq!(symbols.find_symbols("User", None).unwrap().len(), 1);
        assert!(symbols.find_symbols("User", Some(SymbolKind::Method)).unwrap().is_empty());
    }
}
