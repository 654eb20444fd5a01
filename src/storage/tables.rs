//! Persisted relational schema (tables, columns, indexes, foreign keys).

use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::schema::{ForeignKey, ParsedSchema, SchemaColumn, SchemaIndex, SchemaTable};
use crate::Result;

/// One row of `list_tables`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub column_count: usize,
    pub index_count: usize,
    pub primary_key: Vec<String>,
    pub comment: Option<String>,
}

pub struct SchemaStore<'c> {
    conn: &'c Connection,
}

impl<'c> SchemaStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Replace the whole stored schema with `schema`
    pub fn replace(&self, schema: &ParsedSchema) -> Result<()> {
        self.clear()?;

        let mut insert_table = self.conn.prepare_cached(
            "INSERT INTO schema_tables (name, position, primary_key, comment) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut insert_column = self.conn.prepare_cached(
            r#"
            INSERT INTO schema_columns
                (table_name, name, position, sql_type, nullable, default_value, col_limit, col_precision, col_scale, comment, primary_key)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )?;
        for (position, table) in schema.tables.iter().enumerate() {
            insert_table.execute(params![
                table.name,
                position as i64,
                serde_json::to_string(&table.primary_key)?,
                table.comment,
            ])?;
            for (column_position, column) in table.columns.iter().enumerate() {
                insert_column.execute(params![
                    table.name,
                    column.name,
                    column_position as i64,
                    column.sql_type,
                    column.nullable,
                    column.default,
                    column.limit,
                    column.precision,
                    column.scale,
                    column.comment,
                    column.primary_key,
                ])?;
            }
        }

        let mut insert_index = self.conn.prepare_cached(
            r#"
            INSERT OR REPLACE INTO schema_indexes (table_name, name, position, columns, is_unique, where_clause, using_method)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )?;
        for (position, index) in schema.indexes.iter().enumerate() {
            if schema.table(&index.table).is_none() {
                continue;
            }
            insert_index.execute(params![
                index.table,
                index.name,
                position as i64,
                serde_json::to_string(&index.columns)?,
                index.unique,
                index.where_clause,
                index.using,
            ])?;
        }

        let mut insert_fk = self.conn.prepare_cached(
            r#"
            INSERT INTO schema_foreign_keys (from_table, from_column, to_table, to_column, on_delete, on_update, name)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )?;
        for fk in &schema.foreign_keys {
            insert_fk.execute(params![
                fk.from_table,
                fk.from_column,
                fk.to_table,
                fk.to_column,
                fk.on_delete,
                fk.on_update,
                fk.name,
            ])?;
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM schema_foreign_keys; DELETE FROM schema_indexes; \
             DELETE FROM schema_columns; DELETE FROM schema_tables;",
        )?;
        Ok(())
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM schema_tables ORDER BY position")?;
        let names = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
        Ok(names)
    }

    pub fn list_tables(&self) -> Result<Vec<TableSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.name, t.primary_key, t.comment,
                   (SELECT COUNT(*) FROM schema_columns c WHERE c.table_name = t.name),
                   (SELECT COUNT(*) FROM schema_indexes i WHERE i.table_name = t.name)
            FROM schema_tables t ORDER BY t.name
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let primary_key: String = row.get(1)?;
            let columns: i64 = row.get(3)?;
            let indexes: i64 = row.get(4)?;
            Ok(TableSummary {
                name: row.get(0)?,
                primary_key: parse_list(1, &primary_key)?,
                comment: row.get(2)?,
                column_count: columns as usize,
                index_count: indexes as usize,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// One table with its columns in declaration order
    pub fn table(&self, name: &str) -> Result<Option<SchemaTable>> {
        let head = self
            .conn
            .query_row(
                "SELECT name, primary_key, comment FROM schema_tables WHERE name = ?1",
                [name],
                |row| {
                    let primary_key: String = row.get(1)?;
                    Ok(SchemaTable {
                        name: row.get(0)?,
                        primary_key: parse_list(1, &primary_key)?,
                        comment: row.get(2)?,
                        columns: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut table) = head else {
            return Ok(None);
        };
        table.columns = self.columns_of(name)?;
        Ok(Some(table))
    }

    /// Every table with columns, in declaration order
    pub fn all_tables(&self) -> Result<Vec<SchemaTable>> {
        let mut tables = Vec::new();
        for name in self.table_names()? {
            if let Some(table) = self.table(&name)? {
                tables.push(table);
            }
        }
        Ok(tables)
    }

    fn columns_of(&self, table: &str) -> Result<Vec<SchemaColumn>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, sql_type, nullable, default_value, col_limit, col_precision, col_scale, comment, primary_key
            FROM schema_columns WHERE table_name = ?1 ORDER BY position
            "#,
        )?;
        let columns = stmt
            .query_map([table], |row| {
                Ok(SchemaColumn {
                    name: row.get(0)?,
                    sql_type: row.get(1)?,
                    nullable: row.get(2)?,
                    default: row.get(3)?,
                    limit: row.get(4)?,
                    precision: row.get(5)?,
                    scale: row.get(6)?,
                    comment: row.get(7)?,
                    primary_key: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(columns)
    }

    /// Indexes of one table, or of every table when `table` is None
    pub fn indexes(&self, table: Option<&str>) -> Result<Vec<SchemaIndex>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT table_name, name, columns, is_unique, where_clause, using_method
            FROM schema_indexes WHERE (?1 IS NULL OR table_name = ?1) ORDER BY position
            "#,
        )?;
        let indexes = stmt
            .query_map([table], |row| {
                let columns: String = row.get(2)?;
                Ok(SchemaIndex {
                    table: row.get(0)?,
                    name: row.get(1)?,
                    columns: parse_list(2, &columns)?,
                    unique: row.get(3)?,
                    where_clause: row.get(4)?,
                    using: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(indexes)
    }

    pub fn foreign_keys(&self) -> Result<Vec<ForeignKey>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT from_table, from_column, to_table, to_column, on_delete, on_update, name
            FROM schema_foreign_keys ORDER BY id
            "#,
        )?;
        let fks = stmt
            .query_map([], |row| {
                Ok(ForeignKey {
                    from_table: row.get(0)?,
                    from_column: row.get(1)?,
                    to_table: row.get(2)?,
                    to_column: row.get(3)?,
                    on_delete: row.get(4)?,
                    on_update: row.get(5)?,
                    name: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(fks)
    }

    /// Rebuild the full schema model from storage (warnings are not kept)
    pub fn load(&self) -> Result<ParsedSchema> {
        Ok(ParsedSchema {
            version: None,
            tables: self.all_tables()?,
            indexes: self.indexes(None)?,
            foreign_keys: self.foreign_keys()?,
            warnings: Vec::new(),
        })
    }

    /// Column count per table
    pub fn column_counts(&self) -> Result<HashMap<String, usize>> {
        let mut stmt = self
            .conn
            .prepare("SELECT table_name, COUNT(*) FROM schema_columns GROUP BY table_name")?;
        let counts = stmt
            .query_map([], |row| {
                let n: i64 = row.get(1)?;
                Ok((row.get(0)?, n as usize))
            })?
            .collect::<rusqlite::Result<_>>()?;
        Ok(counts)
    }
}

fn parse_list(idx: usize, text: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
