//! Relational schema model
//!
//! Tables, columns, indexes and foreign keys as described by a Rails-style
//! `schema.rb`. Parsed by [`parser::parse_schema`], persisted by the schema
//! store and consumed by the graph builder and the association mapper.

pub mod parser;

pub use parser::parse_schema;

use serde::{Deserialize, Serialize};

/// Origin marker recorded on everything the schema projection produces
pub const SCHEMA_ORIGIN: &str = "@schema";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub limit: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub comment: Option<String>,
    pub primary_key: bool,
}

impl SchemaColumn {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
            limit: None,
            precision: None,
            scale: None,
            comment: None,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
    /// Partial index predicate
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    pub using: Option<String>,
}

impl SchemaIndex {
    /// Rails' default name: `index_<table>_on_<col1>_and_<col2>`
    pub fn default_name(table: &str, columns: &[String]) -> String {
        format!("index_{}_on_{}", table, columns.join("_and_"))
    }

    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        let table = table.into();
        Self {
            name: Self::default_name(&table, &columns),
            table,
            columns,
            unique: false,
            where_clause: None,
            using: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Whether this is a unique index on exactly `column`
    pub fn is_unique_on(&self, column: &str) -> bool {
        self.unique && self.columns.len() == 1 && self.columns[0] == column
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
    pub name: Option<String>,
}

impl ForeignKey {
    pub fn new(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: "id".to_string(),
            on_delete: None,
            on_update: None,
            name: None,
        }
    }

    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        self.on_delete = Some(action.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTable {
    pub name: String,
    pub primary_key: Vec<String>,
    pub comment: Option<String>,
    pub columns: Vec<SchemaColumn>,
}

impl SchemaTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: Vec::new(),
            comment: None,
            columns: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Something the parser could not make sense of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaWarning {
    pub line: usize,
    pub message: String,
}

/// Everything read from one schema description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedSchema {
    pub version: Option<String>,
    pub tables: Vec<SchemaTable>,
    pub indexes: Vec<SchemaIndex>,
    pub foreign_keys: Vec<ForeignKey>,
    pub warnings: Vec<SchemaWarning>,
}

impl ParsedSchema {
    pub fn table(&self, name: &str) -> Option<&SchemaTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn indexes_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a SchemaIndex> + 'a {
        self.indexes.iter().filter(move |i| i.table == table)
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }
}
