//! Graph node types
//!
//! Nodes are deduplicated on `(kind, key)`. Keys follow a fixed shape per kind:
//! - `File`: relative path (`app/models/user.rb`)
//! - `Class`, `Module`: constant name (`Admin::User`)
//! - `Method`: `Owner#name` (instance) or `Owner.name` (class-level)
//! - `Table`: table name, `Column`: `table.column`, `Index`: index name

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Class,
    Module,
    Method,
    Table,
    Column,
    Index,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Module => "module",
            NodeKind::Method => "method",
            NodeKind::Table => "table",
            NodeKind::Column => "column",
            NodeKind::Index => "index",
        }
    }

    pub fn all() -> &'static [NodeKind] {
        &[
            NodeKind::File,
            NodeKind::Class,
            NodeKind::Module,
            NodeKind::Method,
            NodeKind::Table,
            NodeKind::Column,
            NodeKind::Index,
        ]
    }

    /// Kinds produced by the schema projection
    pub fn is_schema(&self) -> bool {
        matches!(self, NodeKind::Table | NodeKind::Column | NodeKind::Index)
    }
}

impl FromStr for NodeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(NodeKind::File),
            "class" => Ok(NodeKind::Class),
            "module" => Ok(NodeKind::Module),
            "method" => Ok(NodeKind::Method),
            "table" => Ok(NodeKind::Table),
            "column" => Ok(NodeKind::Column),
            "index" => Ok(NodeKind::Index),
            _ => Err(Error::InvalidQuery(format!("Unknown node kind: {}", s))),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a node's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeSource {
    FromSource,
    FromSchema,
    Manual,
}

impl NodeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeSource::FromSource => "from-source",
            NodeSource::FromSchema => "from-schema",
            NodeSource::Manual => "manual",
        }
    }
}

impl FromStr for NodeSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "from-source" => Ok(NodeSource::FromSource),
            "from-schema" => Ok(NodeSource::FromSchema),
            "manual" => Ok(NodeSource::Manual),
            _ => Err(Error::InvalidQuery(format!("Unknown node source: {}", s))),
        }
    }
}

impl std::fmt::Display for NodeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Location of a node in a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl Anchor {
    pub fn new(path: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            path: path.into(),
            start_line,
            end_line,
        }
    }
}

/// A stored graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    pub kind: NodeKind,
    pub key: String,
    pub label: String,
    pub source: NodeSource,
    pub anchor: Option<Anchor>,
    pub metadata: serde_json::Value,
}

impl GraphNode {
    /// Placeholder nodes stand in for names referenced before (or without)
    /// being defined.
    pub fn is_inferred(&self) -> bool {
        self.metadata
            .get("inferred")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// `kind:key` display form
    pub fn display_key(&self) -> String {
        format!("{}:{}", self.kind, self.key)
    }
}

/// Input to a node upsert
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub kind: NodeKind,
    pub key: String,
    pub label: Option<String>,
    pub source: NodeSource,
    pub anchor: Option<Anchor>,
    pub metadata: serde_json::Value,
}

impl NewNode {
    pub fn new(kind: NodeKind, key: impl Into<String>, source: NodeSource) -> Self {
        Self {
            kind,
            key: key.into(),
            label: None,
            source,
            anchor: None,
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
