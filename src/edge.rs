//! Edge types - typed relationships between graph nodes
//!
//! Structural edges (`defines`, `inherits`, `includes`, `extends`, `requires`)
//! come from source files. Association edges (`belongs_to`, `has_many`, ...)
//! link model classes. Schema edges (`has_column`, `has_index`, `references`,
//! `backs`) come from the schema projection.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// File or container defines a symbol
    Defines,
    /// Class inherits from a superclass
    Inherits,
    /// Class/module includes a module
    Includes,
    /// Class/module extends a module
    Extends,
    BelongsTo,
    HasMany,
    HasOne,
    HasAndBelongsToMany,
    /// Column (foreign key) references a table
    References,
    HasColumn,
    HasIndex,
    /// Model class is backed by a table
    Backs,
    /// File requires another file
    Requires,
}

impl EdgeKind {
    /// Get the string representation of the edge kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Defines => "defines",
            EdgeKind::Inherits => "inherits",
            EdgeKind::Includes => "includes",
            EdgeKind::Extends => "extends",
            EdgeKind::BelongsTo => "belongs_to",
            EdgeKind::HasMany => "has_many",
            EdgeKind::HasOne => "has_one",
            EdgeKind::HasAndBelongsToMany => "has_and_belongs_to_many",
            EdgeKind::References => "references",
            EdgeKind::HasColumn => "has_column",
            EdgeKind::HasIndex => "has_index",
            EdgeKind::Backs => "backs",
            EdgeKind::Requires => "requires",
        }
    }

    /// Get all edge kinds
    pub fn all() -> &'static [EdgeKind] {
        &[
            EdgeKind::Defines,
            EdgeKind::Inherits,
            EdgeKind::Includes,
            EdgeKind::Extends,
            EdgeKind::BelongsTo,
            EdgeKind::HasMany,
            EdgeKind::HasOne,
            EdgeKind::HasAndBelongsToMany,
            EdgeKind::References,
            EdgeKind::HasColumn,
            EdgeKind::HasIndex,
            EdgeKind::Backs,
            EdgeKind::Requires,
        ]
    }

    /// Association edges between model classes
    pub fn is_association(&self) -> bool {
        matches!(
            self,
            EdgeKind::BelongsTo | EdgeKind::HasMany | EdgeKind::HasOne | EdgeKind::HasAndBelongsToMany
        )
    }

    /// Association kinds whose target is named in the plural (`has_many :posts`)
    pub fn is_collection(&self) -> bool {
        matches!(self, EdgeKind::HasMany | EdgeKind::HasAndBelongsToMany)
    }
}

impl FromStr for EdgeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "defines" => Ok(EdgeKind::Defines),
            "inherits" => Ok(EdgeKind::Inherits),
            "includes" => Ok(EdgeKind::Includes),
            "extends" => Ok(EdgeKind::Extends),
            "belongs_to" => Ok(EdgeKind::BelongsTo),
            "has_many" => Ok(EdgeKind::HasMany),
            "has_one" => Ok(EdgeKind::HasOne),
            "has_and_belongs_to_many" | "habtm" => Ok(EdgeKind::HasAndBelongsToMany),
            "references" => Ok(EdgeKind::References),
            "has_column" => Ok(EdgeKind::HasColumn),
            "has_index" => Ok(EdgeKind::HasIndex),
            "backs" => Ok(EdgeKind::Backs),
            "requires" => Ok(EdgeKind::Requires),
            _ => Err(Error::InvalidQuery(format!("Unknown edge kind: {}", s))),
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored graph edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: i64,
    pub kind: EdgeKind,
    pub src_id: i64,
    pub dst_id: i64,
    /// `path:line` strings where the relationship was declared
    pub locations: Vec<String>,
    pub metadata: serde_json::Value,
    /// File path (or schema marker) whose projection produced this edge
    pub origin: Option<String>,
}

impl GraphEdge {
    /// The endpoint opposite to `node_id`
    pub fn other_end(&self, node_id: i64) -> i64 {
        if self.src_id == node_id { self.dst_id } else { self.src_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_kind_round_trip() {
        for kind in EdgeKind::all() {
            assert_eq!(kind.as_str().parse::<EdgeKind>().unwrap(), *kind);
        }
        assert!("calls".parse::<EdgeKind>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&EdgeKind::HasAndBelongsToMany).unwrap();
        assert_eq!(json, "\"has_and_belongs_to_many\"");
    }

    #[test]
    fn test_association_kinds() {
        assert!(EdgeKind::HasOne.is_association());
        assert!(!EdgeKind::References.is_association());
        assert!(EdgeKind::HasMany.is_collection());
        assert!(!EdgeKind::BelongsTo.is_collection());
    }

    #[test]
    fn test_other_end() {
        let edge = GraphEdge {
            id: 1,
            kind: EdgeKind::Defines,
            src_id: 10,
            dst_id: 20,
            locations: vec![],
            metadata: serde_json::json!({}),
            origin: None,
        };
        assert_eq!(edge.other_end(10), 20);
        assert_eq!(edge.other_end(20), 10);
    }
}
