//! Core extractor framework
//!
//! Defines the parse result contract every extractor produces and the
//! [`Extractor`] trait the indexer drives.

use crate::Result;
use crate::edge::EdgeKind;
use crate::symbol::{SymbolKind, Visibility};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file handed to an extractor
#[derive(Debug, Clone)]
pub struct SourceInput {
    /// Path relative to the indexed root, `/`-separated
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub content: String,
}

/// A symbol as reported by an extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    #[serde(default, alias = "enclosing_name")]
    pub enclosing_name: Option<String>,
    #[serde(alias = "start_line")]
    pub start_line: u32,
    #[serde(alias = "end_line")]
    pub end_line: u32,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub superclass: Option<String>,
    /// `def self.x` / `class << self` methods
    #[serde(default, alias = "class_method")]
    pub class_method: bool,
}

impl ParsedSymbol {
    pub fn new(kind: SymbolKind, name: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            enclosing_name: None,
            start_line,
            end_line,
            visibility: Visibility::Public,
            signature: None,
            documentation: None,
            superclass: None,
            class_method: false,
        }
    }

    pub fn within(mut self, enclosing: impl Into<String>) -> Self {
        self.enclosing_name = Some(enclosing.into());
        self
    }

    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn class_level(mut self) -> Self {
        self.class_method = true;
        self
    }

    /// Class-level method, by flag or by a `self.` name prefix
    pub fn is_class_method(&self) -> bool {
        self.class_method || self.name.starts_with("self.")
    }

    /// Name with any `self.` prefix removed
    pub fn bare_name(&self) -> &str {
        self.name.strip_prefix("self.").unwrap_or(&self.name)
    }
}

/// Association macros an extractor can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMacro {
    BelongsTo,
    HasMany,
    HasOne,
    HasAndBelongsToMany,
}

impl AssociationMacro {
    pub fn edge_kind(&self) -> EdgeKind {
        match self {
            AssociationMacro::BelongsTo => EdgeKind::BelongsTo,
            AssociationMacro::HasMany => EdgeKind::HasMany,
            AssociationMacro::HasOne => EdgeKind::HasOne,
            AssociationMacro::HasAndBelongsToMany => EdgeKind::HasAndBelongsToMany,
        }
    }

    pub fn from_macro(name: &str) -> Option<Self> {
        match name {
            "belongs_to" => Some(AssociationMacro::BelongsTo),
            "has_many" => Some(AssociationMacro::HasMany),
            "has_one" => Some(AssociationMacro::HasOne),
            "has_and_belongs_to_many" => Some(AssociationMacro::HasAndBelongsToMany),
            _ => None,
        }
    }
}

/// A declared association (`has_many :posts, dependent: :destroy`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedAssociation {
    pub kind: AssociationMacro,
    pub name: String,
    /// Explicit target class, when the extractor resolved one
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl ParsedAssociation {
    pub fn class_name(&self) -> Option<&str> {
        self.options.get("class_name").and_then(|v| v.as_str())
    }
}

/// Everything an extractor reports for one file.
///
/// `fingerprint`, `category` and `line_count` are optional; the indexer fills
/// them in when missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "line_count")]
    pub line_count: Option<u32>,
    #[serde(default)]
    pub symbols: Vec<ParsedSymbol>,
    #[serde(default)]
    pub associations: Vec<ParsedAssociation>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub extends: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default, alias = "require_relatives")]
    pub require_relatives: Vec<String>,
}

impl ParseResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(&mut self, symbol: ParsedSymbol) {
        self.symbols.push(symbol);
    }

    /// First class or module declared in the file
    pub fn primary_container(&self) -> Option<&ParsedSymbol> {
        self.symbols.iter().find(|s| s.kind.is_container())
    }

    /// First class declared in the file
    pub fn primary_class(&self) -> Option<&ParsedSymbol> {
        self.symbols.iter().find(|s| s.kind == SymbolKind::Class)
    }
}

/// Turns one source file into a [`ParseResult`].
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name for logs and status output
    fn name(&self) -> &str;

    async fn extract(&self, input: &SourceInput) -> Result<ParseResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_accepts_camel_and_snake_case() {
        let camel = r#"{
            "lineCount": 12,
            "symbols": [
                {"name": "User", "kind": "class", "startLine": 1, "endLine": 12, "visibility": "public", "superclass": "ApplicationRecord"},
                {"name": "self.find_by_email", "kind": "method", "enclosingName": "User", "startLine": 3, "endLine": 5, "visibility": "public"}
            ],
            "associations": [{"kind": "has_many", "name": "posts", "options": {"dependent": "destroy"}}],
            "requireRelatives": ["../lib/thing"]
        }"#;
        let parsed: ParseResult = serde_json::from_str(camel).unwrap();
        assert_eq!(parsed.line_count, Some(12));
        assert_eq!(parsed.symbols[0].superclass.as_deref(), Some("ApplicationRecord"));
        assert!(parsed.symbols[1].is_class_method());
        assert_eq!(parsed.symbols[1].bare_name(), "find_by_email");
        assert_eq!(parsed.associations[0].kind, AssociationMacro::HasMany);
        assert_eq!(parsed.require_relatives, vec!["../lib/thing"]);

        let snake = r#"{
            "line_count": 4,
            "symbols": [{"name": "run", "kind": "method", "enclosing_name": "Job", "start_line": 2, "end_line": 3, "class_method": true}],
            "require_relatives": ["helper"]
        }"#;
        let parsed: ParseResult = serde_json::from_str(snake).unwrap();
        assert_eq!(parsed.line_count, Some(4));
        assert_eq!(parsed.symbols[0].enclosing_name.as_deref(), Some("Job"));
        assert!(parsed.symbols[0].is_class_method());
        assert_eq!(parsed.symbols[0].visibility, Visibility::Public);
        assert_eq!(parsed.require_relatives, vec!["helper"]);
    }

    #[test]
    fn test_primary_container() {
        let mut result = ParseResult::new();
        result.add_symbol(ParsedSymbol::new(SymbolKind::Constant, "VERSION", 1, 1));
        result.add_symbol(ParsedSymbol::new(SymbolKind::Module, "Admin", 2, 10));
        result.add_symbol(ParsedSymbol::new(SymbolKind::Class, "Admin::User", 3, 9));
        assert_eq!(result.primary_container().unwrap().name, "Admin");
        assert_eq!(result.primary_class().unwrap().name, "Admin::User");
    }
}
