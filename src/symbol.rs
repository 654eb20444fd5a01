//! Symbol types
//!
//! Symbols are the relational side of the index: every named entity an
//! extractor reports for a file is stored as a row owned by that file.
//! Seven kinds are distinguished:
//! - `Class`, `Module`: containers, also projected into the graph
//! - `Method`: instance or class-level methods, also projected
//! - `Scope`, `Attribute`, `Constant`, `Association`: relational only

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of a stored symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Module,
    Method,
    /// Named query scope (`scope :active, -> { ... }`)
    Scope,
    /// Generated accessor (`attr_accessor`, `attribute`)
    Attribute,
    Constant,
    /// Association macro (`has_many :posts`)
    Association,
}

impl SymbolKind {
    /// Get the string representation of the symbol kind
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Module => "module",
            SymbolKind::Method => "method",
            SymbolKind::Scope => "scope",
            SymbolKind::Attribute => "attribute",
            SymbolKind::Constant => "constant",
            SymbolKind::Association => "association",
        }
    }

    /// Get all symbol kinds
    pub fn all() -> &'static [SymbolKind] {
        &[
            SymbolKind::Class,
            SymbolKind::Module,
            SymbolKind::Method,
            SymbolKind::Scope,
            SymbolKind::Attribute,
            SymbolKind::Constant,
            SymbolKind::Association,
        ]
    }

    /// Whether symbols of this kind become graph nodes
    pub fn is_projected(&self) -> bool {
        match self {
            SymbolKind::Class | SymbolKind::Module | SymbolKind::Method => true,
            SymbolKind::Scope | SymbolKind::Attribute | SymbolKind::Constant | SymbolKind::Association => false,
        }
    }

    /// Whether this kind can enclose other symbols
    pub fn is_container(&self) -> bool {
        matches!(self, SymbolKind::Class | SymbolKind::Module)
    }
}

impl FromStr for SymbolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "class" => Ok(SymbolKind::Class),
            "module" => Ok(SymbolKind::Module),
            "method" | "def" | "function" => Ok(SymbolKind::Method),
            "scope" => Ok(SymbolKind::Scope),
            "attribute" | "attr" => Ok(SymbolKind::Attribute),
            "constant" | "const" => Ok(SymbolKind::Constant),
            "association" => Ok(SymbolKind::Association),
            _ => Err(Error::InvalidQuery(format!("Unknown symbol kind: {}", s))),
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Method/attribute visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "protected" => Ok(Visibility::Protected),
            "private" => Ok(Visibility::Private),
            _ => Err(Error::InvalidQuery(format!("Unknown visibility: {}", s))),
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored symbol row.
///
/// Symbols are exclusively owned by their file: the whole set for a file is
/// replaced on every re-index, so `id` is only stable between re-indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    /// Row id (None until stored)
    pub id: Option<i64>,
    /// File path relative to the indexed root
    pub path: String,
    pub name: String,
    pub kind: SymbolKind,
    /// Name of the enclosing class/module, if any
    pub enclosing_name: Option<String>,
    /// Starting line number (1-indexed)
    pub start_line: u32,
    /// Ending line number (1-indexed, inclusive)
    pub end_line: u32,
    pub visibility: Visibility,
    pub signature: Option<String>,
    pub documentation: Option<String>,
}

impl Symbol {
    pub fn new(
        path: impl Into<String>,
        kind: SymbolKind,
        name: impl Into<String>,
        start_line: u32,
        end_line: u32,
    ) -> Self {
        Self {
            id: None,
            path: path.into(),
            name: name.into(),
            kind,
            enclosing_name: None,
            start_line,
            end_line,
            visibility: Visibility::Public,
            signature: None,
            documentation: None,
        }
    }

    pub fn with_enclosing(mut self, enclosing: impl Into<String>) -> Self {
        self.enclosing_name = Some(enclosing.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(doc.into());
        self
    }

    /// `Enclosing#name` style display name
    pub fn qualified_name(&self) -> String {
        match (&self.enclosing_name, self.kind) {
            (Some(enclosing), SymbolKind::Method) => format!("{}#{}", enclosing, self.name),
            (Some(enclosing), _) => format!("{}::{}", enclosing, self.name),
            (None, _) => self.name.clone(),
        }
    }

    /// Get a short description for display
    pub fn short_description(&self) -> String {
        match &self.signature {
            Some(sig) => format!("{} {}", self.kind, sig),
            None => format!("{} {}", self.kind, self.qualified_name()),
        }
    }
}
