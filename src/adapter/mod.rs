//! Extractor Framework
//!
//! An extractor turns one source file into a [`ParseResult`]. The core never
//! parses source itself; it depends only on that contract.
//!
//! Two extractors ship with the crate: [`CommandExtractor`] runs an external
//! parser process, [`LineExtractor`] is a built-in approximate Ruby matcher.

pub mod framework;
pub mod category;
pub mod command;
pub mod lines;

pub use framework::{
    AssociationMacro, Extractor, ParseResult, ParsedAssociation, ParsedSymbol, SourceInput,
};
pub use category::Category;
pub use command::CommandExtractor;
pub use lines::LineExtractor;
