//! Line-matching Ruby extractor
//!
//! An approximate, dependency-free alternative to an external parser: it
//! recognizes declarations by their leading keyword and tracks `end`s with a
//! block stack. Good enough for conventional Rails code; metaprogramming and
//! unusual layouts are simply missed.

use super::framework::{AssociationMacro, Extractor, ParseResult, ParsedAssociation, ParsedSymbol, SourceInput};
use crate::args::{Args, Value};
use crate::symbol::{SymbolKind, Visibility};
use crate::{Error, Result};
use async_trait::async_trait;
use regex::Regex;

/// Statement keywords that open a block closed by `end`
const BLOCK_OPENERS: &[&str] = &["if", "unless", "while", "until", "case", "begin", "for"];

/// Loop keywords whose optional `do` does not open a second block
const LOOP_KEYWORDS: &[&str] = &["while", "until", "for"];

struct Patterns {
    class: Regex,
    singleton: Regex,
    module: Regex,
    def: Regex,
    visibility: Regex,
    attr: Regex,
    attribute: Regex,
    constant: Regex,
    scope: Regex,
    association: Regex,
    mixin: Regex,
    require: Regex,
    heredoc: Regex,
    assign_opener: Regex,
}

impl Patterns {
    fn compile() -> std::result::Result<Self, regex::Error> {
        Ok(Self {
            class: Regex::new(r"^class\s+((?:::)?[A-Z][\w:]*)(?:\s*<\s*((?:::)?[A-Z][\w:]*))?")?,
            singleton: Regex::new(r"^class\s*<<\s*self\b")?,
            module: Regex::new(r"^module\s+((?:::)?[A-Z][\w:]*)")?,
            def: Regex::new(
                r"^(?:(private|protected|public)\s+)?def\s+(self\.)?([A-Za-z_]\w*[?!=]?|\[\]=?|[-+*/%<>=!~^&|]+)(.*)$",
            )?,
            visibility: Regex::new(r"^(private|protected|public)$")?,
            attr: Regex::new(r"^attr_(?:reader|writer|accessor)\b\s*(.*)$")?,
            attribute: Regex::new(r"^attribute\s+:(\w+)")?,
            constant: Regex::new(r"^([A-Z][A-Z0-9_]*)\s*=(?:[^=~>]|$)")?,
            scope: Regex::new(r"^scope\s*\(?\s*:(\w+)")?,
            association: Regex::new(r"^(belongs_to|has_many|has_one|has_and_belongs_to_many)\b(.*)$")?,
            mixin: Regex::new(r"^(include|extend|prepend)\s+(.+)$")?,
            require: Regex::new(r#"^require(_relative)?\b\s*\(?\s*['"]([^'"]+)['"]"#)?,
            heredoc: Regex::new(r#"<<[~-]?['"]?([A-Z_][A-Za-z0-9_]*)"#)?,
            assign_opener: Regex::new(r"(?:^|[^=!<>])=\s*(?:if|unless|case|begin|while|until)\b")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FrameKind {
    /// Class or module, with its qualified name
    Container(String),
    /// `class << self`
    Singleton,
    Method,
    Block,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    symbol: Option<usize>,
    visibility: Visibility,
}

/// Regex-based extractor for Ruby sources
pub struct LineExtractor {
    patterns: Patterns,
}

impl LineExtractor {
    pub fn new() -> Result<Self> {
        let patterns = Patterns::compile().map_err(|e| Error::Extractor(e.to_string()))?;
        Ok(Self { patterns })
    }

    /// Extract synchronously; [`Extractor::extract`] delegates here.
    pub fn extract_source(&self, content: &str) -> ParseResult {
        let mut state = FileState {
            patterns: &self.patterns,
            result: ParseResult::new(),
            stack: Vec::new(),
        };

        let mut doc_lines: Vec<String> = Vec::new();
        let mut heredoc: Option<String> = None;
        let mut in_block_comment = false;
        let mut line_count = 0u32;

        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx as u32 + 1;
            line_count = line_no;

            if in_block_comment {
                if raw_line.starts_with("=end") {
                    in_block_comment = false;
                }
                continue;
            }
            if raw_line.starts_with("=begin") {
                in_block_comment = true;
                continue;
            }
            if let Some(terminator) = &heredoc {
                if raw_line.trim() == terminator.as_str() {
                    heredoc = None;
                }
                continue;
            }

            let trimmed = raw_line.trim();
            if let Some(comment) = trimmed.strip_prefix('#') {
                doc_lines.push(comment.strip_prefix(' ').unwrap_or(comment).to_string());
                continue;
            }

            let raw = strip_comment(trimmed).trim_end();
            if raw.is_empty() {
                doc_lines.clear();
                continue;
            }

            let doc = (!doc_lines.is_empty()).then(|| doc_lines.join("\n"));
            doc_lines.clear();

            let code = blank_strings(raw);
            state.line(raw, &code, line_no, doc);

            if let Some(cap) = self.patterns.heredoc.captures(raw) {
                heredoc = Some(cap[1].to_string());
            }
        }

        state.finish(line_count)
    }
}

#[async_trait]
impl Extractor for LineExtractor {
    fn name(&self) -> &str {
        "line-matcher"
    }

    async fn extract(&self, input: &SourceInput) -> Result<ParseResult> {
        Ok(self.extract_source(&input.content))
    }
}

struct FileState<'p> {
    patterns: &'p Patterns,
    result: ParseResult,
    stack: Vec<Frame>,
}

impl FileState<'_> {
    fn container(&self) -> Option<&str> {
        self.stack.iter().rev().find_map(|f| match &f.kind {
            FrameKind::Container(name) => Some(name.as_str()),
            _ => None,
        })
    }

    fn in_method(&self) -> bool {
        self.stack.iter().any(|f| f.kind == FrameKind::Method)
    }

    fn in_singleton(&self) -> bool {
        self.stack
            .iter()
            .rev()
            .find(|f| matches!(f.kind, FrameKind::Container(_) | FrameKind::Singleton))
            .is_some_and(|f| f.kind == FrameKind::Singleton)
    }

    /// Visibility in effect for the innermost class body
    fn scope_frame(&mut self) -> Option<&mut Frame> {
        self.stack
            .iter_mut()
            .rev()
            .find(|f| matches!(f.kind, FrameKind::Container(_) | FrameKind::Singleton))
    }

    fn current_visibility(&self) -> Visibility {
        self.stack
            .iter()
            .rev()
            .find(|f| matches!(f.kind, FrameKind::Container(_) | FrameKind::Singleton))
            .map(|f| f.visibility)
            .unwrap_or_default()
    }

    fn push_symbol(&mut self, mut symbol: ParsedSymbol, doc: Option<String>) -> usize {
        if symbol.enclosing_name.is_none() {
            if let Some(container) = self.container() {
                symbol.enclosing_name = Some(container.to_string());
            }
        }
        symbol.documentation = doc;
        self.result.symbols.push(symbol);
        self.result.symbols.len() - 1
    }

    fn qualify(&self, declared: &str) -> (String, Option<String>) {
        if let Some(absolute) = declared.strip_prefix("::") {
            return (absolute.to_string(), None);
        }
        match self.container() {
            Some(outer) => (format!("{}::{}", outer, declared), Some(outer.to_string())),
            None => (declared.to_string(), None),
        }
    }

    fn line(&mut self, raw: &str, code: &str, line_no: u32, doc: Option<String>) {
        let patterns = self.patterns;
        let first = first_word(code);
        let mut ends = count_keyword(code, "end");

        if first == "end" && ends > 0 {
            self.pop(line_no);
            ends -= 1;
        }

        if patterns.singleton.is_match(code) {
            self.stack.push(Frame {
                kind: FrameKind::Singleton,
                symbol: None,
                visibility: Visibility::Public,
            });
        } else if let Some(cap) = patterns.class.captures(raw) {
            let (name, enclosing) = self.qualify(&cap[1]);
            let mut symbol = ParsedSymbol::new(SymbolKind::Class, name.clone(), line_no, line_no);
            symbol.enclosing_name = enclosing;
            symbol.superclass = cap.get(2).map(|m| m.as_str().trim_start_matches("::").to_string());
            symbol.signature = Some(raw.to_string());
            let idx = self.push_symbol(symbol, doc);
            self.stack.push(Frame {
                kind: FrameKind::Container(name),
                symbol: Some(idx),
                visibility: Visibility::Public,
            });
        } else if let Some(cap) = patterns.module.captures(raw) {
            let (name, enclosing) = self.qualify(&cap[1]);
            let mut symbol = ParsedSymbol::new(SymbolKind::Module, name.clone(), line_no, line_no);
            symbol.enclosing_name = enclosing;
            symbol.signature = Some(raw.to_string());
            let idx = self.push_symbol(symbol, doc);
            self.stack.push(Frame {
                kind: FrameKind::Container(name),
                symbol: Some(idx),
                visibility: Visibility::Public,
            });
        } else if let Some(cap) = patterns.def.captures(raw) {
            let visibility: Visibility = cap
                .get(1)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or_else(|| self.current_visibility());
            let class_method = cap.get(2).is_some() || self.in_singleton();
            let signature = match cap.get(1) {
                Some(vis) => raw[vis.end()..].trim_start(),
                None => raw,
            };

            let mut symbol = ParsedSymbol::new(SymbolKind::Method, &cap[3], line_no, line_no);
            symbol.visibility = visibility;
            symbol.class_method = class_method;
            symbol.signature = Some(signature.to_string());
            let idx = self.push_symbol(symbol, doc);

            if !is_endless_def(&cap[4]) {
                self.stack.push(Frame {
                    kind: FrameKind::Method,
                    symbol: Some(idx),
                    visibility,
                });
            }
        } else if self.in_method() {
            if BLOCK_OPENERS.contains(&first) || patterns.assign_opener.is_match(code) {
                self.push_block();
            }
        } else if let Some(cap) = patterns.visibility.captures(code) {
            let visibility: Visibility = cap[1].parse().unwrap_or_default();
            if let Some(frame) = self.scope_frame() {
                frame.visibility = visibility;
            }
        } else if let Some(cap) = patterns.association.captures(raw) {
            self.association(&cap[1], &cap[2], raw, line_no, doc);
        } else if let Some(cap) = patterns.scope.captures(raw) {
            let mut symbol = ParsedSymbol::new(SymbolKind::Scope, &cap[1], line_no, line_no);
            symbol.signature = Some(raw.to_string());
            self.push_symbol(symbol, doc);
        } else if let Some(cap) = patterns.attr.captures(raw) {
            let args = Args::parse(&cap[1]);
            let visibility = self.current_visibility();
            for name in args.positional.iter().filter_map(Value::as_str) {
                let mut symbol = ParsedSymbol::new(SymbolKind::Attribute, name, line_no, line_no);
                symbol.visibility = visibility;
                symbol.signature = Some(raw.to_string());
                self.push_symbol(symbol, doc.clone());
            }
        } else if let Some(cap) = patterns.attribute.captures(raw) {
            let mut symbol = ParsedSymbol::new(SymbolKind::Attribute, &cap[1], line_no, line_no);
            symbol.signature = Some(raw.to_string());
            self.push_symbol(symbol, doc);
        } else if let Some(cap) = patterns.constant.captures(raw) {
            let mut symbol = ParsedSymbol::new(SymbolKind::Constant, &cap[1], line_no, line_no);
            symbol.signature = Some(raw.to_string());
            self.push_symbol(symbol, doc);
        } else if let Some(cap) = patterns.mixin.captures(raw) {
            let names: Vec<String> = Args::parse(&cap[2])
                .positional
                .iter()
                .filter_map(Value::to_text)
                .map(|n| n.trim_start_matches("::").to_string())
                .collect();
            let extend = &cap[1] == "extend" || self.in_singleton();
            if extend {
                self.result.extends.extend(names);
            } else {
                self.result.includes.extend(names);
            }
        } else if let Some(cap) = patterns.require.captures(raw) {
            let target = cap[2].to_string();
            if cap.get(1).is_some() {
                self.result.require_relatives.push(target);
            } else {
                self.result.requires.push(target);
            }
        } else if BLOCK_OPENERS.contains(&first) || patterns.assign_opener.is_match(code) {
            self.push_block();
        }

        if !LOOP_KEYWORDS.contains(&first) {
            for _ in 0..count_keyword(code, "do") {
                self.push_block();
            }
        }

        for _ in 0..ends {
            self.pop(line_no);
        }
    }

    fn association(&mut self, macro_name: &str, rest: &str, raw: &str, line_no: u32, doc: Option<String>) {
        let Some(kind) = AssociationMacro::from_macro(macro_name) else {
            return;
        };
        let args = Args::parse(rest);
        let Some(name) = args.name_at(0).map(str::to_string) else {
            return;
        };
        let options = args.options_json();
        let target = args
            .option("class_name")
            .and_then(Value::as_str)
            .map(|c| c.trim_start_matches("::").to_string());

        let mut symbol = ParsedSymbol::new(SymbolKind::Association, &name, line_no, line_no);
        symbol.signature = Some(raw.to_string());
        self.push_symbol(symbol, doc);

        self.result.associations.push(ParsedAssociation {
            kind,
            name,
            target,
            options,
            line: Some(line_no),
        });
    }

    fn push_block(&mut self) {
        self.stack.push(Frame {
            kind: FrameKind::Block,
            symbol: None,
            visibility: Visibility::Public,
        });
    }

    fn pop(&mut self, line_no: u32) {
        if let Some(frame) = self.stack.pop() {
            if let Some(idx) = frame.symbol {
                self.result.symbols[idx].end_line = line_no;
            }
        }
    }

    fn finish(mut self, last_line: u32) -> ParseResult {
        while !self.stack.is_empty() {
            self.pop(last_line);
        }
        self.result.line_count = Some(last_line);
        self.result
    }
}

/// Whether the text after a method name makes it an endless definition
/// (`def full_name = "#{first} #{last}"`).
fn is_endless_def(tail: &str) -> bool {
    let mut rest = tail.trim_start();
    if rest.starts_with('(') {
        match rest.find(')') {
            Some(close) => rest = rest[close + 1..].trim_start(),
            None => return false,
        }
    }
    rest.starts_with('=') && !rest.starts_with("==")
}

fn first_word(code: &str) -> &str {
    let end = code
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(code.len());
    &code[..end]
}

/// Count whole-word occurrences of a keyword, ignoring method calls
/// (`.end`), symbols (`:end`) and hash keys (`end:`).
fn count_keyword(code: &str, keyword: &str) -> usize {
    let bytes = code.as_bytes();
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = code[from..].find(keyword) {
        let start = from + pos;
        let end = start + keyword.len();
        let before_ok = start == 0 || {
            let b = bytes[start - 1];
            !(b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'@' | b'$'))
        };
        let after_ok = end == bytes.len() || {
            let b = bytes[end];
            !(b.is_ascii_alphanumeric() || matches!(b, b'_' | b'?' | b'!' | b':'))
        };
        if before_ok && after_ok {
            count += 1;
        }
        from = end;
    }
    count
}

fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '#' => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Replace string literal contents so keywords inside strings are not counted.
fn blank_strings(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in line.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                    out.push(c);
                }
            }
            None => {
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER_MODEL: &str = r##"# frozen_string_literal: true

require "digest"
require_relative "../lib/tokens"

module Accounts
  # A registered person.
  # Owns posts.
  class User < ApplicationRecord
    include Trackable, Searchable
    extend FriendlyId

    ROLES = %w[admin member].freeze

    has_many :posts, dependent: :destroy
    belongs_to :company, class_name: "Org::Company", optional: true
    scope :active, -> { where(active: true) }
    attr_accessor :remember_token, :reset_token

    # Full display name
    def full_name
      if first_name
        "#{first_name} #{last_name}"
      else
        email
      end
    end

    def self.find_by_token(token)
      where(token: token).first
    end

    def initials = "#{first_name[0]}#{last_name[0]}"

    class << self
      def admins
        where(role: "admin")
      end
    end

    private

    def normalize_email
      self.email = email.to_s.downcase
      items.each do |item|
        item.touch
      end
    end

    protected def compare(other) = id <=> other.id
  end
end
"##;

    fn extract(content: &str) -> ParseResult {
        LineExtractor::new().unwrap().extract_source(content)
    }

    fn symbol<'a>(result: &'a ParseResult, name: &str) -> &'a ParsedSymbol {
        result
            .symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("missing symbol {name}"))
    }

    #[test]
    fn test_containers_and_nesting() {
        let result = extract(USER_MODEL);
        let module = symbol(&result, "Accounts");
        assert_eq!(module.kind, SymbolKind::Module);
        assert_eq!((module.start_line, module.end_line), (6, 52));

        let class = symbol(&result, "Accounts::User");
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.enclosing_name.as_deref(), Some("Accounts"));
        assert_eq!(class.superclass.as_deref(), Some("ApplicationRecord"));
        assert_eq!(class.documentation.as_deref(), Some("A registered person.\nOwns posts."));
        assert_eq!((class.start_line, class.end_line), (9, 51));
        assert_eq!(result.line_count, Some(52));
    }

    #[test]
    fn test_methods() {
        let result = extract(USER_MODEL);

        let full_name = symbol(&result, "full_name");
        assert_eq!(full_name.enclosing_name.as_deref(), Some("Accounts::User"));
        assert_eq!((full_name.start_line, full_name.end_line), (21, 27));
        assert_eq!(full_name.documentation.as_deref(), Some("Full display name"));
        assert!(!full_name.is_class_method());

        let finder = symbol(&result, "find_by_token");
        assert!(finder.is_class_method());
        assert_eq!(finder.end_line, 31);

        let initials = symbol(&result, "initials");
        assert_eq!(initials.start_line, initials.end_line);

        let admins = symbol(&result, "admins");
        assert!(admins.is_class_method());
        assert_eq!((admins.start_line, admins.end_line), (36, 38));

        let normalize = symbol(&result, "normalize_email");
        assert_eq!(normalize.visibility, Visibility::Private);
        assert_eq!((normalize.start_line, normalize.end_line), (43, 48));

        let compare = symbol(&result, "compare");
        assert_eq!(compare.visibility, Visibility::Protected);
        assert_eq!(compare.signature.as_deref(), Some("def compare(other) = id <=> other.id"));
    }

    #[test]
    fn test_declarations() {
        let result = extract(USER_MODEL);

        assert_eq!(result.includes, vec!["Trackable", "Searchable"]);
        assert_eq!(result.extends, vec!["FriendlyId"]);
        assert_eq!(result.requires, vec!["digest"]);
        assert_eq!(result.require_relatives, vec!["../lib/tokens"]);

        assert_eq!(symbol(&result, "ROLES").kind, SymbolKind::Constant);
        assert_eq!(symbol(&result, "active").kind, SymbolKind::Scope);
        assert_eq!(symbol(&result, "remember_token").kind, SymbolKind::Attribute);
        assert_eq!(symbol(&result, "reset_token").kind, SymbolKind::Attribute);

        assert_eq!(result.associations.len(), 2);
        let posts = &result.associations[0];
        assert_eq!(posts.kind, AssociationMacro::HasMany);
        assert_eq!(posts.name, "posts");
        assert_eq!(posts.options["dependent"], serde_json::json!("destroy"));
        let company = &result.associations[1];
        assert_eq!(company.target.as_deref(), Some("Org::Company"));
        assert_eq!(symbol(&result, "company").kind, SymbolKind::Association);
    }

    #[test]
    fn test_heredocs_and_keywords_in_strings() {
        let result = extract(
            r#"class Report
  QUERY = <<~SQL
    SELECT * FROM users WHERE x = 1
    end
  SQL

  def title
    "the end"
  end
end
"#,
        );
        let title = symbol(&result, "title");
        assert_eq!((title.start_line, title.end_line), (7, 9));
        assert_eq!(symbol(&result, "Report").end_line, 10);
    }

    #[test]
    fn test_count_keyword() {
        assert_eq!(count_keyword("def x; end", "end"), 1);
        assert_eq!(count_keyword("range.end", "end"), 0);
        assert_eq!(count_keyword("foo(end: 1)", "end"), 0);
        assert_eq!(count_keyword("items.each do |i|", "do"), 1);
        assert_eq!(count_keyword("done", "do"), 0);
    }

    #[tokio::test]
    async fn test_extract_trait() {
        let extractor = LineExtractor::new().unwrap();
        let input = SourceInput {
            relative_path: "app/models/a.rb".into(),
            absolute_path: "app/models/a.rb".into(),
            content: "class A < B\nend\n".into(),
        };
        let result = extractor.extract(&input).await.unwrap();
        assert_eq!(result.symbols[0].superclass.as_deref(), Some("B"));
        assert_eq!(extractor.name(), "line-matcher");
    }
}
