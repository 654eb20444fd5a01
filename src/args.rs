//! Argument lists of Ruby-style DSL calls
//!
//! Both the schema parser (`t.string "email", limit: 255, null: false`) and the
//! line extractor (`has_many :posts, dependent: :destroy`) need to read the
//! argument list of a method call. This is not a Ruby parser: it understands
//! literals, symbols, arrays, hashes and `key: value` pairs, and keeps anything
//! else (lambdas, constants, expressions) as raw text.

use serde_json::json;

/// A literal argument value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Sym(String),
    Int(i64),
    /// Non-integer numeric literal, kept as written
    Number(String),
    Bool(bool),
    Nil,
    Array(Vec<Value>),
    Hash(Vec<(String, Value)>),
    /// Anything that is not a literal (`-> { "now()" }`, `Foo::BAR`, ...)
    Raw(String),
}

impl Value {
    /// String or symbol contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Sym(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Number(n) => n.parse::<f64>().ok().map(|f| f as i64),
            _ => None,
        }
    }

    /// Ruby truthiness: everything except `false` and `nil`
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Nil)
    }

    /// A single name or a list of names (`"a"`, `:a`, `["a", "b"]`)
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            other => other.as_str().map(|s| vec![s.to_string()]).unwrap_or_default(),
        }
    }

    pub fn as_hash(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Hash(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Textual form used for recorded defaults and option values.
    /// `nil` has no textual form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Str(s) | Value::Sym(s) | Value::Number(s) | Value::Raw(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Nil => None,
            Value::Array(items) => Some(format!(
                "[{}]",
                items.iter().filter_map(Value::to_text).collect::<Vec<_>>().join(", ")
            )),
            Value::Hash(_) => Some(self.to_json().to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Str(s) | Value::Sym(s) | Value::Number(s) | Value::Raw(s) => json!(s),
            Value::Int(i) => json!(i),
            Value::Bool(b) => json!(b),
            Value::Nil => serde_json::Value::Null,
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Hash(pairs) => serde_json::Value::Object(
                pairs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// Parsed argument list: positional values followed by keyword options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub options: Vec<(String, Value)>,
}

impl Args {
    /// Parse the text between the method name and the end of the call.
    /// A single wrapping pair of parentheses is removed first.
    pub fn parse(input: &str) -> Self {
        let mut text = input.trim();
        if text.starts_with('(') && text.ends_with(')') && closing_index(text, 0) == Some(text.len() - 1) {
            text = text[1..text.len() - 1].trim();
        }

        let mut args = Args::default();
        for piece in split_top_level(text, ',') {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            match split_pair(piece) {
                Some((key, value)) => args.options.push((key, parse_value(value))),
                None => args.positional.push(parse_value(piece)),
            }
        }
        args
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Positional argument as a name (string or symbol)
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.positional.get(index).and_then(Value::as_str)
    }

    /// Options as a JSON object
    pub fn options_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.options
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

/// Look up a key inside a hash option value
pub fn hash_get<'a>(pairs: &'a [(String, Value)], key: &str) -> Option<&'a Value> {
    pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

/// Split `text` on `sep` at nesting depth zero, outside string literals.
pub fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
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
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ if c == sep && depth == 0 => {
                pieces.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces
}

/// Net bracket depth at the end of `text` (ignoring string contents).
/// Positive means the statement continues on the next line.
pub fn open_depth(text: &str) -> i32 {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
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
            '#' => break,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

/// Index of the bracket closing the one opened at `open`.
fn closing_index(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices().skip_while(|(i, _)| *i < open) {
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
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Recognize `key: value`, `"key": value`, `:key => value` and `"key" => value`.
fn split_pair(piece: &str) -> Option<(String, &str)> {
    if let Some((lhs, rhs)) = split_arrow(piece) {
        let key = parse_value(lhs.trim());
        return key.as_str().map(|k| (k.to_string(), rhs.trim()));
    }

    if let Some(rest) = piece.strip_prefix('"') {
        let end = rest.find('"')?;
        let after = &rest[end + 1..];
        let value = after.strip_prefix(':')?;
        if value.starts_with(':') {
            return None;
        }
        return Some((rest[..end].to_string(), value.trim()));
    }

    let ident_len = piece
        .char_indices()
        .take_while(|(i, c)| c.is_alphanumeric() || *c == '_' || (*i > 0 && (*c == '?' || *c == '!')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    let first = piece.chars().next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    let after = &piece[ident_len..];
    let value = after.strip_prefix(':')?;
    if value.starts_with(':') {
        return None;
    }
    Some((piece[..ident_len].to_string(), value.trim()))
}

/// Split on a top-level `=>`
fn split_arrow(piece: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    let mut depth = 0i32;
    let bytes = piece.as_bytes();
    for (i, c) in piece.char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '=' if depth == 0 && bytes.get(i + 1) == Some(&b'>') => {
                return Some((&piece[..i], &piece[i + 2..]));
            }
            _ => {}
        }
    }
    None
}

/// Parse a single literal
pub fn parse_value(text: &str) -> Value {
    let text = text.trim();

    if text.len() >= 2 {
        let first = text.as_bytes()[0];
        let last = text.as_bytes()[text.len() - 1];
        if (first == b'"' || first == b'\'') && first == last && closing_quote(text) == Some(text.len() - 1) {
            return Value::Str(unescape(&text[1..text.len() - 1]));
        }
    }

    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "nil" | "" => return Value::Nil,
        _ => {}
    }

    if let Some(sym) = text.strip_prefix(':') {
        if let Value::Str(s) = parse_value(sym) {
            return Value::Sym(s);
        }
        if !sym.is_empty() && sym.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '?' | '!' | '=')) {
            return Value::Sym(sym.to_string());
        }
    }

    let numeric = text.replace('_', "");
    if let Ok(i) = numeric.parse::<i64>() {
        return Value::Int(i);
    }
    if numeric.parse::<f64>().is_ok() && numeric.chars().any(|c| c.is_ascii_digit()) {
        return Value::Number(text.to_string());
    }

    for (prefix, symbols) in [("%w[", false), ("%w(", false), ("%i[", true), ("%i(", true)] {
        if let Some(inner) = text.strip_prefix(prefix) {
            let inner = inner.trim_end_matches([']', ')']);
            return Value::Array(
                inner
                    .split_whitespace()
                    .map(|w| if symbols { Value::Sym(w.to_string()) } else { Value::Str(w.to_string()) })
                    .collect(),
            );
        }
    }

    if text.starts_with('[') && text.ends_with(']') && closing_index(text, 0) == Some(text.len() - 1) {
        let inner = &text[1..text.len() - 1];
        return Value::Array(
            split_top_level(inner, ',')
                .into_iter()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_value)
                .collect(),
        );
    }

    if text.starts_with('{') && text.ends_with('}') && closing_index(text, 0) == Some(text.len() - 1) {
        let inner = Args::parse(&text[1..text.len() - 1]);
        return Value::Hash(inner.options);
    }

    Value::Raw(text.to_string())
}

fn closing_quote(text: &str) -> Option<usize> {
    let quote = text.chars().next()?;
    let mut escaped = false;
    for (i, c) in text.char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(i);
        }
    }
    None
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_statement_args() {
        let args = Args::parse(r#""email", limit: 255, null: false, default: """#);
        assert_eq!(args.name_at(0), Some("email"));
        assert_eq!(args.option("limit"), Some(&Value::Int(255)));
        assert_eq!(args.option("null"), Some(&Value::Bool(false)));
        assert_eq!(args.option("default"), Some(&Value::Str(String::new())));
    }

    #[test]
    fn test_arrays_and_hashes() {
        let args = Args::parse(r#"["user_id", "created_at"], name: "idx", unique: true, where: "deleted_at IS NULL""#);
        assert_eq!(args.positional[0].as_list(), vec!["user_id", "created_at"]);
        assert_eq!(args.option("where").and_then(Value::as_str), Some("deleted_at IS NULL"));

        let args = Args::parse(":author, foreign_key: { to_table: :users, on_delete: :cascade }");
        let fk = args.option("foreign_key").and_then(Value::as_hash).unwrap();
        assert_eq!(hash_get(fk, "to_table").and_then(Value::as_str), Some("users"));
        assert_eq!(hash_get(fk, "on_delete").and_then(Value::as_str), Some("cascade"));
    }

    #[test]
    fn test_hash_rockets_and_raw_values() {
        let args = Args::parse(r#":posts, :class_name => "Article", default: -> { "now()" }"#);
        assert_eq!(args.name_at(0), Some("posts"));
        assert_eq!(args.option("class_name").and_then(Value::as_str), Some("Article"));
        assert!(matches!(args.option("default"), Some(Value::Raw(_))));
    }

    #[test]
    fn test_namespaced_constants_are_not_pairs() {
        let args = Args::parse("Foo::Bar, version: 2024_01_15_000000");
        assert_eq!(args.positional, vec![Value::Raw("Foo::Bar".into())]);
        assert_eq!(args.option("version"), Some(&Value::Int(20240115000000)));
    }

    #[test]
    fn test_open_depth() {
        assert_eq!(open_depth(r#"t.index ["a","#), 1);
        assert_eq!(open_depth(r#"t.string "x(", null: false"#), 0);
    }
}
