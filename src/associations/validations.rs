//! Validation suggestions derived from column constraints and unique indexes.

use crate::schema::{SchemaIndex, SchemaTable};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const INTEGER_TYPES: &[&str] = &["integer", "bigint", "smallint"];
const NUMERIC_TYPES: &[&str] = &["integer", "bigint", "smallint", "decimal", "numeric", "float"];

/// Column name fragments that suggest a non-negative amount
const NON_NEGATIVE_HINTS: &[&str] = &["price", "cost", "amount", "total", "fee", "balance", "salary", "cents"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Presence,
    Length,
    Numericality,
    Uniqueness,
}

impl ValidationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationKind::Presence => "presence",
            ValidationKind::Length => "length",
            ValidationKind::Numericality => "numericality",
            ValidationKind::Uniqueness => "uniqueness",
        }
    }
}

impl std::fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSuggestion {
    pub kind: ValidationKind,
    pub attributes: Vec<String>,
    pub options: Map<String, Value>,
}

impl ValidationSuggestion {
    fn new(kind: ValidationKind, attributes: Vec<String>) -> Self {
        Self {
            kind,
            attributes,
            options: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    /// Render as a Ruby `validates` line
    pub fn to_ruby(&self) -> String {
        let attrs = self
            .attributes
            .iter()
            .map(|a| format!(":{}", a))
            .collect::<Vec<_>>()
            .join(", ");

        if self.options.is_empty() {
            return format!("validates {}, {}: true", attrs, self.kind);
        }

        let opts = self
            .options
            .iter()
            .map(|(key, value)| match (key.as_str(), value) {
                ("scope", Value::Array(cols)) => {
                    let cols: Vec<String> = cols
                        .iter()
                        .filter_map(Value::as_str)
                        .map(|c| format!(":{}", c))
                        .collect();
                    format!("scope: [{}]", cols.join(", "))
                }
                ("conditions", Value::String(predicate)) => {
                    format!("conditions: -> {{ where({:?}) }}", predicate)
                }
                (key, value) => format!("{}: {}", key, value),
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("validates {}, {}: {{ {} }}", attrs, self.kind, opts)
    }
}

/// Suggest validations for `table` given the indexes defined on it.
///
/// Presence covers non-null columns without a default, excluding primary key
/// columns and `_at`/`_on` timestamps. Length covers strings with a limit.
/// Numericality covers numeric columns other than the primary key. Every
/// unique index yields a uniqueness validation on its first column, scoped
/// by the rest.
pub fn suggest_validations(table: &SchemaTable, indexes: &[SchemaIndex]) -> Vec<ValidationSuggestion> {
    let is_pk = |name: &str| {
        table.primary_key.iter().any(|pk| pk == name)
            || table.column(name).is_some_and(|c| c.primary_key)
    };

    let mut out = Vec::new();

    let presence: Vec<String> = table
        .columns
        .iter()
        .filter(|c| !c.nullable && c.default.is_none() && !is_pk(&c.name))
        .filter(|c| !c.name.ends_with("_at") && !c.name.ends_with("_on"))
        .map(|c| c.name.clone())
        .collect();
    if !presence.is_empty() {
        out.push(ValidationSuggestion::new(ValidationKind::Presence, presence));
    }

    for column in &table.columns {
        if column.sql_type == "string" {
            if let Some(limit) = column.limit {
                out.push(
                    ValidationSuggestion::new(ValidationKind::Length, vec![column.name.clone()])
                        .with("maximum", json!(limit)),
                );
            }
        }
    }

    for column in &table.columns {
        if !NUMERIC_TYPES.contains(&column.sql_type.as_str()) || is_pk(&column.name) {
            continue;
        }
        let mut suggestion = ValidationSuggestion::new(ValidationKind::Numericality, vec![column.name.clone()]);
        if INTEGER_TYPES.contains(&column.sql_type.as_str()) {
            suggestion = suggestion.with("only_integer", json!(true));
        }
        if NON_NEGATIVE_HINTS.iter().any(|hint| column.name.contains(hint)) {
            suggestion = suggestion.with("greater_than_or_equal_to", json!(0));
        }
        out.push(suggestion);
    }

    for index in indexes.iter().filter(|i| i.unique && i.table == table.name) {
        let Some((first, rest)) = index.columns.split_first() else {
            continue;
        };
        let mut suggestion = ValidationSuggestion::new(ValidationKind::Uniqueness, vec![first.clone()]);
        if let Some(predicate) = &index.where_clause {
            suggestion = suggestion.with("conditions", json!(predicate));
        }
        if !rest.is_empty() {
            suggestion = suggestion.with("scope", json!(rest));
        }
        out.push(suggestion);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaColumn;

    fn products() -> SchemaTable {
        let mut table = SchemaTable::new("products");
        table.primary_key = vec!["id".into()];
        table.columns = vec![
            SchemaColumn::new("id", "bigint").primary(),
            SchemaColumn::new("name", "string").not_null().with_limit(120),
            SchemaColumn::new("sku", "string").not_null(),
            SchemaColumn::new("price_cents", "integer").not_null(),
            SchemaColumn::new("weight", "decimal"),
            SchemaColumn::new("status", "string").not_null().with_default("draft"),
            SchemaColumn::new("published_on", "date").not_null(),
            SchemaColumn::new("created_at", "datetime").not_null(),
        ];
        table
    }

    #[test]
    fn test_presence() {
        let suggestions = suggest_validations(&products(), &[]);
        let presence = &suggestions[0];
        assert_eq!(presence.kind, ValidationKind::Presence);
        assert_eq!(presence.attributes, vec!["name", "sku", "price_cents"]);
        assert_eq!(presence.to_ruby(), "validates :name, :sku, :price_cents, presence: true");
    }

    #[test]
    fn test_length_and_numericality() {
        let suggestions = suggest_validations(&products(), &[]);

        let length: Vec<_> = suggestions.iter().filter(|s| s.kind == ValidationKind::Length).collect();
        assert_eq!(length.len(), 1);
        assert_eq!(length[0].attributes, vec!["name"]);
        assert_eq!(length[0].options["maximum"], json!(120));

        let numeric: Vec<_> = suggestions
            .iter()
            .filter(|s| s.kind == ValidationKind::Numericality)
            .collect();
        assert_eq!(numeric.len(), 2);
        assert_eq!(numeric[0].attributes, vec!["price_cents"]);
        assert_eq!(numeric[0].options["only_integer"], json!(true));
        assert_eq!(numeric[0].options["greater_than_or_equal_to"], json!(0));
        assert_eq!(numeric[1].attributes, vec!["weight"]);
        assert!(!numeric[1].options.contains_key("only_integer"));
    }

    #[test]
    fn test_uniqueness_from_indexes() {
        let mut scoped = SchemaIndex::new("products", vec!["sku".into(), "store_id".into()]).unique();
        scoped.where_clause = Some("deleted_at IS NULL".into());
        let indexes = vec![
            SchemaIndex::new("products", vec!["name".into()]).unique(),
            scoped,
            SchemaIndex::new("products", vec!["weight".into()]),
        ];

        let suggestions = suggest_validations(&products(), &indexes);
        let unique: Vec<_> = suggestions
            .iter()
            .filter(|s| s.kind == ValidationKind::Uniqueness)
            .collect();
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].to_ruby(), "validates :name, uniqueness: true");
        assert_eq!(unique[1].attributes, vec!["sku"]);
        assert_eq!(unique[1].options["scope"], json!(["store_id"]));
        assert_eq!(unique[1].options["conditions"], json!("deleted_at IS NULL"));
        assert_eq!(
            unique[1].to_ruby(),
            "validates :sku, uniqueness: { conditions: -> { where(\"deleted_at IS NULL\") }, scope: [:store_id] }"
        );
    }
}
