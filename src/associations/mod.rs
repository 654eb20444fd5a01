//! Association mapper
//!
//! Pure naming heuristics over schema foreign keys: given a table, propose the
//! `belongs_to` / `has_many` / `has_one` declarations its model would carry.
//! Nothing here touches the store or the graph.

pub mod validations;

pub use validations::{suggest_validations, ValidationKind, ValidationSuggestion};

use crate::inflect::{camelize, classify, singularize, strip_id_suffix};
use crate::schema::{ForeignKey, SchemaIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    BelongsTo,
    HasMany,
    HasOne,
}

impl AssociationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociationKind::BelongsTo => "belongs_to",
            AssociationKind::HasMany => "has_many",
            AssociationKind::HasOne => "has_one",
        }
    }
}

impl FromStr for AssociationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "belongs_to" => Ok(AssociationKind::BelongsTo),
            "has_many" => Ok(AssociationKind::HasMany),
            "has_one" => Ok(AssociationKind::HasOne),
            _ => Err(crate::Error::InvalidQuery(format!("Unknown association kind: {}", s))),
        }
    }
}

impl std::fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The foreign key (and unique index, for `has_one`) an association was read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub foreign_key: ForeignKey,
    pub unique_index: Option<String>,
}

impl Provenance {
    pub fn describe(&self) -> String {
        let fk = &self.foreign_key;
        let mut text = format!(
            "{}.{} -> {}.{}",
            fk.from_table, fk.from_column, fk.to_table, fk.to_column
        );
        if let Some(index) = &self.unique_index {
            text.push_str(&format!(" (unique index {})", index));
        }
        text
    }
}

/// A suggested association declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    /// Model class that would declare the association
    pub model: String,
    pub kind: AssociationKind,
    pub name: String,
    /// Option name → value. `class_name` and `foreign_key` are strings,
    /// everything else is a symbol.
    pub options: BTreeMap<String, String>,
    pub provenance: Provenance,
}

impl Association {
    /// Render as a Ruby declaration
    pub fn to_ruby(&self) -> String {
        let mut line = format!("{} :{}", self.kind, self.name);
        for (key, value) in &self.options {
            match key.as_str() {
                "class_name" | "foreign_key" => line.push_str(&format!(", {}: \"{}\"", key, value)),
                _ => line.push_str(&format!(", {}: :{}", key, value)),
            }
        }
        line
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Name a `belongs_to` would get for `fk`
fn belongs_to_name(fk: &ForeignKey) -> String {
    strip_id_suffix(&fk.from_column)
        .map(str::to_string)
        .unwrap_or_else(|| singularize(&fk.to_table))
}

fn covering_unique_index<'a>(fk: &ForeignKey, indexes: &'a [SchemaIndex]) -> Option<&'a SchemaIndex> {
    indexes
        .iter()
        .find(|i| i.table == fk.from_table && i.is_unique_on(&fk.from_column))
}

/// Kind and name the referenced side would get for `fk`
fn inverse_side(fk: &ForeignKey, indexes: &[SchemaIndex]) -> (AssociationKind, String) {
    match covering_unique_index(fk, indexes) {
        Some(_) => (AssociationKind::HasOne, singularize(&fk.from_table)),
        None => (AssociationKind::HasMany, fk.from_table.clone()),
    }
}

fn dependent_for(on_delete: Option<&str>) -> Option<&'static str> {
    match on_delete? {
        "cascade" => Some("destroy"),
        "nullify" | "set_null" => Some("nullify"),
        "restrict" => Some("restrict_with_exception"),
        _ => None,
    }
}

/// Propose the associations of the model backed by `table`.
///
/// Foreign keys whose other end is not in `all_table_names` are skipped.
/// Incoming associations that would share a name (two foreign keys from the
/// same table) are disambiguated as `<name>_as_<belongs_to name>`.
pub fn generate_associations(
    table: &str,
    foreign_keys: &[ForeignKey],
    all_table_names: &[String],
    indexes: &[SchemaIndex],
) -> Vec<Association> {
    let known: HashSet<&str> = all_table_names.iter().map(String::as_str).collect();
    let model = classify(table);
    let mut out = Vec::new();

    for fk in foreign_keys.iter().filter(|fk| fk.from_table == table) {
        if !known.contains(fk.to_table.as_str()) {
            continue;
        }
        let name = belongs_to_name(fk);
        let mut options = BTreeMap::new();

        let target_class = classify(&fk.to_table);
        if camelize(&name) != target_class {
            options.insert("class_name".to_string(), target_class);
        }
        if fk.from_column != format!("{}_id", singularize(&fk.to_table)) {
            options.insert("foreign_key".to_string(), fk.from_column.clone());
        }
        let (_, inverse) = inverse_side(fk, indexes);
        options.insert("inverse_of".to_string(), inverse);
        if let Some(dependent) = dependent_for(fk.on_delete.as_deref()) {
            options.insert("dependent".to_string(), dependent.to_string());
        }

        out.push(Association {
            model: model.clone(),
            kind: AssociationKind::BelongsTo,
            name,
            options,
            provenance: Provenance {
                foreign_key: fk.clone(),
                unique_index: None,
            },
        });
    }

    let mut used: HashSet<String> = out.iter().map(|a| a.name.clone()).collect();
    for fk in foreign_keys.iter().filter(|fk| fk.to_table == table) {
        if !known.contains(fk.from_table.as_str()) {
            continue;
        }
        let (kind, mut name) = inverse_side(fk, indexes);
        let inverse = belongs_to_name(fk);
        if used.contains(&name) {
            name = format!("{}_as_{}", name, inverse);
        }
        used.insert(name.clone());

        let mut options = BTreeMap::new();
        if camelize(&singularize(&name)) != classify(&fk.from_table) {
            options.insert("class_name".to_string(), classify(&fk.from_table));
        }
        if fk.from_column != format!("{}_id", singularize(table)) {
            options.insert("foreign_key".to_string(), fk.from_column.clone());
        }
        options.insert("inverse_of".to_string(), inverse);

        out.push(Association {
            model: model.clone(),
            kind,
            name,
            options,
            provenance: Provenance {
                foreign_key: fk.clone(),
                unique_index: covering_unique_index(fk, indexes).map(|i| i.name.clone()),
            },
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_users_posts() {
        let fks = vec![ForeignKey::new("posts", "user_id", "users")];
        let tables = names(&["users", "posts"]);

        let post = generate_associations("posts", &fks, &tables, &[]);
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].model, "Post");
        assert_eq!(post[0].kind, AssociationKind::BelongsTo);
        assert_eq!(post[0].name, "user");
        assert_eq!(post[0].option("class_name"), None);
        assert_eq!(post[0].option("foreign_key"), None);
        assert_eq!(post[0].option("inverse_of"), Some("posts"));

        let user = generate_associations("users", &fks, &tables, &[]);
        assert_eq!(user.len(), 1);
        assert_eq!(user[0].model, "User");
        assert_eq!(user[0].kind, AssociationKind::HasMany);
        assert_eq!(user[0].name, "posts");
        assert_eq!(user[0].option("inverse_of"), Some("user"));
        assert_eq!(user[0].to_ruby(), "has_many :posts, inverse_of: :user");
    }

    #[test]
    fn test_custom_column_names() {
        let fks = vec![ForeignKey::new("posts", "author_id", "users").on_delete("cascade")];
        let tables = names(&["users", "posts"]);

        let post = generate_associations("posts", &fks, &tables, &[]);
        assert_eq!(post[0].name, "author");
        assert_eq!(post[0].option("class_name"), Some("User"));
        assert_eq!(post[0].option("foreign_key"), Some("author_id"));
        assert_eq!(post[0].option("dependent"), Some("destroy"));
        assert_eq!(
            post[0].to_ruby(),
            "belongs_to :author, class_name: \"User\", dependent: :destroy, foreign_key: \"author_id\", inverse_of: :posts"
        );

        let user = generate_associations("users", &fks, &tables, &[]);
        assert_eq!(user[0].name, "posts");
        assert_eq!(user[0].option("foreign_key"), Some("author_id"));
        assert_eq!(user[0].option("inverse_of"), Some("author"));
        assert_eq!(user[0].option("class_name"), None);
    }

    #[test]
    fn test_unique_index_yields_has_one() {
        let fks = vec![ForeignKey::new("profiles", "user_id", "users")];
        let indexes = vec![SchemaIndex::new("profiles", vec!["user_id".into()]).unique()];
        let tables = names(&["users", "profiles"]);

        let user = generate_associations("users", &fks, &tables, &indexes);
        assert_eq!(user[0].kind, AssociationKind::HasOne);
        assert_eq!(user[0].name, "profile");
        assert_eq!(
            user[0].provenance.unique_index.as_deref(),
            Some("index_profiles_on_user_id")
        );

        let profile = generate_associations("profiles", &fks, &tables, &indexes);
        assert_eq!(profile[0].option("inverse_of"), Some("profile"));
    }

    #[test]
    fn test_unknown_tables_are_skipped() {
        let fks = vec![
            ForeignKey::new("posts", "user_id", "users"),
            ForeignKey::new("posts", "legacy_id", "legacies"),
        ];
        let tables = names(&["users", "posts"]);
        let post = generate_associations("posts", &fks, &tables, &[]);
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].name, "user");
    }

    #[test]
    fn test_restrict_and_nullify() {
        let fks = vec![
            ForeignKey::new("orders", "customer_id", "customers").on_delete("restrict"),
            ForeignKey::new("orders", "coupon_id", "coupons").on_delete("nullify"),
        ];
        let tables = names(&["orders", "customers", "coupons"]);
        let order = generate_associations("orders", &fks, &tables, &[]);
        assert_eq!(order[0].option("dependent"), Some("restrict_with_exception"));
        assert_eq!(order[1].option("dependent"), Some("nullify"));
    }

    #[test]
    fn test_two_foreign_keys_from_one_table() {
        let fks = vec![
            ForeignKey::new("posts", "author_id", "users"),
            ForeignKey::new("posts", "editor_id", "users"),
        ];
        let tables = names(&["users", "posts"]);
        let user = generate_associations("users", &fks, &tables, &[]);
        let names: Vec<&str> = user.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["posts", "posts_as_editor"]);
        assert_eq!(user[1].option("class_name"), Some("Post"));
    }
}
