//! Naming transforms shared by the graph builder and the association mapper.
//!
//! These are deliberately approximate. `pluralize` is not the inverse of
//! `singularize` (`pluralize("status")` is `"statuses"` but
//! `singularize("status")` is `"statu"`), and both the schema projection
//! (table → model) and the association mapper (model → table) depend on the
//! exact same irregular mapping, so neither side may "fix" it locally.

/// Suffixes that singularize by dropping the trailing `es`.
const ES_SUFFIXES: &[&str] = &["ses", "xes", "zes", "ches", "shes"];

/// Suffixes that pluralize by appending `es`.
const SIBILANT_SUFFIXES: &[&str] = &["s", "x", "z", "ch", "sh"];

/// Singularize a word. First matching rule wins:
/// `ies→y`, `ses|xes|zes|ches|shes` drop 2, `ves→f`, `oes` drop 2,
/// a trailing `s` not preceded by `s` drops 1, anything else is unchanged.
pub fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{stem}y");
    }
    if ES_SUFFIXES.iter().any(|suffix| word.ends_with(suffix)) {
        return word[..word.len() - 2].to_string();
    }
    if let Some(stem) = word.strip_suffix("ves") {
        return format!("{stem}f");
    }
    if word.ends_with("oes") {
        return word[..word.len() - 2].to_string();
    }
    if word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Pluralize a word: consonant + `y` → `ies`, sibilant endings get `es`,
/// everything else gets `s`.
pub fn pluralize(word: &str) -> String {
    if word.is_empty() {
        return String::new();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if stem.chars().last().is_some_and(|c| !is_vowel(c)) {
            return format!("{stem}ies");
        }
    }
    if SIBILANT_SUFFIXES.iter().any(|suffix| word.ends_with(suffix)) {
        return format!("{word}es");
    }
    format!("{word}s")
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u')
}

/// `user_profile` → `UserProfile`, `admin/user` → `Admin::User`
pub fn camelize(word: &str) -> String {
    word.split('/')
        .map(|segment| {
            segment
                .split('_')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let mut chars = part.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                        None => String::new(),
                    }
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("::")
}

/// `UserProfile` → `user_profile`, `Admin::User` → `admin/user`,
/// `HTMLParser` → `html_parser`
pub fn underscore(word: &str) -> String {
    let word = word.replace("::", "/");
    let chars: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(word.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Table name → model class name (`order_items` → `OrderItem`).
pub fn classify(table: &str) -> String {
    camelize(&singularize(table))
}

/// Model class name → table name (`OrderItem` → `order_items`).
pub fn tableize(model: &str) -> String {
    pluralize(&underscore(model).replace('/', "_"))
}

/// Strip a trailing `_id`, if present.
pub fn strip_id_suffix(column: &str) -> Option<&str> {
    column.strip_suffix("_id").filter(|stem| !stem.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singularize_rules() {
        assert_eq!(singularize("companies"), "company");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("leaves"), "leaf");
        assert_eq!(singularize("heroes"), "hero");
        assert_eq!(singularize("matches"), "match");
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("address"), "address");
        assert_eq!(singularize("data"), "data");
    }

    #[test]
    fn test_pluralize_rules() {
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("branch"), "branches");
        assert_eq!(pluralize("user"), "users");
        assert_eq!(pluralize("leaf"), "leafs");
    }

    #[test]
    fn test_pluralize_is_not_the_inverse() {
        assert_eq!(pluralize(&singularize("address")), "addresses");
        assert_eq!(pluralize("status"), "statuses");
        assert_eq!(singularize("status"), "statu");
        assert_eq!(pluralize(&singularize("status")), "status");
        assert_eq!(pluralize("movie"), "movies");
        assert_eq!(singularize("movies"), "movy");
    }

    #[test]
    fn test_camelize_and_underscore() {
        assert_eq!(camelize("user_profile"), "UserProfile");
        assert_eq!(camelize("admin/user"), "Admin::User");
        assert_eq!(underscore("UserProfile"), "user_profile");
        assert_eq!(underscore("Admin::User"), "admin/user");
        assert_eq!(underscore("HTMLParser"), "html_parser");
    }

    #[test]
    fn test_classify_and_tableize() {
        assert_eq!(classify("order_items"), "OrderItem");
        assert_eq!(classify("companies"), "Company");
        assert_eq!(tableize("OrderItem"), "order_items");
        assert_eq!(tableize("Category"), "categories");
    }

    #[test]
    fn test_strip_id_suffix() {
        assert_eq!(strip_id_suffix("user_id"), Some("user"));
        assert_eq!(strip_id_suffix("_id"), None);
        assert_eq!(strip_id_suffix("email"), None);
    }
}
