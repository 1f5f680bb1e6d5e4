//! Naming helpers for identifiers, labels and relation defaults

use regex::Regex;
use std::sync::OnceLock;

/// Check that a name is usable as a table or column identifier
///
/// Names are lowercase snake_case starting with a letter or underscore. This is
/// what keeps declared names safe to interpolate into generated SQL.
pub fn is_valid_identifier(name: &str) -> bool {
    static IDENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = IDENT_REGEX.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").unwrap());
    regex.is_match(name)
}

/// Render `snake_case` as `Pascal With Spaces` for labels
///
/// # Examples
///
/// ```
/// use this_data::core::naming::snake_to_label;
///
/// assert_eq!(snake_to_label("post_id"), "Post Id");
/// assert_eq!(snake_to_label("todos"), "Todos");
/// ```
pub fn snake_to_label(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convert a plural noun to its singular form
///
/// Used to derive foreign key names (`posts` → `post_id`).
///
/// # Examples
///
/// ```
/// use this_data::core::naming::singularize;
///
/// assert_eq!(singularize("posts"), "post");
/// assert_eq!(singularize("categories"), "category");
/// assert_eq!(singularize("addresses"), "address");
/// ```
pub fn singularize(plural: &str) -> String {
    match plural {
        s if s.len() > 3 && s.ends_with("ies") => format!("{}y", &s[..s.len() - 3]),
        s if s.len() > 3
            && (s.ends_with("sses")
                || s.ends_with("shes")
                || s.ends_with("ches")
                || s.ends_with("xes")
                || s.ends_with("zes")) =>
        {
            s[..s.len() - 2].to_string()
        }
        s if s.len() > 1 && s.ends_with('s') && !s.ends_with("ss") => {
            s[..s.len() - 1].to_string()
        }
        s => s.to_string(),
    }
}

/// Default foreign key column for a reference to `entity`
pub fn foreign_key_for(entity: &str) -> String {
    format!("{}_id", singularize(entity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("todos"));
        assert!(is_valid_identifier("post_id"));
        assert!(is_valid_identifier("_internal"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1posts"));
        assert!(!is_valid_identifier("Posts"));
        assert!(!is_valid_identifier("posts; drop table x"));
    }

    #[test]
    fn test_snake_to_label() {
        assert_eq!(snake_to_label("created_at"), "Created At");
        assert_eq!(snake_to_label("id"), "Id");
        assert_eq!(snake_to_label("__weird__name"), "Weird Name");
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("comments"), "comment");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("class"), "class");
        assert_eq!(singularize("media"), "media");
    }

    #[test]
    fn test_foreign_key_for() {
        assert_eq!(foreign_key_for("posts"), "post_id");
        assert_eq!(foreign_key_for("users"), "user_id");
    }
}
