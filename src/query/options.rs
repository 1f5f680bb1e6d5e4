//! Repository query options
//!
//! Options arrive either as a JSON body (`POST /:entity/query`) or as query
//! string parameters, where every value is a string. Both go through
//! [`RepoQuery::from_json`]: string forms (`"-title"`, `"id,title"`, JSON
//! text) are accepted wherever the structured form is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::statement::SortDir;
use crate::core::error::ValidationError;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 1000;

const KNOWN_KEYS: &[&str] = &["where", "sort", "limit", "offset", "select", "join"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub by: String,
    #[serde(default)]
    pub dir: SortDir,
}

impl Sort {
    pub fn new(by: impl Into<String>, dir: SortDir) -> Self {
        Self { by: by.into(), dir }
    }

    /// `"title"` sorts ascending, `"-title"` descending
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(by) => Self::new(by, SortDir::Desc),
            None => Self::new(s.trim_start_matches('+'), SortDir::Asc),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepoQuery {
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<Vec<String>>,
}

impl RepoQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_where(mut self, where_: Value) -> Self {
        self.where_ = Some(where_);
        self
    }

    pub fn with_sort(mut self, by: impl Into<String>, dir: SortDir) -> Self {
        self.sort = Some(Sort::new(by, dir));
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_select(mut self, select: &[&str]) -> Self {
        self.select = Some(select.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_join(mut self, join: &[&str]) -> Self {
        self.join = Some(join.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Limit clamped to `1..=MAX_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    /// Parse options from a JSON object
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let map = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::query(format!(
                    "query options must be an object, got {}",
                    other
                )));
            }
        };

        if let Some(key) = map.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            return Err(ValidationError::query(format!("unknown option \"{}\"", key)));
        }

        Ok(Self {
            where_: map.get("where").map(parse_where_option).transpose()?.flatten(),
            sort: map.get("sort").map(parse_sort).transpose()?.flatten(),
            limit: map.get("limit").map(|v| parse_count("limit", v)).transpose()?.flatten(),
            offset: map.get("offset").map(|v| parse_count("offset", v)).transpose()?.flatten(),
            select: map.get("select").map(|v| parse_list("select", v)).transpose()?.flatten(),
            join: map.get("join").map(|v| parse_list("join", v)).transpose()?.flatten(),
        })
    }

    /// Parse options from query string parameters
    pub fn from_query_map(params: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let map: Map<String, Value> = params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Self::from_json(&Value::Object(map))
    }
}

/// Decode a string that may hold JSON text
fn json_text(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(trimmed).ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn parse_where_option(value: &Value) -> Result<Option<Value>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(_) => Ok(Some(value.clone())),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(_) => match json_text(value) {
            Some(obj @ Value::Object(_)) => Ok(Some(obj)),
            _ => Err(ValidationError::query("where must be a JSON object")),
        },
        other => Err(ValidationError::query(format!(
            "where must be an object, got {}",
            other
        ))),
    }
}

fn parse_sort(value: &Value) -> Result<Option<Sort>, ValidationError> {
    if let Some(decoded) = json_text(value) {
        return parse_sort(&decoded);
    }
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(Sort::parse(s.trim()))),
        Value::Object(_) => serde_json::from_value::<Sort>(value.clone())
            .map(Some)
            .map_err(|e| ValidationError::query(format!("invalid sort: {}", e))),
        other => Err(ValidationError::query(format!("invalid sort: {}", other))),
    }
}

fn parse_count(name: &str, value: &Value) -> Result<Option<usize>, ValidationError> {
    let invalid = || ValidationError::query(format!("{} must be a non-negative integer", name));
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_u64().map(|n| Some(n as usize)).ok_or_else(invalid),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s.trim().parse::<usize>().map(Some).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn parse_list(name: &str, value: &Value) -> Result<Option<Vec<String>>, ValidationError> {
    if let Some(decoded) = json_text(value) {
        return parse_list(name, &decoded);
    }
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    ValidationError::query(format!("{} entries must be strings", name))
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        other => Err(ValidationError::query(format!(
            "{} must be a list, got {}",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_and_clamp() {
        let query = RepoQuery::default();
        assert_eq!(query.effective_limit(), DEFAULT_LIMIT);
        assert_eq!(query.effective_offset(), 0);
        assert_eq!(RepoQuery::new().with_limit(5000).effective_limit(), MAX_LIMIT);
        assert_eq!(RepoQuery::new().with_limit(0).effective_limit(), 1);
    }

    #[test]
    fn test_from_json_structured() {
        let query = RepoQuery::from_json(&json!({
            "where": { "done": false },
            "sort": { "by": "title", "dir": "desc" },
            "limit": 5,
            "select": ["id", "title"],
            "join": ["posts"]
        }))
        .unwrap();
        assert_eq!(query.where_, Some(json!({ "done": false })));
        assert_eq!(query.sort, Some(Sort::new("title", SortDir::Desc)));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.select.unwrap(), vec!["id", "title"]);
        assert_eq!(query.join.unwrap(), vec!["posts"]);
    }

    #[test]
    fn test_from_query_map_string_forms() {
        let mut params = HashMap::new();
        params.insert("where".to_string(), r#"{"done":true}"#.to_string());
        params.insert("sort".to_string(), "-id".to_string());
        params.insert("limit".to_string(), "3".to_string());
        params.insert("offset".to_string(), "6".to_string());
        params.insert("select".to_string(), "id, title".to_string());

        let query = RepoQuery::from_query_map(&params).unwrap();
        assert_eq!(query.where_, Some(json!({ "done": true })));
        assert_eq!(query.sort, Some(Sort::new("id", SortDir::Desc)));
        assert_eq!(query.effective_limit(), 3);
        assert_eq!(query.effective_offset(), 6);
        assert_eq!(query.select.unwrap(), vec!["id", "title"]);
    }

    #[test]
    fn test_rejects_invalid_options() {
        assert!(RepoQuery::from_json(&json!({ "limt": 3 })).is_err());
        assert!(RepoQuery::from_json(&json!({ "limit": -1 })).is_err());
        assert!(RepoQuery::from_json(&json!({ "limit": "ten" })).is_err());
        assert!(RepoQuery::from_json(&json!({ "where": "done" })).is_err());
        assert!(RepoQuery::from_json(&json!({ "sort": { "by": "id", "dir": "up" } })).is_err());
        assert!(RepoQuery::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_sort_string_parse() {
        assert_eq!(Sort::parse("title"), Sort::new("title", SortDir::Asc));
        assert_eq!(Sort::parse("-title"), Sort::new("title", SortDir::Desc));
    }
}
