//! The `where` predicate tree
//!
//! Clients send predicates as JSON objects:
//!
//! ```json
//! { "done": false, "id": { "$gt": 3, "$lte": 10 }, "$or": [{ "title": { "$like": "a%" } }] }
//! ```
//!
//! Keys are field names mapped to a literal (equality) or to an operator
//! object. `$and` / `$or` take an object or an array of objects. Parsing checks
//! every field against the entity, normalizes literals to the field's stored
//! representation and produces a [`Condition`] tree that the in-memory backend
//! evaluates and the SQL compiler renders.
//!
//! An empty predicate matches every row, so an empty child of `$or` makes the
//! whole `$or` match.

use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::statement::ColumnRef;
use crate::core::error::ValidationError;
use crate::entities::Entity;
use crate::fields::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    IsNull,
    Like,
}

impl Operator {
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "$eq" => Some(Operator::Eq),
            "$ne" => Some(Operator::Ne),
            "$gt" => Some(Operator::Gt),
            "$gte" => Some(Operator::Gte),
            "$lt" => Some(Operator::Lt),
            "$lte" => Some(Operator::Lte),
            "$in" => Some(Operator::In),
            "$notin" => Some(Operator::NotIn),
            "$isnull" => Some(Operator::IsNull),
            "$like" => Some(Operator::Like),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::NotIn => "$notin",
            Operator::IsNull => "$isnull",
            Operator::Like => "$like",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Compare {
        column: ColumnRef,
        op: Operator,
        value: Value,
    },
}

impl Condition {
    pub fn compare(column: ColumnRef, op: Operator, value: Value) -> Self {
        Condition::Compare { column, op, value }
    }

    pub fn eq(column: ColumnRef, value: impl Into<Value>) -> Self {
        Condition::compare(column, Operator::Eq, value.into())
    }

    /// Evaluate against a row, with SQL null semantics
    ///
    /// `lookup` resolves a qualified column to its value in the current row
    /// (`Value::Null` when absent).
    pub fn evaluate<F>(&self, lookup: &F) -> bool
    where
        F: Fn(&ColumnRef) -> Value,
    {
        match self {
            Condition::And(all) => all.iter().all(|c| c.evaluate(lookup)),
            Condition::Or(any) => any.iter().any(|c| c.evaluate(lookup)),
            Condition::Compare { column, op, value } => {
                let actual = lookup(column);
                match op {
                    Operator::IsNull => actual.is_null() == value.as_bool().unwrap_or(true),
                    _ if actual.is_null() => false,
                    Operator::Eq => compare_values(&actual, value) == Some(Ordering::Equal),
                    Operator::Ne => matches!(
                        compare_values(&actual, value),
                        Some(Ordering::Less | Ordering::Greater)
                    ),
                    Operator::Gt => compare_values(&actual, value) == Some(Ordering::Greater),
                    Operator::Gte => matches!(
                        compare_values(&actual, value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                    Operator::Lt => compare_values(&actual, value) == Some(Ordering::Less),
                    Operator::Lte => matches!(
                        compare_values(&actual, value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    Operator::In => as_list(value)
                        .iter()
                        .any(|v| compare_values(&actual, v) == Some(Ordering::Equal)),
                    Operator::NotIn => !as_list(value)
                        .iter()
                        .any(|v| compare_values(&actual, v) == Some(Ordering::Equal)),
                    Operator::Like => match (actual.as_str(), value.as_str()) {
                        (Some(s), Some(pattern)) => like_matches(s, pattern),
                        _ => false,
                    },
                }
            }
        }
    }
}

/// Order two scalar values; `None` when they are not comparable
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Number(_)) => compare_values(&Value::from(*x as i64), b),
        (Value::Number(_), Value::Bool(y)) => compare_values(a, &Value::from(*y as i64)),
        _ => None,
    }
}

fn as_list(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        _ => &[],
    }
}

/// SQL `LIKE`: `%` any run, `_` any single char, ASCII case-insensitive
///
/// Non-ASCII characters compare exactly, as in SQLite's built-in `LIKE`.
fn like_matches(value: &str, pattern: &str) -> bool {
    let mut regex = String::from("(?s)^");
    for c in pattern.to_ascii_lowercase().chars() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex.push('$');
    Regex::new(&regex).is_ok_and(|re| re.is_match(&value.to_ascii_lowercase()))
}

/// Parse a JSON `where` object for `entity`, qualifying columns with `alias`
///
/// Returns `None` for an absent or empty predicate.
pub fn parse_where(
    value: &Value,
    entity: &Entity,
    alias: &str,
) -> Result<Option<Condition>, ValidationError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => parse_object(map, entity, alias),
        other => Err(ValidationError::query(format!(
            "where must be an object, got {}",
            other
        ))),
    }
}

fn parse_object(
    map: &Map<String, Value>,
    entity: &Entity,
    alias: &str,
) -> Result<Option<Condition>, ValidationError> {
    let mut conditions = Vec::new();

    for (key, value) in map {
        match key.as_str() {
            "$and" | "$or" => {
                let children: Vec<Option<Condition>> = match value {
                    Value::Array(items) => items
                        .iter()
                        .map(|item| parse_where(item, entity, alias))
                        .collect::<Result<Vec<_>, _>>()?,
                    Value::Object(obj) => obj
                        .iter()
                        .map(|(k, v)| {
                            let mut single = Map::new();
                            single.insert(k.clone(), v.clone());
                            parse_object(&single, entity, alias)
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    other => {
                        return Err(ValidationError::query(format!(
                            "{} expects an object or an array, got {}",
                            key, other
                        )));
                    }
                };
                if key == "$or" && children.iter().any(Option::is_none) {
                    continue;
                }
                let children: Vec<Condition> = children.into_iter().flatten().collect();
                if children.is_empty() {
                    continue;
                }
                conditions.push(if key == "$and" {
                    Condition::And(children)
                } else {
                    Condition::Or(children)
                });
            }
            field_name => {
                let Some(field) = entity.field(field_name).filter(|f| !f.is_virtual()) else {
                    return Err(ValidationError::query(format!(
                        "unknown field \"{}\" on entity \"{}\"",
                        field_name, entity.name()
                    )));
                };
                conditions.extend(parse_field(field, ColumnRef::new(alias, field_name), value)?);
            }
        }
    }

    Ok(match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(Condition::And(conditions)),
    })
}

fn parse_field(
    field: &Field,
    column: ColumnRef,
    value: &Value,
) -> Result<Vec<Condition>, ValidationError> {
    let operators = match value {
        Value::Object(obj) if obj.keys().all(|k| k.starts_with('$')) && !obj.is_empty() => obj,
        Value::Null => {
            return Ok(vec![Condition::compare(column, Operator::IsNull, Value::Bool(true))]);
        }
        Value::Object(_) | Value::Array(_) => {
            return Err(ValidationError::query(format!(
                "invalid predicate for \"{}\": {}",
                column.column, value
            )));
        }
        literal => {
            let literal = to_literal(field, Operator::Eq, literal)?;
            return Ok(vec![Condition::eq(column, literal)]);
        }
    };

    operators
        .iter()
        .map(|(key, operand)| {
            let op = Operator::parse(key).ok_or_else(|| {
                ValidationError::query(format!("unknown operator \"{}\"", key))
            })?;
            let valid = match op {
                Operator::In | Operator::NotIn => operand.is_array(),
                Operator::IsNull => operand.is_boolean(),
                Operator::Like => operand.is_string(),
                _ => !operand.is_array() && !operand.is_object(),
            };
            if !valid {
                return Err(ValidationError::query(format!(
                    "invalid operand for {} on \"{}\": {}",
                    op.as_str(),
                    column.column,
                    operand
                )));
            }
            let operand = match (op, operand) {
                (Operator::IsNull | Operator::Like, _) => operand.clone(),
                (Operator::In | Operator::NotIn, Value::Array(items)) => Value::Array(
                    items
                        .iter()
                        .map(|item| to_literal(field, op, item))
                        .collect::<Result<_, _>>()?,
                ),
                _ => to_literal(field, op, operand)?,
            };
            Ok(Condition::compare(column.clone(), op, operand))
        })
        .collect()
}

/// Normalize one operand through the field kind
fn to_literal(field: &Field, op: Operator, value: &Value) -> Result<Value, ValidationError> {
    if value.is_null() {
        return Err(ValidationError::query(format!(
            "null operand for {} on \"{}\", use $isnull",
            op.as_str(),
            field.name()
        )));
    }
    field.kind().as_type().literal(value.clone()).map_err(|message| {
        ValidationError::query(format!(
            "invalid operand for {} on \"{}\": {}",
            op.as_str(),
            field.name(),
            message
        ))
    })
}
