//! Field kinds and their behaviour
//!
//! The set of kinds is closed: [`FieldKind`] enumerates every supported type
//! tag and dispatches to a [`FieldType`] implementation. Adding a kind means
//! adding a variant here.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

use super::context::{ActionContext, Fillable};
use super::field::BaseFieldConfig;
use crate::manager::EntityManager;
use crate::query::ddl::{ColumnDefinition, ColumnType, ForeignKey, OnDelete};

/// Shared capabilities of every field kind
#[async_trait]
pub trait FieldType: Send + Sync + fmt::Debug {
    /// The type tag this kind is registered under
    fn type_name(&self) -> &'static str;

    /// Normalize the base config for this kind before validation
    fn adjust_base(&self, _base: &mut BaseFieldConfig) {}

    /// Semantic checks that the config's shape cannot express
    fn check_config(&self, _base: &BaseFieldConfig) -> Result<(), String> {
        Ok(())
    }

    /// Validate and normalize a non-null input value
    fn coerce(&self, value: Value) -> Result<Value, String>;

    /// Normalize a `where` literal to the stored representation
    ///
    /// Only the representation is checked; length, range and membership
    /// constraints apply to writes, not to filters.
    fn literal(&self, value: Value) -> Result<Value, String> {
        self.coerce(value)
    }

    /// Stricter validity check used by `Field::is_valid`
    fn is_valid(&self, value: &Value) -> bool {
        self.coerce(value.clone()).is_ok()
    }

    /// Persist transform for a non-null value
    async fn persist(
        &self,
        value: Value,
        _em: &EntityManager,
        _context: ActionContext,
    ) -> Result<Value, String> {
        self.coerce(value)
    }

    /// Convert a stored value to its API-facing form
    fn retrieve(&self, value: Value) -> Value {
        value
    }

    fn column(&self, name: &str) -> ColumnDefinition;

    fn json_schema(&self) -> Value;
}

// =============================================================================
// primary
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrimaryField {}

#[async_trait]
impl FieldType for PrimaryField {
    fn type_name(&self) -> &'static str {
        "primary"
    }

    fn adjust_base(&self, base: &mut BaseFieldConfig) {
        base.fillable = Fillable::All(false);
        base.required = false;
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        positive_integer(&value).map(Value::from)
    }

    fn literal(&self, value: Value) -> Result<Value, String> {
        integer(&value).map(Value::from)
    }

    fn column(&self, name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::Integer).primary()
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "integer" })
    }
}

// =============================================================================
// text
// =============================================================================

/// Built-in formats for text values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFormat {
    Email,
    Url,
    Uuid,
    Phone,
}

impl TextFormat {
    pub fn validate(&self, value: &str) -> bool {
        match self {
            TextFormat::Email => {
                static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
                EMAIL_REGEX
                    .get_or_init(|| {
                        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
                    })
                    .is_match(value)
            }
            TextFormat::Url => {
                static URL_REGEX: OnceLock<Regex> = OnceLock::new();
                URL_REGEX
                    .get_or_init(|| Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap())
                    .is_match(value)
            }
            TextFormat::Uuid => Uuid::parse_str(value).is_ok(),
            TextFormat::Phone => {
                static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();
                // 8 to 15 digits (E.164)
                PHONE_REGEX
                    .get_or_init(|| Regex::new(r"^\+?[1-9]\d{7,14}$").unwrap())
                    .is_match(value)
            }
        }
    }

    fn json_schema_format(&self) -> &'static str {
        match self {
            TextFormat::Email => "email",
            TextFormat::Url => "uri",
            TextFormat::Uuid => "uuid",
            TextFormat::Phone => "phone",
        }
    }
}

/// A regex compiled once at config parse time, compared by its source
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Pattern::new(&source).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<TextFormat>,
}

#[async_trait]
impl FieldType for TextField {
    fn type_name(&self) -> &'static str {
        "text"
    }

    fn check_config(&self, base: &BaseFieldConfig) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(format!("min_length ({}) exceeds max_length ({})", min, max));
            }
        }
        check_default(self, base)
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        let Some(s) = value.as_str() else {
            return Err(format!("expected a string, got {}", value));
        };
        let len = s.chars().count();
        if let Some(min) = self.min_length {
            if len < min {
                return Err(format!("must be at least {} characters", min));
            }
        }
        if let Some(max) = self.max_length {
            if len > max {
                return Err(format!("must be at most {} characters", max));
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(s) {
                return Err(format!("does not match pattern {}", pattern.as_str()));
            }
        }
        if let Some(format) = &self.format {
            if !format.validate(s) {
                return Err(format!("is not a valid {:?}", format).to_lowercase());
            }
        }
        Ok(value)
    }

    fn literal(&self, value: Value) -> Result<Value, String> {
        match value {
            Value::String(_) => Ok(value),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            other => Err(format!("expected a string, got {}", other)),
        }
    }

    fn column(&self, name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::Text)
    }

    fn json_schema(&self) -> Value {
        let mut schema = json!({ "type": "string" });
        if let Some(min) = self.min_length {
            schema["minLength"] = json!(min);
        }
        if let Some(max) = self.max_length {
            schema["maxLength"] = json!(max);
        }
        if let Some(pattern) = &self.pattern {
            schema["pattern"] = json!(pattern.as_str());
        }
        if let Some(format) = &self.format {
            schema["format"] = json!(format.json_schema_format());
        }
        schema
    }
}

// =============================================================================
// number
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
}

#[async_trait]
impl FieldType for NumberField {
    fn type_name(&self) -> &'static str {
        "number"
    }

    fn check_config(&self, base: &BaseFieldConfig) -> Result<(), String> {
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(format!("minimum ({}) exceeds maximum ({})", min, max));
            }
        }
        if let Some(step) = self.multiple_of {
            if step <= 0.0 {
                return Err("multiple_of must be positive".to_string());
            }
        }
        check_default(self, base)
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        let number = self.literal(value)?;
        let n = number.as_f64().unwrap_or_default();
        if let Some(min) = self.minimum {
            if n < min {
                return Err(format!("must be greater than or equal to {}", min));
            }
        }
        if let Some(max) = self.maximum {
            if n > max {
                return Err(format!("must be less than or equal to {}", max));
            }
        }
        if let Some(step) = self.multiple_of {
            let ratio = n / step;
            if (ratio - ratio.round()).abs() > 1e-9 {
                return Err(format!("must be a multiple of {}", step));
            }
        }
        Ok(number)
    }

    fn literal(&self, value: Value) -> Result<Value, String> {
        match &value {
            Value::Number(_) => Ok(value),
            Value::String(s) => parse_number(s.trim())
                .ok_or_else(|| format!("expected a number, got \"{}\"", s)),
            other => Err(format!("expected a number, got {}", other)),
        }
    }

    fn column(&self, name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::Numeric)
    }

    fn json_schema(&self) -> Value {
        let mut schema = json!({ "type": "number" });
        if let Some(min) = self.minimum {
            schema["minimum"] = json!(min);
        }
        if let Some(max) = self.maximum {
            schema["maximum"] = json!(max);
        }
        if let Some(step) = self.multiple_of {
            schema["multipleOf"] = json!(step);
        }
        schema
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    s.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

// =============================================================================
// boolean
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BooleanField {}

#[async_trait]
impl FieldType for BooleanField {
    fn type_name(&self) -> &'static str {
        "boolean"
    }

    fn check_config(&self, base: &BaseFieldConfig) -> Result<(), String> {
        check_default(self, base)
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        as_bool(&value)
            .map(Value::Bool)
            .ok_or_else(|| format!("expected a boolean, got {}", value))
    }

    /// Backends without a native boolean hand back 0/1
    fn retrieve(&self, value: Value) -> Value {
        match as_bool(&value) {
            Some(b) => Value::Bool(b),
            None => value,
        }
    }

    fn column(&self, name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::Boolean)
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "boolean" })
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

// =============================================================================
// date
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateType {
    #[default]
    Date,
    DateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateField {
    #[serde(rename = "type", default)]
    pub date_type: DateType,
}

#[async_trait]
impl FieldType for DateField {
    fn type_name(&self) -> &'static str {
        "date"
    }

    fn check_config(&self, base: &BaseFieldConfig) -> Result<(), String> {
        check_default(self, base)
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        let Some(s) = value.as_str() else {
            return Err(format!("expected a date string, got {}", value));
        };
        match self.date_type {
            DateType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .map_err(|_| format!("\"{}\" is not a date (YYYY-MM-DD)", s)),
            DateType::DateTime => parse_datetime(s)
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                .ok_or_else(|| format!("\"{}\" is not an RFC 3339 datetime", s)),
        }
    }

    fn column(&self, name: &str) -> ColumnDefinition {
        match self.date_type {
            DateType::Date => ColumnDefinition::new(name, ColumnType::Date),
            DateType::DateTime => ColumnDefinition::new(name, ColumnType::DateTime),
        }
    }

    fn json_schema(&self) -> Value {
        match self.date_type {
            DateType::Date => json!({ "type": "string", "format": "date" }),
            DateType::DateTime => json!({ "type": "string", "format": "date-time" }),
        }
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

// =============================================================================
// enum
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumField {
    pub options: Vec<String>,
}

#[async_trait]
impl FieldType for EnumField {
    fn type_name(&self) -> &'static str {
        "enum"
    }

    fn check_config(&self, base: &BaseFieldConfig) -> Result<(), String> {
        if self.options.is_empty() {
            return Err("options must not be empty".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.options.iter().find(|o| !seen.insert(o.as_str())) {
            return Err(format!("duplicate option \"{}\"", dup));
        }
        check_default(self, base)
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        match value.as_str() {
            Some(s) if self.options.iter().any(|o| o == s) => Ok(value),
            _ => Err(format!(
                "must be one of [{}], got {}",
                self.options.join(", "),
                value
            )),
        }
    }

    fn literal(&self, value: Value) -> Result<Value, String> {
        match value {
            Value::String(_) => Ok(value),
            other => Err(format!("expected a string, got {}", other)),
        }
    }

    fn column(&self, name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::Text)
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string", "enum": self.options })
    }
}

// =============================================================================
// json
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonField {}

#[async_trait]
impl FieldType for JsonField {
    fn type_name(&self) -> &'static str {
        "json"
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        serde_json::to_string(&value)
            .map(Value::String)
            .map_err(|e| e.to_string())
    }

    fn is_valid(&self, _value: &Value) -> bool {
        true
    }

    /// Stored as encoded text
    fn retrieve(&self, value: Value) -> Value {
        match &value {
            Value::String(s) => serde_json::from_str(s).unwrap_or(value),
            _ => value,
        }
    }

    fn column(&self, name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::Text)
    }

    fn json_schema(&self) -> Value {
        json!({})
    }
}

// =============================================================================
// relation
// =============================================================================

fn default_target_field() -> String {
    "id".to_string()
}

/// Foreign key to another entity's primary field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationField {
    pub target: String,
    #[serde(default = "default_target_field")]
    pub target_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<OnDelete>,
}

impl RelationField {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            target_field: default_target_field(),
            on_delete: None,
        }
    }
}

#[async_trait]
impl FieldType for RelationField {
    fn type_name(&self) -> &'static str {
        "relation"
    }

    fn coerce(&self, value: Value) -> Result<Value, String> {
        positive_integer(&value).map(Value::from)
    }

    fn literal(&self, value: Value) -> Result<Value, String> {
        integer(&value).map(Value::from)
    }

    /// The referenced row must exist in the target entity
    async fn persist(
        &self,
        value: Value,
        em: &EntityManager,
        _context: ActionContext,
    ) -> Result<Value, String> {
        let id = self.coerce(value)?;
        let mut predicate = Map::new();
        predicate.insert(self.target_field.clone(), id.clone());
        let exists = em
            .repository(&self.target)
            .map_err(|e| e.to_string())?
            .exists(&Value::Object(predicate))
            .await
            .map_err(|e| e.to_string())?;
        if !exists.exists {
            return Err(format!("referenced {} {} does not exist", self.target, id));
        }
        Ok(id)
    }

    fn column(&self, name: &str) -> ColumnDefinition {
        ColumnDefinition::new(name, ColumnType::Integer).references(ForeignKey {
            table: self.target.clone(),
            column: self.target_field.clone(),
            on_delete: self.on_delete,
        })
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "integer" })
    }
}

fn integer(value: &Value) -> Result<i64, String> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| format!("expected an integer, got {}", value))
}

fn positive_integer(value: &Value) -> Result<i64, String> {
    match integer(value) {
        Ok(i) if i > 0 => Ok(i),
        _ => Err(format!("expected a positive integer id, got {}", value)),
    }
}

fn check_default(kind: &dyn FieldType, base: &BaseFieldConfig) -> Result<(), String> {
    match &base.default_value {
        Some(default) if kind.coerce(default.clone()).is_err() => Err(format!(
            "default_value {} is not a valid {} value",
            default,
            kind.type_name()
        )),
        _ => Ok(()),
    }
}

// =============================================================================
// registry
// =============================================================================

/// Every supported field kind
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Primary(PrimaryField),
    Text(TextField),
    Number(NumberField),
    Boolean(BooleanField),
    Date(DateField),
    Enum(EnumField),
    Json(JsonField),
    Relation(RelationField),
}

impl FieldKind {
    /// Type tags accepted by [`FieldKind::from_config`]
    pub const TYPES: &'static [&'static str] = &[
        "primary", "text", "number", "boolean", "date", "enum", "json", "relation",
    ];

    /// Parse the kind-specific part of a field config
    ///
    /// Returns `Ok(None)` when the tag is not registered.
    pub fn from_config(tag: &str, config: Value) -> Result<Option<Self>, serde_json::Error> {
        let kind = match tag {
            "primary" => FieldKind::Primary(serde_json::from_value(config)?),
            "text" => FieldKind::Text(serde_json::from_value(config)?),
            "number" => FieldKind::Number(serde_json::from_value(config)?),
            "boolean" => FieldKind::Boolean(serde_json::from_value(config)?),
            "date" => FieldKind::Date(serde_json::from_value(config)?),
            "enum" => FieldKind::Enum(serde_json::from_value(config)?),
            "json" => FieldKind::Json(serde_json::from_value(config)?),
            "relation" => FieldKind::Relation(serde_json::from_value(config)?),
            _ => return Ok(None),
        };
        Ok(Some(kind))
    }

    pub fn as_type(&self) -> &dyn FieldType {
        match self {
            FieldKind::Primary(f) => f,
            FieldKind::Text(f) => f,
            FieldKind::Number(f) => f,
            FieldKind::Boolean(f) => f,
            FieldKind::Date(f) => f,
            FieldKind::Enum(f) => f,
            FieldKind::Json(f) => f,
            FieldKind::Relation(f) => f,
        }
    }

    /// Kind-specific config as a JSON object
    pub fn config_json(&self) -> Map<String, Value> {
        let value = match self {
            FieldKind::Primary(f) => serde_json::to_value(f),
            FieldKind::Text(f) => serde_json::to_value(f),
            FieldKind::Number(f) => serde_json::to_value(f),
            FieldKind::Boolean(f) => serde_json::to_value(f),
            FieldKind::Date(f) => serde_json::to_value(f),
            FieldKind::Enum(f) => serde_json::to_value(f),
            FieldKind::Json(f) => serde_json::to_value(f),
            FieldKind::Relation(f) => serde_json::to_value(f),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, FieldKind::Primary(_))
    }

    pub fn as_relation(&self) -> Option<&RelationField> {
        match self {
            FieldKind::Relation(r) => Some(r),
            _ => None,
        }
    }
}
