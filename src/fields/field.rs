//! The `Field` type: base config, validity rules and the transform pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::context::{ActionContext, Context, Fillable, Hidden};
use super::types::{FieldKind, PrimaryField};
use crate::core::error::{ConfigError, DataResult, ValidationError};
use crate::core::naming::{is_valid_identifier, snake_to_label};
use crate::manager::EntityManager;
use crate::query::ddl::ColumnDefinition;

/// Config keys shared by every field kind
pub const BASE_CONFIG_KEYS: &[&str] = &[
    "label",
    "description",
    "required",
    "fillable",
    "hidden",
    "virtual",
    "default_value",
];

/// Config shared by every field kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseFieldConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub fillable: Fillable,

    #[serde(default)]
    pub hidden: Hidden,

    /// Virtual fields are never persisted nor retrieved
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl BaseFieldConfig {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    pub fn with_default(value: Value) -> Self {
        Self {
            default_value: Some(value),
            ..Default::default()
        }
    }
}

/// A typed, configurable attribute of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    config: BaseFieldConfig,
    kind: FieldKind,
}

impl Field {
    /// Build a field from typed parts
    pub fn new(name: impl Into<String>, kind: FieldKind, config: BaseFieldConfig) -> DataResult<Self> {
        let name = name.into();
        let mut config = config;
        kind.as_type().adjust_base(&mut config);

        let invalid = |message: String, config: &BaseFieldConfig, kind: &FieldKind| {
            ConfigError::InvalidFieldConfig {
                field: name.clone(),
                config: merged_config(config, kind),
                message,
            }
        };

        if !is_valid_identifier(&name) {
            return Err(invalid(format!("\"{}\" is not a valid field name", name), &config, &kind).into());
        }
        if config.fillable.has_duplicates() {
            return Err(invalid("fillable contains duplicate contexts".to_string(), &config, &kind).into());
        }
        if config.hidden.has_duplicates() {
            return Err(invalid("hidden contains duplicate contexts".to_string(), &config, &kind).into());
        }
        if let Err(message) = kind.as_type().check_config(&config) {
            return Err(invalid(message, &config, &kind).into());
        }

        Ok(Self { name, config, kind })
    }

    /// Build a field from its type tag and a JSON config object
    ///
    /// The object holds the base keys plus the kind's own keys.
    pub fn from_config(name: impl Into<String>, field_type: &str, config: Value) -> DataResult<Self> {
        let name = name.into();
        let invalid = |message: String| ConfigError::InvalidFieldConfig {
            field: name.clone(),
            config: config.clone(),
            message,
        };

        let object = match &config {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => return Err(invalid(format!("expected an object, got {}", other)).into()),
        };

        let (base, specific): (Map<String, Value>, Map<String, Value>) = object
            .into_iter()
            .partition(|(key, _)| BASE_CONFIG_KEYS.contains(&key.as_str()));

        let base: BaseFieldConfig =
            serde_json::from_value(Value::Object(base)).map_err(|e| invalid(e.to_string()))?;
        let kind = FieldKind::from_config(field_type, Value::Object(specific))
            .map_err(|e| invalid(e.to_string()))?
            .ok_or_else(|| ConfigError::FieldTypeNotFound {
                field: name.clone(),
                field_type: field_type.to_string(),
            })?;

        Self::new(name, kind, base)
    }

    /// The reserved primary key field
    pub fn primary(name: impl Into<String>) -> Self {
        let mut config = BaseFieldConfig::default();
        let kind = FieldKind::Primary(PrimaryField {});
        kind.as_type().adjust_base(&mut config);
        Self {
            name: name.into(),
            config,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BaseFieldConfig {
        &self.config
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn field_type(&self) -> &'static str {
        self.kind.as_type().type_name()
    }

    pub fn is_primary(&self) -> bool {
        self.kind.is_primary()
    }

    pub fn label(&self) -> String {
        self.config
            .label
            .clone()
            .unwrap_or_else(|| snake_to_label(&self.name))
    }

    pub fn is_fillable(&self, context: Option<ActionContext>) -> bool {
        self.config.fillable.allows(context)
    }

    pub fn is_hidden(&self, context: Option<Context>) -> bool {
        self.config.hidden.hides(context)
    }

    pub fn is_required(&self) -> bool {
        self.config.required
    }

    pub fn is_virtual(&self) -> bool {
        self.config.is_virtual
    }

    pub fn has_default(&self) -> bool {
        self.config.default_value.is_some()
    }

    pub fn get_default(&self) -> Option<&Value> {
        self.config.default_value.as_ref()
    }

    /// Check a value for `context`, explaining the failure
    ///
    /// A present value must be fillable in the context and acceptable to the
    /// field kind. An absent (or null) value is valid unless the field is
    /// required.
    pub fn validate(&self, value: Option<&Value>, context: ActionContext) -> Result<(), String> {
        match value {
            Some(v) if !v.is_null() => {
                if !self.is_fillable(Some(context)) {
                    return Err(format!("is not fillable on {}", context.as_str()));
                }
                if self.is_virtual() {
                    return Ok(());
                }
                self.kind.as_type().coerce(v.clone()).map(|_| ())
            }
            _ if self.is_required() => Err("is required".to_string()),
            _ => Ok(()),
        }
    }

    pub fn is_valid(&self, value: Option<&Value>, context: ActionContext) -> bool {
        self.validate(value, context).is_ok()
    }

    /// Convert a stored value to its API-facing form
    pub fn transform_retrieve(&self, value: Value) -> Value {
        if self.is_virtual() || value.is_null() {
            return value;
        }
        self.kind.as_type().retrieve(value)
    }

    /// Convert an input value to its stored form
    ///
    /// A missing value is replaced by the default; a required field without
    /// default fails. Relation kinds consult the manager to check the target.
    pub async fn transform_persist(
        &self,
        value: Option<Value>,
        em: &EntityManager,
        context: ActionContext,
    ) -> Result<Option<Value>, ValidationError> {
        if self.is_virtual() {
            return Ok(value);
        }

        let value = match value {
            Some(v) if !v.is_null() => v,
            _ => {
                if self.is_required() && !self.has_default() {
                    return Err(ValidationError::field(
                        &self.name,
                        "transform persist failed: field is required",
                    ));
                }
                return match self.get_default() {
                    Some(default) => self
                        .kind
                        .as_type()
                        .coerce(default.clone())
                        .map(Some)
                        .map_err(|message| ValidationError::field(&self.name, message)),
                    None => Ok(None),
                };
            }
        };

        self.kind
            .as_type()
            .persist(value, em, context)
            .await
            .map(Some)
            .map_err(|message| ValidationError::field(&self.name, message))
    }

    /// Column directive for schema sync; virtual fields have none
    pub fn schema(&self) -> Option<ColumnDefinition> {
        if self.is_virtual() {
            return None;
        }
        Some(self.kind.as_type().column(&self.name))
    }

    /// JSON-Schema fragment for this field
    ///
    /// Whether the field is optional is expressed by the owning entity's
    /// `required` list.
    pub fn to_json_schema(&self) -> Value {
        let mut schema = self.kind.as_type().json_schema();
        if let (Some(default), Value::Object(map)) = (self.get_default(), &mut schema) {
            map.insert("default".to_string(), default.clone());
        }
        schema
    }

    /// Serialized form `{type, config}`, used for equality and introspection
    pub fn to_json(&self) -> Value {
        json!({
            "type": self.field_type(),
            "config": merged_config(&self.config, &self.kind),
        })
    }
}

fn merged_config(base: &BaseFieldConfig, kind: &FieldKind) -> Value {
    let mut map = match serde_json::to_value(base) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.extend(kind.config_json());
    Value::Object(map)
}
