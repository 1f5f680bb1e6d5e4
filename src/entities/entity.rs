//! Entity: an ordered set of unique fields mapped to one table

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::core::error::{ConfigError, DataResult};
use crate::core::naming::{is_valid_identifier, snake_to_label};
use crate::fields::{ActionContext, Context, Field};
use crate::query::ddl::TableDefinition;
use crate::query::statement::{Row, SelectColumn, SortDir};

/// Name of the primary field inserted when none is declared
pub const DEFAULT_PRIMARY_FIELD: &str = "id";

/// Where an entity comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Declared in configuration
    #[default]
    Regular,
    /// Provided by the system itself
    System,
    /// Produced by a relation (many-to-many connection tables)
    Generated,
}

fn default_sort_field() -> String {
    DEFAULT_PRIMARY_FIELD.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    /// Display name (plural)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_singular: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_sort_field")]
    pub sort_field: String,

    #[serde(default)]
    pub sort_dir: SortDir,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            name: None,
            name_singular: None,
            description: None,
            sort_field: default_sort_field(),
            sort_dir: SortDir::Asc,
        }
    }
}

/// Default ordering of an entity's rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultSort {
    pub by: String,
    pub dir: SortDir,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    name: String,
    fields: Vec<Field>,
    config: EntityConfig,
    entity_type: EntityType,
}

impl Entity {
    /// Create a regular entity with default config
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> DataResult<Self> {
        Self::create(name, fields, EntityConfig::default(), EntityType::Regular)
    }

    /// Create an entity
    ///
    /// Exactly one primary field ends up first in the field list: the
    /// supplied one, or an `id` primary field when none is supplied.
    pub fn create(
        name: impl Into<String>,
        fields: Vec<Field>,
        config: EntityConfig,
        entity_type: EntityType,
    ) -> DataResult<Self> {
        let name = name.into();
        if !is_valid_identifier(&name) {
            return Err(ConfigError::InvalidEntityConfig {
                entity: name.clone(),
                message: format!("\"{}\" is not a valid entity name", name),
            }
            .into());
        }

        let primary_count = fields.iter().filter(|f| f.is_primary()).count();
        if primary_count > 1 {
            return Err(ConfigError::MultiplePrimaryFields { entity: name }.into());
        }

        let (primary, others): (Vec<Field>, Vec<Field>) =
            fields.into_iter().partition(|f| f.is_primary());
        let primary = primary
            .into_iter()
            .next()
            .unwrap_or_else(|| Field::primary(DEFAULT_PRIMARY_FIELD));

        let mut entity = Self {
            name,
            fields: vec![primary],
            config,
            entity_type,
        };
        for field in others {
            entity.add_field(field)?;
        }
        Ok(entity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn label(&self) -> String {
        snake_to_label(self.config.name.as_deref().unwrap_or(&self.name))
    }

    /// Append a field
    ///
    /// Re-adding an identical field is a no-op; a different field with the
    /// same name is an error. Primary fields cannot be added after creation.
    pub fn add_field(&mut self, field: Field) -> DataResult<()> {
        if let Some(existing) = self.field(field.name()) {
            if existing.to_json() == field.to_json() {
                return Ok(());
            }
            return Err(ConfigError::DuplicateField {
                entity: self.name.clone(),
                field: field.name().to_string(),
            }
            .into());
        }
        if field.is_primary() {
            return Err(ConfigError::MultiplePrimaryFields {
                entity: self.name.clone(),
            }
            .into());
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn primary_field(&self) -> &Field {
        &self.fields[0]
    }

    pub fn primary_name(&self) -> &str {
        self.fields[0].name()
    }

    /// Fields in declaration order, primary first
    pub fn get_fields(&self, include_virtual: bool) -> Vec<&Field> {
        self.fields
            .iter()
            .filter(|f| include_virtual || !f.is_virtual())
            .collect()
    }

    pub fn get_fillable_fields(
        &self,
        context: Option<ActionContext>,
        include_virtual: bool,
    ) -> Vec<&Field> {
        self.get_fields(include_virtual)
            .into_iter()
            .filter(|f| f.is_fillable(context))
            .collect()
    }

    pub fn get_required_fields(&self) -> Vec<&Field> {
        self.get_fields(false)
            .into_iter()
            .filter(|f| f.is_required())
            .collect()
    }

    /// Visible, non-virtual columns for `context` (default `read`)
    pub fn get_select(&self, alias: Option<&str>, context: Option<Context>) -> Vec<SelectColumn> {
        let context = context.unwrap_or(Context::Read);
        let table = alias.unwrap_or(&self.name);
        self.get_fields(false)
            .into_iter()
            .filter(|f| !f.is_hidden(Some(context)))
            .map(|f| SelectColumn::new(table, f.name(), f.name()))
            .collect()
    }

    /// Like [`get_select`](Self::get_select), restricted to the names in `select`
    pub fn get_aliased_select_from(
        &self,
        select: &[String],
        alias: Option<&str>,
        context: Option<Context>,
    ) -> Vec<SelectColumn> {
        self.get_select(alias, context)
            .into_iter()
            .filter(|c| select.iter().any(|s| s == &c.alias))
            .collect()
    }

    pub fn default_sort(&self) -> DefaultSort {
        DefaultSort {
            by: self.config.sort_field.clone(),
            dir: self.config.sort_dir,
        }
    }

    /// Validate every fillable field's value in `data`
    ///
    /// With `explain`, the first invalid field is reported as an error instead
    /// of returning `false`.
    pub fn is_valid_data(
        &self,
        data: &Row,
        context: ActionContext,
        explain: bool,
    ) -> DataResult<bool> {
        for field in self.get_fillable_fields(Some(context), false) {
            if let Err(message) = field.validate(data.get(field.name()), context) {
                tracing::debug!(
                    entity = %self.name,
                    field = field.name(),
                    context = context.as_str(),
                    "invalid data"
                );
                if explain {
                    return Err(crate::core::error::ValidationError::field(field.name(), message).into());
                }
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Field name to default value, for every field that has one
    pub fn get_default_object(&self) -> Row {
        self.get_fields(false)
            .into_iter()
            .filter_map(|f| f.get_default().map(|d| (f.name().to_string(), d.clone())))
            .collect()
    }

    /// JSON-Schema object describing a row
    pub fn to_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for field in &self.fields {
            let mut property = Map::new();
            property.insert("title".to_string(), json!(field.label()));
            if let Some(description) = &field.config().description {
                property.insert("$comment".to_string(), json!(description));
            }
            property.insert("$field".to_string(), json!(field.field_type()));
            if !field.is_fillable(Some(ActionContext::Update)) {
                property.insert("readOnly".to_string(), json!(true));
            }
            if !field.is_fillable(Some(ActionContext::Create)) {
                property.insert("writeOnly".to_string(), json!(true));
            }
            if let Value::Object(schema) = field.to_json_schema() {
                property.extend(schema);
            }
            if field.is_required() {
                required.push(field.name().to_string());
            }
            properties.insert(field.name().to_string(), Value::Object(property));
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// Table directive for schema sync
    pub fn table_definition(&self) -> TableDefinition {
        TableDefinition {
            name: self.name.clone(),
            columns: self.fields.iter().filter_map(|f| f.schema()).collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        let fields: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name().to_string(), f.to_json()))
            .collect();
        json!({
            "type": self.entity_type,
            "fields": fields,
            "config": self.config,
        })
    }
}
