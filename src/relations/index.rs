//! Named field-group constraints over one entity

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::core::error::{ConfigError, DataResult};
use crate::entities::Entity;
use crate::query::ddl::IndexDefinition;

/// Index declaration as found in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    pub entity: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityIndex {
    name: String,
    entity: String,
    fields: Vec<String>,
    unique: bool,
}

impl EntityIndex {
    /// Create an index over `fields` of `entity`
    ///
    /// Without a name, one is derived as `idx_<entity>_<fields...>`.
    pub fn new(
        entity: &Entity,
        fields: Vec<String>,
        unique: bool,
        name: Option<String>,
    ) -> DataResult<Self> {
        let name = name.unwrap_or_else(|| format!("idx_{}_{}", entity.name(), fields.join("_")));
        let invalid = |message: String| ConfigError::InvalidIndex {
            index: name.clone(),
            message,
        };

        if fields.is_empty() {
            return Err(invalid("an index needs at least one field".to_string()).into());
        }
        for field in &fields {
            match entity.field(field) {
                None => {
                    return Err(invalid(format!(
                        "field \"{}\" does not exist on entity \"{}\"",
                        field,
                        entity.name()
                    ))
                    .into());
                }
                Some(f) if f.is_virtual() => {
                    return Err(invalid(format!("field \"{}\" is virtual", field)).into());
                }
                Some(_) => {}
            }
        }
        if fields.iter().enumerate().any(|(i, f)| fields[..i].contains(f)) {
            return Err(invalid("fields must be unique".to_string()).into());
        }

        Ok(Self {
            entity: entity.name().to_string(),
            name,
            fields,
            unique,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Index directive for schema sync
    pub fn definition(&self) -> IndexDefinition {
        IndexDefinition {
            name: self.name.clone(),
            table: self.entity.clone(),
            columns: self.fields.clone(),
            unique: self.unique,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "entity": self.entity,
            "fields": self.fields,
            "unique": self.unique,
        })
    }
}
