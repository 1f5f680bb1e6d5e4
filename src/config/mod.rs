//! Configuration loading and management
//!
//! A [`DataConfig`] declares the whole data model: entities with their fields,
//! relations between entities and named indices. It is loaded once from YAML
//! or JSON and turned into an [`EntityManager`] by [`DataConfig::build`]; any
//! declaration error aborts the build.
//!
//! ```yaml
//! basepath: /api/data
//! entities:
//!   todos:
//!     fields:
//!       title: { type: text, config: { required: true } }
//!       done: { type: boolean, config: { default_value: false } }
//! relations:
//!   - { type: one_to_many, source: posts, target: comments, config: { field: post_id } }
//! indices:
//!   idx_todos_title: { entity: todos, fields: [title], unique: true }
//! ```

use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::core::error::{ConfigError, DataResult};
use crate::entities::{Entity, EntityConfig, EntityType};
use crate::fields::Field;
use crate::manager::EntityManager;
use crate::relations::{EntityRelation, IndexConfig, RelationDeclaration};
use crate::storage::Connection;

/// Environment variable enabling debug responses
pub const DEBUG_ENV: &str = "THIS_DATA_DEBUG";

pub const DEFAULT_BASEPATH: &str = "/api/data";

fn default_basepath() -> String {
    DEFAULT_BASEPATH.to_string()
}

/// A field as declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDeclaration {
    /// Type tag (`text`, `number`, `relation`...)
    #[serde(rename = "type")]
    pub field_type: String,

    /// Base keys plus the kind's own keys
    #[serde(default)]
    pub config: Value,
}

/// An entity as declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDeclaration {
    #[serde(rename = "type", default)]
    pub entity_type: EntityType,

    #[serde(default)]
    pub fields: IndexMap<String, FieldDeclaration>,

    #[serde(default)]
    pub config: EntityConfig,
}

/// Complete declaration of a data model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Mount point of the HTTP surface
    #[serde(default = "default_basepath")]
    pub basepath: String,

    #[serde(default)]
    pub entities: IndexMap<String, EntityDeclaration>,

    #[serde(default)]
    pub relations: Vec<RelationDeclaration>,

    /// Index name -> declaration
    #[serde(default)]
    pub indices: IndexMap<String, IndexConfig>,

    /// Permission name -> policy, for a role based guard
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub permissions: IndexMap<String, String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            basepath: default_basepath(),
            entities: IndexMap::new(),
            relations: Vec::new(),
            indices: IndexMap::new(),
            permissions: IndexMap::new(),
        }
    }
}

impl DataConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            message: format!("{}: {}", path.display(), e),
        })?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.display().to_string()),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Build the entity manager for this model on `connection`
    ///
    /// Entities come first, then relations (which may add fields and
    /// generated entities), then indices.
    pub fn build(&self, connection: Arc<dyn Connection>) -> DataResult<EntityManager> {
        let mut em = EntityManager::new(connection);

        for (name, declaration) in &self.entities {
            let fields = declaration
                .fields
                .iter()
                .map(|(field, decl)| Field::from_config(field, &decl.field_type, decl.config.clone()))
                .collect::<DataResult<Vec<_>>>()?;
            em.add_entity(Entity::create(
                name.clone(),
                fields,
                declaration.config.clone(),
                declaration.entity_type,
            )?)?;
        }
        for relation in &self.relations {
            em.add_relation(EntityRelation::from_declaration(relation.clone()))?;
        }
        for (name, index) in &self.indices {
            em.add_index(index.clone(), Some(name.clone()))?;
        }

        tracing::info!(
            entities = em.entities().count(),
            relations = em.relations().len(),
            indices = em.indices().len(),
            backend = em.connection().backend(),
            "data model built"
        );
        Ok(em)
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_basepath")]
    pub basepath: String,

    /// Expose compiled queries in read responses
    #[serde(default)]
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            basepath: default_basepath(),
            debug: debug_from_env(),
        }
    }
}

impl ServerConfig {
    pub fn new(basepath: impl Into<String>) -> Self {
        Self {
            basepath: basepath.into(),
            ..Default::default()
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl From<&DataConfig> for ServerConfig {
    fn from(config: &DataConfig) -> Self {
        Self::new(config.basepath.clone())
    }
}

fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| matches!(v.trim(), "1" | "true"))
        .unwrap_or(false)
}
