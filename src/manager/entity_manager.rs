//! Registry of one data model: entities, relations and indices
//!
//! The manager is assembled once at build time (`add_*` take `&mut self`) and
//! then shared read-only, typically behind an `Arc`, by every request.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use super::mutator::Mutator;
use super::repository::Repository;
use super::schema::SchemaManager;
use crate::core::error::{ConfigError, DataResult, EntityError};
use crate::entities::Entity;
use crate::relations::{Direction, EntityIndex, EntityRelation, IndexConfig};
use crate::storage::Connection;

pub struct EntityManager {
    entities: IndexMap<String, Entity>,
    relations: Vec<EntityRelation>,
    indices: Vec<EntityIndex>,
    connection: Arc<dyn Connection>,
    pub(crate) sync_lock: tokio::sync::Mutex<()>,
}

impl EntityManager {
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self {
            entities: IndexMap::new(),
            relations: Vec::new(),
            indices: Vec::new(),
            connection,
            sync_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    /// Register an entity; names are unique
    pub fn add_entity(&mut self, entity: Entity) -> DataResult<()> {
        if self.entities.contains_key(entity.name()) {
            return Err(ConfigError::DuplicateEntity {
                entity: entity.name().to_string(),
            }
            .into());
        }
        tracing::debug!(entity = entity.name(), "registered entity");
        self.entities.insert(entity.name().to_string(), entity);
        Ok(())
    }

    /// Register a relation and everything it implies
    ///
    /// Foreign key fields are added to the holding entity, generated
    /// connection entities and indices are registered. Adding the same
    /// relation twice is a no-op.
    pub fn add_relation(&mut self, relation: EntityRelation) -> DataResult<()> {
        if self.relations.contains(&relation) {
            return Ok(());
        }
        let source = self.entity(relation.source())?.clone();
        let target = self.entity(relation.target())?.clone();
        let artifacts = relation.artifacts(&source, &target)?;

        for (entity, field) in artifacts.fields {
            self.entity_mut(&entity)?.add_field(field)?;
        }
        for entity in artifacts.entities {
            match self.entities.get(entity.name()) {
                Some(existing) if existing.to_json() == entity.to_json() => {}
                _ => self.add_entity(entity)?,
            }
        }
        for index in artifacts.indices {
            self.add_index(index, None)?;
        }

        tracing::debug!(relation = %relation.name(), "registered relation");
        self.relations.push(relation);
        Ok(())
    }

    /// Register an index; re-adding an identical index is a no-op
    pub fn add_index(&mut self, config: IndexConfig, name: Option<String>) -> DataResult<()> {
        let index = EntityIndex::new(self.entity(&config.entity)?, config.fields, config.unique, name)?;
        match self.indices.iter().find(|i| i.name() == index.name()) {
            Some(existing) if existing == &index => Ok(()),
            Some(_) => Err(ConfigError::InvalidIndex {
                index: index.name().to_string(),
                message: "an index with this name already exists".to_string(),
            }
            .into()),
            None => {
                self.indices.push(index);
                Ok(())
            }
        }
    }

    /// Resolve an entity by name
    pub fn entity(&self, name: &str) -> DataResult<&Entity> {
        self.entities.get(name).ok_or_else(|| {
            EntityError::UnknownEntity {
                name: name.to_string(),
            }
            .into()
        })
    }

    fn entity_mut(&mut self, name: &str) -> DataResult<&mut Entity> {
        self.entities.get_mut(name).ok_or_else(|| {
            EntityError::UnknownEntity {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Entities in registration order
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn relations(&self) -> &[EntityRelation] {
        &self.relations
    }

    pub fn indices(&self) -> &[EntityIndex] {
        &self.indices
    }

    /// Relations with `entity` at either end
    pub fn relations_of<'a>(&'a self, entity: &'a str) -> impl Iterator<Item = &'a EntityRelation> {
        self.relations
            .iter()
            .filter(move |r| r.source() == entity || r.target() == entity)
    }

    /// Resolve the relation `reference` names from `entity`'s side
    pub fn find_reference(
        &self,
        entity: &str,
        reference: &str,
    ) -> DataResult<(&EntityRelation, Direction)> {
        self.relations
            .iter()
            .find_map(|r| r.direction_for(entity, reference).map(|d| (r, d)))
            .ok_or_else(|| {
                EntityError::ReferenceNotFound {
                    entity: entity.to_string(),
                    reference: reference.to_string(),
                }
                .into()
            })
    }

    pub fn repository(&self, entity: &str) -> DataResult<Repository<'_>> {
        Ok(Repository::new(self, self.entity(entity)?))
    }

    pub fn mutator(&self, entity: &str) -> DataResult<Mutator<'_>> {
        Ok(Mutator::new(self, self.entity(entity)?))
    }

    pub fn schema(&self) -> SchemaManager<'_> {
        SchemaManager::new(self)
    }

    /// The declared model: entities, relations and indices
    pub fn to_json(&self) -> Value {
        let entities: Map<String, Value> = self
            .entities
            .values()
            .map(|e| (e.name().to_string(), e.to_json()))
            .collect();
        let relations: Vec<Value> = self.relations.iter().map(|r| r.to_json()).collect();
        let indices: Map<String, Value> = self
            .indices
            .iter()
            .map(|i| (i.name().to_string(), i.to_json()))
            .collect();
        json!({
            "entities": entities,
            "relations": relations,
            "indices": indices,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DataError;
    use crate::fields::Field;
    use crate::relations::{RelationConfig, RelationType};
    use crate::storage::InMemoryConnection;

    fn manager() -> EntityManager {
        let mut em = EntityManager::new(Arc::new(InMemoryConnection::new()));
        em.add_entity(
            Entity::new(
                "posts",
                vec![Field::from_config("title", "text", json!({})).unwrap()],
            )
            .unwrap(),
        )
        .unwrap();
        em.add_entity(Entity::new("comments", vec![]).unwrap()).unwrap();
        em.add_entity(Entity::new("tags", vec![]).unwrap()).unwrap();
        em
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let mut em = manager();
        let err = em.add_entity(Entity::new("posts", vec![]).unwrap()).unwrap_err();
        assert!(matches!(err, DataError::Config(ConfigError::DuplicateEntity { .. })));
    }

    #[test]
    fn test_unknown_entity() {
        let em = manager();
        assert!(em.entity("users").unwrap_err().is_not_found());
        assert!(em.repository("users").is_err());
    }

    #[test]
    fn test_one_to_many_adds_foreign_key() {
        let mut em = manager();
        let relation = EntityRelation::new(
            RelationType::OneToMany,
            "posts",
            "comments",
            RelationConfig {
                field: Some("post_id".to_string()),
                ..Default::default()
            },
        );
        em.add_relation(relation.clone()).unwrap();
        em.add_relation(relation).unwrap();

        let comments = em.entity("comments").unwrap();
        assert_eq!(comments.field("post_id").unwrap().field_type(), "relation");
        assert_eq!(em.relations().len(), 1);

        let (_, direction) = em.find_reference("posts", "comments").unwrap();
        assert_eq!(direction, Direction::FromSource);
        let (_, direction) = em.find_reference("comments", "posts").unwrap();
        assert_eq!(direction, Direction::FromTarget);
        assert!(em.find_reference("posts", "tags").unwrap_err().is_not_found());
    }

    #[test]
    fn test_many_to_many_generates_connection_entity() {
        let mut em = manager();
        em.add_relation(EntityRelation::new(
            RelationType::ManyToMany,
            "posts",
            "tags",
            RelationConfig::default(),
        ))
        .unwrap();

        let connection = em.entity("posts_tags").unwrap();
        assert!(connection.field("post_id").is_some());
        assert!(connection.field("tag_id").is_some());
        assert_eq!(em.indices().len(), 1);
        assert!(em.indices()[0].is_unique());
    }

    #[test]
    fn test_relation_with_unknown_end() {
        let mut em = manager();
        let err = em
            .add_relation(EntityRelation::new(
                RelationType::ManyToOne,
                "posts",
                "users",
                RelationConfig::default(),
            ))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_to_json_lists_model() {
        let em = manager();
        let json = em.to_json();
        let names: Vec<&String> = json["entities"].as_object().unwrap().keys().collect();
        assert_eq!(names, vec!["posts", "comments", "tags"]);
        assert!(json["entities"]["posts"]["fields"]["title"].is_object());
    }
}
