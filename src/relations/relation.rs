//! Typed edges between two entities
//!
//! A relation decides which entity holds the foreign key, which names each
//! side uses to refer to the other, and how to traverse it in a query.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

use super::index::IndexConfig;
use crate::core::error::{ConfigError, DataResult};
use crate::core::naming::foreign_key_for;
use crate::entities::{Entity, EntityConfig, EntityType};
use crate::fields::{BaseFieldConfig, Field, FieldKind, NumberField, RelationField, TextField};
use crate::manager::EntityManager;
use crate::query::ddl::OnDelete;
use crate::query::filter::Condition;
use crate::query::statement::{ColumnRef, JoinClause, JoinKind};

/// Alias of the table joined to resolve a reference traversal
pub const REFERENCE_ALIAS: &str = "__ref";

/// Column names used by polymorphic relations on the target entity
pub const POLYMORPHIC_REFERENCE_FIELD: &str = "reference";
pub const POLYMORPHIC_ID_FIELD: &str = "entity_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// n:1, the source holds the foreign key
    ManyToOne,
    /// 1:1, the source holds a unique foreign key
    OneToOne,
    /// 1:n, the target holds the foreign key
    OneToMany,
    /// m:n, through a generated connection entity
    ManyToMany,
    /// the target holds `reference` + `entity_id`
    Polymorphic,
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelationType::ManyToOne => "many_to_one",
            RelationType::OneToOne => "one_to_one",
            RelationType::OneToMany => "one_to_many",
            RelationType::ManyToMany => "many_to_many",
            RelationType::Polymorphic => "polymorphic",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationConfig {
    /// How the source refers to the target (default: target name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_by: Option<String>,

    /// How the target refers to the source (default: source name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inversed_by: Option<String>,

    /// Foreign key column name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Name of the generated many-to-many entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_table: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<OnDelete>,
}

/// Relation declaration as found in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationDeclaration {
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub config: RelationConfig,
}

/// Which end of a relation a query starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromSource,
    FromTarget,
}

/// What registering a relation adds to the model
#[derive(Debug, Default)]
pub struct RelationArtifacts {
    /// `(entity name, field)` pairs to add
    pub fields: Vec<(String, Field)>,
    pub entities: Vec<Entity>,
    pub indices: Vec<IndexConfig>,
}

/// Query pieces reaching the other end of a relation
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    /// The entity whose rows are returned
    pub entity: String,
    pub joins: Vec<JoinClause>,
    pub filter: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRelation {
    relation_type: RelationType,
    source: String,
    target: String,
    config: RelationConfig,
}

impl EntityRelation {
    pub fn new(
        relation_type: RelationType,
        source: impl Into<String>,
        target: impl Into<String>,
        config: RelationConfig,
    ) -> Self {
        Self {
            relation_type,
            source: source.into(),
            target: target.into(),
            config,
        }
    }

    pub fn from_declaration(declaration: RelationDeclaration) -> Self {
        Self::new(
            declaration.relation_type,
            declaration.source,
            declaration.target,
            declaration.config,
        )
    }

    pub fn relation_type(&self) -> RelationType {
        self.relation_type
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &RelationConfig {
        &self.config
    }

    /// Display name, e.g. `posts_comments_one_to_many`
    pub fn name(&self) -> String {
        format!("{}_{}_{}", self.source, self.target, self.relation_type)
    }

    /// Name the source uses for the target
    pub fn source_reference(&self) -> &str {
        self.config.mapped_by.as_deref().unwrap_or(&self.target)
    }

    /// Name the target uses for the source
    pub fn target_reference(&self) -> &str {
        self.config.inversed_by.as_deref().unwrap_or(&self.source)
    }

    /// Foreign key column of to-one relations
    pub fn foreign_key(&self) -> String {
        if let Some(field) = &self.config.field {
            return field.clone();
        }
        match self.relation_type {
            RelationType::OneToMany => foreign_key_for(&self.source),
            _ => foreign_key_for(&self.target),
        }
    }

    pub fn connection_table(&self) -> String {
        self.config
            .connection_table
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.source, self.target))
    }

    /// Foreign keys of the connection entity: (to source, to target)
    pub fn connection_keys(&self) -> (String, String) {
        (foreign_key_for(&self.source), foreign_key_for(&self.target))
    }

    /// Value of `reference` marking rows that belong to the source
    pub fn polymorphic_key(&self) -> String {
        format!("{}.{}", self.source, self.source_reference())
    }

    /// Resolve `reference` as seen from `entity`
    pub fn direction_for(&self, entity: &str, reference: &str) -> Option<Direction> {
        if entity == self.source && reference == self.source_reference() {
            Some(Direction::FromSource)
        } else if entity == self.target && reference == self.target_reference() {
            Some(Direction::FromTarget)
        } else {
            None
        }
    }

    /// The entity on the far side when starting from `direction`
    pub fn other_end(&self, direction: Direction) -> &str {
        match direction {
            Direction::FromSource => &self.target,
            Direction::FromTarget => &self.source,
        }
    }

    fn invalid(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::InvalidRelation {
            relation: self.name(),
            message: message.into(),
        }
    }

    fn relation_field(
        &self,
        name: &str,
        target: &Entity,
        required: bool,
    ) -> DataResult<Field> {
        Field::new(
            name,
            FieldKind::Relation(RelationField {
                target: target.name().to_string(),
                target_field: target.primary_name().to_string(),
                on_delete: self.config.on_delete,
            }),
            BaseFieldConfig {
                required,
                ..Default::default()
            },
        )
    }

    /// Fields, generated entities and indices this relation contributes
    pub fn artifacts(&self, source: &Entity, target: &Entity) -> DataResult<RelationArtifacts> {
        let mut artifacts = RelationArtifacts::default();

        match self.relation_type {
            RelationType::ManyToOne | RelationType::OneToOne => {
                let fk = self.foreign_key();
                let field = self.relation_field(&fk, target, self.config.required)?;
                artifacts.fields.push((self.source.clone(), field));
                if self.relation_type == RelationType::OneToOne {
                    artifacts.indices.push(IndexConfig {
                        entity: self.source.clone(),
                        fields: vec![fk],
                        unique: true,
                    });
                }
            }
            RelationType::OneToMany => {
                let field = self.relation_field(&self.foreign_key(), source, self.config.required)?;
                artifacts.fields.push((self.target.clone(), field));
            }
            RelationType::ManyToMany => {
                let (source_key, target_key) = self.connection_keys();
                if source_key == target_key {
                    return Err(self
                        .invalid("many_to_many relations need two distinct entities")
                        .into());
                }
                let name = self.connection_table();
                let connection = Entity::create(
                    name.clone(),
                    vec![
                        self.relation_field(&source_key, source, true)?,
                        self.relation_field(&target_key, target, true)?,
                    ],
                    EntityConfig::default(),
                    EntityType::Generated,
                )?;
                artifacts.entities.push(connection);
                artifacts.indices.push(IndexConfig {
                    entity: name,
                    fields: vec![source_key, target_key],
                    unique: true,
                });
            }
            RelationType::Polymorphic => {
                artifacts.fields.push((
                    self.target.clone(),
                    Field::new(
                        POLYMORPHIC_REFERENCE_FIELD,
                        FieldKind::Text(TextField::default()),
                        BaseFieldConfig::default(),
                    )?,
                ));
                artifacts.fields.push((
                    self.target.clone(),
                    Field::new(
                        POLYMORPHIC_ID_FIELD,
                        FieldKind::Number(NumberField::default()),
                        BaseFieldConfig::default(),
                    )?,
                ));
                artifacts.indices.push(IndexConfig {
                    entity: self.target.clone(),
                    fields: vec![
                        POLYMORPHIC_REFERENCE_FIELD.to_string(),
                        POLYMORPHIC_ID_FIELD.to_string(),
                    ],
                    unique: false,
                });
            }
        }

        Ok(artifacts)
    }

    /// Rows of the far side related to row `id` of the starting side
    pub fn traverse(
        &self,
        direction: Direction,
        id: i64,
        em: &EntityManager,
    ) -> DataResult<Traversal> {
        let source_pk = em.entity(&self.source)?.primary_name().to_string();
        let target_pk = em.entity(&self.target)?.primary_name().to_string();
        let other = self.other_end(direction).to_string();
        let ref_col = |column: &str| ColumnRef::new(REFERENCE_ALIAS, column);
        let inner = |table: &str, left: ColumnRef, right: ColumnRef| JoinClause {
            kind: JoinKind::Inner,
            table: table.to_string(),
            alias: REFERENCE_ALIAS.to_string(),
            left,
            right,
        };

        let (joins, filter) = match (self.relation_type, direction) {
            (RelationType::ManyToOne | RelationType::OneToOne, Direction::FromSource) => (
                vec![inner(
                    &self.source,
                    ref_col(&self.foreign_key()),
                    ColumnRef::new(&other, &target_pk),
                )],
                Condition::eq(ref_col(&source_pk), id),
            ),
            (RelationType::ManyToOne | RelationType::OneToOne, Direction::FromTarget)
            | (RelationType::OneToMany, Direction::FromSource) => (
                vec![],
                Condition::eq(ColumnRef::new(&other, self.foreign_key()), id),
            ),
            (RelationType::OneToMany, Direction::FromTarget) => (
                vec![inner(
                    &self.target,
                    ref_col(&self.foreign_key()),
                    ColumnRef::new(&other, &source_pk),
                )],
                Condition::eq(ref_col(&target_pk), id),
            ),
            (RelationType::ManyToMany, _) => {
                let (source_key, target_key) = self.connection_keys();
                let (near_key, far_key, far_pk) = match direction {
                    Direction::FromSource => (source_key, target_key, &target_pk),
                    Direction::FromTarget => (target_key, source_key, &source_pk),
                };
                (
                    vec![inner(
                        &self.connection_table(),
                        ref_col(&far_key),
                        ColumnRef::new(&other, far_pk),
                    )],
                    Condition::eq(ref_col(&near_key), id),
                )
            }
            (RelationType::Polymorphic, Direction::FromSource) => (
                vec![],
                Condition::And(vec![
                    Condition::eq(
                        ColumnRef::new(&other, POLYMORPHIC_REFERENCE_FIELD),
                        self.polymorphic_key(),
                    ),
                    Condition::eq(ColumnRef::new(&other, POLYMORPHIC_ID_FIELD), id),
                ]),
            ),
            (RelationType::Polymorphic, Direction::FromTarget) => (
                vec![inner(
                    &self.target,
                    ref_col(POLYMORPHIC_ID_FIELD),
                    ColumnRef::new(&other, &source_pk),
                )],
                Condition::And(vec![
                    Condition::eq(ref_col(&target_pk), id),
                    Condition::eq(ref_col(POLYMORPHIC_REFERENCE_FIELD), self.polymorphic_key()),
                ]),
            ),
        };

        Ok(Traversal {
            entity: other,
            joins,
            filter,
        })
    }

    /// Left join pulling the single related row into a query on `from_alias`
    ///
    /// `None` when the far side can hold more than one row.
    pub fn to_one_join(
        &self,
        direction: Direction,
        from_alias: &str,
        alias: &str,
        em: &EntityManager,
    ) -> DataResult<Option<JoinClause>> {
        let left = |table: &str, joined: &str, from: &str| JoinClause {
            kind: JoinKind::Left,
            table: table.to_string(),
            alias: alias.to_string(),
            left: ColumnRef::new(alias, joined),
            right: ColumnRef::new(from_alias, from),
        };

        let join = match (self.relation_type, direction) {
            (RelationType::ManyToOne | RelationType::OneToOne, Direction::FromSource) => {
                let target = em.entity(&self.target)?;
                Some(left(&self.target, target.primary_name(), &self.foreign_key()))
            }
            (RelationType::OneToMany, Direction::FromTarget) => {
                let source = em.entity(&self.source)?;
                Some(left(&self.source, source.primary_name(), &self.foreign_key()))
            }
            (RelationType::OneToOne, Direction::FromTarget) => {
                let target = em.entity(&self.target)?;
                Some(left(&self.source, &self.foreign_key(), target.primary_name()))
            }
            _ => None,
        };
        Ok(join)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "type": self.relation_type,
            "source": self.source,
            "target": self.target,
            "config": self.config,
        })
    }
}
