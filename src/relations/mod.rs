//! Relations between entities and indices over an entity's fields

pub mod index;
pub mod relation;

pub use index::{EntityIndex, IndexConfig};
pub use relation::{
    Direction, EntityRelation, REFERENCE_ALIAS, RelationArtifacts, RelationConfig,
    RelationDeclaration, RelationType, Traversal,
};
