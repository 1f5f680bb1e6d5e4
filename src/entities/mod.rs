//! Entity model
//!
//! An [`Entity`] is a named, ordered collection of unique fields with exactly
//! one primary field, mapped to one physical table.

pub mod entity;

pub use entity::{DEFAULT_PRIMARY_FIELD, DefaultSort, Entity, EntityConfig, EntityType};
