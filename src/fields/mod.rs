//! Field type system
//!
//! A [`Field`] is a named, typed attribute of an entity. Its behaviour comes
//! from two parts: the [`BaseFieldConfig`] shared by every kind (fillability,
//! visibility, default value...) and a [`FieldKind`] carrying the kind's own
//! config and implementing [`FieldType`].

pub mod context;
pub mod field;
pub mod types;

pub use context::{ActionContext, Context, Fillable, Hidden};
pub use field::{BASE_CONFIG_KEYS, BaseFieldConfig, Field};
pub use types::{
    BooleanField, DateField, DateType, EnumField, FieldKind, FieldType, JsonField, NumberField,
    Pattern, PrimaryField, RelationField, TextField, TextFormat,
};
