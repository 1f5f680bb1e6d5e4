//! # this-data
//!
//! A schema-driven entity/relation data layer. Declare entities, fields,
//! relations and indices once, and get validated reads and writes, schema
//! sync against the store, and a permission-gated HTTP API.
//!
//! ## Features
//!
//! - **Typed fields**: text, number, boolean, date, enum, json and relation
//!   fields with validation, defaults, visibility and persist/retrieve transforms
//! - **Relations**: many-to-one, one-to-one, one-to-many, many-to-many and
//!   polymorphic, with reference traversal and to-one joins
//! - **Schema sync**: reconcile the declared model with the physical store,
//!   destructive changes gated behind `force`
//! - **Pluggable storage**: in-memory backend by default, SQLite through sqlx
//! - **Guarded HTTP surface**: axum routes checked against a permission guard
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use this_data::prelude::*;
//!
//! let config = DataConfig::from_yaml_str(r#"
//! entities:
//!   todos:
//!     fields:
//!       title: { type: text, config: { required: true } }
//!       done: { type: boolean, config: { default_value: false } }
//! "#)?;
//!
//! let em = config.build(Arc::new(InMemoryConnection::new()))?;
//! em.schema().sync(SyncOptions::default()).await?;
//!
//! em.mutator("todos")?.insert_one(json!({ "title": "a" })).await?;
//! let todo = em.repository("todos")?.find_id(1, &RepoQuery::default()).await?;
//!
//! ServerBuilder::new()
//!     .with_entity_manager(em)
//!     .serve("127.0.0.1:3000")
//!     .await?;
//! ```

pub mod config;
pub mod core;
pub mod entities;
pub mod fields;
pub mod manager;
pub mod query;
pub mod relations;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        AllowAllGuard, AuthContext, AuthPolicy, AuthProvider, DataError, DataResult, Guard,
        HeaderAuthProvider, NoAuthProvider, Permission, RoleGuard,
    };

    // === Model ===
    pub use crate::entities::{Entity, EntityConfig, EntityType};
    pub use crate::fields::{ActionContext, Context, Field, FieldKind};
    pub use crate::relations::{EntityIndex, EntityRelation, IndexConfig, RelationType};

    // === Engine ===
    pub use crate::manager::{
        EntityManager, Mutator, MutatorResponse, Repository, RepositoryResponse, SchemaChange,
        SyncOptions,
    };
    pub use crate::query::{RepoQuery, SortDir};

    // === Storage ===
    pub use crate::storage::Connection;
    #[cfg(feature = "in-memory")]
    pub use crate::storage::InMemoryConnection;
    #[cfg(feature = "sqlite")]
    pub use crate::storage::SqliteConnection;

    // === Config ===
    pub use crate::config::{DataConfig, ServerConfig};

    // === Server ===
    pub use crate::server::{DataHost, ServerBuilder};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
    pub use std::sync::Arc;
}
