//! The entity manager and the per-entity services it hands out
//!
//! ```rust,ignore
//! let em = DataConfig::from_yaml_str(yaml)?.build(connection)?;
//! em.schema().sync(SyncOptions::default()).await?;
//!
//! let todos = em.mutator("todos")?;
//! todos.insert_one(json!({ "title": "write docs" })).await?;
//!
//! let open = em.repository("todos")?.count(&json!({ "done": false })).await?;
//! ```

pub mod entity_manager;
pub mod mutator;
pub mod repository;
pub mod response;
pub mod schema;

pub use entity_manager::EntityManager;
pub use mutator::Mutator;
pub use repository::Repository;
pub use response::{
    CountResponse, ExistsResponse, MutatorResponse, RepositoryMeta, RepositoryResponse,
};
pub use schema::{SchemaAction, SchemaChange, SchemaManager, SyncOptions};
