//! Storage backends
//!
//! The data layer talks to storage only through [`Connection`], which executes
//! storage-neutral statements and schema directives. Two backends ship with the
//! crate:
//!
//! - [`InMemoryConnection`]: a small relational engine over JSON rows, for
//!   tests and development (feature `in-memory`, on by default)
//! - [`SqliteConnection`]: SQLite through `sqlx` (feature `sqlite`)

use async_trait::async_trait;
use serde::Serialize;

use crate::core::error::{DataError, StorageError};
use crate::query::ddl::SchemaStatement;
use crate::query::statement::{
    CountStatement, DeleteStatement, InsertStatement, Row, SelectStatement, UpdateStatement,
};

#[cfg(feature = "in-memory")]
pub mod in_memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryConnection;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteConnection;

/// Errors raised by storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("table \"{0}\" does not exist")]
    NoSuchTable(String),

    #[error("table \"{0}\" already exists")]
    TableExists(String),

    #[error("column \"{column}\" does not exist on table \"{table}\"")]
    NoSuchColumn { table: String, column: String },

    #[error("column \"{column}\" already exists on table \"{table}\"")]
    ColumnExists { table: String, column: String },

    #[error("index \"{0}\" does not exist")]
    NoSuchIndex(String),

    #[error("index \"{0}\" already exists")]
    IndexExists(String),

    #[error("cannot drop column \"{column}\": used by index \"{index}\"")]
    ColumnIndexed { column: String, index: String },

    #[error("unique constraint \"{0}\" violated")]
    UniqueViolation(String),

    #[error("failed to acquire lock: {0}")]
    Poisoned(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Wrap as a data layer error attributed to `backend`
    pub fn into_data_error(self, backend: &str) -> DataError {
        StorageError::Backend {
            backend: backend.to_string(),
            message: self.to_string(),
        }
        .into()
    }
}

/// A column as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared storage type tag, as the backend reports it
    pub column_type: String,
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// A table as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indices: Vec<IndexInfo>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Executes statements against one physical store
///
/// Every write call is atomic: either all its rows are written or none.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Backend name used in logs and errors
    fn backend(&self) -> &'static str;

    async fn select(&self, statement: &SelectStatement) -> StoreResult<Vec<Row>>;

    async fn count(&self, statement: &CountStatement) -> StoreResult<u64>;

    /// Insert all rows; returns them as stored, primary key included
    async fn insert(&self, statement: &InsertStatement) -> StoreResult<Vec<Row>>;

    /// Update one row; `None` when it does not exist
    async fn update(&self, statement: &UpdateStatement) -> StoreResult<Option<Row>>;

    /// Delete matching rows; returns their primary keys
    async fn delete(&self, statement: &DeleteStatement) -> StoreResult<Vec<i64>>;

    /// Tables physically present, declared or not
    async fn introspect(&self) -> StoreResult<Vec<TableInfo>>;

    async fn apply(&self, statement: &SchemaStatement) -> StoreResult<()>;
}
