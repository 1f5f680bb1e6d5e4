//! Response envelopes returned by repositories and mutators

use serde::Serialize;
use serde_json::Value;

use crate::query::options::Sort;
use crate::query::sql::CompiledQuery;

/// Pagination and diagnostics of a read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryMeta {
    pub entity: String,
    pub sort: Sort,
    pub limit: usize,
    pub offset: usize,
    /// All rows of the entity
    pub total: u64,
    /// Rows matching the predicate
    pub count: u64,
    /// Rows returned
    pub items: usize,
    /// The query as SQL; only exposed over HTTP in debug mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<CompiledQuery>,
}

/// `{data, meta}` envelope of a read
///
/// `data` is an array for list reads and a single object (or nothing) for
/// reads by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub meta: RepositoryMeta,
}

impl RepositoryResponse {
    pub fn is_empty(&self) -> bool {
        self.data.is_none()
    }

    /// Drop the compiled query from the meta
    pub fn without_query(mut self) -> Self {
        self.meta.query = None;
        self
    }

    /// Rows of a list read
    pub fn rows(&self) -> &[Value] {
        match &self.data {
            Some(Value::Array(rows)) => rows,
            _ => &[],
        }
    }
}

/// `{data}` envelope of a write
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutatorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl MutatorResponse {
    pub fn new(data: Value) -> Self {
        Self { data: Some(data) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountResponse {
    pub entity: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExistsResponse {
    pub entity: String,
    pub exists: bool,
}
