//! Storage-neutral read and write statements
//!
//! The repository and mutator build these from entity declarations and query
//! options; each [`Connection`](crate::storage::Connection) executes them,
//! either directly (in-memory) or after compiling to SQL.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::filter::Condition;

/// A stored row, keyed by column (or selection alias)
pub type Row = Map<String, Value>;

/// A column qualified by the alias of its table in the statement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// `table.column as alias`
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub source: ColumnRef,
    pub alias: String,
}

impl SelectColumn {
    pub fn new(table: &str, column: &str, alias: impl Into<String>) -> Self {
        Self {
            source: ColumnRef::new(table, column),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub dir: SortDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// `<kind> join <table> as <alias> on <left> = <right>`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

/// Table plus the joins and predicate restricting it
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub table: String,
    pub alias: String,
    pub joins: Vec<JoinClause>,
    pub filter: Option<Condition>,
}

impl Source {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            alias: table.to_string(),
            joins: Vec::new(),
            filter: None,
        }
    }

    /// Add a predicate, and-ed with the existing one
    pub fn and_where(&mut self, condition: Condition) {
        self.filter = Some(match self.filter.take() {
            None => condition,
            Some(Condition::And(mut all)) => {
                all.push(condition);
                Condition::And(all)
            }
            Some(existing) => Condition::And(vec![existing, condition]),
        });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub source: Source,
    pub columns: Vec<SelectColumn>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CountStatement {
    pub source: Source,
}

/// Insert one or more rows; returns the rows with their generated primary key
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub primary: String,
    pub rows: Vec<Row>,
}

/// Update the row whose primary key equals `id`
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: String,
    pub primary: String,
    pub id: i64,
    pub values: Row,
}

/// Delete the rows matching `filter`; returns the deleted rows
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub primary: String,
    pub filter: Condition,
}
