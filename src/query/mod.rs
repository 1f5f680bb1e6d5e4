//! Query construction
//!
//! - [`options`]: client-facing query options (`RepoQuery`)
//! - [`filter`]: the `where` predicate tree
//! - [`statement`]: storage-neutral read/write statements
//! - [`ddl`]: storage-neutral schema directives
//! - [`sql`]: SQL rendering of both

pub mod ddl;
pub mod filter;
pub mod options;
pub mod sql;
pub mod statement;

pub use filter::{Condition, Operator, parse_where};
pub use options::{DEFAULT_LIMIT, MAX_LIMIT, RepoQuery, Sort};
pub use sql::CompiledQuery;
pub use statement::{Row, SortDir};
