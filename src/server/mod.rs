//! HTTP surface of the data layer
//!
//! This module provides a `ServerBuilder` that mounts, under a basepath:
//! - model and schema introspection routes
//! - schema sync
//! - read, count and exists routes per entity
//! - insert, update and delete routes per entity
//!
//! Each route checks its [`Permission`](crate::core::Permission) through the
//! configured guard before running.

pub mod builder;
pub mod handlers;
pub mod host;
pub mod router;

pub use builder::ServerBuilder;
pub use host::DataHost;
pub use router::build_data_routes;
