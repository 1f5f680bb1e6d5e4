//! Integration test infrastructure for the HTTP surface.
//!
//! Builds the data API router over a seeded model so that suites can drive
//! it through `axum_test::TestServer`.
//!
//! # Architecture
//!
//! ```text
//! axum_test::TestServer
//!     └─ Router (built by build_test_router)
//!         ├─ GET    /health
//!         └─ /api/data
//!             ├─ GET    /                      → model
//!             ├─ GET    /sync                  → schema sync
//!             ├─ GET    /{entity}              → find_many
//!             ├─ GET    /{entity}/{id}         → find_id
//!             ├─ POST   /{entity}              → insert_one
//!             └─ ...
//! ```

#[macro_use]
pub mod rest_tests;

use axum::Router;
use axum_test::TestServer;
use std::sync::Arc;

use this_data::config::ServerConfig;
use this_data::core::{AuthProvider, Guard};
use this_data::server::ServerBuilder;
use this_data::storage::Connection;

pub const BASE: &str = "/api/data";

/// Router over the seeded blog model with the given guard and auth provider
pub async fn build_test_router(
    connection: Arc<dyn Connection>,
    guard: impl Guard + 'static,
    auth: impl AuthProvider + 'static,
    debug: bool,
) -> Router {
    let em = super::build_manager(connection).await;
    super::seed_blog(&em).await;

    ServerBuilder::new()
        .with_entity_manager(em)
        .with_guard(guard)
        .with_auth_provider(auth)
        .with_config(ServerConfig::new(BASE).with_debug(debug))
        .build()
        .unwrap()
}

pub fn server(router: Router) -> TestServer {
    TestServer::try_new(router).unwrap()
}

/// Path below the data basepath
pub fn path(rest: &str) -> String {
    format!("{}{}", BASE, rest)
}
