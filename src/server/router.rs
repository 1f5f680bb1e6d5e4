//! Route table of the data API

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde_json::{Value, json};

use super::handlers;
use super::host::DataHost;

/// Build the data routes, relative to the basepath
///
/// Static segments (`/sync`, `/schema.json`, `/{entity}/fn/...`,
/// `/{entity}/query`) take precedence over the parameterised entity routes.
pub fn build_data_routes(host: DataHost) -> Router {
    Router::new()
        .route("/", get(handlers::info))
        .route("/sync", get(handlers::sync))
        .route("/schema.json", get(handlers::schema_index))
        .route("/schemas/{entity}", get(handlers::entity_schema))
        .route("/{entity}/fn/count", post(handlers::count))
        .route("/{entity}/fn/exists", post(handlers::exists))
        .route("/{entity}/query", post(handlers::query))
        .route(
            "/{entity}",
            get(handlers::find_many)
                .post(handlers::insert_one)
                .delete(handlers::delete_many),
        )
        .route(
            "/{entity}/{id}",
            get(handlers::find_id)
                .patch(handlers::update_one)
                .delete(handlers::delete_one),
        )
        .route(
            "/{entity}/{id}/{reference}",
            get(handlers::find_many_by_reference),
        )
        .with_state(host)
}

/// Mount the data routes under `basepath`
pub fn mount(host: DataHost) -> Router {
    let basepath = host.basepath().trim_matches('/').to_string();
    let routes = build_data_routes(host);
    if basepath.is_empty() {
        routes
    } else {
        Router::new().nest(&format!("/{}", basepath), routes)
    }
}

/// Build health check routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(health_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "this-data"
    }))
}
