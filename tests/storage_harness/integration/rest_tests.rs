//! REST integration test macro for storage backends.
//!
//! The `rest_integration_tests!` macro generates HTTP-level tests that drive
//! the data API through full round-trips:
//! JSON → HTTP request → guard → repository/mutator → storage → JSON.
//!
//! # Generated Tests
//!
//! ## Model (3 tests)
//! - `test_rest_model_info` — GET / returns entities, relations, indices
//! - `test_rest_schema_index` — GET /schema.json references every entity
//! - `test_rest_entity_schema` — GET /schemas/{entity}, 404 when undeclared
//!
//! ## Reads (5 tests)
//! - `test_rest_find_many` — GET 200 + envelope, query hidden outside debug
//! - `test_rest_find_many_query_string` — where/sort/limit/select from the query string
//! - `test_rest_find_id` — GET 200, unknown id 404, malformed id 400
//! - `test_rest_by_reference` — GET /{entity}/{id}/{reference}
//! - `test_rest_query_body` — POST /{entity}/query
//!
//! ## Functions (1 test)
//! - `test_rest_count_and_exists` — POST fn/count and fn/exists
//!
//! ## Writes (4 tests)
//! - `test_rest_insert` — POST 201, validation 400
//! - `test_rest_update` — PATCH 200, missing row 404
//! - `test_rest_delete_one` — DELETE 200 then GET 404
//! - `test_rest_delete_many` — empty where 400, filtered delete 200
//!
//! ## Schema (1 test)
//! - `test_rest_sync` — GET /sync lists tables and no changes
#[macro_export]
macro_rules! rest_integration_tests {
    ($factory:expr) => {
        mod rest_integration_tests {
            use super::*;
            use axum::http::StatusCode;
            use axum_test::TestServer;
            use serde_json::{Value, json};
            use std::sync::Arc;
            use this_data::core::{AllowAllGuard, NoAuthProvider};
            use this_data::storage::Connection;
            use storage_harness::integration::path;

            async fn make_server() -> TestServer {
                let connection: Arc<dyn Connection> = $factory;
                let router = storage_harness::integration::build_test_router(
                    connection,
                    AllowAllGuard,
                    NoAuthProvider,
                    false,
                )
                .await;
                storage_harness::integration::server(router)
            }

            // ==============================================================
            // Model
            // ==============================================================

            #[tokio::test]
            async fn test_rest_model_info() {
                let server = make_server().await;

                let response = server.get(&path("")).await;
                response.assert_status(StatusCode::OK);

                let body: Value = response.json();
                let names: Vec<&str> = body["entities"]
                    .as_object()
                    .unwrap()
                    .keys()
                    .map(String::as_str)
                    .collect();
                assert_eq!(names, vec!["todos", "users", "posts", "comments", "tags", "posts_tags"]);
                assert_eq!(body["relations"].as_array().unwrap().len(), 3);
                assert!(body["indices"].as_object().unwrap().contains_key("idx_tags_name"));
            }

            #[tokio::test]
            async fn test_rest_schema_index() {
                let server = make_server().await;

                let response = server.get(&path("/schema.json")).await;
                response.assert_status(StatusCode::OK);

                let body: Value = response.json();
                assert_eq!(body["$schema"], "https://json-schema.org/draft/2020-12/schema");
                assert!(body["$id"].as_str().unwrap().ends_with("/api/data/schema.json"));
                assert_eq!(body["properties"]["posts"]["$ref"], "schemas/posts");
            }

            #[tokio::test]
            async fn test_rest_entity_schema() {
                let server = make_server().await;

                let response = server.get(&path("/schemas/posts")).await;
                response.assert_status(StatusCode::OK);
                let body: Value = response.json();
                assert_eq!(body["title"], "Posts");
                assert_eq!(body["$comment"], "Blog posts");
                assert!(body["$id"].as_str().unwrap().ends_with("/api/data/schemas/posts"));
                assert!(body["properties"]["title"].is_object());

                server
                    .get(&path("/schemas/nope"))
                    .await
                    .assert_status(StatusCode::NOT_FOUND);
            }

            // ==============================================================
            // Reads
            // ==============================================================

            #[tokio::test]
            async fn test_rest_find_many() {
                let server = make_server().await;

                let response = server.get(&path("/comments")).await;
                response.assert_status(StatusCode::OK);

                let body: Value = response.json();
                assert_eq!(body["data"].as_array().unwrap().len(), 3);
                assert_eq!(body["meta"]["entity"], "comments");
                assert_eq!(body["meta"]["total"], 3);
                assert!(body["meta"].get("query").is_none());

                let response = server.get(&path("/nope")).await;
                response.assert_status(StatusCode::NOT_FOUND);
                let body: Value = response.json();
                assert_eq!(body["code"], "ENTITY_NOT_FOUND");
            }

            #[tokio::test]
            async fn test_rest_find_many_query_string() {
                let server = make_server().await;

                let response = server
                    .get(&path("/comments"))
                    .add_query_param("where", r#"{"post_id":1}"#)
                    .add_query_param("sort", "-id")
                    .add_query_param("select", "id,body")
                    .add_query_param("limit", "1")
                    .await;
                response.assert_status(StatusCode::OK);

                let body: Value = response.json();
                assert_eq!(body["data"], json!([{ "id": 2, "body": "agreed" }]));
                assert_eq!(body["meta"]["count"], 2);
                assert_eq!(body["meta"]["items"], 1);

                server
                    .get(&path("/comments"))
                    .add_query_param("where", r#"{"nope":1}"#)
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);
            }

            #[tokio::test]
            async fn test_rest_find_id() {
                let server = make_server().await;

                let response = server.get(&path("/users/1")).await;
                response.assert_status(StatusCode::OK);
                let body: Value = response.json();
                assert_eq!(body["data"], json!({ "id": 1, "name": "alice" }));

                let response = server.get(&path("/users/99")).await;
                response.assert_status(StatusCode::NOT_FOUND);
                let body: Value = response.json();
                assert!(body.get("data").is_none());
                assert_eq!(body["meta"]["entity"], "users");

                for bad in ["0", "-1", "abc"] {
                    server
                        .get(&path(&format!("/users/{}", bad)))
                        .await
                        .assert_status(StatusCode::BAD_REQUEST);
                }
            }

            #[tokio::test]
            async fn test_rest_by_reference() {
                let server = make_server().await;

                let response = server.get(&path("/posts/1/comments")).await;
                response.assert_status(StatusCode::OK);
                let body: Value = response.json();
                let bodies: Vec<&str> = body["data"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|row| row["body"].as_str().unwrap())
                    .collect();
                assert_eq!(bodies, vec!["nice", "agreed"]);

                let response = server.get(&path("/posts/2/tags")).await;
                let body: Value = response.json();
                assert_eq!(body["data"], json!([{ "id": 1, "name": "rust" }]));

                server
                    .get(&path("/posts/1/likes"))
                    .await
                    .assert_status(StatusCode::NOT_FOUND);
            }

            #[tokio::test]
            async fn test_rest_query_body() {
                let server = make_server().await;

                let response = server
                    .post(&path("/posts/query"))
                    .json(&json!({
                        "where": { "status": "draft" },
                        "select": ["title"],
                        "join": ["author"]
                    }))
                    .await;
                response.assert_status(StatusCode::OK);
                let body: Value = response.json();
                assert_eq!(body["data"].as_array().unwrap().len(), 1);
                assert_eq!(body["data"][0]["title"], "second");
                assert_eq!(body["data"][0]["author.name"], "alice");

                server
                    .post(&path("/posts/query"))
                    .json(&json!({ "limit": "many" }))
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);
            }

            // ==============================================================
            // Functions
            // ==============================================================

            #[tokio::test]
            async fn test_rest_count_and_exists() {
                let server = make_server().await;

                let response = server
                    .post(&path("/comments/fn/count"))
                    .json(&json!({ "post_id": 1 }))
                    .await;
                response.assert_status(StatusCode::OK);
                response.assert_json(&json!({ "entity": "comments", "count": 2 }));

                let response = server.post(&path("/comments/fn/count")).await;
                response.assert_json(&json!({ "entity": "comments", "count": 3 }));

                let response = server
                    .post(&path("/tags/fn/exists"))
                    .json(&json!({ "name": "go" }))
                    .await;
                response.assert_json(&json!({ "entity": "tags", "exists": false }));

                server
                    .post(&path("/nope/fn/count"))
                    .json(&json!({}))
                    .await
                    .assert_status(StatusCode::NOT_FOUND);
            }

            // ==============================================================
            // Writes
            // ==============================================================

            #[tokio::test]
            async fn test_rest_insert() {
                let server = make_server().await;

                let response = server
                    .post(&path("/todos"))
                    .json(&json!({ "title": "a" }))
                    .await;
                response.assert_status(StatusCode::CREATED);
                response.assert_json(&json!({ "data": { "id": 1, "title": "a", "done": false } }));

                let response = server.post(&path("/todos")).json(&json!({})).await;
                response.assert_status(StatusCode::BAD_REQUEST);
                let body: Value = response.json();
                assert_eq!(body["code"], "VALIDATION_ERROR");
                assert!(body["message"].as_str().unwrap().contains("title"));

                server
                    .post(&path("/todos"))
                    .text("{not json")
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);
            }

            #[tokio::test]
            async fn test_rest_update() {
                let server = make_server().await;

                let response = server
                    .patch(&path("/posts/2"))
                    .json(&json!({ "status": "published" }))
                    .await;
                response.assert_status(StatusCode::OK);
                let body: Value = response.json();
                assert_eq!(body["data"]["status"], "published");
                assert_eq!(body["data"]["title"], "second");

                server
                    .patch(&path("/posts/2"))
                    .json(&json!({ "status": "archived" }))
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);
                server
                    .patch(&path("/posts/99"))
                    .json(&json!({ "title": "x" }))
                    .await
                    .assert_status(StatusCode::NOT_FOUND);
            }

            #[tokio::test]
            async fn test_rest_delete_one() {
                let server = make_server().await;

                let response = server.delete(&path("/comments/3")).await;
                response.assert_status(StatusCode::OK);
                response.assert_json(&json!({ "data": { "id": 3 } }));

                server
                    .get(&path("/comments/3"))
                    .await
                    .assert_status(StatusCode::NOT_FOUND);
                server
                    .delete(&path("/comments/3"))
                    .await
                    .assert_status(StatusCode::NOT_FOUND);
            }

            #[tokio::test]
            async fn test_rest_delete_many() {
                let server = make_server().await;

                let response = server.delete(&path("/comments")).json(&json!({})).await;
                response.assert_status(StatusCode::BAD_REQUEST);
                let body: Value = response.json();
                assert_eq!(body["code"], "UNBOUNDED_DELETE");
                server
                    .delete(&path("/comments"))
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);

                let response = server
                    .delete(&path("/comments"))
                    .json(&json!({ "post_id": 1 }))
                    .await;
                response.assert_status(StatusCode::OK);
                response.assert_json(&json!({ "data": [1, 2] }));

                let response = server.post(&path("/comments/fn/count")).await;
                response.assert_json(&json!({ "entity": "comments", "count": 1 }));
            }

            // ==============================================================
            // Schema
            // ==============================================================

            #[tokio::test]
            async fn test_rest_sync() {
                let server = make_server().await;

                let response = server.get(&path("/sync")).add_query_param("force", "1").await;
                response.assert_status(StatusCode::OK);
                let body: Value = response.json();
                let tables = body["tables"].as_array().unwrap();
                assert_eq!(tables.len(), 6);
                assert!(tables.contains(&json!("posts_tags")));
                assert_eq!(body["changes"], json!([]));
            }
        }
    };
}
