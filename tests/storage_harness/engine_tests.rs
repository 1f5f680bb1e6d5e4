//! Macro-generated test suite validating the entity engine on a backend.
//!
//! The `engine_tests!` macro generates a test module running the repository,
//! mutator and schema sync contracts against any `Connection`.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//!
//! use storage_harness::*;
//!
//! engine_tests!(Arc::new(InMemoryConnection::new()));
//! ```
//!
//! # Generated Tests
//!
//! ## Scenarios
//! - `test_todos_insert_find_and_required` — insert, find by id, missing required field
//! - `test_todos_count_where` — count with an equality predicate
//! - `test_posts_comments_by_reference` — one-to-many traversal from both ends
//!
//! ## Reads
//! - `test_many_to_many_by_reference` — traversal through the connection entity
//! - `test_join_to_one_reference` — joined columns keyed `ref.field`
//! - `test_pagination_and_meta` — limit, offset, sort and meta counters
//! - `test_where_operators` — `$in`, `$gt`, `$like`, `$or`
//! - `test_where_literals_normalized` — literals take the field's stored form
//! - `test_hidden_fields_not_returned` — read-hidden fields never leave the engine
//! - `test_invalid_queries_rejected` — unknown fields in select, sort and where
//!
//! ## Writes
//! - `test_round_trip_transforms` — json/enum/boolean values survive a round trip
//! - `test_update_and_delete` — update, delete, then not found
//! - `test_delete_many_requires_where` — empty predicates never delete
//! - `test_relation_target_must_exist` — dangling foreign keys are rejected
//! - `test_unique_index_enforced` — duplicate values in a unique index
//!
//! ## Schema
//! - `test_sync_is_idempotent` — second sync yields no changes
//! - `test_introspect_lists_tables` — every declared entity has a table

/// Generate the entity engine contract suite.
///
/// `$factory` must evaluate to an `Arc<dyn Connection>` backed by an empty
/// store. It is re-evaluated for each test and may use `.await`.
#[macro_export]
macro_rules! engine_tests {
    ($factory:expr) => {
        mod engine_contract_tests {
            use super::*;
            use serde_json::{Value, json};
            use std::sync::Arc;
            use this_data::core::error::{DataError, StorageError, ValidationError};
            use this_data::manager::{EntityManager, SyncOptions};
            use this_data::query::{RepoQuery, SortDir};
            use this_data::storage::Connection;

            async fn manager() -> EntityManager {
                let connection: Arc<dyn Connection> = $factory;
                storage_harness::build_manager(connection).await
            }

            async fn blog() -> EntityManager {
                let em = manager().await;
                storage_harness::seed_blog(&em).await;
                em
            }

            // ==================================================================
            // Scenarios
            // ==================================================================

            #[tokio::test]
            async fn test_todos_insert_find_and_required() {
                let em = manager().await;
                let mutator = em.mutator("todos").unwrap();

                let res = mutator.insert_one(json!({ "title": "a" })).await.unwrap();
                let expected = json!({ "id": 1, "title": "a", "done": false });
                assert_eq!(res.data, Some(expected.clone()));

                let found = em
                    .repository("todos")
                    .unwrap()
                    .find_id(1, &RepoQuery::default())
                    .await
                    .unwrap();
                assert_eq!(found.data, Some(expected));

                let err = mutator.insert_one(json!({})).await.unwrap_err();
                match err {
                    DataError::Validation(ValidationError::FieldError { field, .. }) => {
                        assert_eq!(field, "title")
                    }
                    other => panic!("expected a field error, got {:?}", other),
                }
            }

            #[tokio::test]
            async fn test_todos_count_where() {
                let em = manager().await;
                storage_harness::seed(
                    &em,
                    "todos",
                    vec![
                        json!({ "title": "a" }),
                        json!({ "title": "b", "done": true }),
                        json!({ "title": "c", "done": false }),
                    ],
                )
                .await;

                let repo = em.repository("todos").unwrap();
                let count = repo.count(&json!({ "done": false })).await.unwrap();
                assert_eq!(json!(count), json!({ "entity": "todos", "count": 2 }));

                assert_eq!(repo.count(&Value::Null).await.unwrap().count, 3);
                assert!(repo.exists(&json!({ "title": "b" })).await.unwrap().exists);
                assert!(!repo.exists(&json!({ "title": "z" })).await.unwrap().exists);
            }

            #[tokio::test]
            async fn test_posts_comments_by_reference() {
                let em = blog().await;

                let res = em
                    .repository("posts")
                    .unwrap()
                    .find_many_by_reference(1, "comments", &RepoQuery::default())
                    .await
                    .unwrap();
                let rows = res.rows();
                assert_eq!(storage_harness::column(rows, "body"), vec![json!("nice"), json!("agreed")]);
                assert!(rows.iter().all(|row| row["post_id"] == json!(1)));
                assert_eq!(res.meta.entity, "comments");
                assert_eq!(res.meta.count, 2);
                assert_eq!(res.meta.total, 3);

                let res = em
                    .repository("comments")
                    .unwrap()
                    .find_many_by_reference(3, "posts", &RepoQuery::default())
                    .await
                    .unwrap();
                assert_eq!(storage_harness::column(res.rows(), "title"), vec![json!("second")]);

                let err = em
                    .repository("posts")
                    .unwrap()
                    .find_many_by_reference(1, "likes", &RepoQuery::default())
                    .await
                    .unwrap_err();
                assert!(err.is_not_found());
            }

            // ==================================================================
            // Reads
            // ==================================================================

            #[tokio::test]
            async fn test_many_to_many_by_reference() {
                let em = blog().await;

                let tags = em
                    .repository("posts")
                    .unwrap()
                    .find_many_by_reference(1, "tags", &RepoQuery::default())
                    .await
                    .unwrap();
                assert_eq!(
                    storage_harness::column(tags.rows(), "name"),
                    vec![json!("rust"), json!("data")]
                );

                let posts = em
                    .repository("tags")
                    .unwrap()
                    .find_many_by_reference(1, "posts", &RepoQuery::default())
                    .await
                    .unwrap();
                assert_eq!(
                    storage_harness::column(posts.rows(), "title"),
                    vec![json!("first"), json!("second")]
                );

                let by_user = em
                    .repository("users")
                    .unwrap()
                    .find_many_by_reference(2, "posts", &RepoQuery::default())
                    .await
                    .unwrap();
                assert!(by_user.rows().is_empty());
            }

            #[tokio::test]
            async fn test_join_to_one_reference() {
                let em = blog().await;

                let query = RepoQuery::default().with_join(&["author"]);
                let res = em.repository("posts").unwrap().find_many(&query).await.unwrap();
                let first = &res.rows()[0];
                assert_eq!(first["title"], json!("first"));
                assert_eq!(first["author.name"], json!("alice"));
                assert_eq!(first["author.id"], json!(1));
                assert!(first.get("author.email").is_none());

                let query = RepoQuery::default().with_join(&["comments"]);
                assert!(em.repository("posts").unwrap().find_many(&query).await.is_err());
            }

            #[tokio::test]
            async fn test_pagination_and_meta() {
                let em = manager().await;
                let rows = (1..=15).map(|i| json!({ "title": format!("t{:02}", i) })).collect();
                storage_harness::seed(&em, "todos", rows).await;
                let repo = em.repository("todos").unwrap();

                let res = repo.find_many(&RepoQuery::default()).await.unwrap();
                assert_eq!(res.rows().len(), 10);
                assert_eq!(res.meta.limit, 10);
                assert_eq!(res.meta.total, 15);
                assert_eq!(res.meta.count, 15);
                assert_eq!(res.meta.items, 10);
                assert!(res.meta.query.is_some());

                let query = RepoQuery::default()
                    .with_sort("title", SortDir::Desc)
                    .with_limit(3)
                    .with_offset(2);
                let res = repo.find_many(&query).await.unwrap();
                assert_eq!(
                    storage_harness::column(res.rows(), "title"),
                    vec![json!("t13"), json!("t12"), json!("t11")]
                );
                assert_eq!(res.meta.offset, 2);
                assert_eq!(res.meta.items, 3);

                let res = repo
                    .find_many(&RepoQuery::default().with_select(&["title"]).with_limit(1))
                    .await
                    .unwrap();
                assert_eq!(res.rows()[0], json!({ "title": "t01" }));
            }

            #[tokio::test]
            async fn test_where_operators() {
                let em = blog().await;
                let repo = em.repository("comments").unwrap();

                let count = |where_: Value| {
                    let repo = &repo;
                    async move { repo.count(&where_).await.unwrap().count }
                };
                assert_eq!(count(json!({ "id": { "$in": [1, 3] } })).await, 2);
                assert_eq!(count(json!({ "id": { "$gt": 1 } })).await, 2);
                assert_eq!(count(json!({ "body": { "$like": "%ee%" } })).await, 1);
                assert_eq!(
                    count(json!({ "$or": [{ "body": "nice" }, { "post_id": 2 }] })).await,
                    2
                );
                assert_eq!(
                    count(json!({ "post_id": 1, "body": { "$ne": "nice" } })).await,
                    1
                );
            }

            #[tokio::test]
            async fn test_where_literals_normalized() {
                let em = blog().await;
                let repo = em.repository("posts").unwrap();

                let count = |where_: Value| {
                    let repo = &repo;
                    async move { repo.count(&where_).await.unwrap().count }
                };
                assert_eq!(count(json!({ "id": "1" })).await, 1);
                assert_eq!(count(json!({ "author_id": "1" })).await, 2);
                assert_eq!(count(json!({ "id": { "$in": ["1", 2] } })).await, 2);
                assert_eq!(
                    count(json!({ "published_at": "2024-03-01T08:00:00Z" })).await,
                    1
                );
                assert_eq!(
                    count(json!({ "published_at": "2024-03-01T09:00:00+01:00" })).await,
                    1
                );
                assert_eq!(
                    count(json!({ "published_at": { "$gt": "2024-04-01T00:00:00+00:00" } })).await,
                    1
                );
                assert_eq!(count(json!({ "$or": [{ "title": "zz" }, {}] })).await, 2);

                for where_ in [
                    json!({ "id": "one" }),
                    json!({ "published_at": "yesterday" }),
                    json!({ "title": { "$in": [true] } }),
                ] {
                    let err = repo.count(&where_).await.unwrap_err();
                    assert!(
                        matches!(err, DataError::Validation(_)),
                        "unexpected error: {:?}",
                        err
                    );
                }
            }

            #[tokio::test]
            async fn test_hidden_fields_not_returned() {
                let em = blog().await;
                let res = em
                    .repository("users")
                    .unwrap()
                    .find_id(1, &RepoQuery::default())
                    .await
                    .unwrap();
                assert_eq!(res.data, Some(json!({ "id": 1, "name": "alice" })));
            }

            #[tokio::test]
            async fn test_invalid_queries_rejected() {
                let em = blog().await;
                let repo = em.repository("users").unwrap();

                for query in [
                    RepoQuery::default().with_select(&["nope"]),
                    RepoQuery::default().with_select(&["email"]),
                    RepoQuery::default().with_sort("nope", SortDir::Asc),
                    RepoQuery::default().with_where(json!({ "nope": 1 })),
                    RepoQuery::default().with_where(json!({ "name": { "$near": 1 } })),
                ] {
                    let err = repo.find_many(&query).await.unwrap_err();
                    assert!(
                        matches!(err, DataError::Validation(_)),
                        "unexpected error: {:?}",
                        err
                    );
                }
                assert!(em.repository("nope").err().unwrap().is_not_found());
            }

            // ==================================================================
            // Writes
            // ==================================================================

            #[tokio::test]
            async fn test_round_trip_transforms() {
                let em = blog().await;
                let data = json!({
                    "title": "third",
                    "status": "published",
                    "meta": { "tags": ["a", "b"], "views": 3 },
                    "author_id": 2
                });
                let inserted = em
                    .mutator("posts")
                    .unwrap()
                    .insert_one(data.clone())
                    .await
                    .unwrap()
                    .data
                    .unwrap();
                let id = inserted["id"].as_i64().unwrap();

                let found = em
                    .repository("posts")
                    .unwrap()
                    .find_id(id, &RepoQuery::default())
                    .await
                    .unwrap()
                    .data
                    .unwrap();
                for key in ["title", "status", "meta", "author_id"] {
                    assert_eq!(found[key], data[key], "field {}", key);
                }
                assert_eq!(found, inserted);

                let draft = em
                    .repository("posts")
                    .unwrap()
                    .find_id(2, &RepoQuery::default())
                    .await
                    .unwrap()
                    .data
                    .unwrap();
                assert_eq!(draft["status"], json!("draft"));
                assert_eq!(draft["meta"], json!({ "pinned": true }));
            }

            #[tokio::test]
            async fn test_update_and_delete() {
                let em = manager().await;
                let mutator = em.mutator("todos").unwrap();
                mutator.insert_one(json!({ "title": "a" })).await.unwrap();

                let updated = mutator.update_one(1, json!({ "done": true })).await.unwrap();
                assert_eq!(updated.data, Some(json!({ "id": 1, "title": "a", "done": true })));
                assert!(mutator.update_one(1, json!({ "title": null })).await.is_err());
                assert!(mutator.update_one(9, json!({ "done": true })).await.unwrap_err().is_not_found());

                let deleted = mutator.delete_one(1).await.unwrap();
                assert_eq!(deleted.data, Some(json!({ "id": 1 })));

                let found = em
                    .repository("todos")
                    .unwrap()
                    .find_id(1, &RepoQuery::default())
                    .await
                    .unwrap();
                assert!(found.data.is_none());
                assert!(mutator.delete_one(1).await.unwrap_err().is_not_found());
            }

            #[tokio::test]
            async fn test_delete_many_requires_where() {
                let em = blog().await;
                let mutator = em.mutator("comments").unwrap();

                for where_ in [Value::Null, json!({})] {
                    let err = mutator.delete_many(&where_).await.unwrap_err();
                    assert!(matches!(
                        err,
                        DataError::Validation(ValidationError::UnboundedDelete { .. })
                    ));
                }
                let repo = em.repository("comments").unwrap();
                assert_eq!(repo.count(&Value::Null).await.unwrap().count, 3);

                let res = mutator.delete_many(&json!({ "post_id": 1 })).await.unwrap();
                assert_eq!(res.data, Some(json!([1, 2])));
                assert_eq!(repo.count(&Value::Null).await.unwrap().count, 1);
            }

            #[tokio::test]
            async fn test_relation_target_must_exist() {
                let em = blog().await;
                let mutator = em.mutator("comments").unwrap();

                let err = mutator
                    .insert_one(json!({ "body": "lost", "post_id": 42 }))
                    .await
                    .unwrap_err();
                assert!(matches!(err, DataError::Validation(_)));
                assert!(mutator.insert_one(json!({ "body": "bad", "post_id": "x" })).await.is_err());
                assert!(mutator.insert_one(json!({ "body": "ok", "post_id": 2 })).await.is_ok());
            }

            #[tokio::test]
            async fn test_unique_index_enforced() {
                let em = blog().await;
                let err = em
                    .mutator("tags")
                    .unwrap()
                    .insert_one(json!({ "name": "rust" }))
                    .await
                    .unwrap_err();
                assert!(matches!(err, DataError::Storage(StorageError::Backend { .. })));

                let err = em
                    .mutator("posts_tags")
                    .unwrap()
                    .insert_one(json!({ "post_id": 1, "tag_id": 1 }))
                    .await
                    .unwrap_err();
                assert!(matches!(err, DataError::Storage(_)));
            }

            // ==================================================================
            // Schema
            // ==================================================================

            #[tokio::test]
            async fn test_sync_is_idempotent() {
                let em = manager().await;
                let changes = em.schema().sync(SyncOptions::default()).await.unwrap();
                assert!(changes.is_empty(), "unexpected changes: {:?}", changes);

                let forced = SyncOptions { force: true, drop: true };
                let changes = em.schema().sync(forced).await.unwrap();
                assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
            }

            #[tokio::test]
            async fn test_introspect_lists_tables() {
                let em = manager().await;
                let tables = em.schema().introspect().await.unwrap();
                let mut names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
                names.sort();
                assert_eq!(
                    names,
                    vec!["comments", "posts", "posts_tags", "tags", "todos", "users"]
                );

                let comments = tables.iter().find(|t| t.name == "comments").unwrap();
                assert!(comments.column("post_id").is_some());
                let posts_tags = tables.iter().find(|t| t.name == "posts_tags").unwrap();
                assert!(posts_tags.indices.iter().any(|i| i.unique));
            }
        }
    };
}
