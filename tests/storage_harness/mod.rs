//! Shared test harness for storage backend testing
//!
//! Provides the blog/todos data model used by every suite, helpers to build
//! a synced `EntityManager` on any `Connection`, and seed data.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//! use storage_harness::*;
//!
//! engine_tests!(Arc::new(InMemoryConnection::new()));
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod engine_tests;

pub mod integration;

use serde_json::{Value, json};
use std::sync::Arc;

use this_data::config::DataConfig;
use this_data::manager::{EntityManager, SyncOptions};
use this_data::storage::Connection;

/// Data model shared by the suites
///
/// - `todos`: `title` (required text), `done` (boolean, default false)
/// - `users` <- `posts` (many_to_one, referenced as `author`)
/// - `posts` -> `comments` (one_to_many on `post_id`)
/// - `posts` <-> `tags` (many_to_many through `posts_tags`)
pub const MODEL_YAML: &str = r#"
basepath: /api/data
entities:
  todos:
    fields:
      title: { type: text, config: { required: true } }
      done: { type: boolean, config: { default_value: false } }
  users:
    fields:
      name: { type: text, config: { required: true } }
      email: { type: text, config: { format: email, hidden: [read] } }
  posts:
    config:
      description: Blog posts
    fields:
      title: { type: text, config: { required: true, max_length: 100 } }
      status:
        type: enum
        config: { options: [draft, published], default_value: draft }
      meta: { type: json }
      published_at: { type: date, config: { type: datetime } }
  comments:
    fields:
      body: { type: text, config: { required: true } }
  tags:
    fields:
      name: { type: text, config: { required: true } }
relations:
  - type: many_to_one
    source: posts
    target: users
    config: { mapped_by: author, field: author_id }
  - type: one_to_many
    source: posts
    target: comments
    config: { field: post_id }
  - type: many_to_many
    source: posts
    target: tags
indices:
  idx_tags_name: { entity: tags, fields: [name], unique: true }
"#;

pub fn model() -> DataConfig {
    DataConfig::from_yaml_str(MODEL_YAML).unwrap()
}

/// Build the shared model on `connection` and create its tables
pub async fn build_manager(connection: Arc<dyn Connection>) -> EntityManager {
    let em = model().build(connection).unwrap();
    em.schema().sync(SyncOptions::default()).await.unwrap();
    em
}

/// Insert `rows` into `entity` through the mutator, returning the stored rows
pub async fn seed(em: &EntityManager, entity: &str, rows: Vec<Value>) -> Vec<Value> {
    let res = em.mutator(entity).unwrap().insert_many(rows).await.unwrap();
    match res.data {
        Some(Value::Array(rows)) => rows,
        other => panic!("unexpected insert result: {:?}", other),
    }
}

/// Two users, two posts by the first user, three comments, two tags
///
/// Post 1 has comments 1 and 2 and both tags, post 2 has comment 3 and
/// tag `rust`.
pub async fn seed_blog(em: &EntityManager) {
    seed(
        em,
        "users",
        vec![
            json!({ "name": "alice", "email": "alice@example.com" }),
            json!({ "name": "bob" }),
        ],
    )
    .await;
    seed(
        em,
        "posts",
        vec![
            json!({
                "title": "first",
                "author_id": 1,
                "status": "published",
                "published_at": "2024-03-01T10:00:00+02:00"
            }),
            json!({
                "title": "second",
                "author_id": 1,
                "meta": { "pinned": true },
                "published_at": "2024-05-01T00:00:00Z"
            }),
        ],
    )
    .await;
    seed(
        em,
        "comments",
        vec![
            json!({ "body": "nice", "post_id": 1 }),
            json!({ "body": "agreed", "post_id": 1 }),
            json!({ "body": "hello", "post_id": 2 }),
        ],
    )
    .await;
    seed(em, "tags", vec![json!({ "name": "rust" }), json!({ "name": "data" })]).await;
    seed(
        em,
        "posts_tags",
        vec![
            json!({ "post_id": 1, "tag_id": 1 }),
            json!({ "post_id": 1, "tag_id": 2 }),
            json!({ "post_id": 2, "tag_id": 1 }),
        ],
    )
    .await;
}

/// Values of `key` across `rows`
pub fn column(rows: &[Value], key: &str) -> Vec<Value> {
    rows.iter().map(|row| row[key].clone()).collect()
}
