//! Todos, posts and comments served over HTTP
//!
//! ```sh
//! cargo run --example todos
//! curl -X POST localhost:3000/api/data/todos -d '{"title":"write docs"}'
//! curl 'localhost:3000/api/data/todos?where={"done":false}'
//! curl localhost:3000/api/data/posts/1/comments
//! ```

use anyhow::Result;
use this_data::prelude::*;
use tracing_subscriber::EnvFilter;

const MODEL: &str = r#"
basepath: /api/data
entities:
  todos:
    config:
      sort_field: id
      sort_dir: desc
    fields:
      title: { type: text, config: { required: true, max_length: 200 } }
      done: { type: boolean, config: { default_value: false } }
  posts:
    fields:
      title: { type: text, config: { required: true } }
      status:
        type: enum
        config: { options: [draft, published], default_value: draft }
      published_at: { type: date, config: { type: datetime } }
  comments:
    fields:
      body: { type: text, config: { required: true } }
      meta: { type: json }
relations:
  - type: one_to_many
    source: posts
    target: comments
    config:
      field: post_id
indices:
  idx_todos_title:
    entity: todos
    fields: [title]
"#;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,this_data=debug")),
        )
        .init();

    let config = DataConfig::from_yaml_str(MODEL)?;
    let em = Arc::new(config.build(Arc::new(InMemoryConnection::new()))?);

    let changes = em.schema().sync(SyncOptions::default()).await?;
    println!("🗄️  Schema synced ({} changes)", changes.len());

    let post = em
        .mutator("posts")?
        .insert_one(json!({ "title": "Hello", "status": "published" }))
        .await?;
    let post_id = post
        .data
        .as_ref()
        .and_then(|row| row["id"].as_i64())
        .unwrap_or(1);
    em.mutator("comments")?
        .insert_many(vec![
            json!({ "body": "First!", "post_id": post_id }),
            json!({ "body": "Nice post", "post_id": post_id, "meta": { "likes": 3 } }),
        ])
        .await?;
    em.mutator("todos")?
        .insert_one(json!({ "title": "Try the API" }))
        .await?;
    println!("🌱 Seeded one post with two comments and one todo");

    ServerBuilder::new()
        .with_shared_entity_manager(em)
        .with_config(ServerConfig::from(&config))
        .with_cors()
        .serve("127.0.0.1:3000")
        .await
}
