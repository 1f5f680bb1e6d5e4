//! SQLite storage backend using sqlx.
//!
//! Statements are rendered by [`crate::query::sql`] and executed on a
//! `sqlx::SqlitePool`. Values are decoded by their dynamic storage class, so
//! rows come back as JSON whatever the declared column types.
//!
//! # Feature flag
//!
//! This module is gated behind the `sqlite` feature flag:
//! ```toml
//! [dependencies]
//! this-data = { version = "0.1", features = ["sqlite"] }
//! ```

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, Sqlite};

use super::{ColumnInfo, Connection, IndexInfo, StoreResult, TableInfo};
use crate::query::ddl::SchemaStatement;
use crate::query::sql::{
    CompiledQuery, compile_count, compile_delete, compile_insert, compile_schema, compile_select,
    compile_update, quote,
};
use crate::query::statement::{
    CountStatement, DeleteStatement, InsertStatement, Row, SelectColumn, SelectStatement, Source,
    UpdateStatement,
};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite connection pool
#[derive(Clone, Debug)]
pub struct SqliteConnection {
    pool: SqlitePool,
}

impl SqliteConnection {
    /// Create a connection with the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool on `url`
    ///
    /// An in-memory database lives in a single connection, so the pool is
    /// capped at one connection for `:memory:` URLs.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_value<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn prepare(compiled: &CompiledQuery) -> SqliteQuery<'_> {
    compiled
        .parameters
        .iter()
        .fold(sqlx::query(&compiled.sql), bind_value)
}

fn decode_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(Some(i)) = row.try_get::<Option<i64>, _>(index) {
        return Value::from(i);
    }
    if let Ok(Some(f)) = row.try_get::<Option<f64>, _>(index) {
        return serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(index) {
        return Value::String(s);
    }
    Value::Null
}

fn decode_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .map(|column| (column.name().to_string(), decode_value(row, column.ordinal())))
        .collect()
}

fn select_by_id(table: &str, primary: &str) -> String {
    format!(
        "select * from {} where {} = ?",
        quote(table),
        quote(primary)
    )
}

#[async_trait]
impl Connection for SqliteConnection {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn select(&self, statement: &SelectStatement) -> StoreResult<Vec<Row>> {
        let compiled = compile_select(statement);
        let rows = prepare(&compiled).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn count(&self, statement: &CountStatement) -> StoreResult<u64> {
        let compiled = compile_count(statement);
        let row = prepare(&compiled).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn insert(&self, statement: &InsertStatement) -> StoreResult<Vec<Row>> {
        let fetch = select_by_id(&statement.table, &statement.primary);
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(statement.rows.len());

        for compiled in compile_insert(statement) {
            let result = prepare(&compiled).execute(&mut *tx).await?;
            let row = sqlx::query(&fetch)
                .bind(result.last_insert_rowid())
                .fetch_one(&mut *tx)
                .await?;
            inserted.push(decode_row(&row));
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn update(&self, statement: &UpdateStatement) -> StoreResult<Option<Row>> {
        let fetch = select_by_id(&statement.table, &statement.primary);
        let mut tx = self.pool.begin().await?;

        if !statement.values.is_empty() {
            let compiled = compile_update(statement);
            let result = prepare(&compiled).execute(&mut *tx).await?;
            if result.rows_affected() == 0 {
                return Ok(None);
            }
        }
        let row = sqlx::query(&fetch)
            .bind(statement.id)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.as_ref().map(decode_row))
    }

    async fn delete(&self, statement: &DeleteStatement) -> StoreResult<Vec<i64>> {
        let ids_query = compile_select(&SelectStatement {
            source: Source {
                table: statement.table.clone(),
                alias: statement.table.clone(),
                joins: Vec::new(),
                filter: Some(statement.filter.clone()),
            },
            columns: vec![SelectColumn::new(
                &statement.table,
                &statement.primary,
                statement.primary.clone(),
            )],
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        });
        let delete = compile_delete(statement);

        let mut tx = self.pool.begin().await?;
        let ids = prepare(&ids_query)
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|row| row.try_get::<i64, _>(0))
            .collect::<Result<Vec<_>, _>>()?;
        prepare(&delete).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(ids)
    }

    async fn introspect(&self) -> StoreResult<Vec<TableInfo>> {
        let names: Vec<String> = sqlx::query_scalar(
            "select name from sqlite_master where type = 'table' and name not like 'sqlite_%' order by name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = sqlx::query(&format!("pragma table_info({})", quote(&name)))
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|row| {
                    Ok(ColumnInfo {
                        name: row.try_get("name")?,
                        column_type: row.try_get("type")?,
                        primary: row.try_get::<i64, _>("pk")? > 0,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?;

            let mut indices = Vec::new();
            let index_rows = sqlx::query(&format!("pragma index_list({})", quote(&name)))
                .fetch_all(&self.pool)
                .await?;
            for row in index_rows {
                // auto-indices for primary keys and inline constraints have origin "pk"/"u"
                let origin: String = row.try_get("origin")?;
                if origin != "c" {
                    continue;
                }
                let index_name: String = row.try_get("name")?;
                let unique = row.try_get::<i64, _>("unique")? != 0;
                let columns = sqlx::query(&format!("pragma index_info({})", quote(&index_name)))
                    .fetch_all(&self.pool)
                    .await?
                    .iter()
                    .map(|r| r.try_get::<String, _>("name"))
                    .collect::<Result<Vec<_>, _>>()?;
                indices.push(IndexInfo {
                    name: index_name,
                    columns,
                    unique,
                });
            }

            tables.push(TableInfo {
                name,
                columns,
                indices,
            });
        }
        Ok(tables)
    }

    async fn apply(&self, statement: &SchemaStatement) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for sql in compile_schema(statement) {
            tracing::debug!(sql = %sql, "applying schema statement");
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ddl::{ColumnDefinition, ColumnType, IndexDefinition, TableDefinition};
    use crate::query::filter::{Condition, Operator};
    use crate::query::statement::ColumnRef;
    use serde_json::json;

    async fn setup() -> SqliteConnection {
        let conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.apply(&SchemaStatement::CreateTable(TableDefinition {
            name: "todos".to_string(),
            columns: vec![
                ColumnDefinition::new("id", ColumnType::Integer).primary(),
                ColumnDefinition::new("title", ColumnType::Text),
                ColumnDefinition::new("done", ColumnType::Boolean),
                ColumnDefinition::new("score", ColumnType::Numeric),
            ],
        }))
        .await
        .unwrap();
        conn
    }

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_select_delete() {
        let conn = setup().await;
        let inserted = conn
            .insert(&InsertStatement {
                table: "todos".to_string(),
                primary: "id".to_string(),
                rows: vec![
                    row(json!({ "title": "a", "done": false, "score": 1.5 })),
                    row(json!({ "title": "b", "done": true })),
                ],
            })
            .await
            .unwrap();
        assert_eq!(inserted[0]["id"], json!(1));
        assert_eq!(inserted[0]["done"], json!(0));
        assert_eq!(inserted[0]["score"], json!(1.5));
        assert_eq!(inserted[1]["score"], Value::Null);

        let mut source = Source::table("todos");
        source.and_where(Condition::eq(ColumnRef::new("todos", "done"), false));
        assert_eq!(conn.count(&CountStatement { source }).await.unwrap(), 1);

        let ids = conn
            .delete(&DeleteStatement {
                table: "todos".to_string(),
                primary: "id".to_string(),
                filter: Condition::compare(ColumnRef::new("todos", "id"), Operator::Gt, json!(0)),
            })
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let conn = setup().await;
        let updated = conn
            .update(&UpdateStatement {
                table: "todos".to_string(),
                primary: "id".to_string(),
                id: 42,
                values: row(json!({ "title": "x" })),
            })
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn test_introspect_reports_declared_types_and_indices() {
        let conn = setup().await;
        conn.apply(&SchemaStatement::CreateIndex(IndexDefinition {
            name: "idx_todos_title".to_string(),
            table: "todos".to_string(),
            columns: vec!["title".to_string()],
            unique: true,
        }))
        .await
        .unwrap();

        let tables = conn.introspect().await.unwrap();
        let todos = tables.iter().find(|t| t.name == "todos").unwrap();
        assert_eq!(todos.column("done").unwrap().column_type, "boolean");
        assert!(todos.column("id").unwrap().primary);
        assert_eq!(todos.indices.len(), 1);
        assert!(todos.indices[0].unique);
        assert_eq!(todos.indices[0].columns, vec!["title"]);
    }
}
