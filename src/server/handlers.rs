//! HTTP handlers for the data API
//!
//! Every handler resolves the caller, checks the permission of its operation
//! and only then touches the entity manager. Unknown entities surface as 404
//! through [`EntityError::UnknownEntity`](crate::core::error::EntityError).

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

use super::host::DataHost;
use crate::core::Permission;
use crate::core::error::{DataResult, RequestError};
use crate::manager::{RepositoryResponse, SyncOptions};
use crate::query::options::RepoQuery;

const JSON_SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

type QueryParams = Query<HashMap<String, String>>;

/// Parse a path id; only positive integers are accepted
pub(crate) fn parse_id(raw: &str) -> DataResult<i64> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0 && !raw.starts_with('+'))
        .ok_or_else(|| {
            RequestError::InvalidEntityId {
                id: raw.to_string(),
            }
            .into()
        })
}

/// Parse a JSON body; an empty body reads as `null`
fn parse_body(body: &Bytes) -> DataResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| {
        RequestError::InvalidBody {
            message: e.to_string(),
        }
        .into()
    })
}

fn flag(params: &HashMap<String, String>, name: &str) -> bool {
    params
        .get(name)
        .is_some_and(|v| matches!(v.as_str(), "1" | "true"))
}

/// Absolute base of the API, derived from the `Host` header when present
fn base_url(host: &DataHost, headers: &HeaderMap) -> String {
    match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(authority) => format!("http://{}{}", authority, host.basepath()),
        None => host.basepath().to_string(),
    }
}

/// Render a read; `data: null` means 404 and the compiled query is only
/// exposed in debug mode
fn repository_result(host: &DataHost, response: RepositoryResponse) -> Response {
    let response = if host.is_debug() {
        response
    } else {
        response.without_query()
    };
    let status = if response.is_empty() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    };
    (status, Json(response)).into_response()
}

/// GET / - the declared model
pub async fn info(State(host): State<DataHost>, headers: HeaderMap) -> DataResult<Json<Value>> {
    host.authorize(&headers, Permission::EntityRead).await?;
    Ok(Json(host.em.to_json()))
}

/// GET /sync - reconcile storage with the model
pub async fn sync(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Query(params): QueryParams,
) -> DataResult<Json<Value>> {
    host.authorize(&headers, Permission::DatabaseSync).await?;

    let options = SyncOptions {
        force: flag(&params, "force"),
        drop: flag(&params, "drop"),
    };
    let schema = host.em.schema();
    let tables: Vec<String> = schema
        .introspect()
        .await?
        .into_iter()
        .map(|table| table.name)
        .collect();
    let changes = schema.sync(options).await?;

    Ok(Json(json!({ "tables": tables, "changes": changes })))
}

/// POST /{entity}/fn/count - body is the `where` predicate
pub async fn count(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    body: Bytes,
) -> DataResult<Json<Value>> {
    host.authorize(&headers, Permission::EntityRead).await?;
    let where_ = parse_body(&body)?;
    let result = host.em.repository(&entity)?.count(&where_).await?;
    Ok(Json(json!(result)))
}

/// POST /{entity}/fn/exists - body is the `where` predicate
pub async fn exists(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    body: Bytes,
) -> DataResult<Json<Value>> {
    host.authorize(&headers, Permission::EntityRead).await?;
    let where_ = parse_body(&body)?;
    let result = host.em.repository(&entity)?.exists(&where_).await?;
    Ok(Json(json!(result)))
}

/// GET /schema.json - index of the entity schemas
pub async fn schema_index(
    State(host): State<DataHost>,
    headers: HeaderMap,
) -> DataResult<Json<Value>> {
    host.authorize(&headers, Permission::EntityRead).await?;

    let properties: Map<String, Value> = host
        .em
        .entities()
        .map(|entity| {
            (
                entity.name().to_string(),
                json!({ "$ref": format!("schemas/{}", entity.name()) }),
            )
        })
        .collect();

    Ok(Json(json!({
        "$schema": JSON_SCHEMA_DIALECT,
        "$id": format!("{}/schema.json", base_url(&host, &headers)),
        "properties": properties,
    })))
}

/// GET /schemas/{entity} - JSON schema of one entity
pub async fn entity_schema(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path(entity): Path<String>,
) -> DataResult<Json<Value>> {
    host.authorize(&headers, Permission::EntityRead).await?;
    let entity = host.em.entity(&entity)?;
    let base = base_url(&host, &headers);

    let mut document = Map::new();
    document.insert("$schema".into(), json!(format!("{}/schema.json", base)));
    document.insert(
        "$id".into(),
        json!(format!("{}/schemas/{}", base, entity.name())),
    );
    document.insert("title".into(), json!(entity.label()));
    if let Some(description) = &entity.config().description {
        document.insert("$comment".into(), json!(description));
    }
    if let Value::Object(schema) = entity.to_schema() {
        document.extend(schema);
    }
    Ok(Json(Value::Object(document)))
}

/// GET /{entity}
pub async fn find_many(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    Query(params): QueryParams,
) -> DataResult<Response> {
    host.authorize(&headers, Permission::EntityRead).await?;
    let query = RepoQuery::from_query_map(&params)?;
    let result = host.em.repository(&entity)?.find_many(&query).await?;
    Ok(repository_result(&host, result))
}

/// POST /{entity}/query - body carries the query options
pub async fn query(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    body: Bytes,
) -> DataResult<Response> {
    host.authorize(&headers, Permission::EntityRead).await?;
    let query = RepoQuery::from_json(&parse_body(&body)?)?;
    let result = host.em.repository(&entity)?.find_many(&query).await?;
    Ok(repository_result(&host, result))
}

/// GET /{entity}/{id}
pub async fn find_id(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path((entity, id)): Path<(String, String)>,
    Query(params): QueryParams,
) -> DataResult<Response> {
    host.authorize(&headers, Permission::EntityRead).await?;
    let id = parse_id(&id)?;
    let query = RepoQuery::from_query_map(&params)?;
    let result = host.em.repository(&entity)?.find_id(id, &query).await?;
    Ok(repository_result(&host, result))
}

/// GET /{entity}/{id}/{reference}
pub async fn find_many_by_reference(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path((entity, id, reference)): Path<(String, String, String)>,
    Query(params): QueryParams,
) -> DataResult<Response> {
    host.authorize(&headers, Permission::EntityRead).await?;
    let id = parse_id(&id)?;
    let query = RepoQuery::from_query_map(&params)?;
    let result = host
        .em
        .repository(&entity)?
        .find_many_by_reference(id, &reference, &query)
        .await?;
    Ok(repository_result(&host, result))
}

/// POST /{entity}
pub async fn insert_one(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    body: Bytes,
) -> DataResult<Response> {
    host.authorize(&headers, Permission::EntityCreate).await?;
    let data = parse_body(&body)?;
    let result = host.em.mutator(&entity)?.insert_one(data).await?;
    Ok((StatusCode::CREATED, Json(result)).into_response())
}

/// PATCH /{entity}/{id}
pub async fn update_one(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path((entity, id)): Path<(String, String)>,
    body: Bytes,
) -> DataResult<Response> {
    host.authorize(&headers, Permission::EntityUpdate).await?;
    let id = parse_id(&id)?;
    let data = parse_body(&body)?;
    let result = host.em.mutator(&entity)?.update_one(id, data).await?;
    Ok(Json(result).into_response())
}

/// DELETE /{entity}/{id}
pub async fn delete_one(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path((entity, id)): Path<(String, String)>,
) -> DataResult<Response> {
    host.authorize(&headers, Permission::EntityDelete).await?;
    let id = parse_id(&id)?;
    let result = host.em.mutator(&entity)?.delete_one(id).await?;
    Ok(Json(result).into_response())
}

/// DELETE /{entity} - body is the `where` predicate, which must not be empty
pub async fn delete_many(
    State(host): State<DataHost>,
    headers: HeaderMap,
    Path(entity): Path<String>,
    body: Bytes,
) -> DataResult<Response> {
    host.authorize(&headers, Permission::EntityDelete).await?;
    let where_ = parse_body(&body)?;
    let result = host.em.mutator(&entity)?.delete_many(&where_).await?;
    Ok(Json(result).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("1").unwrap(), 1);
        assert_eq!(parse_id("42").unwrap(), 42);
        for raw in ["0", "-1", "+1", "abc", "1.5", ""] {
            assert!(parse_id(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(&Bytes::new()).unwrap(), Value::Null);
        assert_eq!(
            parse_body(&Bytes::from_static(b"{\"done\":true}")).unwrap(),
            json!({ "done": true })
        );
        assert!(parse_body(&Bytes::from_static(b"{oops")).is_err());
    }

    #[test]
    fn test_flag() {
        let params: HashMap<String, String> = [
            ("force".to_string(), "1".to_string()),
            ("drop".to_string(), "no".to_string()),
        ]
        .into_iter()
        .collect();
        assert!(flag(&params, "force"));
        assert!(!flag(&params, "drop"));
        assert!(!flag(&params, "other"));
    }
}
