//! Write side: the field pipeline in front of storage writes

use futures::future::try_join_all;
use serde_json::{Value, json};

use super::entity_manager::EntityManager;
use super::response::MutatorResponse;
use crate::core::error::{DataResult, EntityError, FieldValidationError, ValidationError};
use crate::entities::Entity;
use crate::fields::{ActionContext, Context};
use crate::query::filter::{Condition, parse_where};
use crate::query::statement::{
    ColumnRef, DeleteStatement, InsertStatement, Row, UpdateStatement,
};

/// Writes to one entity
pub struct Mutator<'a> {
    em: &'a EntityManager,
    entity: &'a Entity,
}

impl<'a> Mutator<'a> {
    pub(crate) fn new(em: &'a EntityManager, entity: &'a Entity) -> Self {
        Self { em, entity }
    }

    pub fn entity(&self) -> &Entity {
        self.entity
    }

    fn backend(&self) -> &'static str {
        self.em.connection().backend()
    }

    /// Reject keys that are undeclared or not fillable in `context`
    fn check_keys(&self, data: &Row, context: ActionContext) -> Result<(), ValidationError> {
        let errors: Vec<FieldValidationError> = data
            .keys()
            .filter_map(|key| {
                let message = match self.entity.field(key) {
                    None => format!("unknown field on entity \"{}\"", self.entity.name()),
                    Some(field) if !field.is_fillable(Some(context)) => {
                        format!("is not fillable on {}", context.as_str())
                    }
                    Some(_) => return None,
                };
                Some(FieldValidationError {
                    field: key.clone(),
                    message,
                })
            })
            .collect();

        match errors.len() {
            0 => Ok(()),
            1 => {
                let error = &errors[0];
                Err(ValidationError::field(&error.field, &error.message))
            }
            _ => Err(ValidationError::FieldErrors(errors)),
        }
    }

    /// Run every fillable field's persist transform over `data`
    ///
    /// On create, absent fields receive their default (or fail when
    /// required). On update only the fields present in `data` are touched.
    async fn persist_row(&self, data: Value, context: ActionContext) -> DataResult<Row> {
        let mut data = match data {
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::InvalidJson {
                    message: format!("expected an object, got {}", other),
                }
                .into());
            }
        };
        self.check_keys(&data, context)?;

        let mut row = Row::new();
        for field in self.entity.get_fillable_fields(Some(context), false) {
            let value = data.remove(field.name());
            if context == ActionContext::Update {
                match value {
                    None => continue,
                    // explicit null clears an optional field
                    Some(Value::Null) if !field.is_required() => {
                        row.insert(field.name().to_string(), Value::Null);
                        continue;
                    }
                    _ => {}
                }
            }
            if let Some(persisted) = field.transform_persist(value, self.em, context).await? {
                row.insert(field.name().to_string(), persisted);
            }
        }

        // Non-fillable fields still receive their defaults on create
        if context == ActionContext::Create {
            for field in self.entity.get_fields(false) {
                if field.is_primary() || row.contains_key(field.name()) {
                    continue;
                }
                if let Some(persisted) = field.transform_persist(None, self.em, context).await? {
                    row.insert(field.name().to_string(), persisted);
                }
            }
        }

        tracing::debug!(
            entity = self.entity.name(),
            context = context.as_str(),
            columns = row.len(),
            "persist pipeline done"
        );
        Ok(row)
    }

    /// Stored row as returned to callers: retrieve transforms, read-visible fields
    fn present(&self, mut stored: Row) -> Value {
        let mut out = Row::new();
        for field in self.entity.get_fields(false) {
            if field.is_hidden(Some(Context::Read)) {
                continue;
            }
            let value = stored.remove(field.name()).unwrap_or(Value::Null);
            out.insert(field.name().to_string(), field.transform_retrieve(value));
        }
        Value::Object(out)
    }

    pub async fn insert_one(&self, data: Value) -> DataResult<MutatorResponse> {
        let row = self.persist_row(data, ActionContext::Create).await?;
        let mut stored = self.write_rows(vec![row]).await?;
        Ok(MutatorResponse::new(stored.pop().unwrap_or(Value::Null)))
    }

    /// Insert several rows in one atomic write
    ///
    /// Row pipelines run concurrently; any failure aborts the whole batch.
    pub async fn insert_many(&self, data: Vec<Value>) -> DataResult<MutatorResponse> {
        let rows = try_join_all(
            data.into_iter()
                .map(|row| self.persist_row(row, ActionContext::Create)),
        )
        .await?;
        let stored = self.write_rows(rows).await?;
        Ok(MutatorResponse::new(Value::Array(stored)))
    }

    async fn write_rows(&self, rows: Vec<Row>) -> DataResult<Vec<Value>> {
        let statement = InsertStatement {
            table: self.entity.name().to_string(),
            primary: self.entity.primary_name().to_string(),
            rows,
        };
        let stored = self
            .em
            .connection()
            .insert(&statement)
            .await
            .map_err(|e| e.into_data_error(self.backend()))?;
        tracing::debug!(entity = self.entity.name(), rows = stored.len(), "inserted");
        Ok(stored.into_iter().map(|row| self.present(row)).collect())
    }

    pub async fn update_one(&self, id: i64, data: Value) -> DataResult<MutatorResponse> {
        let values = self.persist_row(data, ActionContext::Update).await?;
        let statement = UpdateStatement {
            table: self.entity.name().to_string(),
            primary: self.entity.primary_name().to_string(),
            id,
            values,
        };
        let updated = self
            .em
            .connection()
            .update(&statement)
            .await
            .map_err(|e| e.into_data_error(self.backend()))?;

        match updated {
            Some(row) => Ok(MutatorResponse::new(self.present(row))),
            None => Err(self.not_found(id)),
        }
    }

    pub async fn delete_one(&self, id: i64) -> DataResult<MutatorResponse> {
        let filter = Condition::eq(
            ColumnRef::new(self.entity.name(), self.entity.primary_name()),
            id,
        );
        let deleted = self.delete(filter).await?;
        if deleted.is_empty() {
            return Err(self.not_found(id));
        }
        Ok(MutatorResponse::new(json!({ "id": id })))
    }

    /// Delete every row matching `where_`; an empty predicate is refused
    pub async fn delete_many(&self, where_: &Value) -> DataResult<MutatorResponse> {
        let filter = parse_where(where_, self.entity, self.entity.name())?.ok_or_else(|| {
            ValidationError::UnboundedDelete {
                entity: self.entity.name().to_string(),
            }
        })?;
        let deleted = self.delete(filter).await?;
        Ok(MutatorResponse::new(json!(deleted)))
    }

    async fn delete(&self, filter: Condition) -> DataResult<Vec<i64>> {
        let statement = DeleteStatement {
            table: self.entity.name().to_string(),
            primary: self.entity.primary_name().to_string(),
            filter,
        };
        let ids = self
            .em
            .connection()
            .delete(&statement)
            .await
            .map_err(|e| e.into_data_error(self.backend()))?;
        tracing::debug!(entity = self.entity.name(), rows = ids.len(), "deleted");
        Ok(ids)
    }

    fn not_found(&self, id: i64) -> crate::core::error::DataError {
        EntityError::NotFound {
            entity: self.entity.name().to_string(),
            id,
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DataError;
    use crate::fields::Field;
    use crate::manager::SyncOptions;
    use crate::query::options::RepoQuery;
    use crate::storage::InMemoryConnection;
    use std::sync::Arc;

    async fn manager() -> EntityManager {
        let mut em = EntityManager::new(Arc::new(InMemoryConnection::new()));
        em.add_entity(
            Entity::new(
                "todos",
                vec![
                    Field::from_config("title", "text", json!({ "required": true })).unwrap(),
                    Field::from_config("done", "boolean", json!({ "default_value": false }))
                        .unwrap(),
                    Field::from_config("meta", "json", json!({})).unwrap(),
                    Field::from_config(
                        "created",
                        "text",
                        json!({ "fillable": false, "default_value": "system" }),
                    )
                    .unwrap(),
                ],
            )
            .unwrap(),
        )
        .unwrap();
        em.schema().sync(SyncOptions::default()).await.unwrap();
        em
    }

    #[tokio::test]
    async fn test_insert_applies_defaults_and_transforms() {
        let em = manager().await;
        let res = em
            .mutator("todos")
            .unwrap()
            .insert_one(json!({ "title": "a", "meta": { "tags": ["x"] } }))
            .await
            .unwrap();
        assert_eq!(
            res.data.unwrap(),
            json!({
                "id": 1,
                "title": "a",
                "done": false,
                "meta": { "tags": ["x"] },
                "created": "system"
            })
        );
    }

    #[tokio::test]
    async fn test_insert_rejects_missing_required() {
        let em = manager().await;
        let err = em.mutator("todos").unwrap().insert_one(json!({})).await.unwrap_err();
        match err {
            DataError::Validation(ValidationError::FieldError { field, .. }) => {
                assert_eq!(field, "title")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_and_non_fillable_keys() {
        let em = manager().await;
        let mutator = em.mutator("todos").unwrap();
        assert!(mutator.insert_one(json!({ "title": "a", "nope": 1 })).await.is_err());
        assert!(mutator.insert_one(json!({ "title": "a", "id": 5 })).await.is_err());
        assert!(
            mutator
                .insert_one(json!({ "title": "a", "created": "me" }))
                .await
                .is_err()
        );
        assert!(mutator.insert_one(json!(["title"])).await.is_err());
    }

    #[tokio::test]
    async fn test_insert_many_is_atomic_on_validation() {
        let em = manager().await;
        let mutator = em.mutator("todos").unwrap();
        assert!(
            mutator
                .insert_many(vec![json!({ "title": "a" }), json!({ "done": true })])
                .await
                .is_err()
        );
        let count = em.repository("todos").unwrap().count(&Value::Null).await.unwrap();
        assert_eq!(count.count, 0);

        let res = mutator
            .insert_many(vec![json!({ "title": "a" }), json!({ "title": "b" })])
            .await
            .unwrap();
        assert_eq!(res.data.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_one() {
        let em = manager().await;
        let mutator = em.mutator("todos").unwrap();
        mutator.insert_one(json!({ "title": "a" })).await.unwrap();

        let res = mutator.update_one(1, json!({ "done": true })).await.unwrap();
        let data = res.data.unwrap();
        assert_eq!(data["done"], json!(true));
        assert_eq!(data["title"], json!("a"));

        let err = mutator.update_one(7, json!({ "done": true })).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(mutator.update_one(1, json!({ "done": "maybe" })).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_one_and_many() {
        let em = manager().await;
        let mutator = em.mutator("todos").unwrap();
        for title in ["a", "b", "c"] {
            mutator.insert_one(json!({ "title": title })).await.unwrap();
        }

        let res = mutator.delete_one(2).await.unwrap();
        assert_eq!(res.data, Some(json!({ "id": 2 })));
        assert!(mutator.delete_one(2).await.unwrap_err().is_not_found());

        let err = mutator.delete_many(&json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            DataError::Validation(ValidationError::UnboundedDelete { .. })
        ));
        assert!(mutator.delete_many(&Value::Null).await.is_err());

        let res = mutator.delete_many(&json!({ "title": "c" })).await.unwrap();
        assert_eq!(res.data, Some(json!([3])));

        let remaining = em
            .repository("todos")
            .unwrap()
            .find_many(&RepoQuery::default())
            .await
            .unwrap();
        assert_eq!(remaining.rows().len(), 1);
    }
}
