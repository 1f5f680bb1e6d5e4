//! Read side: query construction over one entity

use serde_json::{Map, Value};

use super::entity_manager::EntityManager;
use super::response::{CountResponse, ExistsResponse, RepositoryMeta, RepositoryResponse};
use crate::core::error::{DataResult, ValidationError};
use crate::entities::Entity;
use crate::fields::{Context, Field};
use crate::query::filter::{Condition, parse_where};
use crate::query::options::{RepoQuery, Sort};
use crate::query::sql::compile_select;
use crate::query::statement::{
    ColumnRef, CountStatement, OrderBy, Row, SelectColumn, SelectStatement, Source,
};

/// Alias prefix of to-one joins requested through `join`
const JOIN_ALIAS_PREFIX: &str = "__join_";

/// Read-only queries over one entity
pub struct Repository<'a> {
    em: &'a EntityManager,
    entity: &'a Entity,
}

/// A selected column paired with the field that decodes it
struct Selected<'a> {
    column: SelectColumn,
    field: &'a Field,
}

impl<'a> Repository<'a> {
    pub(crate) fn new(em: &'a EntityManager, entity: &'a Entity) -> Self {
        Self { em, entity }
    }

    pub fn entity(&self) -> &Entity {
        self.entity
    }

    pub async fn find_many(&self, query: &RepoQuery) -> DataResult<RepositoryResponse> {
        let source = Source::table(self.entity.name());
        self.read(self.entity, source, query).await
    }

    /// The row with primary key `id`; `data` is `None` when there is none
    pub async fn find_id(&self, id: i64, query: &RepoQuery) -> DataResult<RepositoryResponse> {
        let mut source = Source::table(self.entity.name());
        source.and_where(Condition::eq(
            ColumnRef::new(self.entity.name(), self.entity.primary_name()),
            id,
        ));
        let query = RepoQuery {
            limit: Some(1),
            offset: None,
            ..query.clone()
        };

        let mut response = self.read(self.entity, source, &query).await?;
        response.data = match response.data.take() {
            Some(Value::Array(mut rows)) if !rows.is_empty() => Some(rows.swap_remove(0)),
            _ => None,
        };
        Ok(response)
    }

    /// Rows of the entity `reference` points to, related to row `id`
    pub async fn find_many_by_reference(
        &self,
        id: i64,
        reference: &str,
        query: &RepoQuery,
    ) -> DataResult<RepositoryResponse> {
        let (relation, direction) = self.em.find_reference(self.entity.name(), reference)?;
        let traversal = relation.traverse(direction, id, self.em)?;
        let target = self.em.entity(&traversal.entity)?;

        let mut source = Source::table(target.name());
        source.joins = traversal.joins;
        source.and_where(traversal.filter);
        self.read(target, source, query).await
    }

    pub async fn count(&self, where_: &Value) -> DataResult<CountResponse> {
        let source = self.filtered(Source::table(self.entity.name()), where_)?;
        let count = self
            .em
            .connection()
            .count(&CountStatement { source })
            .await
            .map_err(|e| e.into_data_error(self.em.connection().backend()))?;
        Ok(CountResponse {
            entity: self.entity.name().to_string(),
            count,
        })
    }

    pub async fn exists(&self, where_: &Value) -> DataResult<ExistsResponse> {
        let count = self.count(where_).await?;
        Ok(ExistsResponse {
            entity: count.entity,
            exists: count.count > 0,
        })
    }

    fn filtered(&self, mut source: Source, where_: &Value) -> DataResult<Source> {
        if let Some(condition) = parse_where(where_, self.entity, self.entity.name())? {
            source.and_where(condition);
        }
        Ok(source)
    }

    /// Columns to read from `entity`, honouring `select`
    fn selection(
        &self,
        entity: &'a Entity,
        query: &RepoQuery,
    ) -> Result<Vec<Selected<'a>>, ValidationError> {
        let columns = match query.select.as_deref() {
            Some(select) if !select.is_empty() => {
                let visible = entity.get_select(None, Some(Context::Read));
                if let Some(unknown) = select.iter().find(|s| !visible.iter().any(|c| &c.alias == *s)) {
                    return Err(ValidationError::query(format!(
                        "cannot select \"{}\" on entity \"{}\"",
                        unknown,
                        entity.name()
                    )));
                }
                entity.get_aliased_select_from(select, None, Some(Context::Read))
            }
            _ => entity.get_select(None, Some(Context::Read)),
        };
        Ok(columns
            .into_iter()
            .filter_map(|column| {
                entity
                    .field(&column.source.column)
                    .map(|field| Selected { column, field })
            })
            .collect())
    }

    /// Left joins and columns for the `join` option
    fn joins(
        &self,
        entity: &Entity,
        query: &RepoQuery,
        source: &mut Source,
    ) -> DataResult<Vec<Selected<'a>>> {
        let mut selected = Vec::new();
        for reference in query.join.iter().flatten() {
            let (relation, direction) = self.em.find_reference(entity.name(), reference)?;
            let alias = format!("{}{}", JOIN_ALIAS_PREFIX, reference);
            let join = relation
                .to_one_join(direction, &source.alias, &alias, self.em)?
                .ok_or_else(|| {
                    ValidationError::query(format!(
                        "reference \"{}\" of \"{}\" does not point to a single row",
                        reference,
                        entity.name()
                    ))
                })?;
            source.joins.push(join);

            let joined = self.em.entity(relation.other_end(direction))?;
            for column in joined.get_select(Some(&alias), Some(Context::Read)) {
                if let Some(field) = joined.field(&column.source.column) {
                    selected.push(Selected {
                        column: SelectColumn::new(
                            &alias,
                            field.name(),
                            format!("{}.{}", reference, field.name()),
                        ),
                        field,
                    });
                }
            }
        }
        Ok(selected)
    }

    fn sort(entity: &Entity, query: &RepoQuery) -> DataResult<Sort> {
        let sort = match &query.sort {
            Some(sort) => sort.clone(),
            None => {
                let default = entity.default_sort();
                Sort::new(default.by, default.dir)
            }
        };
        let known = entity
            .field(&sort.by)
            .is_some_and(|f| !f.is_virtual() && !f.is_hidden(Some(Context::Read)));
        if !known {
            return Err(ValidationError::query(format!(
                "cannot sort \"{}\" by \"{}\"",
                entity.name(),
                sort.by
            ))
            .into());
        }
        Ok(sort)
    }

    async fn read(
        &self,
        entity: &'a Entity,
        source: Source,
        query: &RepoQuery,
    ) -> DataResult<RepositoryResponse> {
        let connection = self.em.connection();
        let backend = connection.backend();
        let where_ = query.where_.clone().unwrap_or(Value::Null);

        let mut source = source;
        if let Some(condition) = parse_where(&where_, entity, &source.alias)? {
            source.and_where(condition);
        }

        let mut selected = self.selection(entity, query)?;
        let sort = Self::sort(entity, query)?;
        let count_source = source.clone();
        selected.extend(self.joins(entity, query, &mut source)?);

        let mut order_by = vec![OrderBy {
            column: ColumnRef::new(&source.alias, &sort.by),
            dir: sort.dir,
        }];
        if sort.by != entity.primary_name() {
            order_by.push(OrderBy {
                column: ColumnRef::new(&source.alias, entity.primary_name()),
                dir: sort.dir,
            });
        }

        let statement = SelectStatement {
            columns: selected.iter().map(|s| s.column.clone()).collect(),
            order_by,
            limit: Some(query.effective_limit()),
            offset: query.effective_offset(),
            source,
        };
        let compiled = compile_select(&statement);
        tracing::debug!(entity = entity.name(), sql = %compiled.sql, "select");

        let rows = connection
            .select(&statement)
            .await
            .map_err(|e| e.into_data_error(backend))?;
        let count = connection
            .count(&CountStatement {
                source: count_source,
            })
            .await
            .map_err(|e| e.into_data_error(backend))?;
        let total = connection
            .count(&CountStatement {
                source: Source::table(entity.name()),
            })
            .await
            .map_err(|e| e.into_data_error(backend))?;

        let data: Vec<Value> = rows
            .into_iter()
            .map(|row| Value::Object(decode(row, &selected)))
            .collect();

        Ok(RepositoryResponse {
            meta: RepositoryMeta {
                entity: entity.name().to_string(),
                sort,
                limit: query.effective_limit(),
                offset: query.effective_offset(),
                total,
                count,
                items: data.len(),
                query: Some(compiled),
            },
            data: Some(Value::Array(data)),
        })
    }
}

/// Run retrieve transforms, keeping the selection order
fn decode(mut row: Row, selected: &[Selected<'_>]) -> Row {
    let mut out = Map::with_capacity(selected.len());
    for s in selected {
        let value = row.remove(&s.column.alias).unwrap_or(Value::Null);
        out.insert(s.column.alias.clone(), s.field.transform_retrieve(value));
    }
    out
}
