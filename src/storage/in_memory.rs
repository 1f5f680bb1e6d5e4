//! In-memory relational backend for testing and development
//!
//! Tables hold JSON rows keyed by an autoincrement primary key. Selects support
//! inner and left equi-joins, predicate evaluation with SQL null semantics,
//! ordering and paging, which is all the repository ever asks for.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use super::{ColumnInfo, Connection, IndexInfo, StoreError, StoreResult, TableInfo};
use crate::query::ddl::{ColumnDefinition, IndexDefinition, SchemaStatement, TableDefinition};
use crate::query::filter::compare_values;
use crate::query::statement::{
    ColumnRef, CountStatement, DeleteStatement, InsertStatement, JoinKind, Row, SelectStatement,
    SortDir, Source, UpdateStatement,
};

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<ColumnDefinition>,
    indices: Vec<IndexDefinition>,
    rows: BTreeMap<i64, Row>,
    next_id: i64,
    /// Keys currently held by each unique index, by index name
    unique_keys: HashMap<String, HashSet<Vec<String>>>,
}

impl Table {
    fn new(definition: &TableDefinition) -> Self {
        Self {
            columns: definition.columns.clone(),
            indices: Vec::new(),
            rows: BTreeMap::new(),
            next_id: 1,
            unique_keys: HashMap::new(),
        }
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn check_columns<'a>(
        &self,
        table: &str,
        names: impl IntoIterator<Item = &'a String>,
    ) -> StoreResult<()> {
        for name in names {
            if !self.has_column(name) {
                return Err(StoreError::NoSuchColumn {
                    table: table.to_string(),
                    column: name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Recompute every unique index from the stored rows
    fn rebuild_unique(&mut self) -> StoreResult<()> {
        let mut keys = HashMap::new();
        for index in self.indices.iter().filter(|i| i.unique) {
            let mut seen = HashSet::new();
            for row in self.rows.values() {
                if let Some(key) = unique_key(index, row) {
                    if !seen.insert(key) {
                        return Err(StoreError::UniqueViolation(index.name.clone()));
                    }
                }
            }
            keys.insert(index.name.clone(), seen);
        }
        self.unique_keys = keys;
        Ok(())
    }

    /// Claim the unique keys of `row`, failing without side effects on a clash
    fn index_row(&mut self, row: &Row) -> StoreResult<()> {
        let keys: Vec<(&str, Vec<String>)> = self
            .indices
            .iter()
            .filter(|i| i.unique)
            .filter_map(|i| unique_key(i, row).map(|key| (i.name.as_str(), key)))
            .collect();
        if let Some((name, _)) = keys.iter().find(|(name, key)| {
            self.unique_keys
                .get(*name)
                .is_some_and(|held| held.contains(key))
        }) {
            return Err(StoreError::UniqueViolation(name.to_string()));
        }
        for (name, key) in keys {
            self.unique_keys
                .entry(name.to_string())
                .or_default()
                .insert(key);
        }
        Ok(())
    }

    fn unindex_row(&mut self, row: &Row) {
        for index in self.indices.iter().filter(|i| i.unique) {
            if let (Some(key), Some(held)) =
                (unique_key(index, row), self.unique_keys.get_mut(&index.name))
            {
                held.remove(&key);
            }
        }
    }

    fn insert_row(&mut self, id: i64, row: Row) -> StoreResult<()> {
        self.index_row(&row)?;
        self.rows.insert(id, row);
        Ok(())
    }

    fn remove_row(&mut self, id: i64) -> Option<Row> {
        let row = self.rows.remove(&id)?;
        self.unindex_row(&row);
        Some(row)
    }
}

/// Key of `row` in a unique index; `None` when a value never clashes (null)
///
/// Values that compare equal share a key, so `1`, `1.0` and `true` collide.
fn unique_key(index: &IndexDefinition, row: &Row) -> Option<Vec<String>> {
    index
        .columns
        .iter()
        .map(|c| match row.get(c).unwrap_or(&Value::Null) {
            Value::Number(n) => n.as_f64().map(|f| format!("n:{}", f)),
            Value::Bool(b) => Some(format!("n:{}", *b as i64)),
            Value::String(s) => Some(format!("s:{}", s)),
            _ => None,
        })
        .collect()
}

type Tables = IndexMap<String, Table>;

/// One candidate result row: table alias to the row it contributes
type Tuple<'a> = HashMap<&'a str, Option<&'a Row>>;

/// In-memory connection
///
/// Cloning shares the underlying store. Uses `RwLock` for thread-safe access.
#[derive(Clone, Default)]
pub struct InMemoryConnection {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> StoreResult<T>) -> StoreResult<T> {
        let tables = self
            .tables
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        f(&tables)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        f(&mut tables)
    }
}

fn table<'a>(tables: &'a Tables, name: &str) -> StoreResult<&'a Table> {
    tables
        .get(name)
        .ok_or_else(|| StoreError::NoSuchTable(name.to_string()))
}

fn table_mut<'a>(tables: &'a mut Tables, name: &str) -> StoreResult<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| StoreError::NoSuchTable(name.to_string()))
}

fn lookup(tuple: &Tuple<'_>, column: &ColumnRef) -> Value {
    tuple
        .get(column.table.as_str())
        .copied()
        .flatten()
        .and_then(|row| row.get(&column.column))
        .cloned()
        .unwrap_or(Value::Null)
}

/// Rows of `source` after joins and filter
fn resolve<'a>(tables: &'a Tables, source: &'a Source) -> StoreResult<Vec<Tuple<'a>>> {
    let base = table(tables, &source.table)?;
    let mut tuples: Vec<Tuple<'a>> = base
        .rows
        .values()
        .map(|row| {
            let mut tuple = Tuple::new();
            tuple.insert(source.alias.as_str(), Some(row));
            tuple
        })
        .collect();

    for join in &source.joins {
        let joined = table(tables, &join.table)?;
        let mut next = Vec::new();
        for tuple in tuples {
            let key = lookup(&tuple, &join.right);
            let matches: Vec<&Row> = joined
                .rows
                .values()
                .filter(|row| {
                    let value = row.get(&join.left.column).unwrap_or(&Value::Null);
                    !key.is_null() && compare_values(value, &key) == Some(Ordering::Equal)
                })
                .collect();
            if matches.is_empty() {
                if join.kind == JoinKind::Left {
                    let mut extended = tuple.clone();
                    extended.insert(join.alias.as_str(), None);
                    next.push(extended);
                }
                continue;
            }
            for row in matches {
                let mut extended = tuple.clone();
                extended.insert(join.alias.as_str(), Some(row));
                next.push(extended);
            }
        }
        tuples = next;
    }

    if let Some(filter) = &source.filter {
        tuples.retain(|tuple| filter.evaluate(&|c: &ColumnRef| lookup(tuple, c)));
    }
    Ok(tuples)
}

/// SQLite ordering: nulls first, then numbers, then text
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => compare_values(a, b).unwrap_or_else(|| a.is_string().cmp(&b.is_string())),
    }
}

#[async_trait]
impl Connection for InMemoryConnection {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn select(&self, statement: &SelectStatement) -> StoreResult<Vec<Row>> {
        self.read(|tables| {
            let mut tuples = resolve(tables, &statement.source)?;
            tuples.sort_by(|a, b| {
                statement
                    .order_by
                    .iter()
                    .map(|order| {
                        let ordering = order_values(&lookup(a, &order.column), &lookup(b, &order.column));
                        match order.dir {
                            SortDir::Asc => ordering,
                            SortDir::Desc => ordering.reverse(),
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });

            let limit = statement.limit.unwrap_or(usize::MAX);
            Ok(tuples
                .iter()
                .skip(statement.offset)
                .take(limit)
                .map(|tuple| {
                    statement
                        .columns
                        .iter()
                        .map(|c| (c.alias.clone(), lookup(tuple, &c.source)))
                        .collect()
                })
                .collect())
        })
    }

    async fn count(&self, statement: &CountStatement) -> StoreResult<u64> {
        self.read(|tables| Ok(resolve(tables, &statement.source)?.len() as u64))
    }

    async fn insert(&self, statement: &InsertStatement) -> StoreResult<Vec<Row>> {
        self.write(|tables| {
            let target = table_mut(tables, &statement.table)?;
            let next_id = target.next_id;
            let mut inserted: Vec<Row> = Vec::with_capacity(statement.rows.len());
            let mut staged: Vec<i64> = Vec::with_capacity(statement.rows.len());

            let result = statement.rows.iter().try_for_each(|values| {
                target.check_columns(&statement.table, values.keys())?;
                let id = match values.get(&statement.primary).and_then(Value::as_i64) {
                    Some(id) => id,
                    None => target.next_id,
                };
                if target.rows.contains_key(&id) {
                    return Err(StoreError::UniqueViolation(format!(
                        "{}.{}",
                        statement.table, statement.primary
                    )));
                }

                let row: Row = target
                    .columns
                    .iter()
                    .map(|c| {
                        let value = if c.name == statement.primary {
                            Value::from(id)
                        } else {
                            values.get(&c.name).cloned().unwrap_or(Value::Null)
                        };
                        (c.name.clone(), value)
                    })
                    .collect();
                target.insert_row(id, row.clone())?;
                target.next_id = target.next_id.max(id + 1);
                staged.push(id);
                inserted.push(row);
                Ok(())
            });

            if let Err(e) = result {
                for id in staged {
                    target.remove_row(id);
                }
                target.next_id = next_id;
                return Err(e);
            }
            Ok(inserted)
        })
    }

    async fn update(&self, statement: &UpdateStatement) -> StoreResult<Option<Row>> {
        self.write(|tables| {
            let target = table_mut(tables, &statement.table)?;
            target.check_columns(&statement.table, statement.values.keys())?;
            let Some(previous) = target.remove_row(statement.id) else {
                return Ok(None);
            };

            let mut updated = previous.clone();
            for (name, value) in &statement.values {
                if name != &statement.primary {
                    updated.insert(name.clone(), value.clone());
                }
            }
            if let Err(e) = target.insert_row(statement.id, updated.clone()) {
                target.insert_row(statement.id, previous)?;
                return Err(e);
            }
            Ok(Some(updated))
        })
    }

    async fn delete(&self, statement: &DeleteStatement) -> StoreResult<Vec<i64>> {
        self.write(|tables| {
            let source = Source {
                table: statement.table.clone(),
                alias: statement.table.clone(),
                joins: Vec::new(),
                filter: Some(statement.filter.clone()),
            };
            let primary = ColumnRef::new(&statement.table, &statement.primary);
            let ids: Vec<i64> = resolve(tables, &source)?
                .iter()
                .filter_map(|tuple| lookup(tuple, &primary).as_i64())
                .collect();

            let target = table_mut(tables, &statement.table)?;
            for id in &ids {
                target.remove_row(*id);
            }
            Ok(ids)
        })
    }

    async fn introspect(&self) -> StoreResult<Vec<TableInfo>> {
        self.read(|tables| {
            Ok(tables
                .iter()
                .map(|(name, t)| TableInfo {
                    name: name.clone(),
                    columns: t
                        .columns
                        .iter()
                        .map(|c| ColumnInfo {
                            name: c.name.clone(),
                            column_type: c.column_type.as_str().to_string(),
                            primary: c.primary,
                        })
                        .collect(),
                    indices: t
                        .indices
                        .iter()
                        .map(|i| IndexInfo {
                            name: i.name.clone(),
                            columns: i.columns.clone(),
                            unique: i.unique,
                        })
                        .collect(),
                })
                .collect())
        })
    }

    async fn apply(&self, statement: &SchemaStatement) -> StoreResult<()> {
        self.write(|tables| match statement {
            SchemaStatement::CreateTable(definition) => {
                if tables.contains_key(&definition.name) {
                    return Err(StoreError::TableExists(definition.name.clone()));
                }
                tables.insert(definition.name.clone(), Table::new(definition));
                Ok(())
            }
            SchemaStatement::AddColumn { table, column } => {
                let t = table_mut(tables, table)?;
                if t.has_column(&column.name) {
                    return Err(StoreError::ColumnExists {
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
                t.columns.push(column.clone());
                for row in t.rows.values_mut() {
                    row.insert(column.name.clone(), Value::Null);
                }
                Ok(())
            }
            SchemaStatement::AlterColumn { table, column } => {
                let t = table_mut(tables, table)?;
                let Some(existing) = t.columns.iter_mut().find(|c| c.name == column.name) else {
                    return Err(StoreError::NoSuchColumn {
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                };
                *existing = column.clone();
                for row in t.rows.values_mut() {
                    row.insert(column.name.clone(), Value::Null);
                }
                t.rebuild_unique()
            }
            SchemaStatement::DropColumn { table, column } => {
                let t = table_mut(tables, table)?;
                if !t.has_column(column) {
                    return Err(StoreError::NoSuchColumn {
                        table: table.clone(),
                        column: column.clone(),
                    });
                }
                if let Some(index) = t.indices.iter().find(|i| i.columns.contains(column)) {
                    return Err(StoreError::ColumnIndexed {
                        column: column.clone(),
                        index: index.name.clone(),
                    });
                }
                t.columns.retain(|c| &c.name != column);
                for row in t.rows.values_mut() {
                    row.remove(column);
                }
                Ok(())
            }
            SchemaStatement::DropTable { table } => {
                tables
                    .shift_remove(table)
                    .map(|_| ())
                    .ok_or_else(|| StoreError::NoSuchTable(table.clone()))
            }
            SchemaStatement::CreateIndex(index) => {
                if tables
                    .values()
                    .any(|t| t.indices.iter().any(|i| i.name == index.name))
                {
                    return Err(StoreError::IndexExists(index.name.clone()));
                }
                let t = table_mut(tables, &index.table)?;
                t.check_columns(&index.table, &index.columns)?;
                t.indices.push(index.clone());
                if let Err(e) = t.rebuild_unique() {
                    t.indices.pop();
                    return Err(e);
                }
                Ok(())
            }
            SchemaStatement::DropIndex { table, name } => {
                let t = table_mut(tables, table)?;
                let before = t.indices.len();
                t.indices.retain(|i| &i.name != name);
                if t.indices.len() == before {
                    return Err(StoreError::NoSuchIndex(name.clone()));
                }
                t.unique_keys.remove(name);
                Ok(())
            }
        })
    }
}
