//! Schema introspection and sync
//!
//! Sync compares the declared model with what the backend reports and
//! produces a list of [`SchemaChange`]s. Additive changes are always applied;
//! destructive ones (type changes, drops) only with `force`, and drops are only
//! computed with `drop`. Skipped changes are still reported.

use serde::{Deserialize, Serialize};

use super::entity_manager::EntityManager;
use crate::core::error::{DataResult, StorageError};
use crate::query::ddl::{IndexDefinition, SchemaStatement};
use crate::storage::{IndexInfo, TableInfo};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Apply destructive changes
    #[serde(default)]
    pub force: bool,
    /// Compute drops of undeclared tables, columns and indices
    #[serde(default)]
    pub drop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaAction {
    CreateTable,
    AddColumn,
    AlterColumn,
    DropColumn,
    DropTable,
    CreateIndex,
    DropIndex,
}

impl SchemaAction {
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            SchemaAction::AlterColumn
                | SchemaAction::DropColumn
                | SchemaAction::DropTable
                | SchemaAction::DropIndex
        )
    }

    /// Application order: drops first, indices last
    fn rank(&self) -> u8 {
        match self {
            SchemaAction::DropIndex => 0,
            SchemaAction::DropColumn => 1,
            SchemaAction::DropTable => 2,
            SchemaAction::CreateTable => 3,
            SchemaAction::AddColumn => 4,
            SchemaAction::AlterColumn => 5,
            SchemaAction::CreateIndex => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaChange {
    pub action: SchemaAction,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A planned change with the directive that performs it
#[derive(Debug, Clone)]
struct Planned {
    change: SchemaChange,
    statement: SchemaStatement,
    needs_force: bool,
}

impl Planned {
    fn new(action: SchemaAction, table: &str, statement: SchemaStatement) -> Self {
        Self {
            change: SchemaChange {
                action,
                table: table.to_string(),
                column: None,
                index: None,
                applied: false,
                detail: None,
            },
            statement,
            needs_force: action.is_destructive(),
        }
    }

    fn column(mut self, column: &str) -> Self {
        self.change.column = Some(column.to_string());
        self
    }

    fn index(mut self, index: &str) -> Self {
        self.change.index = Some(index.to_string());
        self
    }

    fn detail(mut self, detail: String) -> Self {
        self.change.detail = Some(detail);
        self
    }
}

pub struct SchemaManager<'a> {
    em: &'a EntityManager,
}

impl<'a> SchemaManager<'a> {
    pub(crate) fn new(em: &'a EntityManager) -> Self {
        Self { em }
    }

    /// Tables physically present in storage, declared or not
    pub async fn introspect(&self) -> DataResult<Vec<TableInfo>> {
        let connection = self.em.connection();
        connection
            .introspect()
            .await
            .map_err(|e| e.into_data_error(connection.backend()))
    }

    /// Reconcile storage with the declared model
    ///
    /// Returns every computed change, applied or not. Fails with
    /// `SyncInProgress` when another sync holds the lock.
    pub async fn sync(&self, options: SyncOptions) -> DataResult<Vec<SchemaChange>> {
        let _guard = self
            .em
            .sync_lock
            .try_lock()
            .map_err(|_| StorageError::SyncInProgress)?;

        let tables = self.introspect().await?;
        let plan = self.plan(&tables, options);
        let connection = self.em.connection();

        let mut changes = Vec::with_capacity(plan.len());
        for Planned {
            mut change,
            statement,
            needs_force,
        } in plan
        {
            if needs_force && !options.force {
                tracing::warn!(
                    action = ?change.action,
                    table = %change.table,
                    column = ?change.column,
                    index = ?change.index,
                    "skipped destructive schema change, sync with force to apply"
                );
                changes.push(change);
                continue;
            }

            connection
                .apply(&statement)
                .await
                .map_err(|e| e.into_data_error(connection.backend()))?;
            change.applied = true;
            tracing::info!(
                action = ?change.action,
                table = %change.table,
                column = ?change.column,
                index = ?change.index,
                "applied schema change"
            );
            changes.push(change);
        }
        Ok(changes)
    }

    fn plan(&self, tables: &[TableInfo], options: SyncOptions) -> Vec<Planned> {
        let mut plan = Vec::new();
        let existing = |name: &str| tables.iter().find(|t| t.name == name);

        for entity in self.em.entities() {
            let definition = entity.table_definition();
            let Some(table) = existing(entity.name()) else {
                plan.push(Planned::new(
                    SchemaAction::CreateTable,
                    entity.name(),
                    SchemaStatement::CreateTable(definition),
                ));
                continue;
            };

            for column in &definition.columns {
                match table.column(&column.name) {
                    None => plan.push(
                        Planned::new(
                            SchemaAction::AddColumn,
                            &table.name,
                            SchemaStatement::AddColumn {
                                table: table.name.clone(),
                                column: column.clone(),
                            },
                        )
                        .column(&column.name),
                    ),
                    Some(info) if !column.primary && !column.column_type.matches(&info.column_type) => {
                        plan.push(
                            Planned::new(
                                SchemaAction::AlterColumn,
                                &table.name,
                                SchemaStatement::AlterColumn {
                                    table: table.name.clone(),
                                    column: column.clone(),
                                },
                            )
                            .column(&column.name)
                            .detail(format!(
                                "{} -> {}",
                                info.column_type,
                                column.column_type.as_str()
                            )),
                        )
                    }
                    Some(_) => {}
                }
            }

            if options.drop {
                for info in &table.columns {
                    if !definition.columns.iter().any(|c| c.name == info.name) {
                        plan.push(
                            Planned::new(
                                SchemaAction::DropColumn,
                                &table.name,
                                SchemaStatement::DropColumn {
                                    table: table.name.clone(),
                                    column: info.name.clone(),
                                },
                            )
                            .column(&info.name),
                        );
                    }
                }
            }
        }

        let declared: Vec<IndexDefinition> =
            self.em.indices().iter().map(|i| i.definition()).collect();
        for index in &declared {
            let current = existing(&index.table)
                .and_then(|t| t.indices.iter().find(|i| i.name == index.name));
            match current {
                None => plan.push(create_index(index)),
                Some(info) if !same_index(info, index) => {
                    // recreated, so both halves need force
                    plan.push(drop_index(&index.table, &info.name));
                    let mut create = create_index(index)
                        .detail("recreated with new definition".to_string());
                    create.needs_force = true;
                    plan.push(create);
                }
                Some(_) => {}
            }
        }

        if options.drop {
            for table in tables {
                if !self.em.has_entity(&table.name) {
                    plan.push(Planned::new(
                        SchemaAction::DropTable,
                        &table.name,
                        SchemaStatement::DropTable {
                            table: table.name.clone(),
                        },
                    ));
                    continue;
                }
                for info in &table.indices {
                    if !declared.iter().any(|d| d.table == table.name && d.name == info.name) {
                        plan.push(drop_index(&table.name, &info.name));
                    }
                }
            }
        }

        plan.sort_by_key(|p| p.change.action.rank());
        plan
    }
}

fn create_index(index: &IndexDefinition) -> Planned {
    Planned::new(
        SchemaAction::CreateIndex,
        &index.table,
        SchemaStatement::CreateIndex(index.clone()),
    )
    .index(&index.name)
}

fn drop_index(table: &str, name: &str) -> Planned {
    Planned::new(
        SchemaAction::DropIndex,
        table,
        SchemaStatement::DropIndex {
            table: table.to_string(),
            name: name.to_string(),
        },
    )
    .index(name)
}

fn same_index(info: &IndexInfo, index: &IndexDefinition) -> bool {
    info.unique == index.unique && info.columns == index.columns
}
