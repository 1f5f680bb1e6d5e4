//! SQL rendering of statements and schema directives
//!
//! Output targets SQLite: `?` placeholders and double-quoted identifiers.
//! Every statement the repository builds is also rendered here so that debug
//! responses can show the query, whichever backend runs it.

use serde::Serialize;
use serde_json::Value;

use super::ddl::{ColumnDefinition, SchemaStatement};
use super::filter::{Condition, Operator};
use super::statement::{
    ColumnRef, CountStatement, DeleteStatement, InsertStatement, JoinKind, SelectStatement,
    Source, UpdateStatement,
};

/// SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: Vec<Value>,
}

pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column(c: &ColumnRef) -> String {
    format!("{}.{}", quote(&c.table), quote(&c.column))
}

#[derive(Default)]
struct Builder {
    sql: String,
    parameters: Vec<Value>,
}

impl Builder {
    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn bind(&mut self, value: &Value) {
        self.sql.push('?');
        self.parameters.push(value.clone());
    }

    fn condition(&mut self, condition: &Condition) {
        match condition {
            Condition::And(all) => self.group(all, " and ", "1 = 1"),
            Condition::Or(any) => self.group(any, " or ", "0 = 1"),
            Condition::Compare { column: c, op, value } => {
                let col = column(c);
                match op {
                    Operator::IsNull => {
                        self.push(&col);
                        if value.as_bool().unwrap_or(true) {
                            self.push(" is null");
                        } else {
                            self.push(" is not null");
                        }
                    }
                    Operator::In | Operator::NotIn => {
                        let items = value.as_array().map(Vec::as_slice).unwrap_or(&[]);
                        if items.is_empty() {
                            self.push(if *op == Operator::In { "0 = 1" } else { "1 = 1" });
                            return;
                        }
                        self.push(&col);
                        self.push(if *op == Operator::In { " in (" } else { " not in (" });
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                self.push(", ");
                            }
                            self.bind(item);
                        }
                        self.push(")");
                    }
                    _ => {
                        let sql_op = match op {
                            Operator::Eq => " = ",
                            Operator::Ne => " <> ",
                            Operator::Gt => " > ",
                            Operator::Gte => " >= ",
                            Operator::Lt => " < ",
                            Operator::Lte => " <= ",
                            _ => " like ",
                        };
                        self.push(&col);
                        self.push(sql_op);
                        self.bind(value);
                    }
                }
            }
        }
    }

    fn group(&mut self, conditions: &[Condition], separator: &str, empty: &str) {
        if conditions.is_empty() {
            self.push(empty);
            return;
        }
        self.push("(");
        for (i, c) in conditions.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.condition(c);
        }
        self.push(")");
    }

    fn source(&mut self, source: &Source) {
        self.push(" from ");
        self.push(&quote(&source.table));
        self.push(" as ");
        self.push(&quote(&source.alias));
        for join in &source.joins {
            self.push(match join.kind {
                JoinKind::Inner => " inner join ",
                JoinKind::Left => " left join ",
            });
            self.push(&format!(
                "{} as {} on {} = {}",
                quote(&join.table),
                quote(&join.alias),
                column(&join.left),
                column(&join.right)
            ));
        }
        if let Some(filter) = &source.filter {
            self.push(" where ");
            self.condition(filter);
        }
    }

    fn finish(self) -> CompiledQuery {
        CompiledQuery {
            sql: self.sql,
            parameters: self.parameters,
        }
    }
}

pub fn compile_select(statement: &SelectStatement) -> CompiledQuery {
    let mut b = Builder::default();
    let columns: Vec<String> = statement
        .columns
        .iter()
        .map(|c| format!("{} as {}", column(&c.source), quote(&c.alias)))
        .collect();
    b.push("select ");
    b.push(&columns.join(", "));
    b.source(&statement.source);

    if !statement.order_by.is_empty() {
        let order: Vec<String> = statement
            .order_by
            .iter()
            .map(|o| format!("{} {}", column(&o.column), o.dir.as_sql()))
            .collect();
        b.push(" order by ");
        b.push(&order.join(", "));
    }
    if let Some(limit) = statement.limit {
        b.push(" limit ");
        b.bind(&Value::from(limit as u64));
        b.push(" offset ");
        b.bind(&Value::from(statement.offset as u64));
    }
    b.finish()
}

pub fn compile_count(statement: &CountStatement) -> CompiledQuery {
    let mut b = Builder::default();
    b.push("select count(*) as \"count\"");
    b.source(&statement.source);
    b.finish()
}

/// One `insert` per row, since rows may carry different columns
pub fn compile_insert(statement: &InsertStatement) -> Vec<CompiledQuery> {
    statement
        .rows
        .iter()
        .map(|row| {
            let mut b = Builder::default();
            b.push("insert into ");
            b.push(&quote(&statement.table));
            if row.is_empty() {
                b.push(" default values");
                return b.finish();
            }
            let names: Vec<String> = row.keys().map(|k| quote(k)).collect();
            b.push(&format!(" ({}) values (", names.join(", ")));
            for (i, value) in row.values().enumerate() {
                if i > 0 {
                    b.push(", ");
                }
                b.bind(value);
            }
            b.push(")");
            b.finish()
        })
        .collect()
}

pub fn compile_update(statement: &UpdateStatement) -> CompiledQuery {
    let mut b = Builder::default();
    b.push("update ");
    b.push(&quote(&statement.table));
    b.push(" set ");
    for (i, (name, value)) in statement.values.iter().enumerate() {
        if i > 0 {
            b.push(", ");
        }
        b.push(&quote(name));
        b.push(" = ");
        b.bind(value);
    }
    b.push(" where ");
    b.push(&quote(&statement.primary));
    b.push(" = ");
    b.bind(&Value::from(statement.id));
    b.finish()
}

pub fn compile_delete(statement: &DeleteStatement) -> CompiledQuery {
    let mut b = Builder::default();
    b.push("delete from ");
    b.push(&quote(&statement.table));
    b.push(" where ");
    b.condition(&statement.filter);
    b.finish()
}

fn column_sql(column: &ColumnDefinition) -> String {
    let mut sql = format!("{} {}", quote(&column.name), column.column_type.as_str());
    if column.primary {
        sql.push_str(" primary key autoincrement");
    }
    if let Some(fk) = &column.references {
        sql.push_str(&format!(" references {}({})", quote(&fk.table), quote(&fk.column)));
        if let Some(action) = fk.on_delete {
            sql.push_str(" on delete ");
            sql.push_str(action.as_sql());
        }
    }
    sql
}

/// DDL for one schema statement
///
/// SQLite cannot change a column's type in place, so an alteration drops and
/// re-adds the column.
pub fn compile_schema(statement: &SchemaStatement) -> Vec<String> {
    match statement {
        SchemaStatement::CreateTable(table) => {
            let columns: Vec<String> = table.columns.iter().map(column_sql).collect();
            vec![format!(
                "create table {} ({})",
                quote(&table.name),
                columns.join(", ")
            )]
        }
        SchemaStatement::AddColumn { table, column } => vec![format!(
            "alter table {} add column {}",
            quote(table),
            column_sql(column)
        )],
        SchemaStatement::AlterColumn { table, column } => vec![
            format!(
                "alter table {} drop column {}",
                quote(table),
                quote(&column.name)
            ),
            format!(
                "alter table {} add column {}",
                quote(table),
                column_sql(column)
            ),
        ],
        SchemaStatement::DropColumn { table, column } => vec![format!(
            "alter table {} drop column {}",
            quote(table),
            quote(column)
        )],
        SchemaStatement::DropTable { table } => vec![format!("drop table {}", quote(table))],
        SchemaStatement::CreateIndex(index) => {
            let columns: Vec<String> = index.columns.iter().map(|c| quote(c)).collect();
            vec![format!(
                "create {}index {} on {} ({})",
                if index.unique { "unique " } else { "" },
                quote(&index.name),
                quote(&index.table),
                columns.join(", ")
            )]
        }
        SchemaStatement::DropIndex { name, .. } => vec![format!("drop index {}", quote(name))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ddl::{ColumnType, ForeignKey, IndexDefinition, OnDelete, TableDefinition};
    use crate::query::statement::{JoinClause, OrderBy, SelectColumn, SortDir};
    use serde_json::json;

    #[test]
    fn test_select_with_join_filter_and_paging() {
        let mut source = Source::table("comments");
        source.joins.push(JoinClause {
            kind: JoinKind::Left,
            table: "posts".to_string(),
            alias: "posts".to_string(),
            left: ColumnRef::new("posts", "id"),
            right: ColumnRef::new("comments", "post_id"),
        });
        source.and_where(Condition::compare(
            ColumnRef::new("comments", "id"),
            Operator::In,
            json!([1, 2]),
        ));
        let statement = SelectStatement {
            source,
            columns: vec![
                SelectColumn::new("comments", "id", "id"),
                SelectColumn::new("posts", "title", "posts.title"),
            ],
            order_by: vec![OrderBy {
                column: ColumnRef::new("comments", "id"),
                dir: SortDir::Desc,
            }],
            limit: Some(10),
            offset: 20,
        };

        let compiled = compile_select(&statement);
        assert_eq!(
            compiled.sql,
            "select \"comments\".\"id\" as \"id\", \"posts\".\"title\" as \"posts.title\" \
             from \"comments\" as \"comments\" \
             left join \"posts\" as \"posts\" on \"posts\".\"id\" = \"comments\".\"post_id\" \
             where \"comments\".\"id\" in (?, ?) order by \"comments\".\"id\" desc limit ? offset ?"
        );
        assert_eq!(compiled.parameters, vec![json!(1), json!(2), json!(10), json!(20)]);
    }

    #[test]
    fn test_count_with_nested_conditions() {
        let mut source = Source::table("todos");
        source.and_where(Condition::Or(vec![
            Condition::eq(ColumnRef::new("todos", "done"), false),
            Condition::compare(ColumnRef::new("todos", "title"), Operator::IsNull, json!(true)),
        ]));
        let compiled = compile_count(&CountStatement { source });
        assert_eq!(
            compiled.sql,
            "select count(*) as \"count\" from \"todos\" as \"todos\" \
             where (\"todos\".\"done\" = ? or \"todos\".\"title\" is null)"
        );
        assert_eq!(compiled.parameters, vec![json!(false)]);
    }

    #[test]
    fn test_empty_in_list() {
        let mut source = Source::table("todos");
        source.and_where(Condition::compare(
            ColumnRef::new("todos", "id"),
            Operator::In,
            json!([]),
        ));
        let compiled = compile_count(&CountStatement { source });
        assert!(compiled.sql.ends_with("where 0 = 1"));
    }

    #[test]
    fn test_insert_and_update() {
        let mut row = crate::query::statement::Row::new();
        row.insert("title".to_string(), json!("a"));
        row.insert("done".to_string(), json!(false));
        let inserts = compile_insert(&InsertStatement {
            table: "todos".to_string(),
            primary: "id".to_string(),
            rows: vec![row.clone(), Default::default()],
        });
        assert_eq!(inserts[0].sql, "insert into \"todos\" (\"title\", \"done\") values (?, ?)");
        assert_eq!(inserts[1].sql, "insert into \"todos\" default values");

        let update = compile_update(&UpdateStatement {
            table: "todos".to_string(),
            primary: "id".to_string(),
            id: 4,
            values: row,
        });
        assert_eq!(
            update.sql,
            "update \"todos\" set \"title\" = ?, \"done\" = ? where \"id\" = ?"
        );
        assert_eq!(update.parameters[2], json!(4));
    }

    #[test]
    fn test_schema_statements() {
        let create = compile_schema(&SchemaStatement::CreateTable(TableDefinition {
            name: "comments".to_string(),
            columns: vec![
                ColumnDefinition::new("id", ColumnType::Integer).primary(),
                ColumnDefinition::new("post_id", ColumnType::Integer).references(ForeignKey {
                    table: "posts".to_string(),
                    column: "id".to_string(),
                    on_delete: Some(OnDelete::Cascade),
                }),
            ],
        }));
        assert_eq!(
            create[0],
            "create table \"comments\" (\"id\" integer primary key autoincrement, \
             \"post_id\" integer references \"posts\"(\"id\") on delete cascade)"
        );

        let index = compile_schema(&SchemaStatement::CreateIndex(IndexDefinition {
            name: "idx_comments_post_id".to_string(),
            table: "comments".to_string(),
            columns: vec!["post_id".to_string()],
            unique: true,
        }));
        assert_eq!(
            index[0],
            "create unique index \"idx_comments_post_id\" on \"comments\" (\"post_id\")"
        );

        let alter = compile_schema(&SchemaStatement::AlterColumn {
            table: "todos".to_string(),
            column: ColumnDefinition::new("done", ColumnType::Boolean),
        });
        assert_eq!(alter.len(), 2);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
