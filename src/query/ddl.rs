//! Storage-neutral schema directives
//!
//! Fields produce [`ColumnDefinition`]s, entities [`TableDefinition`]s and
//! indices [`IndexDefinition`]s. Schema sync compares them with what the
//! backend reports and emits [`SchemaStatement`]s.

use serde::{Deserialize, Serialize};

/// Storage type tag of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Numeric,
    Text,
    Boolean,
    Date,
    DateTime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Numeric => "numeric",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
        }
    }

    /// Compare with a type tag reported by introspection
    pub fn matches(&self, reported: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(reported.trim())
    }
}

/// Referential action for relation columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "cascade",
            OnDelete::SetNull => "set null",
            OnDelete::Restrict => "restrict",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<OnDelete>,
}

/// Column directive produced by a field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKey>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary: false,
            references: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn references(mut self, foreign_key: ForeignKey) -> Self {
        self.references = Some(foreign_key);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn primary_column(&self) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.primary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDefinition {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// A single structural change applied to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaStatement {
    CreateTable(TableDefinition),
    AddColumn {
        table: String,
        column: ColumnDefinition,
    },
    /// Replace a column's type; existing values in that column are lost
    AlterColumn {
        table: String,
        column: ColumnDefinition,
    },
    DropColumn {
        table: String,
        column: String,
    },
    DropTable {
        table: String,
    },
    CreateIndex(IndexDefinition),
    DropIndex {
        table: String,
        name: String,
    },
}
