//! Schema snapshots
//!
//! Structural description of a database schema, produced either by
//! introspecting a live database or from declared types. Column types are
//! stored already rendered for the target dialect so snapshots compare
//! textually.

use serde::{Deserialize, Serialize};

/// A whole database schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn new(tables: Vec<TableSchema>) -> Self {
        Self { tables }
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub indexes: Vec<IndexSchema>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeySchema>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|i| i.name.eq_ignore_ascii_case(name))
    }

    /// The autoincrement column acting as primary key
    pub fn primary_column(&self) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.autoincrement)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Dialect-specific type, e.g. `VARCHAR(255)`
    pub sql_type: String,
    pub nullable: bool,
    /// Default rendered as an SQL literal
    pub default: Option<String>,
    #[serde(default)]
    pub autoincrement: bool,
    /// Column comment, written on PostgreSQL and never compared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            default: None,
            autoincrement: false,
            comment: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.comment = Some(text.into());
        self
    }

    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeySchema {
    /// SQLite does not report constraint names
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub foreign_table: String,
    pub foreign_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

impl ForeignKeySchema {
    /// Structural equality, ignoring the constraint name
    pub fn same_constraint(&self, other: &ForeignKeySchema) -> bool {
        fn eq_list(a: &[String], b: &[String]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
        }

        eq_list(&self.columns, &other.columns)
            && self.foreign_table.eq_ignore_ascii_case(&other.foreign_table)
            && eq_list(&self.foreign_columns, &other.foreign_columns)
            && normalize_action(&self.on_update) == normalize_action(&other.on_update)
            && normalize_action(&self.on_delete) == normalize_action(&other.on_delete)
    }
}

/// Referential actions compare case-insensitively, absent meaning `NO ACTION`
pub fn normalize_action(action: &str) -> String {
    let action = action.trim().to_uppercase();
    if action.is_empty() {
        "NO ACTION".to_string()
    } else {
        action
    }
}
