//! Schema Builder - desired schema snapshots from declared types
//!
//! Each property becomes one column, index and unique flags become named
//! indexes, and relations become foreign keys.

use std::sync::Arc;

use super::snapshot::{ColumnSchema, ForeignKeySchema, IndexSchema, SchemaSnapshot, TableSchema};
use crate::backends::SqlDialect;
use crate::schema::storage::default_literal;
use crate::schema::{PropertyDefinition, TypeSchema};

/// Snapshot of every given type, in the order given
pub fn desired_snapshot(schemas: &[Arc<TypeSchema>], dialect: SqlDialect) -> SchemaSnapshot {
    SchemaSnapshot::new(schemas.iter().map(|s| table_for(s, dialect)).collect())
}

/// Table a type is stored in
pub fn table_for(schema: &TypeSchema, dialect: SqlDialect) -> TableSchema {
    let mut table = TableSchema::new(schema.table.clone());

    for property in &schema.properties {
        table.columns.push(column_for(property, dialect));

        if let Some(index) = &property.index {
            table.indexes.push(IndexSchema {
                name: index.resolved_name("idx", &schema.table, &property.name),
                columns: vec![property.name.clone()],
                unique: false,
            });
        }
        if let Some(unique) = &property.unique {
            table.indexes.push(IndexSchema {
                name: unique.resolved_name("uniq", &schema.table, &property.name),
                columns: vec![property.name.clone()],
                unique: true,
            });
        }
    }

    for relation in &schema.relations {
        table.foreign_keys.push(ForeignKeySchema {
            name: Some(format!("fk_{}_{}", schema.table, identifier_part(&relation.identifier))),
            columns: vec![relation.local_column.clone()],
            foreign_table: relation.target_table.clone(),
            foreign_columns: vec![relation.target_column.clone()],
            on_update: relation.on_update.as_sql().to_string(),
            on_delete: relation.on_delete.as_sql().to_string(),
        });
    }

    table
}

fn column_for(property: &PropertyDefinition, dialect: SqlDialect) -> ColumnSchema {
    let mut column = ColumnSchema::new(
        property.name.clone(),
        property.storage.sql_type(dialect, &property.dimensions()),
    );
    // SQLite has nowhere to keep it
    if dialect == SqlDialect::PostgreSQL && !property.description.trim().is_empty() {
        column = column.comment(property.description.trim());
    }

    if property.autoincrement {
        return column.autoincrement();
    }
    if property.notnull {
        column = column.not_null();
    }
    // Generated defaults are evaluated per write and never reach the DDL
    if let Some(literal) = property
        .default
        .as_ref()
        .and_then(|d| d.literal())
        .and_then(|v| default_literal(v, dialect))
    {
        column = column.default_value(literal);
    }
    column
}

/// Relation identifiers may be namespaced; keep what is valid in a bare identifier
fn identifier_part(identifier: &str) -> String {
    identifier
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
