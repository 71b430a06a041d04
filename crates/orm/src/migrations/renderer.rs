//! DDL rendering
//!
//! Turns a schema diff into the statements that apply it. Statements are
//! returned in execution order and executed one at a time.

use super::comparator::{SchemaDiff, TableDiff};
use super::snapshot::{ColumnSchema, ForeignKeySchema, IndexSchema, TableSchema};
use crate::backends::SqlDialect;

/// Prefix of the copy kept while SQLite rebuilds a table
pub const REBUILD_PREFIX: &str = "__temp__";

pub fn render(diff: &SchemaDiff, dialect: SqlDialect) -> Vec<String> {
    match dialect {
        SqlDialect::SQLite => render_sqlite(diff),
        SqlDialect::PostgreSQL => render_postgres(diff),
    }
}

fn render_sqlite(diff: &SchemaDiff) -> Vec<String> {
    let mut statements = Vec::new();

    for table in &diff.created {
        statements.push(create_table(table, SqlDialect::SQLite, true));
        statements.extend(table.indexes.iter().map(|i| create_index(&table.name, i)));
    }

    for table in &diff.altered {
        if needs_rebuild(table) {
            statements.extend(rebuild_table(table));
            continue;
        }
        statements.extend(table.dropped_indexes.iter().map(drop_index));
        for column in &table.added_columns {
            statements.push(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table.name,
                column_definition(column, SqlDialect::SQLite)
            ));
        }
        statements.extend(table.added_indexes.iter().map(|i| create_index(&table.name, i)));
    }

    statements.extend(diff.dropped.iter().map(|t| format!("DROP TABLE {}", t.name)));
    statements
}

/// Whether SQLite can only apply the change by recreating the table
fn needs_rebuild(table: &TableDiff) -> bool {
    !table.changed_columns.is_empty()
        || !table.dropped_columns.is_empty()
        || !table.added_foreign_keys.is_empty()
        || !table.dropped_foreign_keys.is_empty()
        || table
            .added_columns
            .iter()
            .any(|c| c.autoincrement || (!c.nullable && c.default.is_none()))
}

/// Copy aside, drop, create, copy back
///
/// Foreign key enforcement is off for the duration so dropping the table
/// does not cascade into rows that reference it. The references are checked
/// once the copy is back.
fn rebuild_table(table: &TableDiff) -> Vec<String> {
    let temporary = format!("{}{}", REBUILD_PREFIX, table.name);
    let shared: Vec<&str> = table
        .to
        .columns
        .iter()
        .filter(|c| table.from.column(&c.name).is_some())
        .map(|c| c.name.as_str())
        .collect();

    let mut statements = vec![
        "PRAGMA foreign_keys = OFF".to_string(),
        format!("CREATE TABLE {} AS SELECT * FROM {}", temporary, table.from.name),
        format!("DROP TABLE {}", table.from.name),
        create_table(&table.to, SqlDialect::SQLite, true),
    ];
    if !shared.is_empty() {
        let columns = shared.join(", ");
        statements.push(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            table.to.name, columns, columns, temporary
        ));
    }
    statements.push(format!("DROP TABLE {}", temporary));
    statements.extend(table.to.indexes.iter().map(|i| create_index(&table.to.name, i)));
    statements.push("PRAGMA foreign_key_check".to_string());
    statements.push("PRAGMA foreign_keys = ON".to_string());
    statements
}

fn render_postgres(diff: &SchemaDiff) -> Vec<String> {
    let mut statements = Vec::new();
    // Foreign keys go last so tables may reference each other in any order
    let mut foreign_keys = Vec::new();

    for table in &diff.created {
        statements.push(create_table(table, SqlDialect::PostgreSQL, false));
        statements.extend(table.columns.iter().filter_map(|c| comment_on_column(&table.name, c)));
        statements.extend(table.indexes.iter().map(|i| create_index(&table.name, i)));
        foreign_keys.extend(table.foreign_keys.iter().map(|fk| add_foreign_key(&table.name, fk)));
    }

    for table in &diff.altered {
        for fk in &table.dropped_foreign_keys {
            if let Some(name) = &fk.name {
                statements.push(format!("ALTER TABLE {} DROP CONSTRAINT {}", table.name, name));
            }
        }
        statements.extend(table.dropped_indexes.iter().map(drop_index));
        for column in &table.added_columns {
            statements.push(format!(
                "ALTER TABLE {} ADD COLUMN {}",
                table.name,
                column_definition(column, SqlDialect::PostgreSQL)
            ));
            statements.extend(comment_on_column(&table.name, column));
        }
        for change in &table.changed_columns {
            statements.extend(alter_column(&table.name, &change.from, &change.to));
        }
        for column in &table.dropped_columns {
            statements.push(format!("ALTER TABLE {} DROP COLUMN {}", table.name, column.name));
        }
        statements.extend(table.added_indexes.iter().map(|i| create_index(&table.name, i)));
        foreign_keys.extend(table.added_foreign_keys.iter().map(|fk| add_foreign_key(&table.name, fk)));
    }

    statements.extend(diff.dropped.iter().map(|t| format!("DROP TABLE {}", t.name)));
    statements.extend(foreign_keys);
    statements
}

fn comment_on_column(table: &str, column: &ColumnSchema) -> Option<String> {
    let comment = column.comment.as_ref()?;
    Some(format!(
        "COMMENT ON COLUMN {}.{} IS '{}'",
        table,
        column.name,
        comment.replace('\'', "''")
    ))
}

fn alter_column(table: &str, from: &ColumnSchema, to: &ColumnSchema) -> Vec<String> {
    let mut statements = Vec::new();
    let prefix = format!("ALTER TABLE {} ALTER COLUMN {}", table, to.name);

    if !from.sql_type.eq_ignore_ascii_case(&to.sql_type) {
        statements.push(format!("{} TYPE {} USING {}::{}", prefix, to.sql_type, to.name, to.sql_type));
    }
    if from.nullable != to.nullable {
        let action = if to.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
        statements.push(format!("{} {}", prefix, action));
    }
    if from.default != to.default {
        match &to.default {
            Some(default) => statements.push(format!("{} SET DEFAULT {}", prefix, default)),
            None => statements.push(format!("{} DROP DEFAULT", prefix)),
        }
    }
    statements
}

fn create_table(table: &TableSchema, dialect: SqlDialect, inline_foreign_keys: bool) -> String {
    let mut definitions: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_definition(c, dialect))
        .collect();

    if inline_foreign_keys {
        definitions.extend(table.foreign_keys.iter().map(foreign_key_clause));
    }

    format!("CREATE TABLE {} ({})", table.name, definitions.join(", "))
}

fn column_definition(column: &ColumnSchema, dialect: SqlDialect) -> String {
    if column.autoincrement {
        return match dialect {
            SqlDialect::SQLite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", column.name),
            SqlDialect::PostgreSQL => {
                let serial = match column.sql_type.to_uppercase().as_str() {
                    "BIGINT" => "BIGSERIAL",
                    "SMALLINT" => "SMALLSERIAL",
                    _ => "SERIAL",
                };
                format!("{} {} PRIMARY KEY", column.name, serial)
            }
        };
    }

    let mut definition = format!("{} {}", column.name, column.sql_type);
    if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        definition.push_str(" DEFAULT ");
        definition.push_str(default);
    }
    definition
}

fn foreign_key_clause(fk: &ForeignKeySchema) -> String {
    let constraint = fk
        .name
        .as_ref()
        .map(|name| format!("CONSTRAINT {} ", name))
        .unwrap_or_default();
    format!(
        "{}FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
        constraint,
        fk.columns.join(", "),
        fk.foreign_table,
        fk.foreign_columns.join(", "),
        action(&fk.on_update),
        action(&fk.on_delete)
    )
}

fn add_foreign_key(table: &str, fk: &ForeignKeySchema) -> String {
    format!("ALTER TABLE {} ADD {}", table, foreign_key_clause(fk))
}

fn action(value: &str) -> String {
    super::snapshot::normalize_action(value)
}

fn create_index(table: &str, index: &IndexSchema) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        index.name,
        table,
        index.columns.join(", ")
    )
}

fn drop_index(index: &IndexSchema) -> String {
    format!("DROP INDEX {}", index.name)
}
