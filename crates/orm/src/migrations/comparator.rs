//! Schema comparison
//!
//! Computes the structural delta that turns an actual schema into the
//! desired one. Diffs are serializable; a saved migration stores one.

use serde::{Deserialize, Serialize};

use super::snapshot::{ColumnSchema, ForeignKeySchema, IndexSchema, SchemaSnapshot, TableSchema};

/// Created, altered and dropped tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDiff {
    #[serde(default)]
    pub created: Vec<TableSchema>,
    #[serde(default)]
    pub altered: Vec<TableDiff>,
    #[serde(default)]
    pub dropped: Vec<TableSchema>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.altered.is_empty() && self.dropped.is_empty()
    }

    /// Diff undoing this one
    pub fn reversed(&self) -> SchemaDiff {
        SchemaDiff {
            created: self.dropped.clone(),
            altered: self.altered.iter().rev().map(TableDiff::reversed).collect(),
            dropped: self.created.clone(),
        }
    }

    /// Steps whose data cannot be recovered once applied
    pub fn data_loss(&self) -> Vec<String> {
        let mut steps: Vec<String> = self
            .dropped
            .iter()
            .map(|t| format!("drop table {} and every row in it", t.name))
            .collect();
        for table in &self.altered {
            for column in &table.dropped_columns {
                steps.push(format!("drop column {}.{} and its values", table.name, column.name));
            }
        }
        steps
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }
}

/// Old and new definition of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChange {
    pub from: ColumnSchema,
    pub to: ColumnSchema,
}

/// Changes to one existing table
///
/// Both full table definitions are kept so a rebuild or a reversal does not
/// need to introspect again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDiff {
    pub name: String,
    pub from: TableSchema,
    pub to: TableSchema,
    #[serde(default)]
    pub added_columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub changed_columns: Vec<ColumnChange>,
    #[serde(default)]
    pub dropped_columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub added_indexes: Vec<IndexSchema>,
    #[serde(default)]
    pub dropped_indexes: Vec<IndexSchema>,
    #[serde(default)]
    pub added_foreign_keys: Vec<ForeignKeySchema>,
    #[serde(default)]
    pub dropped_foreign_keys: Vec<ForeignKeySchema>,
}

impl TableDiff {
    fn between(from: &TableSchema, to: &TableSchema) -> TableDiff {
        let mut diff = TableDiff {
            name: to.name.clone(),
            from: from.clone(),
            to: to.clone(),
            added_columns: Vec::new(),
            changed_columns: Vec::new(),
            dropped_columns: Vec::new(),
            added_indexes: Vec::new(),
            dropped_indexes: Vec::new(),
            added_foreign_keys: Vec::new(),
            dropped_foreign_keys: Vec::new(),
        };

        for column in &to.columns {
            match from.column(&column.name) {
                None => diff.added_columns.push(column.clone()),
                Some(existing) if !same_column(existing, column) => diff.changed_columns.push(ColumnChange {
                    from: existing.clone(),
                    to: column.clone(),
                }),
                Some(_) => {}
            }
        }
        diff.dropped_columns = from
            .columns
            .iter()
            .filter(|c| to.column(&c.name).is_none())
            .cloned()
            .collect();

        for index in &to.indexes {
            match from.index(&index.name) {
                Some(existing) if same_index(existing, index) => {}
                Some(existing) => {
                    diff.dropped_indexes.push(existing.clone());
                    diff.added_indexes.push(index.clone());
                }
                None => diff.added_indexes.push(index.clone()),
            }
        }
        diff.dropped_indexes.extend(
            from.indexes
                .iter()
                .filter(|i| to.index(&i.name).is_none())
                .cloned(),
        );

        diff.added_foreign_keys = to
            .foreign_keys
            .iter()
            .filter(|fk| !from.foreign_keys.iter().any(|e| e.same_constraint(fk)))
            .cloned()
            .collect();
        diff.dropped_foreign_keys = from
            .foreign_keys
            .iter()
            .filter(|fk| !to.foreign_keys.iter().any(|d| d.same_constraint(fk)))
            .cloned()
            .collect();

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.changed_columns.is_empty()
            && self.dropped_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.dropped_indexes.is_empty()
            && self.added_foreign_keys.is_empty()
            && self.dropped_foreign_keys.is_empty()
    }

    pub fn reversed(&self) -> TableDiff {
        TableDiff {
            name: self.from.name.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
            added_columns: self.dropped_columns.clone(),
            changed_columns: self
                .changed_columns
                .iter()
                .map(|c| ColumnChange {
                    from: c.to.clone(),
                    to: c.from.clone(),
                })
                .collect(),
            dropped_columns: self.added_columns.clone(),
            added_indexes: self.dropped_indexes.clone(),
            dropped_indexes: self.added_indexes.clone(),
            added_foreign_keys: self.dropped_foreign_keys.clone(),
            dropped_foreign_keys: self.added_foreign_keys.clone(),
        }
    }
}

/// Compares an actual snapshot against a desired one
#[derive(Debug, Clone, Copy)]
pub struct SchemaComparator {
    drop_undeclared: bool,
}

impl SchemaComparator {
    /// Whole-database comparison; live tables nobody declares are dropped
    pub fn database() -> Self {
        Self { drop_undeclared: true }
    }

    /// Comparison scoped to the declared tables, never dropping a table
    pub fn tables() -> Self {
        Self { drop_undeclared: false }
    }

    pub fn compare(&self, actual: &SchemaSnapshot, desired: &SchemaSnapshot) -> SchemaDiff {
        let mut diff = SchemaDiff::default();

        for table in &desired.tables {
            match actual.table(&table.name) {
                None => diff.created.push(table.clone()),
                Some(existing) => {
                    let changes = TableDiff::between(existing, table);
                    if !changes.is_empty() {
                        diff.altered.push(changes);
                    }
                }
            }
        }

        if self.drop_undeclared {
            diff.dropped = actual
                .tables
                .iter()
                .filter(|t| !desired.has_table(&t.name))
                .cloned()
                .collect();
        }

        tracing::debug!(
            created = diff.created.len(),
            altered = diff.altered.len(),
            dropped = diff.dropped.len(),
            "schema compared"
        );
        diff
    }
}

fn normalize_type(sql_type: &str) -> String {
    sql_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

fn normalize_default(default: Option<&str>) -> Option<String> {
    let mut value = default?.trim();
    // Engines may report a default wrapped in parentheses
    while value.len() >= 2 && value.starts_with('(') && value.ends_with(')') {
        value = value[1..value.len() - 1].trim();
    }
    if value.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(value.to_string())
}

fn same_column(a: &ColumnSchema, b: &ColumnSchema) -> bool {
    normalize_type(&a.sql_type) == normalize_type(&b.sql_type)
        && a.nullable == b.nullable
        && a.autoincrement == b.autoincrement
        && normalize_default(a.default.as_deref()) == normalize_default(b.default.as_deref())
}

fn same_index(a: &IndexSchema, b: &IndexSchema) -> bool {
    a.unique == b.unique
        && a.columns.len() == b.columns.len()
        && a.columns.iter().zip(&b.columns).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_table() -> TableSchema {
        let mut table = TableSchema::new("post");
        table.columns = vec![
            ColumnSchema::new("id", "INTEGER").autoincrement(),
            ColumnSchema::new("title", "VARCHAR(120)").not_null(),
        ];
        table.indexes = vec![IndexSchema {
            name: "idx_post_title".to_string(),
            columns: vec!["title".to_string()],
            unique: false,
        }];
        table
    }

    #[test]
    fn test_identical_snapshots_have_empty_diff() {
        let snapshot = SchemaSnapshot::new(vec![post_table()]);
        let diff = SchemaComparator::database().compare(&snapshot, &snapshot.clone());
        assert!(diff.is_empty());
    }

    #[test]
    fn test_created_and_dropped_tables() {
        let actual = SchemaSnapshot::new(vec![TableSchema::new("legacy")]);
        let desired = SchemaSnapshot::new(vec![post_table()]);

        let diff = SchemaComparator::database().compare(&actual, &desired);
        assert_eq!(diff.created.len(), 1);
        assert_eq!(diff.dropped[0].name, "legacy");

        let scoped = SchemaComparator::tables().compare(&actual, &desired);
        assert!(scoped.dropped.is_empty());
    }

    #[test]
    fn test_altered_columns_and_indexes() {
        let actual = SchemaSnapshot::new(vec![post_table()]);
        let mut wanted = post_table();
        wanted.columns[1] = ColumnSchema::new("title", "varchar(200)").not_null();
        wanted.columns.push(ColumnSchema::new("body", "TEXT"));
        wanted.indexes.clear();
        let desired = SchemaSnapshot::new(vec![wanted]);

        let diff = SchemaComparator::database().compare(&actual, &desired);
        let table = &diff.altered[0];
        assert_eq!(table.added_columns[0].name, "body");
        assert_eq!(table.changed_columns[0].to.sql_type, "varchar(200)");
        assert_eq!(table.dropped_indexes[0].name, "idx_post_title");
        assert!(table.dropped_columns.is_empty());
    }

    #[test]
    fn test_defaults_compare_loosely() {
        let a = ColumnSchema::new("status", "SMALLINT").default_value("(0)");
        let b = ColumnSchema::new("status", "smallint").default_value("0");
        assert!(same_column(&a, &b));
        assert!(!same_column(&a, &ColumnSchema::new("status", "SMALLINT")));
    }

    #[test]
    fn test_foreign_keys_match_without_names() {
        let fk = ForeignKeySchema {
            name: Some("fk_post_author".to_string()),
            columns: vec!["author_id".to_string()],
            foreign_table: "author".to_string(),
            foreign_columns: vec!["id".to_string()],
            on_update: "CASCADE".to_string(),
            on_delete: "CASCADE".to_string(),
        };
        let mut actual = post_table();
        actual.foreign_keys.push(ForeignKeySchema { name: None, ..fk.clone() });
        let mut desired = post_table();
        desired.foreign_keys.push(fk);

        let diff = SchemaComparator::database()
            .compare(&SchemaSnapshot::new(vec![actual]), &SchemaSnapshot::new(vec![desired]));
        assert!(diff.is_empty());
    }

    #[test]
    fn test_reversed_diff_and_data_loss() {
        let actual = SchemaSnapshot::new(vec![TableSchema::new("legacy")]);
        let mut wanted = post_table();
        wanted.columns.push(ColumnSchema::new("body", "TEXT"));
        let desired = SchemaSnapshot::new(vec![wanted, TableSchema::new("legacy")]);
        let current = SchemaSnapshot::new(vec![post_table(), TableSchema::new("legacy")]);

        let diff = SchemaComparator::database().compare(&current, &desired);
        let reversed = diff.reversed();
        assert_eq!(reversed.altered[0].dropped_columns[0].name, "body");
        assert_eq!(reversed.data_loss(), vec!["drop column post.body and its values".to_string()]);

        let creation = SchemaComparator::database().compare(&actual, &SchemaSnapshot::new(vec![post_table()]));
        assert_eq!(creation.reversed().dropped[0].name, "post");
        assert_eq!(creation.reversed().created[0].name, "legacy");
    }

    #[test]
    fn test_diff_serializes() {
        let diff = SchemaComparator::database()
            .compare(&SchemaSnapshot::default(), &SchemaSnapshot::new(vec![post_table()]));
        let json = diff.to_json().unwrap();
        assert_eq!(SchemaDiff::from_json(&json).unwrap(), diff);
    }
}
