//! Migration Definitions - records, generated migrations and run reports

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::comparator::SchemaDiff;
use super::record;
use crate::backends::SqlDialect;
use crate::error::{OrmError, OrmResult, StatementFailure};
use crate::schema::{FieldValue, Type};

/// Application status of a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    Pending,
    Done,
}

impl MigrationStatus {
    /// Stored column value
    pub fn as_i64(&self) -> i64 {
        match self {
            MigrationStatus::Pending => 0,
            MigrationStatus::Done => 1,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        if value == 0 {
            MigrationStatus::Pending
        } else {
            MigrationStatus::Done
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStatus::Pending => write!(f, "Pending"),
            MigrationStatus::Done => write!(f, "Done"),
        }
    }
}

/// A saved migration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub name: String,
    /// Database the diff applies to
    pub database: String,
    pub diff: SchemaDiff,
    pub status: MigrationStatus,
    pub tag: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MigrationRecord {
    /// Read a hydrated migration Type
    pub fn from_type(record: &Type) -> OrmResult<Self> {
        let text = |key: &str| -> OrmResult<String> {
            Ok(record.get(key)?.as_str().unwrap_or_default().to_string())
        };
        let timestamp = |key: &str| -> OrmResult<Option<DateTime<Utc>>> {
            Ok(match record.get(key)? {
                FieldValue::DateTime(value) => Some(*value),
                _ => None,
            })
        };

        let name = text(record::NAME)?;
        let diff = SchemaDiff::from_json(&text(record::DIFF)?).map_err(|e| {
            OrmError::Serialization(format!("diff of migration '{}' cannot be read: {}", name, e))
        })?;

        Ok(Self {
            id: record.get(record::ID)?.as_i64().unwrap_or_default(),
            database: text(record::DATABASE)?,
            diff,
            status: MigrationStatus::from_i64(record.get(record::STATUS)?.as_i64().unwrap_or_default()),
            tag: text(record::TAG)?,
            created_at: timestamp(record::CREATED_AT)?,
            updated_at: timestamp(record::UPDATED_AT)?,
            name,
        })
    }

    pub fn is_done(&self) -> bool {
        self.status == MigrationStatus::Done
    }
}

/// Diff produced by a generate step, with its DDL preview
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMigration {
    pub database: String,
    pub dialect: SqlDialect,
    pub diff: SchemaDiff,
    pub statements: Vec<String>,
}

impl GeneratedMigration {
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }
}

/// Outcome of applying or reverting a migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub name: String,
    /// Statements that succeeded, in order
    pub executed: Vec<String>,
    pub failures: Vec<StatementFailure>,
    /// Nothing was executed because the migration was already in the target state
    pub skipped: bool,
}

impl RunReport {
    pub(crate) fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            skipped: true,
            ..Default::default()
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// The report as an error when any statement failed
    pub fn into_result(self) -> OrmResult<RunReport> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(OrmError::MigrationPartiallyApplied {
                name: self.name,
                failures: self.failures,
            })
        }
    }
}

/// Reverse of an applied migration, for review before it is executed
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackPlan {
    pub name: String,
    pub database: String,
    pub diff: SchemaDiff,
    pub statements: Vec<String>,
    /// Steps whose data cannot be brought back
    pub irreversible: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::record::{record_schema, MIGRATION_TYPE};
    use crate::schema::SchemaRegistry;

    #[test]
    fn test_status_mapping() {
        assert_eq!(MigrationStatus::from_i64(0), MigrationStatus::Pending);
        assert_eq!(MigrationStatus::from_i64(1), MigrationStatus::Done);
        assert_eq!(MigrationStatus::Done.as_i64(), 1);
        assert_eq!(MigrationStatus::Pending.to_string(), "Pending");
    }

    #[test]
    fn test_record_from_type() {
        let registry = SchemaRegistry::new(record_schema("blog").unwrap());
        let record = registry
            .instantiate(MIGRATION_TYPE)
            .unwrap()
            .with(record::ID, 4)
            .unwrap()
            .with(record::NAME, "2024-init")
            .unwrap()
            .with(record::DATABASE, "blog")
            .unwrap()
            .with(record::DIFF, "{}")
            .unwrap()
            .with(record::STATUS, 1)
            .unwrap()
            .with(record::TAG, "abc")
            .unwrap();

        let migration = MigrationRecord::from_type(&record).unwrap();
        assert_eq!(migration.id, 4);
        assert_eq!(migration.name, "2024-init");
        assert!(migration.diff.is_empty());
        assert!(migration.is_done());
        assert_eq!(migration.created_at, None);
    }

    #[test]
    fn test_unreadable_diff() {
        let registry = SchemaRegistry::new(record_schema("blog").unwrap());
        let record = registry
            .instantiate(MIGRATION_TYPE)
            .unwrap()
            .with(record::NAME, "broken")
            .unwrap()
            .with(record::DIFF, "not json")
            .unwrap();

        assert!(matches!(
            MigrationRecord::from_type(&record),
            Err(OrmError::Serialization(_))
        ));
    }

    #[test]
    fn test_report_into_result() {
        let mut report = RunReport {
            name: "m".to_string(),
            ..Default::default()
        };
        assert!(report.clone().into_result().is_ok());

        report.failures.push(StatementFailure {
            statement: "DROP TABLE nope".to_string(),
            reason: "no such table".to_string(),
        });
        match report.into_result() {
            Err(OrmError::MigrationPartiallyApplied { failures, .. }) => assert_eq!(failures.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
