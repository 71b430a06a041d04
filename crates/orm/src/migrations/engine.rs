//! Migration engine
//!
//! Generates a diff between the declared types and a live database, saves
//! it as a migration record and applies it. Every statement of a run is
//! attempted; a migration is only marked done when all of them succeed.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tokio::sync::{Mutex, MutexGuard};

use super::comparator::{SchemaComparator, SchemaDiff};
use super::definitions::{GeneratedMigration, MigrationRecord, MigrationStatus, RunReport};
use super::record::{self, MIGRATION_TYPE};
use super::renderer::render;
use super::schema_builder::{desired_snapshot, table_for};
use super::snapshot::SchemaSnapshot;
use crate::backends::DatabaseConnection;
use crate::context::DataContext;
use crate::error::{OrmError, OrmResult, StatementFailure};
use crate::schema::{FieldValue, TypeSchema};

pub struct MigrationEngine<'a> {
    ctx: &'a DataContext,
    records: Arc<TypeSchema>,
    run_guard: Mutex<()>,
}

impl<'a> MigrationEngine<'a> {
    /// Engine storing records in the database the migration type belongs to
    pub fn new(ctx: &'a DataContext) -> OrmResult<Self> {
        let records = ctx.registry().resolve(MIGRATION_TYPE)?;
        Ok(Self {
            ctx,
            records,
            run_guard: Mutex::new(()),
        })
    }

    pub(crate) fn context(&self) -> &'a DataContext {
        self.ctx
    }

    /// Database holding the migration records
    pub fn records_database(&self) -> &str {
        &self.records.database
    }

    /// Create the migration record table if it is missing
    ///
    /// Returns whether the table was created.
    pub async fn setup(&self) -> OrmResult<bool> {
        let connection = self.ctx.connection(&self.records.database).await?;
        if connection.introspect_table(&self.records.table).await?.is_some() {
            tracing::debug!(table = %self.records.table, "migration table already present");
            return Ok(false);
        }

        let diff = SchemaDiff {
            created: vec![table_for(&self.records, connection.dialect())],
            ..Default::default()
        };
        for statement in render(&diff, connection.dialect()) {
            connection.execute(&statement, &[]).await?;
        }

        tracing::info!(database = %self.records.database, table = %self.records.table, "migration table created");
        Ok(true)
    }

    /// Diff every type declared in `database` against the live schema
    ///
    /// Live tables that no type declares are reported as dropped.
    pub async fn generate_for_database(&self, database: &str) -> OrmResult<GeneratedMigration> {
        let connection = self.ctx.connection(database).await?;
        let dialect = connection.dialect();

        let types: Vec<Arc<TypeSchema>> = self
            .ctx
            .registry()
            .types_for_database(database)?
            .into_iter()
            .filter(|schema| !self.is_record_table(database, &schema.table))
            .collect();
        let desired = desired_snapshot(&types, dialect);

        let mut actual = connection.introspect_schema().await?;
        actual.tables.retain(|table| !self.is_record_table(database, &table.name));

        let diff = SchemaComparator::database().compare(&actual, &desired);
        Ok(self.generated(database, connection.as_ref(), diff))
    }

    /// Diff one type against its live table, never dropping anything else
    pub async fn generate_for_type(&self, type_identifier: &str) -> OrmResult<GeneratedMigration> {
        let schema = self.ctx.registry().resolve(type_identifier)?;
        let connection = self.ctx.connection(&schema.database).await?;
        let dialect = connection.dialect();

        let desired = SchemaSnapshot::new(vec![table_for(&schema, dialect)]);
        let actual = match connection.introspect_table(&schema.table).await? {
            Some(table) => SchemaSnapshot::new(vec![table]),
            None => SchemaSnapshot::default(),
        };

        let diff = SchemaComparator::tables().compare(&actual, &desired);
        Ok(self.generated(&schema.database, connection.as_ref(), diff))
    }

    fn generated(&self, database: &str, connection: &dyn DatabaseConnection, diff: SchemaDiff) -> GeneratedMigration {
        let dialect = connection.dialect();
        let statements = render(&diff, dialect);
        tracing::info!(database = %database, statements = statements.len(), "migration generated");
        GeneratedMigration {
            database: database.to_string(),
            dialect,
            diff,
            statements,
        }
    }

    fn is_record_table(&self, database: &str, table: &str) -> bool {
        database == self.records.database && table.eq_ignore_ascii_case(&self.records.table)
    }

    /// Persist a generated migration as pending
    pub async fn save(&self, name: &str, migration: &GeneratedMigration) -> OrmResult<MigrationRecord> {
        let failed = |reason: String| {
            tracing::error!(migration = %name, reason = %reason, "migration not saved");
            OrmError::MigrationSaveFailed {
                name: name.to_string(),
                reason,
            }
        };

        if migration.is_empty() {
            return Err(failed("the diff is empty, there is nothing to migrate".to_string()));
        }

        let connection = self.ctx.connection(&self.records.database).await?;
        if connection.introspect_table(&self.records.table).await?.is_none() {
            return Err(failed("the migration table does not exist, run setup first".to_string()));
        }
        if self.find(name).await?.is_some() {
            return Err(failed("a migration with this name already exists".to_string()));
        }

        let diff = migration.diff.to_json().map_err(|e| failed(e.to_string()))?;
        let record = self
            .ctx
            .instantiate(MIGRATION_TYPE)?
            .with(record::NAME, name)?
            .with(record::DATABASE, migration.database.as_str())?
            .with(record::DIFF, diff)?
            .with(record::STATUS, MigrationStatus::Pending.as_i64())?;

        let created = self
            .ctx
            .create(record)
            .execute()
            .await
            .map_err(|e| failed(e.to_string()))?;

        tracing::info!(migration = %name, database = %migration.database, "migration saved");
        MigrationRecord::from_type(&created)
    }

    /// Saved migration by name
    pub async fn find(&self, name: &str) -> OrmResult<Option<MigrationRecord>> {
        let record = self
            .ctx
            .select(MIGRATION_TYPE)?
            .where_eq(record::NAME, name)
            .fetch()
            .await?;

        if record.is_empty() {
            Ok(None)
        } else {
            MigrationRecord::from_type(&record).map(Some)
        }
    }

    pub(crate) async fn get(&self, name: &str) -> OrmResult<MigrationRecord> {
        self.find(name)
            .await?
            .ok_or_else(|| OrmError::MigrationNotFound(name.to_string()))
    }

    /// Apply a saved migration
    ///
    /// Runs are serialized per engine. A migration that is already done is
    /// skipped.
    pub async fn run(&self, name: &str) -> OrmResult<RunReport> {
        let _guard = self.lock_runs().await;

        let migration = self.get(name).await?;
        if migration.is_done() {
            tracing::info!(migration = %name, "migration already applied");
            return Ok(RunReport::skipped(name));
        }

        let report = self.apply(name, &migration.database, &migration.diff).await?;
        if !report.succeeded() {
            tracing::error!(migration = %name, failed = report.failures.len(), "migration partially applied");
            return report.into_result();
        }

        self.mark(&migration, MigrationStatus::Done).await?;
        tracing::info!(migration = %name, statements = report.executed.len(), "migration applied");
        Ok(report)
    }

    /// Held while a migration is applied or rolled back
    pub(crate) async fn lock_runs(&self) -> MutexGuard<'_, ()> {
        self.run_guard.lock().await
    }

    /// Execute every statement of a diff, collecting failures
    pub(crate) async fn apply(&self, name: &str, database: &str, diff: &SchemaDiff) -> OrmResult<RunReport> {
        let connection = self.ctx.connection(database).await?;
        let mut report = RunReport {
            name: name.to_string(),
            ..Default::default()
        };

        let statements = render(diff, connection.dialect());
        let results = connection.execute_each(&statements).await;
        for (statement, result) in statements.into_iter().zip(results) {
            match result {
                Ok(_) => report.executed.push(statement),
                Err(err) => {
                    let reason = match &err {
                        OrmError::DatabaseQuery { message, .. } => message.clone(),
                        other => other.to_string(),
                    };
                    tracing::error!(migration = %name, statement = %statement, reason = %reason, "statement failed");
                    report.failures.push(StatementFailure { statement, reason });
                }
            }
        }

        Ok(report)
    }

    pub(crate) async fn mark(&self, migration: &MigrationRecord, status: MigrationStatus) -> OrmResult<()> {
        let record = self
            .ctx
            .instantiate(MIGRATION_TYPE)?
            .with(record::ID, migration.id)?;

        self.ctx
            .update(record)
            .set(record::STATUS, status.as_i64())
            .set(record::UPDATED_AT, FieldValue::DateTime(Utc::now().trunc_subsecs(0)))
            .execute()
            .await?;
        Ok(())
    }

    /// Every saved migration, newest first
    pub async fn status(&self) -> OrmResult<Vec<MigrationRecord>> {
        self.ctx
            .select(MIGRATION_TYPE)?
            .order_by_desc(record::CREATED_AT)
            .order_by_desc(record::ID)
            .fetch_all()
            .await?
            .iter()
            .map(MigrationRecord::from_type)
            .collect()
    }

    /// DDL a saved migration would execute
    pub async fn describe(&self, name: &str) -> OrmResult<Vec<String>> {
        let migration = self.get(name).await?;
        let dialect = self.ctx.dialect(&migration.database)?;
        Ok(render(&migration.diff, dialect))
    }
}

impl std::fmt::Debug for MigrationEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEngine")
            .field("records", &self.records.identifier)
            .field("database", &self.records.database)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{ConnectionManager, SqliteConnection};
    use crate::config::SchemaConfig;
    use crate::migrations::record::record_schema;
    use crate::schema::SchemaRegistry;
    use std::collections::HashMap;

    async fn context(schema: &str) -> DataContext {
        let mut config = SchemaConfig::from_yaml_str(schema).unwrap();
        config.merge(record_schema("main").unwrap());

        let connections = ConnectionManager::new(HashMap::new());
        connections.register("main", Arc::new(SqliteConnection::in_memory().await.unwrap()));
        DataContext::new(Arc::new(SchemaRegistry::new(config)), Arc::new(connections))
    }

    #[tokio::test]
    async fn test_setup_is_idempotent() {
        let ctx = context("{}").await;
        let engine = MigrationEngine::new(&ctx).unwrap();

        assert!(engine.setup().await.unwrap());
        assert!(!engine.setup().await.unwrap());
        assert!(engine.status().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_types_gives_empty_diff_and_nothing_is_saved() {
        let ctx = context("{}").await;
        let engine = MigrationEngine::new(&ctx).unwrap();
        engine.setup().await.unwrap();

        let generated = engine.generate_for_database("main").await.unwrap();
        assert!(generated.is_empty());
        assert!(generated.statements.is_empty());

        let err = engine.save("nothing", &generated).await.unwrap_err();
        assert!(matches!(err, OrmError::MigrationSaveFailed { .. }));
        assert!(engine.status().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_requires_setup() {
        let ctx = context(
            r#"
properties:
  app::note-id: { label: Id, name: id, description: Id, type: integer, autoincrement: true }
types:
  app::note: { name: Note, description: Notes, database: main, table: note, properties: [app::note-id] }
"#,
        )
        .await;
        let engine = MigrationEngine::new(&ctx).unwrap();

        let generated = engine.generate_for_type("app::note").await.unwrap();
        assert_eq!(generated.diff.created.len(), 1);

        let err = engine.save("first", &generated).await.unwrap_err();
        assert!(err.to_string().contains("run setup first"));
    }

    #[tokio::test]
    async fn test_run_unknown_migration() {
        let ctx = context("{}").await;
        let engine = MigrationEngine::new(&ctx).unwrap();
        engine.setup().await.unwrap();

        assert!(matches!(engine.run("missing").await, Err(OrmError::MigrationNotFound(_))));
        assert!(matches!(engine.describe("missing").await, Err(OrmError::MigrationNotFound(_))));
    }
}
