//! Migration Rollback - reverting an applied migration
//!
//! A rollback applies the reverse of the saved diff. Tables and columns the
//! migration created are dropped with their data, and tables or columns it
//! dropped come back empty. Those steps are listed in the plan so they can
//! be reviewed before anything is executed.

use super::definitions::{MigrationRecord, MigrationStatus, RollbackPlan, RunReport};
use super::engine::MigrationEngine;
use super::renderer::render;
use crate::error::{OrmError, OrmResult};

/// Steps of the reverse diff that lose data or cannot bring it back
fn irreversible_steps(migration: &MigrationRecord) -> Vec<String> {
    let mut steps = migration.diff.reversed().data_loss();
    for table in &migration.diff.dropped {
        steps.push(format!("table {} is recreated without its rows", table.name));
    }
    for table in &migration.diff.altered {
        for column in &table.dropped_columns {
            steps.push(format!(
                "column {}.{} is recreated without its values",
                table.name, column.name
            ));
        }
    }
    steps
}

impl MigrationEngine<'_> {
    /// Reverse DDL of a saved migration and the data it cannot restore
    pub async fn rollback_plan(&self, name: &str) -> OrmResult<RollbackPlan> {
        let migration = self.get(name).await?;
        let dialect = self.context().dialect(&migration.database)?;
        let irreversible = irreversible_steps(&migration);
        let reversed = migration.diff.reversed();

        Ok(RollbackPlan {
            name: migration.name,
            database: migration.database,
            statements: render(&reversed, dialect),
            diff: reversed,
            irreversible,
        })
    }

    /// Revert an applied migration
    ///
    /// Nothing is executed unless `confirmed` is set. On success the record is
    /// pending again and can be re-run.
    /// Shares the run lock, so a rollback never interleaves with a run.
    pub async fn rollback(&self, name: &str, confirmed: bool) -> OrmResult<RunReport> {
        let _guard = self.lock_runs().await;

        let migration = self.get(name).await?;
        if !migration.is_done() {
            return Err(OrmError::MigrationNotApplied(name.to_string()));
        }
        if !confirmed {
            tracing::info!(migration = %name, "rollback not confirmed");
            return Ok(RunReport::skipped(name));
        }

        for step in irreversible_steps(&migration) {
            tracing::warn!(migration = %name, step = %step, "irreversible rollback step");
        }

        let report = self
            .apply(name, &migration.database, &migration.diff.reversed())
            .await?;
        if !report.succeeded() {
            tracing::error!(migration = %name, failed = report.failures.len(), "rollback partially applied");
            return report.into_result();
        }

        self.mark(&migration, MigrationStatus::Pending).await?;
        tracing::info!(migration = %name, statements = report.executed.len(), "migration rolled back");
        Ok(report)
    }
}
