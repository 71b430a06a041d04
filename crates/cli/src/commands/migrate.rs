use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use console::style;
use inquire::{Confirm, Text};
use strata_orm::migrations::{GeneratedMigration, MigrationRecord};
use strata_orm::{AppConfig, DataContext, MigrationEngine, MigrationStatus, OrmError};

/// What `generate` compares against the live schema
pub enum Target {
    Database(String),
    Type(String),
}

pub fn load_context(path: &Path) -> anyhow::Result<DataContext> {
    tracing::debug!(config = %path.display(), "loading configuration");
    let config = AppConfig::load(path).with_context(|| format!("failed to load {}", path.display()))?;
    config.migration_database()?;
    Ok(DataContext::from_config(config)?)
}

pub async fn setup(ctx: &DataContext) -> anyhow::Result<()> {
    let engine = MigrationEngine::new(ctx)?;
    if engine.setup().await? {
        println!("{} Created the migration table in {}", style("✓").green(), engine.records_database());
    } else {
        println!("Migration table already exists in {}", engine.records_database());
    }
    Ok(())
}

pub async fn generate(ctx: &DataContext, target: Target, name: Option<String>, yes: bool) -> anyhow::Result<()> {
    let engine = MigrationEngine::new(ctx)?;
    let generated = match &target {
        Target::Database(database) => engine.generate_for_database(database).await?,
        Target::Type(type_identifier) => engine.generate_for_type(type_identifier).await?,
    };

    if generated.is_empty() {
        println!("Nothing to migrate: {} matches the declared types", generated.database);
        return Ok(());
    }

    print_preview(&generated);
    for step in generated.diff.data_loss() {
        println!("{} {}", style("!").yellow().bold(), step);
    }

    if !yes {
        let confirmed = Confirm::new("Save this migration?")
            .with_default(true)
            .prompt()
            .context("failed to get confirmation")?;
        if !confirmed {
            println!("Migration not saved");
            return Ok(());
        }
    }

    let name = match name {
        Some(name) => name,
        None if yes => default_name(&target),
        None => Text::new("Migration name:")
            .with_default(&default_name(&target))
            .prompt()
            .context("failed to get migration name")?,
    };

    let record = engine.save(name.trim(), &generated).await?;
    println!(
        "{} Saved {} ({} statements, run it with `strata migrate run {}`)",
        style("✓").green(),
        style(&record.name).bold(),
        generated.statements.len(),
        record.name
    );
    Ok(())
}

pub async fn run(ctx: &DataContext, name: &str) -> anyhow::Result<()> {
    let engine = MigrationEngine::new(ctx)?;
    match engine.run(name).await {
        Ok(report) if report.skipped => {
            println!("{} is already applied", style(name).bold());
            Ok(())
        }
        Ok(report) => {
            println!(
                "{} Applied {} ({} statements)",
                style("✓").green(),
                style(name).bold(),
                report.executed.len()
            );
            Ok(())
        }
        Err(OrmError::MigrationPartiallyApplied { name, failures }) => {
            for failure in &failures {
                println!("{} {}", style("✗").red(), failure.statement);
                println!("    {}", style(&failure.reason).dim());
            }
            anyhow::bail!("{} statement(s) of {} failed, it stays pending", failures.len(), name)
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn status(ctx: &DataContext) -> anyhow::Result<()> {
    let engine = MigrationEngine::new(ctx)?;
    let records = engine.status().await?;
    if records.is_empty() {
        println!("No migrations saved");
        return Ok(());
    }

    for record in &records {
        println!("{}", status_line(record));
    }
    Ok(())
}

pub async fn describe(ctx: &DataContext, name: &str) -> anyhow::Result<()> {
    let engine = MigrationEngine::new(ctx)?;
    for statement in engine.describe(name).await? {
        println!("{};", statement);
    }
    Ok(())
}

pub async fn rollback(ctx: &DataContext, name: &str, yes: bool) -> anyhow::Result<()> {
    let engine = MigrationEngine::new(ctx)?;
    let plan = engine.rollback_plan(name).await?;

    println!("{}", style(format!("Rolling back {} on {}", plan.name, plan.database)).bold());
    for statement in &plan.statements {
        println!("  {};", statement);
    }
    if !plan.irreversible.is_empty() {
        println!("{}", style("These steps cannot be undone:").yellow().bold());
        for step in &plan.irreversible {
            println!("  {} {}", style("!").yellow(), step);
        }
    }

    let confirmed = yes
        || Confirm::new("Roll back this migration?")
            .with_default(false)
            .prompt()
            .context("failed to get confirmation")?;

    let report = engine.rollback(name, confirmed).await?;
    if report.skipped {
        println!("Rollback cancelled");
    } else {
        println!("{} Rolled back {}", style("✓").green(), style(name).bold());
    }
    Ok(())
}

fn print_preview(generated: &GeneratedMigration) {
    println!(
        "{}",
        style(format!("{} statement(s) for {}", generated.statements.len(), generated.database)).bold()
    );
    for statement in &generated.statements {
        println!("  {};", statement);
    }
}

fn default_name(target: &Target) -> String {
    let subject = match target {
        Target::Database(database) => database.as_str(),
        Target::Type(type_identifier) => type_identifier.as_str(),
    };
    let subject: String = subject
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), subject)
}

fn status_line(record: &MigrationRecord) -> String {
    let status = match record.status {
        MigrationStatus::Done => style(record.status.to_string()).green(),
        MigrationStatus::Pending => style(record.status.to_string()).yellow(),
    };
    let created = record
        .created_at
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!("{:<8} {}  {}  ({})", status, created, record.name, record.database)
}
