mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::migrate;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Schema migrations for configuration-driven types")]
struct Cli {
    /// Application configuration (YAML or JSON)
    #[arg(long, short, global = true, default_value = "strata.yaml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Create the migration record table
    Setup,

    /// Diff the declared types against a database and save the result
    Generate {
        /// Compare every type declared in this database
        #[arg(long, conflicts_with = "type_identifier", required_unless_present = "type_identifier")]
        database: Option<String>,

        /// Compare a single type
        #[arg(long = "type")]
        type_identifier: Option<String>,

        /// Migration name (prompted for when missing)
        #[arg(long)]
        name: Option<String>,

        /// Save without asking for confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// Apply a saved migration
    Run {
        /// Migration name
        name: String,
    },

    /// List saved migrations, newest first
    Status,

    /// Print the statements a migration executes
    Describe {
        /// Migration name
        name: String,
    },

    /// Revert an applied migration
    Rollback {
        /// Migration name
        name: String,

        /// Revert without asking for confirmation
        #[arg(long, short)]
        yes: bool,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json);

    let ctx = migrate::load_context(&cli.config)?;

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Setup => {
                migrate::setup(&ctx).await?;
            }
            MigrateCommands::Generate {
                database,
                type_identifier,
                name,
                yes,
            } => {
                let target = match (database, type_identifier) {
                    (_, Some(type_identifier)) => migrate::Target::Type(type_identifier),
                    (Some(database), None) => migrate::Target::Database(database),
                    (None, None) => anyhow::bail!("either --database or --type is required"),
                };
                migrate::generate(&ctx, target, name, yes).await?;
            }
            MigrateCommands::Run { name } => {
                migrate::run(&ctx, &name).await?;
            }
            MigrateCommands::Status => {
                migrate::status(&ctx).await?;
            }
            MigrateCommands::Describe { name } => {
                migrate::describe(&ctx, &name).await?;
            }
            MigrateCommands::Rollback { name, yes } => {
                migrate::rollback(&ctx, &name, yes).await?;
            }
        },
    }

    ctx.connections().close_all().await?;
    Ok(())
}
