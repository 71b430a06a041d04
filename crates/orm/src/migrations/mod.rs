//! Migration System
//!
//! Declared types are compared with the live database, the difference is
//! saved as a migration record and applied statement by statement.

pub mod comparator;
pub mod definitions;
pub mod engine;
pub mod record;
pub mod renderer;
pub mod rollback;
pub mod schema_builder;
pub mod snapshot;

pub use comparator::{ColumnChange, SchemaComparator, SchemaDiff, TableDiff};
pub use definitions::{GeneratedMigration, MigrationRecord, MigrationStatus, RollbackPlan, RunReport};
pub use engine::MigrationEngine;
pub use snapshot::{ColumnSchema, ForeignKeySchema, IndexSchema, SchemaSnapshot, TableSchema};
