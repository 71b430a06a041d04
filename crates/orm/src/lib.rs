//! # strata-orm: configuration-driven data access
//!
//! Types and their properties are declared in YAML or JSON and resolved by
//! the [`SchemaRegistry`]. The query builder joins declared relations and
//! hydrates nested Types, and the migration engine keeps SQLite and
//! PostgreSQL schemas in line with the declarations.

pub mod backends;
pub mod config;
pub mod context;
pub mod error;
pub mod hydration;
pub mod migrations;
pub mod query;
pub mod schema;
pub mod validation;

pub use backends::{
    ConnectionManager, DatabaseConnection, DatabaseRow, DatabaseValue, ExecuteResult, PostgresConnection,
    SqlDialect, SqliteConnection,
};
pub use config::{AppConfig, DatabaseConfig, DatabaseDriver, SchemaConfig};
pub use context::DataContext;
pub use error::{FieldMessage, OrmError, OrmResult, StatementFailure};
pub use hydration::ResultHydrator;
pub use migrations::{MigrationEngine, MigrationRecord, MigrationStatus, SchemaDiff};
pub use query::{Create, Delete, LazyRows, OrderDirection, PropertyPath, QueryOperator, RawParams, Select, Update};
pub use schema::{FieldValue, Property, SchemaRegistry, StorageType, Type, TypeSchema};
pub use validation::{ConfiguredValidator, FilterRegistry, NoopValidator, Operation, TypeValidator};
