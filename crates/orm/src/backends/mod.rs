//! Database Backend Abstractions
//!
//! SQLite and PostgreSQL connections behind the common
//! [`DatabaseConnection`] trait, plus the manager that opens them per
//! logical database.

pub mod core;
pub mod manager;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

pub use self::core::*;
pub use manager::ConnectionManager;
pub use postgres::PostgresConnection;
pub use sqlite::SqliteConnection;

use crate::config::{DatabaseConfig, DatabaseDriver};
use crate::error::OrmResult;

/// Open a pooled connection for the configured driver
pub async fn connect(config: &DatabaseConfig) -> OrmResult<Arc<dyn DatabaseConnection>> {
    match config.driver {
        DatabaseDriver::Sqlite => Ok(Arc::new(SqliteConnection::connect(config).await?)),
        DatabaseDriver::Postgres => Ok(Arc::new(PostgresConnection::connect(config).await?)),
    }
}
