//! Connection manager
//!
//! Opens one pooled connection per logical database on first use and hands
//! out shared handles afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use super::core::{DatabaseConnection, SqlDialect};
use super::connect;
use crate::config::{DatabaseConfig, DatabaseDriver};
use crate::error::{OrmError, OrmResult};

/// Lazily connected pools keyed by logical database name
pub struct ConnectionManager {
    configs: HashMap<String, DatabaseConfig>,
    connections: DashMap<String, Arc<dyn DatabaseConnection>>,
    connect_guard: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(configs: HashMap<String, DatabaseConfig>) -> Self {
        Self {
            configs,
            connections: DashMap::new(),
            connect_guard: Mutex::new(()),
        }
    }

    /// Use an already open connection for `database`
    pub fn register(&self, database: impl Into<String>, connection: Arc<dyn DatabaseConnection>) {
        self.connections.insert(database.into(), connection);
    }

    pub fn config(&self, database: &str) -> Option<&DatabaseConfig> {
        self.configs.get(database)
    }

    pub fn databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .configs
            .keys()
            .cloned()
            .chain(self.connections.iter().map(|entry| entry.key().clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Shared connection for `database`, connecting on first use
    pub async fn connection(&self, database: &str) -> OrmResult<Arc<dyn DatabaseConnection>> {
        if let Some(connection) = self.connections.get(database) {
            return Ok(Arc::clone(connection.value()));
        }

        let _guard = self.connect_guard.lock().await;
        // Another task may have connected while we waited
        if let Some(connection) = self.connections.get(database) {
            return Ok(Arc::clone(connection.value()));
        }

        let config = self.configs.get(database).ok_or_else(|| {
            OrmError::Configuration(format!("database '{}' is not configured", database))
        })?;

        tracing::info!(database = %database, driver = ?config.driver, "opening database connection");
        let connection = connect(config).await?;
        self.connections
            .insert(database.to_string(), Arc::clone(&connection));
        Ok(connection)
    }

    /// Dialect of `database`, known without connecting
    pub fn dialect(&self, database: &str) -> OrmResult<SqlDialect> {
        if let Some(connection) = self.connections.get(database) {
            return Ok(connection.dialect());
        }
        match self.configs.get(database).map(|config| config.driver) {
            Some(DatabaseDriver::Sqlite) => Ok(SqlDialect::SQLite),
            Some(DatabaseDriver::Postgres) => Ok(SqlDialect::PostgreSQL),
            None => Err(OrmError::Configuration(format!(
                "database '{}' is not configured",
                database
            ))),
        }
    }

    /// Close every open pool
    pub async fn close_all(&self) -> OrmResult<()> {
        let connections: Vec<(String, Arc<dyn DatabaseConnection>)> = self
            .connections
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        self.connections.clear();

        for (database, connection) in connections {
            tracing::debug!(database = %database, "closing database connection");
            connection.close().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("databases", &self.databases())
            .field("open", &self.connections.len())
            .finish()
    }
}
