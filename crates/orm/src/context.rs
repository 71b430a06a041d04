//! Data context
//!
//! Everything a query or migration needs, constructed once and passed by
//! reference: the schema registry, the connection cache, the validator and
//! the input filters.

use std::sync::Arc;

use crate::backends::{ConnectionManager, DatabaseConnection, SqlDialect};
use crate::config::AppConfig;
use crate::error::OrmResult;
use crate::migrations::record::record_schema;
use crate::query::{Create, Delete, Select, Update};
use crate::schema::{SchemaRegistry, Type};
use crate::validation::{ConfiguredValidator, FilterRegistry, TypeValidator};

pub struct DataContext {
    registry: Arc<SchemaRegistry>,
    connections: Arc<ConnectionManager>,
    validator: Arc<dyn TypeValidator>,
    filters: Arc<FilterRegistry>,
}

impl DataContext {
    pub fn new(registry: Arc<SchemaRegistry>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            registry,
            connections,
            validator: Arc::new(ConfiguredValidator::default()),
            filters: Arc::new(FilterRegistry::new()),
        }
    }

    /// Context for an application configuration
    ///
    /// The migration record type is declared in the migration database when
    /// one can be determined.
    pub fn from_config(config: AppConfig) -> OrmResult<Self> {
        let mut schema = config.schema.clone();
        match config.migration_database() {
            Ok(database) => schema.merge(record_schema(&database)?),
            Err(err) => tracing::debug!(error = %err, "migration records unavailable"),
        }

        let registry = Arc::new(SchemaRegistry::new(schema));
        let connections = Arc::new(ConnectionManager::new(config.databases));
        Ok(Self::new(registry, connections))
    }

    pub fn with_validator(mut self, validator: Arc<dyn TypeValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn validator(&self) -> &dyn TypeValidator {
        self.validator.as_ref()
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn dialect(&self, database: &str) -> OrmResult<SqlDialect> {
        self.connections.dialect(database)
    }

    pub async fn connection(&self, database: &str) -> OrmResult<Arc<dyn DatabaseConnection>> {
        self.connections.connection(database).await
    }

    /// Fresh, empty instance of a type
    pub fn instantiate(&self, type_identifier: &str) -> OrmResult<Type> {
        self.registry.instantiate(type_identifier)
    }

    pub fn select(&self, type_identifier: &str) -> OrmResult<Select<'_>> {
        Ok(Select::new(self, self.registry.resolve(type_identifier)?))
    }

    pub fn create(&self, record: Type) -> Create<'_> {
        Create::new(self, record)
    }

    pub fn update(&self, record: Type) -> Update<'_> {
        Update::new(self, record)
    }

    pub fn delete(&self, type_identifier: &str) -> OrmResult<Delete<'_>> {
        Ok(Delete::new(self, self.registry.resolve(type_identifier)?))
    }
}

impl std::fmt::Debug for DataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContext")
            .field("registry", &self.registry)
            .field("connections", &self.connections)
            .field("filters", &self.filters)
            .finish()
    }
}
