//! Declarative configuration
//!
//! Types and properties are described in YAML or JSON. The application
//! configuration adds the database connections and the database that stores
//! migration records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{OrmError, OrmResult};

/// Property and type definitions keyed by identifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub properties: HashMap<String, PropertyConfig>,
    #[serde(default)]
    pub types: HashMap<String, TypeConfig>,
}

/// Definition record of one property
///
/// Every field is optional so a property can inherit from another one and
/// only spell out what differs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyConfig {
    pub label: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub storage_type: Option<String>,
    pub notnull: Option<bool>,
    pub autoincrement: Option<bool>,
    pub default: Option<DefaultConfig>,
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub fixed: Option<bool>,
    pub unsigned: Option<bool>,
    pub index: Option<IndexConfig>,
    pub unique: Option<IndexConfig>,
    pub relation: Option<PropertyRelationConfig>,
    pub validators: Option<Vec<ValidatorConfig>>,
    pub filters: Option<Vec<String>>,
    pub platform_options: Option<HashMap<String, JsonValue>>,
    /// Identifier of the property this one is based on
    pub inherits: Option<String>,
    /// Fields replacing the inherited ones
    #[serde(rename = "override")]
    pub overrides: Option<Box<PropertyConfig>>,
}

impl PropertyConfig {
    /// Overlay every field set on `other` onto `self`
    pub fn overlay(mut self, other: &PropertyConfig) -> PropertyConfig {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            label,
            name,
            description,
            storage_type,
            notnull,
            autoincrement,
            default,
            length,
            precision,
            scale,
            fixed,
            unsigned,
            index,
            unique,
            relation,
            validators,
            filters,
            platform_options
        );
        self
    }
}

/// Default value of a property: a literal scalar or a named generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultConfig {
    Generator { generator: String },
    Literal(JsonValue),
}

/// Index or unique flag: a plain boolean or an explicit name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexConfig {
    Flag(bool),
    Named { name: String },
}

impl IndexConfig {
    pub fn enabled(&self) -> bool {
        match self {
            IndexConfig::Flag(flag) => *flag,
            IndexConfig::Named { .. } => true,
        }
    }

    pub fn explicit_name(&self) -> Option<&str> {
        match self {
            IndexConfig::Named { name } => Some(name),
            IndexConfig::Flag(_) => None,
        }
    }
}

/// Relation declared directly on a property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRelationConfig {
    /// Target type identifier
    #[serde(rename = "type")]
    pub target_type: String,
    /// Target property identifier
    pub property: String,
}

/// Named validator with free-form options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub name: String,
    #[serde(default)]
    pub options: JsonValue,
}

/// Definition record of one type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeConfig {
    pub name: Option<String>,
    pub description: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub relations: HashMap<String, RelationConfig>,
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
}

/// Relation declared in a type's `relations` map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationConfig {
    pub local_property: Option<String>,
    pub relation_type: Option<String>,
    pub relation_property: Option<String>,
    pub join_type: Option<String>,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
    pub alias: Option<String>,
}

/// Supported storage drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Sqlite,
    #[serde(alias = "postgresql", alias = "pgsql")]
    Postgres,
}

/// Connection settings of one logical database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,
    /// File path for SQLite (`:memory:` for an in-memory store)
    pub path: Option<PathBuf>,
    /// Connection URL for PostgreSQL
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

impl DatabaseConfig {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            driver: DatabaseDriver::Sqlite,
            path: Some(path.into()),
            url: None,
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }

    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            driver: DatabaseDriver::Postgres,
            path: None,
            url: Some(url.into()),
            max_connections: default_max_connections(),
            min_connections: 0,
            acquire_timeout_seconds: default_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Database holding the migration record table
    pub database: Option<String>,
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub databases: HashMap<String, DatabaseConfig>,
    #[serde(default)]
    pub migrations: MigrationSettings,
    #[serde(default)]
    pub schema: SchemaConfig,
    /// Extra schema files merged into `schema`, relative to this file
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

impl AppConfig {
    /// Load a configuration file and every schema file it includes
    pub fn load(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let mut config: AppConfig = parse_file(path)?;

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for include in config.include.clone() {
            let schema: SchemaConfig = parse_file(&base.join(include))?;
            config.schema.merge(schema);
        }

        Ok(config)
    }

    /// Name of the database storing migration records
    pub fn migration_database(&self) -> OrmResult<String> {
        if let Some(database) = &self.migrations.database {
            return Ok(database.clone());
        }
        // A single configured database is unambiguous
        if self.databases.len() == 1 {
            if let Some(name) = self.databases.keys().next() {
                return Ok(name.clone());
            }
        }
        Err(OrmError::Configuration(
            "migrations.database must name one of the configured databases".to_string(),
        ))
    }
}

impl SchemaConfig {
    /// Parse a schema document, YAML or JSON chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> OrmResult<Self> {
        parse_file(path.as_ref())
    }

    pub fn from_yaml_str(source: &str) -> OrmResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_json_str(source: &str) -> OrmResult<Self> {
        Ok(serde_json::from_str(source)?)
    }

    /// Merge another document; its identifiers win on conflict
    pub fn merge(&mut self, other: SchemaConfig) {
        self.properties.extend(other.properties);
        self.types.extend(other.types);
    }
}

fn parse_file<T>(path: &Path) -> OrmResult<T>
where
    T: for<'de> Deserialize<'de>,
{
    let source = std::fs::read_to_string(path)
        .map_err(|e| OrmError::Configuration(format!("Failed to read {}: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&source)
            .map_err(|e| OrmError::Configuration(format!("Failed to parse {}: {}", path.display(), e)))
    } else {
        serde_yaml::from_str(&source)
            .map_err(|e| OrmError::Configuration(format!("Failed to parse {}: {}", path.display(), e)))
    }
}
