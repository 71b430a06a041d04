//! Schema Registry
//!
//! Builds [`TypeSchema`]s from declarative configuration, validating it on the
//! way, and caches the result per identifier. The registry is an explicit
//! object: build one at startup and hand it to every consumer.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use super::defaults::{DefaultGenerators, DefaultValue};
use super::entity::{Type, TypeSchema};
use super::property::{IndexSpec, PropertyDefinition, PropertyRelation};
use super::relation::{JoinKind, ReferentialAction, Relation};
use super::storage::StorageType;
use super::value::FieldValue;
use crate::config::{DefaultConfig, PropertyConfig, SchemaConfig, TypeConfig};
use crate::error::{OrmError, OrmResult};

const MAX_INHERITANCE_DEPTH: usize = 8;

pub struct SchemaRegistry {
    config: SchemaConfig,
    generators: DefaultGenerators,
    cache: DashMap<String, Arc<TypeSchema>>,
}

impl SchemaRegistry {
    pub fn new(config: SchemaConfig) -> Self {
        Self::with_generators(config, DefaultGenerators::new())
    }

    /// Registry with a custom generator table
    pub fn with_generators(config: SchemaConfig, generators: DefaultGenerators) -> Self {
        Self {
            config,
            generators,
            cache: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }

    /// Resolve a type by identifier, or by table name
    pub fn resolve(&self, key: &str) -> OrmResult<Arc<TypeSchema>> {
        let identifier = self.identifier_for(key)?;

        if let Some(schema) = self.cache.get(&identifier) {
            return Ok(Arc::clone(schema.value()));
        }

        let built = Arc::new(self.build(&identifier)?);
        tracing::debug!(identifier = %identifier, table = %built.table, "built type schema");

        let schema = self
            .cache
            .entry(identifier)
            .or_insert_with(|| Arc::clone(&built));
        Ok(Arc::clone(schema.value()))
    }

    /// Fresh, empty runtime instance of a type
    pub fn instantiate(&self, key: &str) -> OrmResult<Type> {
        Ok(Type::new(self.resolve(key)?))
    }

    /// Every configured type identifier, sorted
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.config.types.keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    /// Every type stored in the given database, sorted by identifier
    pub fn types_for_database(&self, database: &str) -> OrmResult<Vec<Arc<TypeSchema>>> {
        self.identifiers()
            .into_iter()
            .filter(|id| {
                self.config
                    .types
                    .get(id)
                    .and_then(|t| t.database.as_deref())
                    == Some(database)
            })
            .map(|id| self.resolve(&id))
            .collect()
    }

    /// Build every configured type, failing on the first invalid one
    pub fn validate_all(&self) -> OrmResult<()> {
        for identifier in self.identifiers() {
            self.resolve(&identifier)?;
        }
        Ok(())
    }

    fn identifier_for(&self, key: &str) -> OrmResult<String> {
        if self.config.types.contains_key(key) {
            return Ok(key.to_string());
        }

        self.identifiers()
            .into_iter()
            .find(|id| {
                self.config
                    .types
                    .get(id)
                    .and_then(|t| t.table.as_deref())
                    == Some(key)
            })
            .ok_or_else(|| OrmError::UnknownType(key.to_string()))
    }

    fn type_config(&self, identifier: &str) -> OrmResult<&TypeConfig> {
        self.config
            .types
            .get(identifier)
            .ok_or_else(|| OrmError::UnknownType(identifier.to_string()))
    }

    fn build(&self, identifier: &str) -> OrmResult<TypeSchema> {
        let config = self.type_config(identifier)?;

        let mut messages = Vec::new();
        let name = required(&config.name, "name", &mut messages);
        let description = required(&config.description, "description", &mut messages);
        let database = required(&config.database, "database", &mut messages);
        let table = required(&config.table, "table", &mut messages);
        if !messages.is_empty() {
            return Err(invalid_type(identifier, messages));
        }

        let mut seen = HashSet::new();
        let mut properties = Vec::with_capacity(config.properties.len());
        for property_id in &config.properties {
            if !seen.insert(property_id.as_str()) {
                messages.push(format!("property '{}' is listed twice", property_id));
                continue;
            }
            let merged = self.property_config(identifier, property_id)?;
            properties.push(Arc::new(self.build_property(property_id, &merged)?));
        }

        let autoincrement = properties.iter().filter(|p| p.autoincrement).count();
        if autoincrement != 1 {
            messages.push(format!(
                "exactly one autoincrement property is required, found {}",
                autoincrement
            ));
        }

        let mut relation_keys: Vec<&String> = config.relations.keys().collect();
        relation_keys.sort();

        let mut relations = Vec::new();
        for key in relation_keys {
            let relation = &config.relations[key];
            let local_property = relation.local_property.as_deref();
            let target_type = relation.relation_type.as_deref();
            let target_property = relation.relation_property.as_deref();

            let (Some(local_property), Some(target_type), Some(target_property)) =
                (local_property, target_type, target_property)
            else {
                messages.push(format!(
                    "relation '{}' requires localProperty, relationType and relationProperty",
                    key
                ));
                continue;
            };

            let Some(local) = properties.iter().find(|p| p.identifier == local_property) else {
                messages.push(format!(
                    "relation '{}' uses local property '{}' which does not belong to the type",
                    key, local_property
                ));
                continue;
            };

            match self.relation_target(target_type, target_property) {
                Ok((target_table, target_column)) => relations.push(Relation {
                    identifier: key.clone(),
                    local_property: local.identifier.clone(),
                    local_column: local.name.clone(),
                    target_type: target_type.to_string(),
                    target_property: target_property.to_string(),
                    alias: relation.alias.clone().unwrap_or_else(|| target_table.clone()),
                    target_table,
                    target_column,
                    join: JoinKind::parse(relation.join_type.as_deref()),
                    on_update: ReferentialAction::parse(relation.on_update.as_deref()),
                    on_delete: ReferentialAction::parse(relation.on_delete.as_deref()),
                }),
                Err(message) => messages.push(format!("relation '{}': {}", key, message)),
            }
        }

        // Relations declared on properties, unless a named relation covers them
        for property in &properties {
            let Some(declared) = &property.relation else {
                continue;
            };
            if relations.iter().any(|r| r.local_property == property.identifier) {
                continue;
            }
            match self.relation_target(&declared.target_type, &declared.target_property) {
                Ok((target_table, target_column)) => relations.push(Relation {
                    identifier: property.identifier.clone(),
                    local_property: property.identifier.clone(),
                    local_column: property.name.clone(),
                    target_type: declared.target_type.clone(),
                    target_property: declared.target_property.clone(),
                    alias: target_table.clone(),
                    target_table,
                    target_column,
                    join: JoinKind::Left,
                    on_update: ReferentialAction::Cascade,
                    on_delete: ReferentialAction::Cascade,
                }),
                Err(message) => messages.push(format!("property '{}': {}", property.identifier, message)),
            }
        }

        if !messages.is_empty() {
            return Err(invalid_type(identifier, messages));
        }

        Ok(TypeSchema {
            identifier: identifier.to_string(),
            name,
            description,
            database,
            table,
            properties,
            relations,
            validators: config.validators.clone(),
        })
    }

    /// Table and column of a relation target, read from raw configuration
    /// so the target type itself is not built
    fn relation_target(&self, target_type: &str, target_property: &str) -> Result<(String, String), String> {
        let target = self
            .config
            .types
            .get(target_type)
            .ok_or_else(|| format!("target type '{}' is not configured", target_type))?;

        let table = target
            .table
            .clone()
            .ok_or_else(|| format!("target type '{}' has no table", target_type))?;

        if !target.properties.iter().any(|p| p == target_property) {
            return Err(format!(
                "target property '{}' does not belong to '{}'",
                target_property, target_type
            ));
        }

        let column = self
            .property_config(target_type, target_property)
            .map_err(|e| e.to_string())?
            .name
            .ok_or_else(|| format!("target property '{}' has no name", target_property))?;

        Ok((table, column))
    }

    /// Property configuration with inheritance and overrides applied
    fn property_config(&self, type_identifier: &str, property_id: &str) -> OrmResult<PropertyConfig> {
        self.merged_property_config(type_identifier, property_id, 0)
    }

    fn merged_property_config(
        &self,
        type_identifier: &str,
        property_id: &str,
        depth: usize,
    ) -> OrmResult<PropertyConfig> {
        let own = self
            .config
            .properties
            .get(property_id)
            .ok_or_else(|| OrmError::PropertyNotFound {
                type_identifier: type_identifier.to_string(),
                property: property_id.to_string(),
            })?;

        let base = match &own.inherits {
            Some(parent) => {
                if depth >= MAX_INHERITANCE_DEPTH {
                    return Err(OrmError::InvalidPropertyConfig {
                        identifier: property_id.to_string(),
                        messages: vec![format!("inheritance chain through '{}' is too deep", parent)],
                    });
                }
                self.merged_property_config(type_identifier, parent, depth + 1)?
                    .overlay(own)
            }
            None => own.clone(),
        };

        Ok(match &own.overrides {
            Some(overrides) => base.overlay(overrides),
            None => base,
        })
    }

    fn build_property(&self, identifier: &str, config: &PropertyConfig) -> OrmResult<PropertyDefinition> {
        let mut messages = Vec::new();

        if !identifier.contains("::") {
            messages.push("identifier must be namespaced with '::'".to_string());
        }
        let label = required(&config.label, "label", &mut messages);
        let name = required(&config.name, "name", &mut messages);
        let description = required(&config.description, "description", &mut messages);
        let type_name = required(&config.storage_type, "type", &mut messages);

        let storage = match type_name.parse::<StorageType>() {
            Ok(storage) => Some(storage),
            Err(message) => {
                if !type_name.is_empty() {
                    messages.push(message);
                }
                None
            }
        };

        let default = match &config.default {
            None => None,
            Some(DefaultConfig::Literal(value)) => Some(DefaultValue::Static(FieldValue::from_json(value))),
            Some(DefaultConfig::Generator { generator }) => match self.generators.get(generator) {
                Some(resolved) => Some(DefaultValue::Generated {
                    key: generator.clone(),
                    generator: resolved,
                }),
                None => {
                    messages.push(format!("unknown default generator '{}'", generator));
                    None
                }
            },
        };

        let (Some(storage), true) = (storage, messages.is_empty()) else {
            return Err(OrmError::InvalidPropertyConfig {
                identifier: identifier.to_string(),
                messages,
            });
        };

        let spec = |flag: &Option<crate::config::IndexConfig>| {
            flag.as_ref().filter(|f| f.enabled()).map(|f| IndexSpec {
                name: f.explicit_name().map(str::to_string),
            })
        };

        Ok(PropertyDefinition {
            identifier: identifier.to_string(),
            label,
            name,
            description,
            storage,
            notnull: config.notnull.unwrap_or(false),
            autoincrement: config.autoincrement.unwrap_or(false),
            default,
            length: config.length,
            precision: config.precision.unwrap_or(10),
            scale: config.scale.unwrap_or(0),
            fixed: config.fixed.unwrap_or(false),
            unsigned: config.unsigned.unwrap_or(false),
            index: spec(&config.index),
            unique: spec(&config.unique),
            relation: config.relation.as_ref().map(|r| PropertyRelation {
                target_type: r.target_type.clone(),
                target_property: r.property.clone(),
            }),
            validators: config.validators.clone().unwrap_or_default(),
            filters: config.filters.clone().unwrap_or_default(),
            platform_options: config.platform_options.clone().unwrap_or_default(),
        })
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("types", &self.config.types.len())
            .field("properties", &self.config.properties.len())
            .field("cached", &self.cache.len())
            .finish()
    }
}

fn required(value: &Option<String>, field: &str, messages: &mut Vec<String>) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => {
            messages.push(format!("'{}' is required", field));
            String::new()
        }
    }
}

fn invalid_type(identifier: &str, messages: Vec<String>) -> OrmError {
    OrmError::InvalidTypeConfig {
        identifier: identifier.to_string(),
        messages,
    }
}
