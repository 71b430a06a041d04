//! Types: table-backed aggregates of properties and relations

use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use super::property::{Property, PropertyDefinition};
use super::relation::Relation;
use super::value::FieldValue;
use crate::backends::{DatabaseValue, SqlDialect};
use crate::config::ValidatorConfig;
use crate::error::{OrmError, OrmResult};

/// Separator between alias and column in selected column names
pub const ALIAS_SEPARATOR: &str = "__";

/// Immutable metadata of a type, built once by the registry
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSchema {
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub database: String,
    pub table: String,
    pub properties: Vec<Arc<PropertyDefinition>>,
    pub relations: Vec<Relation>,
    pub validators: Vec<ValidatorConfig>,
}

impl TypeSchema {
    /// Look up a property by identifier or column name
    pub fn property(&self, key: &str) -> Option<&Arc<PropertyDefinition>> {
        self.properties
            .iter()
            .find(|p| p.identifier == key)
            .or_else(|| self.properties.iter().find(|p| p.name == key))
    }

    pub fn relation(&self, identifier: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.identifier == identifier)
    }

    /// Relation whose local side is the given property
    pub fn relation_for_property(&self, property_identifier: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|r| r.local_property == property_identifier)
    }

    pub fn autoincrement_property(&self) -> Option<&Arc<PropertyDefinition>> {
        self.properties.iter().find(|p| p.autoincrement)
    }

    /// Column name of the identity key
    pub fn identity_column(&self) -> Option<&str> {
        self.autoincrement_property().map(|p| p.name.as_str())
    }
}

/// Runtime instance of a type carrying property values
#[derive(Debug, Clone)]
pub struct Type {
    schema: Arc<TypeSchema>,
    properties: Vec<Property>,
}

impl Type {
    /// Fresh instance with every value unset
    pub fn new(schema: Arc<TypeSchema>) -> Self {
        let properties = schema
            .properties
            .iter()
            .map(|definition| Property::new(Arc::clone(definition)))
            .collect();
        Self { schema, properties }
    }

    pub fn schema(&self) -> &Arc<TypeSchema> {
        &self.schema
    }

    pub fn identifier(&self) -> &str {
        &self.schema.identifier
    }

    pub fn table(&self) -> &str {
        &self.schema.table
    }

    pub fn database(&self) -> &str {
        &self.schema.database
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut [Property] {
        &mut self.properties
    }

    /// Property by identifier or column name
    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.identifier() == key)
            .or_else(|| self.properties.iter().find(|p| p.column() == key))
    }

    pub fn property_mut(&mut self, key: &str) -> Option<&mut Property> {
        let index = self
            .properties
            .iter()
            .position(|p| p.identifier() == key)
            .or_else(|| self.properties.iter().position(|p| p.column() == key))?;
        self.properties.get_mut(index)
    }

    /// Value of a property, `PropertyNotFound` for unknown keys
    pub fn get(&self, key: &str) -> OrmResult<&FieldValue> {
        self.property(key)
            .map(Property::value)
            .ok_or_else(|| self.not_found(key))
    }

    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) -> OrmResult<()> {
        let not_found = self.not_found(key);
        let property = self.property_mut(key).ok_or(not_found)?;
        property.set(value);
        Ok(())
    }

    /// Builder-style `set`
    pub fn with(mut self, key: &str, value: impl Into<FieldValue>) -> OrmResult<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    pub fn autoincrement_property(&self) -> Option<&Property> {
        self.properties.iter().find(|p| p.definition().autoincrement)
    }

    /// Identity value, `Null` when unset
    pub fn autoincrement_value(&self) -> &FieldValue {
        self.autoincrement_property()
            .map(Property::value)
            .unwrap_or(&FieldValue::Null)
    }

    /// True while the identity key has no value
    pub fn is_empty(&self) -> bool {
        self.autoincrement_value().is_null()
    }

    /// Plain value map keyed by property identifier
    pub fn to_values(&self) -> Map<String, JsonValue> {
        self.properties
            .iter()
            .map(|p| (p.identifier().to_string(), p.value().to_json()))
            .collect()
    }

    /// Flat row in the shape a select produces for this type
    pub fn to_flat_row(&self, dialect: SqlDialect) -> OrmResult<HashMap<String, DatabaseValue>> {
        self.properties
            .iter()
            .map(|p| {
                let key = format!("{}{}{}", self.schema.table, ALIAS_SEPARATOR, p.column());
                Ok((key, p.to_storage_value(dialect)?))
            })
            .collect()
    }

    fn not_found(&self, key: &str) -> OrmError {
        OrmError::PropertyNotFound {
            type_identifier: self.schema.identifier.clone(),
            property: key.to_string(),
        }
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.schema.identifier == other.schema.identifier
            && self.properties.len() == other.properties.len()
            && self
                .properties
                .iter()
                .zip(&other.properties)
                .all(|(a, b)| a.identifier() == b.identifier() && a.value() == b.value())
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        JsonValue::Object(self.to_values()).serialize(serializer)
    }
}
