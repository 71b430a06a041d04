//! Property metadata and runtime values

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::defaults::DefaultValue;
use super::storage::{ColumnDimensions, StorageType};
use super::value::FieldValue;
use crate::backends::{DatabaseValue, SqlDialect};
use crate::config::ValidatorConfig;
use crate::error::{FieldMessage, OrmError, OrmResult};

/// Index or unique constraint requested on a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Explicit name, otherwise derived from table and column
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn resolved_name(&self, prefix: &str, table: &str, column: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_{}", prefix, table, column))
    }
}

/// Relation declared on the property itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRelation {
    pub target_type: String,
    pub target_property: String,
}

/// Immutable metadata of one property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    /// Namespaced identifier, e.g. `blog::post-title`
    pub identifier: String,
    pub label: String,
    /// Storage column name
    pub name: String,
    pub description: String,
    pub storage: StorageType,
    pub notnull: bool,
    pub autoincrement: bool,
    pub default: Option<DefaultValue>,
    pub length: Option<u32>,
    pub precision: u32,
    pub scale: u32,
    pub fixed: bool,
    pub unsigned: bool,
    pub index: Option<IndexSpec>,
    pub unique: Option<IndexSpec>,
    pub relation: Option<PropertyRelation>,
    pub validators: Vec<ValidatorConfig>,
    pub filters: Vec<String>,
    pub platform_options: HashMap<String, JsonValue>,
}

impl PropertyDefinition {
    pub fn column(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> ColumnDimensions {
        ColumnDimensions {
            length: self.length,
            precision: self.precision,
            scale: self.scale,
            fixed: self.fixed,
            autoincrement: self.autoincrement,
        }
    }

    /// Whether a lookup key names this property
    pub fn matches(&self, key: &str) -> bool {
        self.identifier == key || self.name == key
    }
}

/// A property with its current runtime value
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    definition: Arc<PropertyDefinition>,
    value: FieldValue,
}

impl Property {
    pub fn new(definition: Arc<PropertyDefinition>) -> Self {
        Self {
            definition,
            value: FieldValue::Null,
        }
    }

    pub fn definition(&self) -> &PropertyDefinition {
        &self.definition
    }

    pub fn identifier(&self) -> &str {
        &self.definition.identifier
    }

    pub fn column(&self) -> &str {
        &self.definition.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut FieldValue {
        &mut self.value
    }

    pub fn set(&mut self, value: impl Into<FieldValue>) {
        self.value = value.into();
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Apply the default when the property is required and has no value
    ///
    /// Returns whether a default was applied.
    pub fn apply_default(&mut self) -> bool {
        if self.definition.autoincrement || !self.definition.notnull || !self.value.is_null() {
            return false;
        }
        match &self.definition.default {
            Some(default) => {
                self.value = default.resolve();
                true
            }
            None => false,
        }
    }

    /// Convert the runtime value into its bound representation
    ///
    /// A hydrated related Type collapses to its autoincrement value.
    pub fn to_storage_value(&self, dialect: SqlDialect) -> OrmResult<DatabaseValue> {
        let collapsed;
        let value = match &self.value {
            FieldValue::Record(record) => {
                collapsed = record.autoincrement_value().clone();
                &collapsed
            }
            other => other,
        };

        self.definition
            .storage
            .to_database(value, dialect)
            .map_err(|message| self.conversion_error(message))
    }

    /// Set the value from a fetched column
    pub fn hydrate(&mut self, raw: &DatabaseValue) -> OrmResult<()> {
        self.value = self
            .definition
            .storage
            .from_database(raw)
            .map_err(|message| self.conversion_error(message))?;
        Ok(())
    }

    fn conversion_error(&self, message: String) -> OrmError {
        OrmError::InvalidInput {
            identifier: self.definition.identifier.clone(),
            messages: vec![FieldMessage::new(self.definition.identifier.clone(), message, "type")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(identifier: &str, name: &str, storage: StorageType) -> PropertyDefinition {
        PropertyDefinition {
            identifier: identifier.to_string(),
            label: name.to_string(),
            name: name.to_string(),
            description: name.to_string(),
            storage,
            notnull: false,
            autoincrement: false,
            default: None,
            length: None,
            precision: 10,
            scale: 0,
            fixed: false,
            unsigned: false,
            index: None,
            unique: None,
            relation: None,
            validators: Vec::new(),
            filters: Vec::new(),
            platform_options: HashMap::new(),
        }
    }

    #[test]
    fn test_apply_default_only_when_required_and_empty() {
        let mut def = definition("blog::post-status", "status", StorageType::SmallInt);
        def.default = Some(DefaultValue::Static(FieldValue::Integer(0)));

        let mut optional = Property::new(Arc::new(def.clone()));
        assert!(!optional.apply_default());
        assert!(optional.is_null());

        def.notnull = true;
        let mut required = Property::new(Arc::new(def));
        assert!(required.apply_default());
        assert_eq!(required.value(), &FieldValue::Integer(0));

        required.set(3);
        assert!(!required.apply_default());
        assert_eq!(required.value(), &FieldValue::Integer(3));
    }

    #[test]
    fn test_hydrate_reports_property_on_bad_value() {
        let mut property = Property::new(Arc::new(definition("blog::post-id", "id", StorageType::Integer)));
        let err = property
            .hydrate(&DatabaseValue::String("not a number".to_string()))
            .unwrap_err();

        assert_eq!(err.field_messages()[0].field, "blog::post-id");
    }

    #[test]
    fn test_index_name_convention() {
        let spec = IndexSpec { name: None };
        assert_eq!(spec.resolved_name("idx", "post", "title"), "idx_post_title");

        let named = IndexSpec {
            name: Some("custom".to_string()),
        };
        assert_eq!(named.resolved_name("uniq", "post", "slug"), "custom");
    }
}
