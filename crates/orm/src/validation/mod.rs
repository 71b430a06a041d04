//! Input validation
//!
//! The query builders only depend on [`TypeValidator`]. The default
//! implementation, [`ConfiguredValidator`], enforces not-null constraints and
//! the validators named in property and type configuration.

pub mod filters;
pub mod rules;

use std::sync::Arc;

use dashmap::DashMap;

pub use filters::FilterRegistry;
pub use rules::{PropertyRule, RecordRule, ValidatorRegistry};

use crate::error::{FieldMessage, OrmError, OrmResult};
use crate::schema::{Type, TypeSchema};

/// Write operation being validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    /// Only the properties in the group are checked
    Update { group: Vec<String> },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update { .. } => "update",
        }
    }

    fn includes(&self, property_identifier: &str) -> bool {
        match self {
            Operation::Create => true,
            Operation::Update { group } => group.iter().any(|p| p == property_identifier),
        }
    }
}

/// Validation contract; an empty result means valid
pub trait TypeValidator: Send + Sync {
    fn validate(&self, record: &Type, operation: &Operation) -> Vec<FieldMessage>;
}

struct CompiledRules {
    property_rules: Vec<(String, Box<dyn PropertyRule>)>,
    record_rules: Vec<Box<dyn RecordRule>>,
}

/// Validator driven by configuration
///
/// Rules are compiled once per type and cached.
pub struct ConfiguredValidator {
    registry: ValidatorRegistry,
    compiled: DashMap<String, Arc<CompiledRules>>,
}

impl ConfiguredValidator {
    pub fn new(registry: ValidatorRegistry) -> Self {
        Self {
            registry,
            compiled: DashMap::new(),
        }
    }

    /// Compile the rules of a type, reporting misconfigured validators
    pub fn check_schema(&self, schema: &TypeSchema) -> OrmResult<()> {
        self.rules_for(schema).map(|_| ())
    }

    fn rules_for(&self, schema: &TypeSchema) -> OrmResult<Arc<CompiledRules>> {
        if let Some(rules) = self.compiled.get(&schema.identifier) {
            return Ok(Arc::clone(rules.value()));
        }

        let mut property_rules = Vec::new();
        for property in &schema.properties {
            for validator in &property.validators {
                let rule = self
                    .registry
                    .property_rule(&validator.name, &validator.options)
                    .map_err(|message| OrmError::InvalidPropertyConfig {
                        identifier: property.identifier.clone(),
                        messages: vec![message],
                    })?;
                property_rules.push((property.identifier.clone(), rule));
            }
        }

        let mut record_rules = Vec::new();
        for validator in &schema.validators {
            let rule = self
                .registry
                .record_rule(&validator.name, &validator.options)
                .map_err(|message| OrmError::InvalidTypeConfig {
                    identifier: schema.identifier.clone(),
                    messages: vec![message],
                })?;
            record_rules.push(rule);
        }

        let compiled = Arc::new(CompiledRules {
            property_rules,
            record_rules,
        });
        self.compiled
            .insert(schema.identifier.clone(), Arc::clone(&compiled));
        Ok(compiled)
    }
}

impl Default for ConfiguredValidator {
    fn default() -> Self {
        Self::new(ValidatorRegistry::new())
    }
}

impl TypeValidator for ConfiguredValidator {
    fn validate(&self, record: &Type, operation: &Operation) -> Vec<FieldMessage> {
        let mut messages = Vec::new();

        for property in record.properties() {
            let definition = property.definition();
            if !operation.includes(&definition.identifier) {
                continue;
            }
            if definition.notnull
                && !definition.autoincrement
                && definition.default.is_none()
                && property.is_null()
            {
                messages.push(FieldMessage::new(
                    definition.identifier.clone(),
                    "This value should not be null.",
                    "not_null",
                ));
            }
        }

        let rules = match self.rules_for(record.schema()) {
            Ok(rules) => rules,
            Err(err) => {
                tracing::error!(identifier = %record.identifier(), error = %err, "invalid validator configuration");
                messages.push(FieldMessage::new(record.identifier(), err.to_string(), "configuration"));
                return messages;
            }
        };

        for (identifier, rule) in &rules.property_rules {
            if !operation.includes(identifier) {
                continue;
            }
            if let Ok(value) = record.get(identifier) {
                messages.extend(rule.validate(value, identifier));
            }
        }

        if *operation == Operation::Create {
            for rule in &rules.record_rules {
                messages.extend(rule.validate(record));
            }
        }

        messages
    }
}

/// Validator accepting everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopValidator;

impl TypeValidator for NoopValidator {
    fn validate(&self, _record: &Type, _operation: &Operation) -> Vec<FieldMessage> {
        Vec::new()
    }
}
