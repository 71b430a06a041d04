//! Validation rules and the factory map resolving them by name

use std::collections::HashMap;
use std::fmt;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::FieldMessage;
use crate::schema::{FieldValue, Type};

/// Rule checked against one property value
pub trait PropertyRule: Send + Sync {
    /// Validate a single value, `None` when it passes
    fn validate(&self, value: &FieldValue, field: &str) -> Option<FieldMessage>;

    fn rule_name(&self) -> &'static str;
}

/// Rule checked against a whole record
pub trait RecordRule: Send + Sync {
    fn validate(&self, record: &Type) -> Vec<FieldMessage>;

    fn rule_name(&self) -> &'static str;
}

pub type PropertyRuleFactory = fn(&JsonValue) -> Result<Box<dyn PropertyRule>, String>;
pub type RecordRuleFactory = fn(&JsonValue) -> Result<Box<dyn RecordRule>, String>;

/// Capability-keyed table of rule constructors
#[derive(Clone)]
pub struct ValidatorRegistry {
    property_rules: HashMap<String, PropertyRuleFactory>,
    record_rules: HashMap<String, RecordRuleFactory>,
}

impl ValidatorRegistry {
    /// Registry with the built-in rules
    pub fn new() -> Self {
        let mut registry = Self {
            property_rules: HashMap::new(),
            record_rules: HashMap::new(),
        };
        registry.register_property_rule("not_empty", |_| Ok(Box::new(NotEmptyRule)));
        registry.register_property_rule("length", |options| Ok(Box::new(LengthRule::from_options(options)?)));
        registry.register_property_rule("regex", |options| Ok(Box::new(RegexRule::from_options(options)?)));
        registry.register_property_rule("choice", |options| Ok(Box::new(ChoiceRule::from_options(options)?)));
        registry.register_property_rule("range", |options| Ok(Box::new(RangeRule::from_options(options)?)));
        registry.register_record_rule("requires_one_of", |options| {
            Ok(Box::new(RequiresOneOfRule::from_options(options)?))
        });
        registry
    }

    pub fn register_property_rule(&mut self, name: impl Into<String>, factory: PropertyRuleFactory) {
        self.property_rules.insert(name.into(), factory);
    }

    pub fn register_record_rule(&mut self, name: impl Into<String>, factory: RecordRuleFactory) {
        self.record_rules.insert(name.into(), factory);
    }

    pub fn property_rule(&self, name: &str, options: &JsonValue) -> Result<Box<dyn PropertyRule>, String> {
        let factory = self
            .property_rules
            .get(name)
            .ok_or_else(|| format!("unknown property validator '{}'", name))?;
        factory(options)
    }

    pub fn record_rule(&self, name: &str, options: &JsonValue) -> Result<Box<dyn RecordRule>, String> {
        let factory = self
            .record_rules
            .get(name)
            .ok_or_else(|| format!("unknown type validator '{}'", name))?;
        factory(options)
    }
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorRegistry")
            .field("property_rules", &self.property_rules.len())
            .field("record_rules", &self.record_rules.len())
            .finish()
    }
}

pub struct NotEmptyRule;

impl PropertyRule for NotEmptyRule {
    fn validate(&self, value: &FieldValue, field: &str) -> Option<FieldMessage> {
        let empty = match value {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Bytes(b) => b.is_empty(),
            _ => false,
        };
        empty.then(|| FieldMessage::new(field, "This value should not be blank.", self.rule_name()))
    }

    fn rule_name(&self) -> &'static str {
        "not_empty"
    }
}

/// Character length bounds, inclusive
#[derive(Debug, Clone)]
pub struct LengthRule {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl LengthRule {
    fn from_options(options: &JsonValue) -> Result<Self, String> {
        let min = options.get("min").and_then(JsonValue::as_u64).map(|v| v as usize);
        let max = options.get("max").and_then(JsonValue::as_u64).map(|v| v as usize);
        if min.is_none() && max.is_none() {
            return Err("length requires 'min' or 'max'".to_string());
        }
        Ok(Self { min, max })
    }
}

impl PropertyRule for LengthRule {
    fn validate(&self, value: &FieldValue, field: &str) -> Option<FieldMessage> {
        let length = value.text_repr()?.chars().count();

        if let Some(min) = self.min {
            if length < min {
                return Some(FieldMessage::new(
                    field,
                    format!("This value is too short. It should have {} characters or more.", min),
                    self.rule_name(),
                ));
            }
        }
        if let Some(max) = self.max {
            if length > max {
                return Some(FieldMessage::new(
                    field,
                    format!("This value is too long. It should have {} characters or less.", max),
                    self.rule_name(),
                ));
            }
        }
        None
    }

    fn rule_name(&self) -> &'static str {
        "length"
    }
}

pub struct RegexRule {
    pattern: Regex,
}

impl RegexRule {
    fn from_options(options: &JsonValue) -> Result<Self, String> {
        let pattern = options
            .get("pattern")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| "regex requires 'pattern'".to_string())?;
        let pattern = Regex::new(pattern).map_err(|e| format!("invalid pattern: {}", e))?;
        Ok(Self { pattern })
    }
}

impl PropertyRule for RegexRule {
    fn validate(&self, value: &FieldValue, field: &str) -> Option<FieldMessage> {
        let text = value.text_repr()?;
        (!self.pattern.is_match(&text)).then(|| FieldMessage::new(field, "This value is not valid.", self.rule_name()))
    }

    fn rule_name(&self) -> &'static str {
        "regex"
    }
}

pub struct ChoiceRule {
    choices: Vec<JsonValue>,
}

impl ChoiceRule {
    fn from_options(options: &JsonValue) -> Result<Self, String> {
        let choices = options
            .get("values")
            .and_then(JsonValue::as_array)
            .cloned()
            .ok_or_else(|| "choice requires 'values'".to_string())?;
        Ok(Self { choices })
    }
}

impl PropertyRule for ChoiceRule {
    fn validate(&self, value: &FieldValue, field: &str) -> Option<FieldMessage> {
        if value.is_null() {
            return None;
        }
        let json = value.to_json();
        (!self.choices.contains(&json))
            .then(|| FieldMessage::new(field, "The value you selected is not a valid choice.", self.rule_name()))
    }

    fn rule_name(&self) -> &'static str {
        "choice"
    }
}

pub struct RangeRule {
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeRule {
    fn from_options(options: &JsonValue) -> Result<Self, String> {
        let min = options.get("min").and_then(JsonValue::as_f64);
        let max = options.get("max").and_then(JsonValue::as_f64);
        if min.is_none() && max.is_none() {
            return Err("range requires 'min' or 'max'".to_string());
        }
        Ok(Self { min, max })
    }
}

impl PropertyRule for RangeRule {
    fn validate(&self, value: &FieldValue, field: &str) -> Option<FieldMessage> {
        let number = match value {
            FieldValue::Integer(i) => *i as f64,
            FieldValue::Float(f) => *f,
            _ => return None,
        };
        let below = self.min.map_or(false, |min| number < min);
        let above = self.max.map_or(false, |max| number > max);
        (below || above).then(|| FieldMessage::new(field, "This value is out of range.", self.rule_name()))
    }

    fn rule_name(&self) -> &'static str {
        "range"
    }
}

/// At least one of the listed properties must carry a value
pub struct RequiresOneOfRule {
    properties: Vec<String>,
}

impl RequiresOneOfRule {
    fn from_options(options: &JsonValue) -> Result<Self, String> {
        let properties: Vec<String> = options
            .get("properties")
            .and_then(JsonValue::as_array)
            .map(|values| values.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        if properties.is_empty() {
            return Err("requires_one_of requires 'properties'".to_string());
        }
        Ok(Self { properties })
    }
}

impl RecordRule for RequiresOneOfRule {
    fn validate(&self, record: &Type) -> Vec<FieldMessage> {
        let any_set = self
            .properties
            .iter()
            .any(|key| record.get(key).map_or(false, |v| !v.is_null()));
        if any_set {
            Vec::new()
        } else {
            vec![FieldMessage::new(
                record.identifier(),
                format!("One of {} must be set.", self.properties.join(", ")),
                self.rule_name(),
            )]
        }
    }

    fn rule_name(&self) -> &'static str {
        "requires_one_of"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_length_rule() {
        let registry = ValidatorRegistry::new();
        let rule = registry.property_rule("length", &json!({ "min": 2, "max": 4 })).unwrap();

        assert!(rule.validate(&FieldValue::from("abc"), "title").is_none());
        assert_eq!(rule.validate(&FieldValue::from("a"), "title").unwrap().code, "length");
        assert!(rule.validate(&FieldValue::from("abcde"), "title").is_some());
        assert!(rule.validate(&FieldValue::Null, "title").is_none());
    }

    #[test]
    fn test_regex_and_choice_rules() {
        let registry = ValidatorRegistry::new();
        let slug = registry.property_rule("regex", &json!({ "pattern": "^[a-z-]+$" })).unwrap();
        assert!(slug.validate(&FieldValue::from("hello-world"), "slug").is_none());
        assert!(slug.validate(&FieldValue::from("Hello World"), "slug").is_some());

        let choice = registry.property_rule("choice", &json!({ "values": ["draft", "published"] })).unwrap();
        assert!(choice.validate(&FieldValue::from("draft"), "state").is_none());
        assert!(choice.validate(&FieldValue::from("deleted"), "state").is_some());
    }

    #[test]
    fn test_unknown_and_misconfigured_rules() {
        let registry = ValidatorRegistry::new();
        assert!(registry.property_rule("nope", &JsonValue::Null).is_err());
        assert!(registry.property_rule("regex", &json!({})).is_err());
        assert!(registry.record_rule("requires_one_of", &json!({ "properties": [] })).is_err());
    }

    #[test]
    fn test_range_rule() {
        let registry = ValidatorRegistry::new();
        let rule = registry.property_rule("range", &json!({ "min": 0, "max": 10 })).unwrap();
        assert!(rule.validate(&FieldValue::Integer(5), "score").is_none());
        assert!(rule.validate(&FieldValue::Integer(11), "score").is_some());
        assert!(rule.validate(&FieldValue::Float(-0.5), "score").is_some());
    }
}
