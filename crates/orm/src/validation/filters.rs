//! Input filters applied to text values before validation

use std::collections::HashMap;
use std::fmt;

use crate::error::{OrmError, OrmResult};
use crate::schema::{FieldValue, Type};

pub type Filter = fn(FieldValue) -> FieldValue;

/// Named filters resolved from property configuration
#[derive(Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, Filter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            filters: HashMap::new(),
        };
        registry.register("trim", |value| map_text(value, |s| s.trim().to_string()));
        registry.register("lowercase", |value| map_text(value, |s| s.to_lowercase()));
        registry.register("uppercase", |value| map_text(value, |s| s.to_uppercase()));
        registry.register("null_if_empty", |value| match value {
            FieldValue::Text(s) if s.is_empty() => FieldValue::Null,
            other => other,
        });
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, filter: Filter) {
        self.filters.insert(name.into(), filter);
    }

    /// Run every configured filter over the record's values, in order
    pub fn apply(&self, record: &mut Type) -> OrmResult<()> {
        for property in record.properties_mut() {
            if property.definition().filters.is_empty() {
                continue;
            }
            let mut value = std::mem::take(property.value_mut());
            for name in &property.definition().filters {
                let filter = self.filters.get(name).ok_or_else(|| OrmError::InvalidPropertyConfig {
                    identifier: property.identifier().to_string(),
                    messages: vec![format!("unknown filter '{}'", name)],
                })?;
                value = filter(value);
            }
            *property.value_mut() = value;
        }
        Ok(())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.filters.keys().collect();
        names.sort();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

fn map_text(value: FieldValue, f: impl Fn(&str) -> String) -> FieldValue {
    match value {
        FieldValue::Text(s) => FieldValue::Text(f(&s)),
        other => other,
    }
}
