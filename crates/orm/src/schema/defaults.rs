//! Default value generators
//!
//! Configuration refers to generators by key; keys are resolved against this
//! table once, when a type is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::value::FieldValue;

/// Zero-argument value generator
pub type Generator = Arc<dyn Fn() -> FieldValue + Send + Sync>;

/// Default of a property
#[derive(Clone)]
pub enum DefaultValue {
    /// Literal scalar, also emitted into column DDL
    Static(FieldValue),
    /// Evaluated each time a record is written
    Generated { key: String, generator: Generator },
}

impl DefaultValue {
    /// Resolve the default for a write
    pub fn resolve(&self) -> FieldValue {
        match self {
            DefaultValue::Static(value) => value.clone(),
            DefaultValue::Generated { generator, .. } => generator(),
        }
    }

    /// Literal default, if any
    pub fn literal(&self) -> Option<&FieldValue> {
        match self {
            DefaultValue::Static(value) => Some(value),
            DefaultValue::Generated { .. } => None,
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Static(value) => f.debug_tuple("Static").field(value).finish(),
            DefaultValue::Generated { key, .. } => f.debug_struct("Generated").field("key", key).finish(),
        }
    }
}

impl PartialEq for DefaultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DefaultValue::Static(a), DefaultValue::Static(b)) => a == b,
            (DefaultValue::Generated { key: a, .. }, DefaultValue::Generated { key: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// Factory map from generator key to generator
#[derive(Clone)]
pub struct DefaultGenerators {
    generators: HashMap<String, Generator>,
}

impl DefaultGenerators {
    /// Table with the built-in `uuid`, `now`, `today` and `tag` generators
    pub fn new() -> Self {
        let mut table = Self {
            generators: HashMap::new(),
        };
        table.register("uuid", || FieldValue::Uuid(uuid::Uuid::new_v4()));
        table.register("now", || FieldValue::DateTime(now_seconds()));
        table.register("today", || FieldValue::Date(chrono::Utc::now().date_naive()));
        table.register("tag", || FieldValue::Text(random_tag(16)));
        table
    }

    pub fn register<F>(&mut self, key: impl Into<String>, generator: F)
    where
        F: Fn() -> FieldValue + Send + Sync + 'static,
    {
        self.generators.insert(key.into(), Arc::new(generator));
    }

    pub fn get(&self, key: &str) -> Option<Generator> {
        self.generators.get(key).cloned()
    }
}

impl Default for DefaultGenerators {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultGenerators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.generators.keys().collect();
        keys.sort();
        f.debug_struct("DefaultGenerators").field("keys", &keys).finish()
    }
}

/// Random alphanumeric tag
pub fn random_tag(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Current UTC time truncated to whole seconds, the resolution stored by SQLite
fn now_seconds() -> chrono::DateTime<chrono::Utc> {
    use chrono::{SubsecRound, Utc};
    Utc::now().trunc_subsecs(0)
}
