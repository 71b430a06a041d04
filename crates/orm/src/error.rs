//! Error types for the data access layer
//!
//! Configuration, query construction, storage and migration failures all
//! surface through [`OrmError`]. Every variant carries enough context to
//! diagnose the failure without re-running at a higher log level.

use std::fmt;

use thiserror::Error;

/// ORM result type alias
pub type OrmResult<T> = Result<T, OrmError>;

/// A single validation message attached to a property
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldMessage {
    /// Property identifier the message belongs to (or the type identifier for record-level rules)
    pub field: String,
    pub message: String,
    /// Machine readable rule code, e.g. `not_null` or `length`
    pub code: String,
}

impl FieldMessage {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for FieldMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.field, self.message, self.code)
    }
}

/// A DDL statement that failed while applying or reverting a migration
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatementFailure {
    pub statement: String,
    pub reason: String,
}

/// Error types for ORM operations
#[derive(Debug, Clone, Error)]
pub enum OrmError {
    /// Type identifier (or table name) is absent from configuration
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("Invalid configuration for type '{identifier}': {}", .messages.join("; "))]
    InvalidTypeConfig {
        identifier: String,
        messages: Vec<String>,
    },

    #[error("Property '{property}' not found on type '{type_identifier}'")]
    PropertyNotFound {
        type_identifier: String,
        property: String,
    },

    #[error("Invalid configuration for property '{identifier}': {}", .messages.join("; "))]
    InvalidPropertyConfig {
        identifier: String,
        messages: Vec<String>,
    },

    /// The caller built an impossible predicate, ordering or relation path
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid input for '{identifier}': {}", join_messages(.messages))]
    InvalidInput {
        identifier: String,
        messages: Vec<FieldMessage>,
    },

    /// Storage engine failure with the rendered statement and bound parameters
    #[error("Database query failed: {message} (sql: {sql}; params: [{}])", .params.join(", "))]
    DatabaseQuery {
        sql: String,
        params: Vec<String>,
        message: String,
    },

    #[error("Migration '{0}' not found")]
    MigrationNotFound(String),

    #[error("Failed to save migration '{name}': {reason}")]
    MigrationSaveFailed { name: String, reason: String },

    #[error("Migration '{name}' partially applied, {} statement(s) failed: {}", .failures.len(), join_failures(.failures))]
    MigrationPartiallyApplied {
        name: String,
        failures: Vec<StatementFailure>,
    },

    #[error("Migration '{0}' has not been applied")]
    MigrationNotApplied(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

fn join_messages(messages: &[FieldMessage]) -> String {
    messages
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_failures(failures: &[StatementFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("`{}` ({})", f.statement, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl OrmError {
    /// Field messages of an `InvalidInput` error, empty for every other variant
    pub fn field_messages(&self) -> &[FieldMessage] {
        match self {
            OrmError::InvalidInput { messages, .. } => messages,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for OrmError {
    fn from(err: serde_yaml::Error) -> Self {
        OrmError::Configuration(err.to_string())
    }
}

impl From<std::io::Error> for OrmError {
    fn from(err: std::io::Error) -> Self {
        OrmError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_query_error_carries_statement() {
        let err = OrmError::DatabaseQuery {
            sql: "INSERT INTO post (title) VALUES (?)".to_string(),
            params: vec!["'hello'".to_string()],
            message: "no such table: post".to_string(),
        };

        let text = err.to_string();
        assert!(text.contains("INSERT INTO post"));
        assert!(text.contains("'hello'"));
        assert!(text.contains("no such table"));
    }

    #[test]
    fn test_invalid_input_lists_field_messages() {
        let err = OrmError::InvalidInput {
            identifier: "blog::post".to_string(),
            messages: vec![FieldMessage::new("blog::post-title", "This value should not be null.", "not_null")],
        };

        assert_eq!(err.field_messages().len(), 1);
        assert!(err.to_string().contains("blog::post-title"));
    }

    #[test]
    fn test_partial_failure_lists_statements() {
        let err = OrmError::MigrationPartiallyApplied {
            name: "2024-init".to_string(),
            failures: vec![StatementFailure {
                statement: "CREATE TABLE x".to_string(),
                reason: "syntax error".to_string(),
            }],
        };

        let text = err.to_string();
        assert!(text.contains("1 statement(s) failed"));
        assert!(text.contains("CREATE TABLE x"));
    }
}
