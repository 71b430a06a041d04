//! Core Database Backend Traits
//!
//! The connection trait every driver implements, the values bound to
//! statements and the dialect differences the SQL generators care about.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{OrmError, OrmResult};
use crate::migrations::snapshot::{SchemaSnapshot, TableSchema};

/// Abstract database connection
///
/// Implementations wrap a pool, so every method takes `&self` and a
/// connection can be shared behind an `Arc`.
#[async_trait]
pub trait DatabaseConnection: Send + Sync {
    /// SQL dialect spoken by this connection
    fn dialect(&self) -> SqlDialect;

    /// Execute a statement and return the affected rows and generated id
    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ExecuteResult>;

    /// Execute DDL statements in order, one outcome per statement
    ///
    /// Every statement is attempted even after a failure. Backends that keep
    /// per-connection state between statements run them on one connection.
    async fn execute_each(&self, statements: &[String]) -> Vec<OrmResult<ExecuteResult>> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.execute(statement, &[]).await);
        }
        results
    }

    /// Execute a query and return every row
    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>>;

    /// Execute a query and return the first row
    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<DatabaseRow>>;

    /// Read the live schema of every user table
    async fn introspect_schema(&self) -> OrmResult<SchemaSnapshot>;

    /// Read the live schema of one table, `None` when it does not exist
    async fn introspect_table(&self, table: &str) -> OrmResult<Option<TableSchema>>;

    /// Close the underlying pool
    async fn close(&self) -> OrmResult<()>;
}

/// Outcome of a data-modifying statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Row id generated by the statement, where the driver reports one
    pub last_insert_id: Option<i64>,
}

/// One result row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseRow {
    columns: Vec<(String, DatabaseValue)>,
}

impl DatabaseRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: DatabaseValue) {
        self.columns.push((column.into(), value));
    }

    /// Get a column value by name
    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DatabaseValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Read a text column, accepting any scalar representation
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            DatabaseValue::Null => None,
            DatabaseValue::String(s) => Some(s.clone()),
            DatabaseValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            other => Some(other.to_json().to_string().trim_matches('"').to_string()),
        }
    }

    /// Read an integer column, accepting booleans and numeric text
    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            DatabaseValue::Int32(i) => Some(i64::from(*i)),
            DatabaseValue::Int64(i) => Some(*i),
            DatabaseValue::Bool(b) => Some(i64::from(*b)),
            DatabaseValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Convert row to a JSON object
    pub fn to_json(&self) -> JsonValue {
        let map = self
            .columns
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        JsonValue::Object(map)
    }
}

impl FromIterator<(String, DatabaseValue)> for DatabaseRow {
    fn from_iter<I: IntoIterator<Item = (String, DatabaseValue)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::from(*i),
            DatabaseValue::Int64(i) => JsonValue::from(*i),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::String(String::from_utf8_lossy(b).into_owned()),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Time(t) => JsonValue::String(t.to_string()),
            DatabaseValue::Json(j) => j.clone(),
        }
    }
}

/// Short rendering used in diagnostics
impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseValue::Null => write!(f, "NULL"),
            DatabaseValue::Bool(b) => write!(f, "{}", b),
            DatabaseValue::Int32(i) => write!(f, "{}", i),
            DatabaseValue::Int64(i) => write!(f, "{}", i),
            DatabaseValue::Float64(v) => write!(f, "{}", v),
            DatabaseValue::String(s) => write!(f, "'{}'", s),
            DatabaseValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            DatabaseValue::Uuid(u) => write!(f, "'{}'", u),
            DatabaseValue::DateTime(dt) => write!(f, "'{}'", dt.to_rfc3339()),
            DatabaseValue::Date(d) => write!(f, "'{}'", d),
            DatabaseValue::Time(t) => write!(f, "'{}'", t),
            DatabaseValue::Json(j) => write!(f, "{}", j),
        }
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

/// Wrap a driver failure with the statement that caused it, and log it
pub(crate) fn query_error(sql: &str, params: &[DatabaseValue], err: impl fmt::Display) -> OrmError {
    let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    let message = err.to_string();
    tracing::error!(sql = %sql, params = ?params, error = %message, "database query failed");
    OrmError::DatabaseQuery {
        sql: sql.to_string(),
        params,
        message,
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    PostgreSQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder for the zero-based parameter index
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Whether `INSERT ... RETURNING` reports the generated key
    pub fn supports_returning(&self) -> bool {
        matches!(self, SqlDialect::PostgreSQL)
    }

    /// Whether booleans are stored natively rather than as 0/1
    pub fn supports_boolean(&self) -> bool {
        matches!(self, SqlDialect::PostgreSQL)
    }

    /// Literal for a boolean in DDL defaults
    pub fn boolean_literal(&self, value: bool) -> &'static str {
        match (self, value) {
            (SqlDialect::PostgreSQL, true) => "true",
            (SqlDialect::PostgreSQL, false) => "false",
            (SqlDialect::SQLite, true) => "1",
            (SqlDialect::SQLite, false) => "0",
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::PostgreSQL => write!(f, "postgresql"),
            SqlDialect::SQLite => write!(f, "sqlite"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(0), "$1");
        assert_eq!(SqlDialect::PostgreSQL.parameter_placeholder(2), "$3");
        assert_eq!(SqlDialect::SQLite.parameter_placeholder(5), "?");
    }

    #[test]
    fn test_row_accessors() {
        let row: DatabaseRow = vec![
            ("post__id".to_string(), DatabaseValue::Int64(7)),
            ("post__title".to_string(), DatabaseValue::String("Hello".to_string())),
            ("post__body".to_string(), DatabaseValue::Null),
        ]
        .into_iter()
        .collect();

        assert_eq!(row.integer("post__id"), Some(7));
        assert_eq!(row.text("post__title").as_deref(), Some("Hello"));
        assert_eq!(row.text("post__body"), None);
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.column_names().collect::<Vec<_>>(), vec!["post__id", "post__title", "post__body"]);
    }

    #[test]
    fn test_text_conversions() {
        let table = "post";
        assert_eq!(DatabaseValue::from(table), DatabaseValue::String("post".to_string()));
        assert_eq!(DatabaseValue::from(String::from("post")), DatabaseValue::String("post".to_string()));
    }
}
