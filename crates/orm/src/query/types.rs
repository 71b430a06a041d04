//! Query Builder Types - Core types and enums for query building

use std::collections::HashMap;
use std::fmt;

use super::path::PropertyPath;
use crate::backends::{DatabaseValue, SqlDialect};
use crate::schema::{FieldValue, StorageType};

/// Comparison operators with a single bound value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Equal,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
        }
    }
}

/// Order by direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Parameters of a raw predicate
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RawParams {
    #[default]
    None,
    /// Replace each `?` in order
    Positional(Vec<FieldValue>),
    /// Replace each `:name`
    Named(HashMap<String, FieldValue>),
}

/// One WHERE predicate, combined with AND
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Compare {
        path: PropertyPath,
        operator: QueryOperator,
        value: FieldValue,
    },
    InSet {
        path: PropertyPath,
        negated: bool,
        values: Vec<FieldValue>,
    },
    Null {
        path: PropertyPath,
        is_null: bool,
    },
    Raw {
        sql: String,
        params: RawParams,
    },
}

/// Collects bound parameters while SQL is rendered
///
/// Null values are written as a literal `NULL` rather than bound.
#[derive(Debug, Clone)]
pub(crate) struct ParamSink {
    dialect: SqlDialect,
    params: Vec<DatabaseValue>,
}

impl ParamSink {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Bind a value and return the SQL to put in its place
    pub fn push(&mut self, value: DatabaseValue) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        let placeholder = self.dialect.parameter_placeholder(self.params.len());
        self.params.push(value);
        placeholder
    }

    pub fn into_params(self) -> Vec<DatabaseValue> {
        self.params
    }
}

/// Convert a value with no known column type, as for raw predicates
pub(crate) fn untyped_value(value: &FieldValue, dialect: SqlDialect) -> DatabaseValue {
    match value {
        FieldValue::Null => DatabaseValue::Null,
        FieldValue::Bool(b) if dialect.supports_boolean() => DatabaseValue::Bool(*b),
        FieldValue::Bool(b) => DatabaseValue::Int64(i64::from(*b)),
        FieldValue::Integer(i) => DatabaseValue::Int64(*i),
        FieldValue::Float(f) => DatabaseValue::Float64(*f),
        FieldValue::Text(s) => DatabaseValue::String(s.clone()),
        FieldValue::Bytes(b) => DatabaseValue::Bytes(b.clone()),
        FieldValue::DateTime(dt) => match dialect {
            SqlDialect::PostgreSQL => DatabaseValue::DateTime(*dt),
            SqlDialect::SQLite => DatabaseValue::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        },
        FieldValue::Date(d) => DatabaseValue::Date(*d),
        FieldValue::Time(t) => DatabaseValue::Time(*t),
        FieldValue::Uuid(u) => DatabaseValue::Uuid(*u),
        FieldValue::Json(j) => DatabaseValue::Json(j.clone()),
        FieldValue::Record(record) => untyped_value(record.autoincrement_value(), dialect),
    }
}

/// Convert a predicate value for a column of known storage type
pub(crate) fn typed_value(
    value: &FieldValue,
    storage: StorageType,
    dialect: SqlDialect,
) -> Result<DatabaseValue, String> {
    match value {
        FieldValue::Record(record) => storage.to_database(record.autoincrement_value(), dialect),
        other => storage.to_database(other, dialect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_sink_placeholders() {
        let mut sink = ParamSink::new(SqlDialect::PostgreSQL);
        assert_eq!(sink.push(DatabaseValue::Int64(1)), "$1");
        assert_eq!(sink.push(DatabaseValue::Null), "NULL");
        assert_eq!(sink.push(DatabaseValue::from("a")), "$2");
        assert_eq!(sink.into_params().len(), 2);
    }

    #[test]
    fn test_untyped_booleans_follow_dialect() {
        assert_eq!(untyped_value(&FieldValue::Bool(true), SqlDialect::SQLite), DatabaseValue::Int64(1));
        assert_eq!(
            untyped_value(&FieldValue::Bool(true), SqlDialect::PostgreSQL),
            DatabaseValue::Bool(true)
        );
    }
}
