//! Storage type codec
//!
//! Maps a property's declared storage type to column DDL and converts values
//! between their runtime and bound representations for each dialect.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::Value as JsonValue;

use super::value::FieldValue;
use crate::backends::{DatabaseValue, SqlDialect};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Integer,
    BigInt,
    SmallInt,
    String,
    Text,
    Boolean,
    DateTime,
    Date,
    Time,
    Float,
    Decimal,
    Blob,
    Json,
    Guid,
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "integer" | "int" => Ok(StorageType::Integer),
            "bigint" => Ok(StorageType::BigInt),
            "smallint" => Ok(StorageType::SmallInt),
            "string" => Ok(StorageType::String),
            "text" => Ok(StorageType::Text),
            "boolean" | "bool" => Ok(StorageType::Boolean),
            "datetime" | "datetime_immutable" => Ok(StorageType::DateTime),
            "date" | "date_immutable" => Ok(StorageType::Date),
            "time" | "time_immutable" => Ok(StorageType::Time),
            "float" => Ok(StorageType::Float),
            "decimal" => Ok(StorageType::Decimal),
            "blob" | "binary" => Ok(StorageType::Blob),
            "json" => Ok(StorageType::Json),
            "guid" | "uuid" => Ok(StorageType::Guid),
            other => Err(format!("unknown storage type '{}'", other)),
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageType::Integer => "integer",
            StorageType::BigInt => "bigint",
            StorageType::SmallInt => "smallint",
            StorageType::String => "string",
            StorageType::Text => "text",
            StorageType::Boolean => "boolean",
            StorageType::DateTime => "datetime",
            StorageType::Date => "date",
            StorageType::Time => "time",
            StorageType::Float => "float",
            StorageType::Decimal => "decimal",
            StorageType::Blob => "blob",
            StorageType::Json => "json",
            StorageType::Guid => "guid",
        };
        f.write_str(name)
    }
}

/// Column dimensions that influence the rendered type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDimensions {
    pub length: Option<u32>,
    pub precision: u32,
    pub scale: u32,
    pub fixed: bool,
    pub autoincrement: bool,
}

impl StorageType {
    pub fn is_integer(&self) -> bool {
        matches!(self, StorageType::Integer | StorageType::BigInt | StorageType::SmallInt)
    }

    /// Column type for CREATE/ALTER statements
    pub fn sql_type(&self, dialect: SqlDialect, dims: &ColumnDimensions) -> String {
        // SQLite only aliases the rowid for exactly INTEGER
        if dims.autoincrement && dialect == SqlDialect::SQLite {
            return "INTEGER".to_string();
        }

        match (self, dialect) {
            (StorageType::Integer, _) => "INTEGER".to_string(),
            (StorageType::BigInt, _) => "BIGINT".to_string(),
            (StorageType::SmallInt, _) => "SMALLINT".to_string(),
            (StorageType::String, _) => {
                let length = dims.length.unwrap_or(255);
                if dims.fixed {
                    format!("CHAR({})", length)
                } else {
                    format!("VARCHAR({})", length)
                }
            }
            (StorageType::Text, _) => "TEXT".to_string(),
            (StorageType::Boolean, _) => "BOOLEAN".to_string(),
            (StorageType::DateTime, SqlDialect::SQLite) => "DATETIME".to_string(),
            (StorageType::DateTime, SqlDialect::PostgreSQL) => "TIMESTAMPTZ".to_string(),
            (StorageType::Date, _) => "DATE".to_string(),
            (StorageType::Time, _) => "TIME".to_string(),
            (StorageType::Float, _) => "DOUBLE PRECISION".to_string(),
            (StorageType::Decimal, _) => format!("NUMERIC({},{})", dims.precision, dims.scale),
            (StorageType::Blob, SqlDialect::SQLite) => "BLOB".to_string(),
            (StorageType::Blob, SqlDialect::PostgreSQL) => "BYTEA".to_string(),
            (StorageType::Json, _) => "JSON".to_string(),
            (StorageType::Guid, SqlDialect::SQLite) => "CHAR(36)".to_string(),
            (StorageType::Guid, SqlDialect::PostgreSQL) => "UUID".to_string(),
        }
    }

    /// Expression used in a select list for a qualified column
    ///
    /// PostgreSQL NUMERIC has no native decoding, so it is read as a double.
    pub fn select_expression(&self, dialect: SqlDialect, qualified: &str) -> String {
        match (self, dialect) {
            (StorageType::Decimal, SqlDialect::PostgreSQL) => {
                format!("CAST({} AS DOUBLE PRECISION)", qualified)
            }
            _ => qualified.to_string(),
        }
    }

    /// Runtime value to bound value
    pub fn to_database(&self, value: &FieldValue, dialect: SqlDialect) -> Result<DatabaseValue, String> {
        if value.is_null() {
            return Ok(DatabaseValue::Null);
        }

        match self {
            StorageType::Integer | StorageType::BigInt | StorageType::SmallInt => match value {
                FieldValue::Integer(i) => Ok(DatabaseValue::Int64(*i)),
                FieldValue::Bool(b) => Ok(DatabaseValue::Int64(i64::from(*b))),
                FieldValue::Float(f) if f.fract() == 0.0 => Ok(DatabaseValue::Int64(*f as i64)),
                FieldValue::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(DatabaseValue::Int64)
                    .map_err(|_| format!("'{}' is not an integer", s)),
                other => Err(mismatch(other, self)),
            },
            StorageType::String | StorageType::Text => match value {
                FieldValue::Text(s) => Ok(DatabaseValue::String(s.clone())),
                FieldValue::Json(j) => Ok(DatabaseValue::String(j.to_string())),
                other => other
                    .text_repr()
                    .map(DatabaseValue::String)
                    .ok_or_else(|| mismatch(other, self)),
            },
            StorageType::Boolean => {
                let flag = match value {
                    FieldValue::Bool(b) => *b,
                    FieldValue::Integer(i) => *i != 0,
                    FieldValue::Text(s) => parse_bool(s).ok_or_else(|| format!("'{}' is not a boolean", s))?,
                    other => return Err(mismatch(other, self)),
                };
                if dialect.supports_boolean() {
                    Ok(DatabaseValue::Bool(flag))
                } else {
                    Ok(DatabaseValue::Int64(i64::from(flag)))
                }
            }
            StorageType::DateTime => {
                let dt = match value {
                    FieldValue::DateTime(dt) => *dt,
                    FieldValue::Text(s) => parse_datetime(s).ok_or_else(|| format!("'{}' is not a datetime", s))?,
                    other => return Err(mismatch(other, self)),
                };
                Ok(match dialect {
                    SqlDialect::PostgreSQL => DatabaseValue::DateTime(dt),
                    SqlDialect::SQLite => DatabaseValue::String(dt.format(DATETIME_FORMAT).to_string()),
                })
            }
            StorageType::Date => {
                let date = match value {
                    FieldValue::Date(d) => *d,
                    FieldValue::DateTime(dt) => dt.date_naive(),
                    FieldValue::Text(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                        .map_err(|_| format!("'{}' is not a date", s))?,
                    other => return Err(mismatch(other, self)),
                };
                Ok(match dialect {
                    SqlDialect::PostgreSQL => DatabaseValue::Date(date),
                    SqlDialect::SQLite => DatabaseValue::String(date.format(DATE_FORMAT).to_string()),
                })
            }
            StorageType::Time => {
                let time = match value {
                    FieldValue::Time(t) => *t,
                    FieldValue::Text(s) => parse_time(s).ok_or_else(|| format!("'{}' is not a time", s))?,
                    other => return Err(mismatch(other, self)),
                };
                Ok(match dialect {
                    SqlDialect::PostgreSQL => DatabaseValue::Time(time),
                    SqlDialect::SQLite => DatabaseValue::String(time.format(TIME_FORMAT).to_string()),
                })
            }
            StorageType::Float | StorageType::Decimal => match value {
                FieldValue::Float(f) => Ok(DatabaseValue::Float64(*f)),
                FieldValue::Integer(i) => Ok(DatabaseValue::Float64(*i as f64)),
                FieldValue::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(DatabaseValue::Float64)
                    .map_err(|_| format!("'{}' is not a number", s)),
                other => Err(mismatch(other, self)),
            },
            StorageType::Blob => match value {
                FieldValue::Bytes(b) => Ok(DatabaseValue::Bytes(b.clone())),
                FieldValue::Text(s) => Ok(DatabaseValue::Bytes(s.as_bytes().to_vec())),
                FieldValue::Json(j) => Ok(DatabaseValue::Bytes(j.to_string().into_bytes())),
                other => Err(mismatch(other, self)),
            },
            StorageType::Json => {
                let json = match value {
                    FieldValue::Text(s) => serde_json::from_str(s).unwrap_or_else(|_| JsonValue::String(s.clone())),
                    other => other.to_json(),
                };
                Ok(match dialect {
                    SqlDialect::PostgreSQL => DatabaseValue::Json(json),
                    SqlDialect::SQLite => DatabaseValue::String(json.to_string()),
                })
            }
            StorageType::Guid => {
                let uuid = match value {
                    FieldValue::Uuid(u) => *u,
                    FieldValue::Text(s) => {
                        uuid::Uuid::parse_str(s.trim()).map_err(|_| format!("'{}' is not a uuid", s))?
                    }
                    other => return Err(mismatch(other, self)),
                };
                Ok(match dialect {
                    SqlDialect::PostgreSQL => DatabaseValue::Uuid(uuid),
                    SqlDialect::SQLite => DatabaseValue::String(uuid.to_string()),
                })
            }
        }
    }

    /// Bound or fetched value back to its runtime representation
    pub fn from_database(&self, raw: &DatabaseValue) -> Result<FieldValue, String> {
        if raw.is_null() {
            return Ok(FieldValue::Null);
        }

        match self {
            StorageType::Integer | StorageType::BigInt | StorageType::SmallInt => match raw {
                DatabaseValue::Int32(i) => Ok(FieldValue::Integer(i64::from(*i))),
                DatabaseValue::Int64(i) => Ok(FieldValue::Integer(*i)),
                DatabaseValue::Bool(b) => Ok(FieldValue::Integer(i64::from(*b))),
                DatabaseValue::Float64(f) => Ok(FieldValue::Integer(*f as i64)),
                DatabaseValue::String(s) => s
                    .trim()
                    .parse()
                    .map(FieldValue::Integer)
                    .map_err(|_| format!("'{}' is not an integer", s)),
                other => Err(format!("cannot read {} as {}", other, self)),
            },
            StorageType::String | StorageType::Text => match raw {
                DatabaseValue::String(s) => Ok(FieldValue::Text(s.clone())),
                DatabaseValue::Bytes(b) => Ok(FieldValue::Text(String::from_utf8_lossy(b).into_owned())),
                other => Ok(FieldValue::Text(other.to_json().to_string().trim_matches('"').to_string())),
            },
            StorageType::Boolean => match raw {
                DatabaseValue::Bool(b) => Ok(FieldValue::Bool(*b)),
                DatabaseValue::Int32(i) => Ok(FieldValue::Bool(*i != 0)),
                DatabaseValue::Int64(i) => Ok(FieldValue::Bool(*i != 0)),
                DatabaseValue::String(s) => parse_bool(s)
                    .map(FieldValue::Bool)
                    .ok_or_else(|| format!("'{}' is not a boolean", s)),
                other => Err(format!("cannot read {} as {}", other, self)),
            },
            StorageType::DateTime => match raw {
                DatabaseValue::DateTime(dt) => Ok(FieldValue::DateTime(*dt)),
                DatabaseValue::String(s) => parse_datetime(s)
                    .map(FieldValue::DateTime)
                    .ok_or_else(|| format!("'{}' is not a datetime", s)),
                other => Err(format!("cannot read {} as {}", other, self)),
            },
            StorageType::Date => match raw {
                DatabaseValue::Date(d) => Ok(FieldValue::Date(*d)),
                DatabaseValue::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                    .map(FieldValue::Date)
                    .map_err(|_| format!("'{}' is not a date", s)),
                other => Err(format!("cannot read {} as {}", other, self)),
            },
            StorageType::Time => match raw {
                DatabaseValue::Time(t) => Ok(FieldValue::Time(*t)),
                DatabaseValue::String(s) => parse_time(s)
                    .map(FieldValue::Time)
                    .ok_or_else(|| format!("'{}' is not a time", s)),
                other => Err(format!("cannot read {} as {}", other, self)),
            },
            StorageType::Float | StorageType::Decimal => match raw {
                DatabaseValue::Float64(f) => Ok(FieldValue::Float(*f)),
                DatabaseValue::Int32(i) => Ok(FieldValue::Float(f64::from(*i))),
                DatabaseValue::Int64(i) => Ok(FieldValue::Float(*i as f64)),
                DatabaseValue::String(s) => s
                    .trim()
                    .parse()
                    .map(FieldValue::Float)
                    .map_err(|_| format!("'{}' is not a number", s)),
                other => Err(format!("cannot read {} as {}", other, self)),
            },
            StorageType::Blob => match raw {
                DatabaseValue::Bytes(b) => Ok(FieldValue::Bytes(b.clone())),
                DatabaseValue::String(s) => Ok(FieldValue::Bytes(s.as_bytes().to_vec())),
                other => Err(format!("cannot read {} as {}", other, self)),
            },
            StorageType::Json => match raw {
                DatabaseValue::Json(j) => Ok(FieldValue::Json(j.clone())),
                DatabaseValue::String(s) => Ok(serde_json::from_str(s)
                    .map(FieldValue::Json)
                    .unwrap_or_else(|_| FieldValue::Text(s.clone()))),
                DatabaseValue::Bytes(b) => serde_json::from_slice(b)
                    .map(FieldValue::Json)
                    .map_err(|e| format!("invalid json: {}", e)),
                other => Ok(FieldValue::Json(other.to_json())),
            },
            StorageType::Guid => match raw {
                DatabaseValue::Uuid(u) => Ok(FieldValue::Uuid(*u)),
                DatabaseValue::String(s) => uuid::Uuid::parse_str(s.trim())
                    .map(FieldValue::Uuid)
                    .map_err(|_| format!("'{}' is not a uuid", s)),
                other => Err(format!("cannot read {} as {}", other, self)),
            },
        }
    }
}

/// Render a literal scalar as an SQL default, `None` for anything else
pub fn default_literal(value: &FieldValue, dialect: SqlDialect) -> Option<String> {
    match value {
        FieldValue::Bool(b) => Some(dialect.boolean_literal(*b).to_string()),
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Float(f) => Some(f.to_string()),
        FieldValue::Text(s) => Some(quote_literal(s)),
        FieldValue::Date(d) => Some(quote_literal(&d.format(DATE_FORMAT).to_string())),
        FieldValue::Time(t) => Some(quote_literal(&t.format(TIME_FORMAT).to_string())),
        FieldValue::DateTime(dt) => Some(quote_literal(&dt.format(DATETIME_FORMAT).to_string())),
        FieldValue::Uuid(u) => Some(quote_literal(&u.to_string())),
        FieldValue::Null | FieldValue::Bytes(_) | FieldValue::Json(_) | FieldValue::Record(_) => None,
    }
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn mismatch(value: &FieldValue, storage: &StorageType) -> String {
    format!("cannot store {} as {}", value.to_json(), storage)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M:%S%.f").ok()
}
