//! SQLite Backend Implementation
//!
//! Uses sqlx as the underlying driver. Introspection goes through
//! `sqlite_master` and the pragma table-valued functions.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Column, Row, Sqlite, TypeInfo, ValueRef};

use super::core::*;
use crate::config::DatabaseConfig;
use crate::error::{OrmError, OrmResult};
use crate::migrations::snapshot::{ColumnSchema, ForeignKeySchema, IndexSchema, SchemaSnapshot, TableSchema};

/// SQLite connection backed by a pool
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    pool: SqlitePool,
}

impl SqliteConnection {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured file, creating it when missing
    ///
    /// A store created by this call gets the performance pragmas applied.
    pub async fn connect(config: &DatabaseConfig) -> OrmResult<Self> {
        let path = config
            .path
            .as_deref()
            .ok_or_else(|| OrmError::Configuration("sqlite database requires a 'path'".to_string()))?;

        if path == Path::new(":memory:") {
            return Self::in_memory().await;
        }

        let existed = path.exists();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OrmError::Connection(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let mut options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        if !existed {
            tracing::info!(path = %path.display(), "initializing new sqlite database");
            options = options
                .synchronous(SqliteSynchronous::Normal)
                .journal_mode(SqliteJournalMode::Wal)
                .pragma("cache_size", "10000")
                .pragma("temp_store", "MEMORY")
                .pragma("mmap_size", "268435456");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to open {}: {}", path.display(), e)))?;

        Ok(Self::from_pool(pool))
    }

    /// Private in-memory database
    ///
    /// Every pooled connection would see its own empty database, so the pool
    /// holds exactly one connection that is never recycled.
    pub async fn in_memory() -> OrmResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| OrmError::Connection(e.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to open in-memory sqlite: {}", e)))?;

        Ok(Self::from_pool(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn table_names(&self) -> OrmResult<Vec<String>> {
        let rows = self
            .fetch_all(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await?;
        Ok(rows.iter().filter_map(|row| row.text("name")).collect())
    }

    async fn read_table(&self, table: &str) -> OrmResult<TableSchema> {
        let params = [DatabaseValue::from(table)];
        let mut schema = TableSchema::new(table);

        let columns = self
            .fetch_all(
                "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid",
                &params,
            )
            .await?;
        let pk_count = columns.iter().filter(|c| c.integer("pk").unwrap_or(0) > 0).count();

        for row in &columns {
            let name = row.text("name").unwrap_or_default();
            let sql_type = row.text("type").unwrap_or_default().to_uppercase();
            let primary = row.integer("pk").unwrap_or(0) > 0;

            schema.columns.push(ColumnSchema {
                autoincrement: primary && pk_count == 1 && sql_type == "INTEGER",
                nullable: row.integer("notnull").unwrap_or(0) == 0 && !primary,
                default: row.text("dflt_value"),
                name,
                sql_type,
                comment: None,
            });
        }

        let indexes = self
            .fetch_all(
                "SELECT name, \"unique\", origin FROM pragma_index_list(?) ORDER BY name",
                &params,
            )
            .await?;
        for row in &indexes {
            let name = row.text("name").unwrap_or_default();
            if row.text("origin").as_deref() == Some("pk") || name.starts_with("sqlite_autoindex") {
                continue;
            }
            let columns = self
                .fetch_all(
                    "SELECT name FROM pragma_index_info(?) ORDER BY seqno",
                    &[DatabaseValue::from(name.as_str())],
                )
                .await?
                .iter()
                .filter_map(|c| c.text("name"))
                .collect();
            schema.indexes.push(IndexSchema {
                unique: row.integer("unique").unwrap_or(0) == 1,
                name,
                columns,
            });
        }

        let foreign_keys = self
            .fetch_all(
                "SELECT id, \"table\", \"from\", \"to\", on_update, on_delete \
                 FROM pragma_foreign_key_list(?) ORDER BY id, seq",
                &params,
            )
            .await?;
        let mut current: Option<(i64, ForeignKeySchema)> = None;
        for row in &foreign_keys {
            let id = row.integer("id").unwrap_or(0);
            let from = row.text("from").unwrap_or_default();
            let to = row.text("to").unwrap_or_default();

            match current.as_mut() {
                Some((current_id, fk)) if *current_id == id => {
                    fk.columns.push(from);
                    fk.foreign_columns.push(to);
                }
                _ => {
                    if let Some((_, fk)) = current.take() {
                        schema.foreign_keys.push(fk);
                    }
                    current = Some((
                        id,
                        ForeignKeySchema {
                            name: None,
                            columns: vec![from],
                            foreign_table: row.text("table").unwrap_or_default(),
                            foreign_columns: vec![to],
                            on_update: row.text("on_update").unwrap_or_default(),
                            on_delete: row.text("on_delete").unwrap_or_default(),
                        },
                    ));
                }
            }
        }
        if let Some((_, fk)) = current {
            schema.foreign_keys.push(fk);
        }

        Ok(schema)
    }
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::SQLite
    }

    async fn execute(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ExecuteResult> {
        tracing::debug!(sql = %sql, params = params.len(), "execute");
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_database_value(query, param);
        }

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(sql, params, e))?;

        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    /// `PRAGMA foreign_keys` is per connection, so the statements share one
    async fn execute_each(&self, statements: &[String]) -> Vec<OrmResult<ExecuteResult>> {
        let mut connection = match self.pool.acquire().await {
            Ok(connection) => connection,
            Err(err) => {
                let message = err.to_string();
                return statements
                    .iter()
                    .map(|statement| Err(query_error(statement, &[], &message)))
                    .collect();
            }
        };

        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            tracing::debug!(sql = %statement, "execute");
            let result = if is_foreign_key_check(statement) {
                match sqlx::query(statement).fetch_all(&mut *connection).await {
                    Ok(rows) if rows.is_empty() => Ok(ExecuteResult::default()),
                    Ok(rows) => Err(query_error(
                        statement,
                        &[],
                        format!("{} row(s) violate a foreign key", rows.len()),
                    )),
                    Err(err) => Err(query_error(statement, &[], err)),
                }
            } else {
                sqlx::query(statement)
                    .execute(&mut *connection)
                    .await
                    .map(|result| ExecuteResult {
                        rows_affected: result.rows_affected(),
                        last_insert_id: Some(result.last_insert_rowid()),
                    })
                    .map_err(|err| query_error(statement, &[], err))
            };
            results.push(result);
        }
        results
    }

    async fn fetch_all(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Vec<DatabaseRow>> {
        tracing::debug!(sql = %sql, params = params.len(), "fetch_all");
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_database_value(query, param);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error(sql, params, e))?;

        rows.iter()
            .map(|row| decode_row(row).map_err(|e| query_error(sql, params, e)))
            .collect()
    }

    async fn fetch_optional(&self, sql: &str, params: &[DatabaseValue]) -> OrmResult<Option<DatabaseRow>> {
        tracing::debug!(sql = %sql, params = params.len(), "fetch_optional");
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_database_value(query, param);
        }

        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_error(sql, params, e))?;

        row.as_ref()
            .map(|row| decode_row(row).map_err(|e| query_error(sql, params, e)))
            .transpose()
    }

    async fn introspect_schema(&self) -> OrmResult<SchemaSnapshot> {
        let mut tables = Vec::new();
        for table in self.table_names().await? {
            tables.push(self.read_table(&table).await?);
        }
        Ok(SchemaSnapshot::new(tables))
    }

    async fn introspect_table(&self, table: &str) -> OrmResult<Option<TableSchema>> {
        let exists = self
            .fetch_optional(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                &[DatabaseValue::from(table)],
            )
            .await?
            .is_some();

        if exists {
            Ok(Some(self.read_table(table).await?))
        } else {
            Ok(None)
        }
    }

    async fn close(&self) -> OrmResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// `PRAGMA foreign_key_check` reports violations as rows instead of failing
fn is_foreign_key_check(statement: &str) -> bool {
    statement
        .trim_start()
        .get(..24)
        .is_some_and(|head| head.eq_ignore_ascii_case("PRAGMA foreign_key_check"))
}

/// Bind a DatabaseValue to a sqlx query
fn bind_database_value<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DatabaseValue::Null => query.bind(Option::<String>::None),
        DatabaseValue::Bool(b) => query.bind(*b),
        DatabaseValue::Int32(i) => query.bind(*i),
        DatabaseValue::Int64(i) => query.bind(*i),
        DatabaseValue::Float64(f) => query.bind(*f),
        DatabaseValue::String(s) => query.bind(s.clone()),
        DatabaseValue::Bytes(b) => query.bind(b.clone()),
        DatabaseValue::Uuid(u) => query.bind(u.to_string()),
        DatabaseValue::DateTime(dt) => query.bind(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        DatabaseValue::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
        DatabaseValue::Time(t) => query.bind(t.format("%H:%M:%S").to_string()),
        DatabaseValue::Json(j) => query.bind(j.to_string()),
    }
}

/// Decode a row by the storage class of each value
fn decode_row(row: &SqliteRow) -> Result<DatabaseRow, sqlx::Error> {
    let mut decoded = DatabaseRow::new();

    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            DatabaseValue::Null
        } else {
            let storage_class = raw.type_info().name().to_string();
            match storage_class.as_str() {
                "INTEGER" | "BOOLEAN" => DatabaseValue::Int64(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" | "NUMERIC" => DatabaseValue::Float64(row.try_get_unchecked::<f64, _>(index)?),
                "BLOB" => DatabaseValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
                _ => DatabaseValue::String(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        decoded.push(column.name(), value);
    }

    Ok(decoded)
}
