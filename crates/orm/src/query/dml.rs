//! Query Builder DML operations: create, update and delete of single types

use std::sync::Arc;

use super::path::{PropertyPath, ResolvedColumn};
use super::types::ParamSink;
use super::where_clause::{where_methods, WhereClause};
use crate::backends::{DatabaseValue, SqlDialect};
use crate::context::DataContext;
use crate::error::{FieldMessage, OrmError, OrmResult};
use crate::schema::{FieldValue, Type, TypeSchema};
use crate::validation::Operation;

/// Resolve a path that must name a property of the statement's own table
fn local_column(schema: &TypeSchema, path: &PropertyPath) -> OrmResult<ResolvedColumn> {
    if !path.is_local() {
        return Err(OrmError::InvalidQuery(format!(
            "'{}' crosses a relation; only local properties can scope a write",
            path
        )));
    }
    let property = schema.property(&path.segments()[0]).ok_or_else(|| {
        OrmError::InvalidQuery(format!("'{}' is not a property of '{}'", path, schema.identifier))
    })?;
    Ok(ResolvedColumn {
        alias: schema.table.clone(),
        table: schema.table.clone(),
        column: property.name.clone(),
        storage: property.storage,
        relation_aliases: Vec::new(),
    })
}

fn invalid_input(record: &Type, messages: Vec<FieldMessage>) -> OrmError {
    OrmError::InvalidInput {
        identifier: record.identifier().to_string(),
        messages,
    }
}

/// Insert a record and read back its generated identity
pub struct Create<'a> {
    ctx: &'a DataContext,
    record: Type,
}

impl<'a> Create<'a> {
    pub(crate) fn new(ctx: &'a DataContext, record: Type) -> Self {
        Self { ctx, record }
    }

    /// Render the INSERT for the record as it currently is
    pub fn to_sql_with_params(&self, dialect: SqlDialect) -> OrmResult<(String, Vec<DatabaseValue>)> {
        let mut sink = ParamSink::new(dialect);
        let mut columns = Vec::new();
        let mut values = Vec::new();

        for property in self.record.properties() {
            // Unset columns fall back to their column default
            if property.is_null() {
                continue;
            }
            columns.push(property.column().to_string());
            values.push(sink.push(property.to_storage_value(dialect)?));
        }

        let mut sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.record.table())
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.record.table(),
                columns.join(", "),
                values.join(", ")
            )
        };

        if dialect.supports_returning() {
            if let Some(identity) = self.record.schema().identity_column() {
                sql.push_str(&format!(" RETURNING {}", identity));
            }
        }

        Ok((sql, sink.into_params()))
    }

    /// Apply defaults and filters, validate, insert
    pub async fn execute(mut self) -> OrmResult<Type> {
        for property in self.record.properties_mut() {
            property.apply_default();
        }
        self.ctx.filters().apply(&mut self.record)?;

        let messages = self.ctx.validator().validate(&self.record, &Operation::Create);
        if !messages.is_empty() {
            return Err(invalid_input(&self.record, messages));
        }

        let database = self.record.database().to_string();
        let connection = self.ctx.connection(&database).await?;
        let dialect = connection.dialect();
        let (sql, params) = self.to_sql_with_params(dialect)?;

        let generated = if dialect.supports_returning() {
            match connection.fetch_optional(&sql, &params).await? {
                Some(row) => {
                    let identity = self.record.schema().identity_column().unwrap_or_default();
                    row.get(identity).cloned()
                }
                None => {
                    tracing::warn!(type_identifier = %self.record.identifier(), sql = %sql, "insert affected no rows");
                    None
                }
            }
        } else {
            let result = connection.execute(&sql, &params).await?;
            if result.rows_affected == 0 {
                tracing::warn!(type_identifier = %self.record.identifier(), sql = %sql, "insert affected no rows");
                None
            } else {
                result.last_insert_id.map(DatabaseValue::Int64)
            }
        };

        if self.record.is_empty() {
            if let Some(raw) = generated {
                let identity = self.record.schema().autoincrement_property().map(|p| p.identifier.clone());
                if let Some(property) = identity.and_then(|id| self.record.property_mut(&id)) {
                    property.hydrate(&raw)?;
                }
            }
        }

        tracing::debug!(type_identifier = %self.record.identifier(), id = ?self.record.autoincrement_value(), "record created");
        Ok(self.record)
    }
}

/// Update one record by identity
pub struct Update<'a> {
    ctx: &'a DataContext,
    record: Type,
    /// Identity the row had before any assignment
    identity: FieldValue,
    assignments: Vec<(String, FieldValue)>,
    where_clause: WhereClause,
}

impl<'a> Update<'a> {
    pub(crate) fn new(ctx: &'a DataContext, record: Type) -> Self {
        Self {
            ctx,
            identity: record.autoincrement_value().clone(),
            record,
            assignments: Vec::new(),
            where_clause: WhereClause::default(),
        }
    }

    /// Assign a value; only assigned properties are written and validated
    pub fn set(mut self, property: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.assignments.push((property.into(), value.into()));
        self
    }

    where_methods!();

    /// Render the UPDATE for the assignments made so far
    pub fn to_sql_with_params(&self, dialect: SqlDialect) -> OrmResult<(String, Vec<DatabaseValue>)> {
        let schema = Arc::clone(self.record.schema());
        let identity = schema
            .autoincrement_property()
            .ok_or_else(|| OrmError::InvalidQuery(format!("'{}' has no identity property", schema.identifier)))?;
        if self.identity.is_null() {
            return Err(OrmError::InvalidQuery(format!(
                "cannot update '{}' without a value for '{}'",
                schema.identifier, identity.identifier
            )));
        }

        // A later assignment to the same column wins
        let mut values: Vec<(String, DatabaseValue)> = Vec::new();
        for (key, value) in &self.assignments {
            let mut property = self
                .record
                .property(key)
                .cloned()
                .ok_or_else(|| OrmError::PropertyNotFound {
                    type_identifier: schema.identifier.clone(),
                    property: key.clone(),
                })?;
            property.set(value.clone());
            let stored = property.to_storage_value(dialect)?;
            match values.iter_mut().find(|(column, _)| column == property.column()) {
                Some(entry) => entry.1 = stored,
                None => values.push((property.column().to_string(), stored)),
            }
        }

        let mut sink = ParamSink::new(dialect);
        let assignments: Vec<String> = values
            .into_iter()
            .map(|(column, value)| format!("{} = {}", column, sink.push(value)))
            .collect();

        let identity_value = identity
            .storage
            .to_database(&self.identity, dialect)
            .map_err(|message| OrmError::InvalidQuery(format!("identity of '{}': {}", schema.identifier, message)))?;
        let mut conditions = vec![format!("{}.{} = {}", schema.table, identity.name, sink.push(identity_value))];
        conditions.extend(self.where_clause.render(&mut sink, |path| local_column(&schema, path))?);

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            schema.table,
            assignments.join(", "),
            conditions.join(" AND ")
        );
        Ok((sql, sink.into_params()))
    }

    /// Validate the assigned group and write it
    pub async fn execute(mut self) -> OrmResult<Type> {
        if self.assignments.is_empty() {
            return Err(invalid_input(
                &self.record,
                vec![FieldMessage::new(
                    self.record.identifier(),
                    "At least one value must be assigned.",
                    "empty_update",
                )],
            ));
        }

        for (key, value) in &self.assignments {
            self.record.set(key, value.clone())?;
        }
        let group: Vec<String> = self
            .assignments
            .iter()
            .filter_map(|(key, _)| self.record.property(key).map(|p| p.identifier().to_string()))
            .collect();

        self.ctx.filters().apply(&mut self.record)?;
        for (key, value) in self.assignments.iter_mut() {
            if let Some(property) = self.record.property(key) {
                *value = property.value().clone();
            }
        }
        let messages = self.ctx.validator().validate(&self.record, &Operation::Update { group });
        if !messages.is_empty() {
            return Err(invalid_input(&self.record, messages));
        }

        let connection = self.ctx.connection(self.record.database()).await?;
        let (sql, params) = self.to_sql_with_params(connection.dialect())?;
        let result = connection.execute(&sql, &params).await?;
        if result.rows_affected == 0 {
            tracing::warn!(type_identifier = %self.record.identifier(), sql = %sql, "update affected no rows");
        }

        Ok(self.record)
    }
}

/// Delete rows matching local predicates
pub struct Delete<'a> {
    ctx: &'a DataContext,
    schema: Arc<TypeSchema>,
    where_clause: WhereClause,
}

impl<'a> Delete<'a> {
    pub(crate) fn new(ctx: &'a DataContext, schema: Arc<TypeSchema>) -> Self {
        Self {
            ctx,
            schema,
            where_clause: WhereClause::default(),
        }
    }

    where_methods!();

    pub fn to_sql_with_params(&self, dialect: SqlDialect) -> OrmResult<(String, Vec<DatabaseValue>)> {
        if self.where_clause.is_empty() {
            return Err(OrmError::InvalidQuery(format!(
                "delete from '{}' requires at least one predicate",
                self.schema.identifier
            )));
        }

        let mut sink = ParamSink::new(dialect);
        let conditions = self
            .where_clause
            .render(&mut sink, |path| local_column(&self.schema, path))?;
        let sql = format!("DELETE FROM {} WHERE {}", self.schema.table, conditions.join(" AND "));
        Ok((sql, sink.into_params()))
    }

    /// Number of rows removed
    pub async fn execute(self) -> OrmResult<u64> {
        let connection = self.ctx.connection(&self.schema.database).await?;
        let (sql, params) = self.to_sql_with_params(connection.dialect())?;
        let result = connection.execute(&sql, &params).await?;
        tracing::debug!(type_identifier = %self.schema.identifier, rows = result.rows_affected, "rows deleted");
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ConnectionManager;
    use crate::config::{DatabaseConfig, SchemaConfig};
    use crate::schema::SchemaRegistry;
    use std::collections::HashMap;

    const SCHEMA: &str = r#"
properties:
  shop::item-id: { label: Id, name: id, description: Id, type: integer, autoincrement: true }
  shop::item-name: { label: Name, name: name, description: Name, type: string, notnull: true }
  shop::item-stock: { label: Stock, name: stock, description: Stock, type: integer, default: 0 }
types:
  shop::item:
    name: Item
    description: Items
    database: shop
    table: item
    properties: [shop::item-id, shop::item-name, shop::item-stock]
"#;

    fn context() -> DataContext {
        let registry = Arc::new(SchemaRegistry::new(SchemaConfig::from_yaml_str(SCHEMA).unwrap()));
        let connections = Arc::new(ConnectionManager::new(HashMap::from([(
            "shop".to_string(),
            DatabaseConfig::postgres("postgres://localhost/shop"),
        )])));
        DataContext::new(registry, connections)
    }

    #[test]
    fn test_create_skips_unset_columns_and_returns_identity() {
        let ctx = context();
        let record = ctx.instantiate("shop::item").unwrap().with("shop::item-name", "lamp").unwrap();

        let (sql, params) = ctx.create(record).to_sql_with_params(SqlDialect::PostgreSQL).unwrap();
        assert_eq!(sql, "INSERT INTO item (name) VALUES ($1) RETURNING id");
        assert_eq!(params, vec![DatabaseValue::String("lamp".to_string())]);

        let empty = ctx.instantiate("shop::item").unwrap();
        let (sql, _) = ctx.create(empty).to_sql_with_params(SqlDialect::SQLite).unwrap();
        assert_eq!(sql, "INSERT INTO item DEFAULT VALUES");
    }

    #[test]
    fn test_update_is_scoped_by_identity() {
        let ctx = context();
        let record = ctx.instantiate("shop::item").unwrap().with("shop::item-id", 7).unwrap();

        let update = ctx
            .update(record)
            .set("shop::item-stock", 3)
            .where_gt("shop::item-stock", 0);
        let (sql, params) = update.to_sql_with_params(SqlDialect::PostgreSQL).unwrap();
        assert_eq!(sql, "UPDATE item SET stock = $1 WHERE item.id = $2 AND item.stock > $3");
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_update_of_the_identity_targets_the_original_row() {
        let ctx = context();
        let record = ctx.instantiate("shop::item").unwrap().with("shop::item-id", 7).unwrap();

        let (sql, params) = ctx
            .update(record)
            .set("shop::item-id", 10)
            .set("shop::item-name", "lamp")
            .to_sql_with_params(SqlDialect::SQLite)
            .unwrap();
        assert_eq!(sql, "UPDATE item SET id = ?, name = ? WHERE item.id = ?");
        assert_eq!(params[0], DatabaseValue::Int64(10));
        assert_eq!(params[2], DatabaseValue::Int64(7));
    }

    #[test]
    fn test_writes_reject_relation_paths() {
        let ctx = context();
        let err = ctx
            .delete("shop::item")
            .unwrap()
            .where_eq(["shop::item-name", "other"], "x")
            .to_sql_with_params(SqlDialect::SQLite)
            .unwrap_err();
        assert!(matches!(err, OrmError::InvalidQuery(_)));

        let (sql, _) = ctx
            .delete("shop::item")
            .unwrap()
            .where_in("shop::item-id", vec![1, 2])
            .to_sql_with_params(SqlDialect::SQLite)
            .unwrap();
        assert_eq!(sql, "DELETE FROM item WHERE item.id IN (?, ?)");
    }
}
