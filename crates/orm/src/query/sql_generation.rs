//! Query Builder SQL generation

use std::collections::HashSet;

use super::builder::Select;
use super::joins::JoinPlan;
use super::path::{PropertyPath, ResolvedColumn};
use super::types::ParamSink;
use crate::backends::{DatabaseValue, SqlDialect};
use crate::error::{OrmError, OrmResult};
use crate::schema::{PropertyDefinition, ALIAS_SEPARATOR};

/// Select list entry `alias.column AS alias__column`
pub(crate) fn select_column(alias: &str, property: &PropertyDefinition, dialect: SqlDialect) -> String {
    let qualified = format!("{}.{}", alias, property.name);
    format!(
        "{} AS {}{}{}",
        property.storage.select_expression(dialect, &qualified),
        alias,
        ALIAS_SEPARATOR,
        property.name
    )
}

impl<'a> Select<'a> {
    /// Generate SQL with parameter placeholders and return the bound parameters
    pub fn to_sql_with_params(&self) -> OrmResult<(String, Vec<DatabaseValue>)> {
        let dialect = self.ctx.dialect(&self.schema.database)?;
        let plan = JoinPlan::build(self.ctx.registry(), &self.schema, &self.exclusions)?;
        self.render(&plan, dialect)
    }

    pub(crate) fn render(&self, plan: &JoinPlan, dialect: SqlDialect) -> OrmResult<(String, Vec<DatabaseValue>)> {
        let mut sink = ParamSink::new(dialect);
        let mut sql = String::from(if self.distinct { "SELECT DISTINCT " } else { "SELECT " });

        let mut columns = Vec::new();
        for property in self.root_properties(plan)? {
            columns.push(select_column(&plan.root_alias, property, dialect));
        }
        for join in &plan.joins {
            for property in &join.target.properties {
                columns.push(select_column(&join.relation.alias, property, dialect));
            }
        }
        sql.push_str(&columns.join(", "));

        sql.push_str(" FROM ");
        sql.push_str(&self.schema.table);
        for join in &plan.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }

        let conditions = self
            .where_clause
            .render(&mut sink, |path| self.resolve_path(plan, path))?;
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        let ordering = self.order_clause(plan)?;
        if !ordering.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&ordering.join(", "));
        }

        // Both dialects read LIMIT and OFFSET as a signed 64-bit integer
        let bounded = |count: u64| count.min(i64::MAX as u64);
        match (self.limit_count.map(bounded), self.offset_value.map(bounded)) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(offset)) if dialect == SqlDialect::SQLite => {
                sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset))
            }
            (None, Some(offset)) => sql.push_str(&format!(" OFFSET {}", offset)),
            (None, None) => {}
        }

        Ok((sql, sink.into_params()))
    }

    /// Root properties to select, in declaration order
    fn root_properties(&self, plan: &JoinPlan) -> OrmResult<Vec<&PropertyDefinition>> {
        if self.properties.is_empty() {
            return Ok(self.schema.properties.iter().map(|p| p.as_ref()).collect());
        }

        let mut wanted: HashSet<&str> = HashSet::new();
        for key in &self.properties {
            let property = self
                .schema
                .property(key)
                .ok_or_else(|| OrmError::PropertyNotFound {
                    type_identifier: self.schema.identifier.clone(),
                    property: key.clone(),
                })?;
            wanted.insert(property.name.as_str());
        }
        if let Some(identity) = self.schema.identity_column() {
            wanted.insert(identity);
        }
        wanted.extend(plan.root_foreign_columns());

        Ok(self
            .schema
            .properties
            .iter()
            .filter(|p| wanted.contains(p.name.as_str()))
            .map(|p| p.as_ref())
            .collect())
    }

    pub(crate) fn resolve_path(&self, plan: &JoinPlan, path: &PropertyPath) -> OrmResult<ResolvedColumn> {
        let resolved = path.resolve(self.ctx.registry(), &self.schema, &plan.root_alias)?;
        if let Some(missing) = resolved.relation_aliases.iter().find(|a| !plan.has_alias(a)) {
            return Err(OrmError::InvalidQuery(format!(
                "path '{}' crosses relation alias '{}' which is not joined",
                path, missing
            )));
        }
        Ok(resolved)
    }

    /// ORDER BY entries, one per aliased column
    fn order_clause(&self, plan: &JoinPlan) -> OrmResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for (path, direction) in &self.order_by {
            let column = self.resolve_path(plan, path)?;
            if !seen.insert((column.alias.clone(), column.column.clone())) {
                tracing::debug!(path = %path, "duplicate order column skipped");
                continue;
            }
            entries.push(format!("{} {}", column.qualified(), direction));
        }
        Ok(entries)
    }
}
