//! Query Builder WHERE clause operations

use super::path::{PropertyPath, ResolvedColumn};
use super::types::{typed_value, untyped_value, ParamSink, Predicate, QueryOperator, RawParams};
use crate::error::{OrmError, OrmResult};
use crate::schema::FieldValue;

/// Predicates of one statement, joined with AND
#[derive(Debug, Clone, Default)]
pub(crate) struct WhereClause {
    predicates: Vec<Predicate>,
}

impl WhereClause {
    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Render every predicate, resolving paths through `resolve`
    pub fn render<F>(&self, sink: &mut ParamSink, mut resolve: F) -> OrmResult<Vec<String>>
    where
        F: FnMut(&PropertyPath) -> OrmResult<ResolvedColumn>,
    {
        let mut parts = Vec::with_capacity(self.predicates.len());

        for predicate in &self.predicates {
            match predicate {
                Predicate::Compare { path, operator, value } => {
                    let column = resolve(path)?;
                    if value.is_null() {
                        // Comparing with NULL never matches; equality means IS NULL
                        if *operator == QueryOperator::Equal {
                            parts.push(format!("{} IS NULL", column.qualified()));
                            continue;
                        }
                        return Err(OrmError::InvalidQuery(format!(
                            "cannot compare '{}' {} NULL",
                            path, operator
                        )));
                    }
                    let bound = bind(sink, value, &column, path)?;
                    parts.push(format!("{} {} {}", column.qualified(), operator, bound));
                }
                Predicate::InSet { path, negated, values } => {
                    let column = resolve(path)?;
                    if values.is_empty() {
                        parts.push(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
                        continue;
                    }
                    let mut bound = Vec::with_capacity(values.len());
                    for value in values {
                        bound.push(bind(sink, value, &column, path)?);
                    }
                    let keyword = if *negated { "NOT IN" } else { "IN" };
                    parts.push(format!("{} {} ({})", column.qualified(), keyword, bound.join(", ")));
                }
                Predicate::Null { path, is_null } => {
                    let column = resolve(path)?;
                    let keyword = if *is_null { "IS NULL" } else { "IS NOT NULL" };
                    parts.push(format!("{} {}", column.qualified(), keyword));
                }
                Predicate::Raw { sql, params } => {
                    parts.push(format!("({})", render_raw(sql, params, sink)?));
                }
            }
        }

        Ok(parts)
    }
}

fn bind(sink: &mut ParamSink, value: &FieldValue, column: &ResolvedColumn, path: &PropertyPath) -> OrmResult<String> {
    let converted = typed_value(value, column.storage, sink.dialect())
        .map_err(|message| OrmError::InvalidQuery(format!("value for '{}': {}", path, message)))?;
    Ok(sink.push(converted))
}

/// Substitute `?` or `:name` markers in raw SQL with bound parameters
///
/// Markers inside quoted strings and `::` casts are left alone.
pub(crate) fn render_raw(sql: &str, params: &RawParams, sink: &mut ParamSink) -> OrmResult<String> {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_quote = false;
    let mut positional = 0usize;

    while let Some(c) = chars.next() {
        if c == '\'' {
            in_quote = !in_quote;
            out.push(c);
            continue;
        }
        if in_quote {
            out.push(c);
            continue;
        }

        match (c, params) {
            ('?', RawParams::Positional(values)) => {
                let value = values.get(positional).ok_or_else(|| {
                    OrmError::InvalidQuery(format!("raw predicate '{}' has more markers than values", sql))
                })?;
                positional += 1;
                out.push_str(&sink.push(untyped_value(value, sink.dialect())));
            }
            (':', _) if chars.peek() == Some(&':') => {
                chars.next();
                out.push_str("::");
            }
            (':', RawParams::Named(values))
                if chars.peek().map_or(false, |n| n.is_ascii_alphabetic() || *n == '_') =>
            {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = values.get(&name).ok_or_else(|| {
                    OrmError::InvalidQuery(format!("raw predicate '{}' has no value for ':{}'", sql, name))
                })?;
                out.push_str(&sink.push(untyped_value(value, sink.dialect())));
            }
            _ => out.push(c),
        }
    }

    if let RawParams::Positional(values) = params {
        if positional != values.len() {
            return Err(OrmError::InvalidQuery(format!(
                "raw predicate '{}' has {} markers for {} values",
                sql,
                positional,
                values.len()
            )));
        }
    }

    Ok(out)
}

/// WHERE methods shared by the builders
///
/// Expects a `where_clause: WhereClause` field on the builder.
macro_rules! where_methods {
    () => {
        /// Add WHERE condition with equality
        pub fn where_eq(
            mut self,
            path: impl Into<$crate::query::PropertyPath>,
            value: impl Into<$crate::schema::FieldValue>,
        ) -> Self {
            self.where_clause.push($crate::query::types::Predicate::Compare {
                path: path.into(),
                operator: $crate::query::QueryOperator::Equal,
                value: value.into(),
            });
            self
        }

        /// Add WHERE condition with greater than
        pub fn where_gt(
            mut self,
            path: impl Into<$crate::query::PropertyPath>,
            value: impl Into<$crate::schema::FieldValue>,
        ) -> Self {
            self.where_clause.push($crate::query::types::Predicate::Compare {
                path: path.into(),
                operator: $crate::query::QueryOperator::GreaterThan,
                value: value.into(),
            });
            self
        }

        /// Add WHERE condition with greater than or equal
        pub fn where_gte(
            mut self,
            path: impl Into<$crate::query::PropertyPath>,
            value: impl Into<$crate::schema::FieldValue>,
        ) -> Self {
            self.where_clause.push($crate::query::types::Predicate::Compare {
                path: path.into(),
                operator: $crate::query::QueryOperator::GreaterThanOrEqual,
                value: value.into(),
            });
            self
        }

        /// Add WHERE condition with less than
        pub fn where_lt(
            mut self,
            path: impl Into<$crate::query::PropertyPath>,
            value: impl Into<$crate::schema::FieldValue>,
        ) -> Self {
            self.where_clause.push($crate::query::types::Predicate::Compare {
                path: path.into(),
                operator: $crate::query::QueryOperator::LessThan,
                value: value.into(),
            });
            self
        }

        /// Add WHERE condition with less than or equal
        pub fn where_lte(
            mut self,
            path: impl Into<$crate::query::PropertyPath>,
            value: impl Into<$crate::schema::FieldValue>,
        ) -> Self {
            self.where_clause.push($crate::query::types::Predicate::Compare {
                path: path.into(),
                operator: $crate::query::QueryOperator::LessThanOrEqual,
                value: value.into(),
            });
            self
        }

        /// Add WHERE IN condition
        pub fn where_in<V>(mut self, path: impl Into<$crate::query::PropertyPath>, values: impl IntoIterator<Item = V>) -> Self
        where
            V: Into<$crate::schema::FieldValue>,
        {
            self.where_clause.push($crate::query::types::Predicate::InSet {
                path: path.into(),
                negated: false,
                values: values.into_iter().map(Into::into).collect(),
            });
            self
        }

        /// Add WHERE NOT IN condition
        pub fn where_not_in<V>(
            mut self,
            path: impl Into<$crate::query::PropertyPath>,
            values: impl IntoIterator<Item = V>,
        ) -> Self
        where
            V: Into<$crate::schema::FieldValue>,
        {
            self.where_clause.push($crate::query::types::Predicate::InSet {
                path: path.into(),
                negated: true,
                values: values.into_iter().map(Into::into).collect(),
            });
            self
        }

        /// `true` adds IS NULL, `false` adds IS NOT NULL, anything else is ignored
        pub fn where_is_null(
            mut self,
            path: impl Into<$crate::query::PropertyPath>,
            flag: impl Into<$crate::schema::FieldValue>,
        ) -> Self {
            if let $crate::schema::FieldValue::Bool(is_null) = flag.into() {
                self.where_clause.push($crate::query::types::Predicate::Null {
                    path: path.into(),
                    is_null,
                });
            }
            self
        }

        /// Add a raw SQL predicate with `?` or `:name` parameters
        pub fn where_raw(mut self, sql: impl Into<String>, params: $crate::query::RawParams) -> Self {
            self.where_clause.push($crate::query::types::Predicate::Raw {
                sql: sql.into(),
                params,
            });
            self
        }
    };
}

pub(crate) use where_methods;
