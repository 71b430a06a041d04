//! Query Builder - Select builder over a type and its relations

use std::sync::Arc;

use super::path::PropertyPath;
use super::types::OrderDirection;
use super::where_clause::{where_methods, WhereClause};
use crate::context::DataContext;
use crate::schema::TypeSchema;

/// Select over one type, joining its relations
///
/// Builders are single-use and consumed by their terminal operation.
#[derive(Clone)]
pub struct Select<'a> {
    pub(crate) ctx: &'a DataContext,
    pub(crate) schema: Arc<TypeSchema>,
    /// Root property whitelist, empty selects all
    pub(crate) properties: Vec<String>,
    pub(crate) exclusions: Vec<String>,
    pub(crate) where_clause: WhereClause,
    pub(crate) order_by: Vec<(PropertyPath, OrderDirection)>,
    pub(crate) group_by: Vec<String>,
    pub(crate) limit_count: Option<u64>,
    pub(crate) offset_value: Option<u64>,
    pub(crate) distinct: bool,
}

impl<'a> Select<'a> {
    pub(crate) fn new(ctx: &'a DataContext, schema: Arc<TypeSchema>) -> Self {
        Self {
            ctx,
            schema,
            properties: Vec::new(),
            exclusions: Vec::new(),
            where_clause: WhereClause::default(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            limit_count: None,
            offset_value: None,
            distinct: false,
        }
    }

    pub fn schema(&self) -> &Arc<TypeSchema> {
        &self.schema
    }

    /// Restrict the root columns to these properties
    ///
    /// The identity and the local columns of joined relations are always
    /// selected so results can be hydrated.
    pub fn properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties.extend(properties.into_iter().map(Into::into));
        self
    }

    /// Skip relations by identifier, alias, target table, local property, or `*`
    pub fn exclude<I, S>(mut self, exclusions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions.extend(exclusions.into_iter().map(Into::into));
        self
    }

    where_methods!();
}

impl std::fmt::Debug for Select<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Select")
            .field("type", &self.schema.identifier)
            .field("properties", &self.properties)
            .field("exclusions", &self.exclusions)
            .field("predicates", &self.where_clause.predicates().len())
            .field("order_by", &self.order_by)
            .field("limit", &self.limit_count)
            .field("offset", &self.offset_value)
            .finish()
    }
}
