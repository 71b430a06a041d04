//! Query Builder ORDER BY and GROUP BY operations

use super::builder::Select;
use super::path::PropertyPath;
use super::types::OrderDirection;

impl<'a> Select<'a> {
    /// Add ORDER BY on a property path
    pub fn order_by(mut self, path: impl Into<PropertyPath>, direction: OrderDirection) -> Self {
        self.order_by.push((path.into(), direction));
        self
    }

    /// Add ORDER BY (ascending)
    pub fn order_by_asc(self, path: impl Into<PropertyPath>) -> Self {
        self.order_by(path, OrderDirection::Asc)
    }

    /// Add ORDER BY (descending)
    pub fn order_by_desc(self, path: impl Into<PropertyPath>) -> Self {
        self.order_by(path, OrderDirection::Desc)
    }

    /// Add GROUP BY clause, passed through verbatim
    pub fn group_by(mut self, expression: impl Into<String>) -> Self {
        self.group_by.push(expression.into());
        self
    }
}
