//! Query Builder execution

use std::collections::VecDeque;

use serde_json::{Map, Value as JsonValue};

use super::builder::Select;
use super::joins::JoinPlan;
use super::path::PropertyPath;
use super::types::OrderDirection;
use crate::error::OrmResult;
use crate::hydration::ResultHydrator;
use crate::schema::Type;

impl<'a> Select<'a> {
    /// First matching record, or an empty Type when nothing matches
    pub async fn fetch(self) -> OrmResult<Type> {
        let query = self.limit(1);
        let (sql, params) = query.to_sql_with_params()?;
        let connection = query.ctx.connection(&query.schema.database).await?;

        match connection.fetch_optional(&sql, &params).await? {
            Some(row) => ResultHydrator::new(query.ctx.registry(), &query.exclusions).hydrate(&query.schema, &row),
            None => Ok(Type::new(query.schema.clone())),
        }
    }

    /// Every matching record
    pub async fn fetch_all(self) -> OrmResult<Vec<Type>> {
        let (sql, params) = self.to_sql_with_params()?;
        let connection = self.ctx.connection(&self.schema.database).await?;
        let rows = connection.fetch_all(&sql, &params).await?;

        ResultHydrator::new(self.ctx.registry(), &self.exclusions).hydrate_all(&self.schema, &rows)
    }

    /// Every matching record as a plain value map
    pub async fn fetch_all_maps(self) -> OrmResult<Vec<Map<String, JsonValue>>> {
        Ok(self
            .fetch_all()
            .await?
            .iter()
            .map(Type::to_values)
            .collect())
    }

    /// Page through the results `page_size` rows at a time
    ///
    /// Without an explicit ordering, pages are ordered by identity.
    pub fn fetch_all_lazy(mut self, page_size: u64) -> LazyRows<'a> {
        if self.order_by.is_empty() {
            if let Some(identity) = self.schema.autoincrement_property() {
                self.order_by
                    .push((PropertyPath::from(identity.identifier.as_str()), OrderDirection::Asc));
            }
        }
        LazyRows::new(self, page_size)
    }

    /// Number of rows the select would return
    pub async fn count(&self) -> OrmResult<u64> {
        let dialect = self.ctx.dialect(&self.schema.database)?;
        let plan = JoinPlan::build(self.ctx.registry(), &self.schema, &self.exclusions)?;
        let (inner, params) = self.render(&plan, dialect)?;
        let sql = format!("SELECT COUNT(*) AS total FROM ({}) AS counted_rows", inner);

        let connection = self.ctx.connection(&self.schema.database).await?;
        let row = connection.fetch_optional(&sql, &params).await?;
        Ok(row
            .and_then(|r| r.integer("total"))
            .map(|n| n.max(0) as u64)
            .unwrap_or(0))
    }
}

/// Lazily fetched results of a select
///
/// Rows are read one page at a time, staying within the select's own
/// limit and offset. `restart` begins again from the first page.
#[derive(Debug)]
pub struct LazyRows<'a> {
    select: Select<'a>,
    page_size: u64,
    base_offset: u64,
    limit: Option<u64>,
    fetched: u64,
    buffer: VecDeque<Type>,
    exhausted: bool,
}

impl<'a> LazyRows<'a> {
    fn new(select: Select<'a>, page_size: u64) -> Self {
        Self {
            base_offset: select.offset_value.unwrap_or(0),
            limit: select.limit_count,
            select,
            page_size: page_size.max(1),
            fetched: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next hydrated record, `None` once the results are exhausted
    pub async fn next(&mut self) -> OrmResult<Option<Type>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill().await?;
        }
        Ok(self.buffer.pop_front())
    }

    /// Next record as a plain value map
    pub async fn next_row(&mut self) -> OrmResult<Option<Map<String, JsonValue>>> {
        Ok(self.next().await?.map(|record| record.to_values()))
    }

    pub fn restart(&mut self) {
        self.fetched = 0;
        self.buffer.clear();
        self.exhausted = false;
    }

    async fn fill(&mut self) -> OrmResult<()> {
        let wanted = match self.limit {
            Some(limit) => self.page_size.min(limit.saturating_sub(self.fetched)),
            None => self.page_size,
        };
        if wanted == 0 {
            self.exhausted = true;
            return Ok(());
        }

        let page = self
            .select
            .clone()
            .limit(wanted)
            .offset(self.base_offset + self.fetched)
            .fetch_all()
            .await?;

        let count = page.len() as u64;
        tracing::debug!(type_identifier = %self.select.schema.identifier, rows = count, offset = self.fetched, "fetched page");
        self.fetched += count;
        if count < wanted {
            self.exhausted = true;
        }
        self.buffer.extend(page);
        Ok(())
    }
}
