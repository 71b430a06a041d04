//! Query Builder pagination operations

use super::builder::Select;

impl<'a> Select<'a> {
    /// Add LIMIT clause
    pub fn limit(mut self, count: u64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, count: u64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// Add pagination (LIMIT + OFFSET), pages start at 1
    ///
    /// Pages far past the end clamp the offset instead of overflowing.
    pub fn paginate(self, per_page: u64, page: u64) -> Self {
        self.limit(per_page).offset(page.saturating_sub(1).saturating_mul(per_page))
    }

    /// SELECT DISTINCT
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}
