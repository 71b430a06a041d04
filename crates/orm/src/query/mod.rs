//! Query Builder Module - relation-aware builders over configured types
//!
//! [`Select`] joins every reachable relation and hydrates nested Types.
//! [`Create`], [`Update`] and [`Delete`] write a single table.

pub mod builder;
pub mod dml;
pub mod execution;
pub(crate) mod joins;
pub mod ordering;
pub mod pagination;
pub mod path;
pub mod sql_generation;
pub mod types;
pub(crate) mod where_clause;

pub use builder::Select;
pub use dml::{Create, Delete, Update};
pub use execution::LazyRows;
pub use path::{PropertyPath, MAX_RELATION_HOPS};
pub use types::{OrderDirection, QueryOperator, RawParams};
