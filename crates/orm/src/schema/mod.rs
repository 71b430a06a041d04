//! Type, property and relation metadata
//!
//! Declarative configuration is turned into immutable [`TypeSchema`]s by the
//! [`SchemaRegistry`]; [`Type`] is the runtime instance carrying values.

pub mod defaults;
pub mod entity;
pub mod property;
pub mod registry;
pub mod relation;
pub mod storage;
pub mod value;

pub use defaults::{DefaultGenerators, DefaultValue, Generator};
pub use entity::{Type, TypeSchema, ALIAS_SEPARATOR};
pub use property::{IndexSpec, Property, PropertyDefinition, PropertyRelation};
pub use registry::SchemaRegistry;
pub use relation::{JoinKind, ReferentialAction, Relation};
pub use storage::{ColumnDimensions, StorageType};
pub use value::FieldValue;
