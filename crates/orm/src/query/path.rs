//! Property paths crossing relations
//!
//! A path is an ordered list of segments. Every segment but the last names
//! a relation (by identifier, local property identifier or local column);
//! the last names a property of the type reached.

use std::fmt;
use std::sync::Arc;

use crate::error::{OrmError, OrmResult};
use crate::schema::{SchemaRegistry, StorageType, TypeSchema};

/// Relation hops a path may cross
pub const MAX_RELATION_HOPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True for a path naming a property of the root type
    pub fn is_local(&self) -> bool {
        self.0.len() == 1
    }

    /// Resolve against a root type whose table is aliased `root_alias`
    pub(crate) fn resolve(
        &self,
        registry: &SchemaRegistry,
        root: &Arc<TypeSchema>,
        root_alias: &str,
    ) -> OrmResult<ResolvedColumn> {
        let Some((last, hops)) = self.0.split_last() else {
            return Err(OrmError::InvalidQuery("empty property path".to_string()));
        };
        if hops.len() > MAX_RELATION_HOPS {
            return Err(OrmError::InvalidQuery(format!(
                "path '{}' crosses more than {} relations",
                self, MAX_RELATION_HOPS
            )));
        }

        let mut schema = Arc::clone(root);
        let mut alias = root_alias.to_string();
        let mut aliases = Vec::with_capacity(hops.len());

        for segment in hops {
            let relation = schema
                .relations
                .iter()
                .find(|r| r.matches(segment))
                .ok_or_else(|| {
                    OrmError::InvalidQuery(format!(
                        "'{}' in path '{}' is not a relation of '{}'",
                        segment, self, schema.identifier
                    ))
                })?;
            alias = relation.alias.clone();
            aliases.push(alias.clone());
            schema = registry.resolve(&relation.target_type)?;
        }

        if let Some(property) = schema.property(last) {
            return Ok(ResolvedColumn {
                alias,
                table: schema.table.clone(),
                column: property.name.clone(),
                storage: property.storage,
                relation_aliases: aliases,
            });
        }

        // A trailing relation stands for its local column
        if let Some(relation) = schema.relations.iter().find(|r| r.matches(last)) {
            let storage = schema
                .property(&relation.local_property)
                .map(|p| p.storage)
                .unwrap_or(StorageType::Integer);
            return Ok(ResolvedColumn {
                alias,
                table: schema.table.clone(),
                column: relation.local_column.clone(),
                storage,
                relation_aliases: aliases,
            });
        }

        Err(OrmError::InvalidQuery(format!(
            "'{}' in path '{}' is not a property of '{}'",
            last, self, schema.identifier
        )))
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" > "))
    }
}

impl From<&str> for PropertyPath {
    fn from(value: &str) -> Self {
        Self(vec![value.to_string()])
    }
}

impl From<String> for PropertyPath {
    fn from(value: String) -> Self {
        Self(vec![value])
    }
}

impl From<Vec<String>> for PropertyPath {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl From<Vec<&str>> for PropertyPath {
    fn from(value: Vec<&str>) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> From<[&str; N]> for PropertyPath {
    fn from(value: [&str; N]) -> Self {
        Self::new(value)
    }
}

/// Physical column a path points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedColumn {
    pub alias: String,
    pub table: String,
    pub column: String,
    pub storage: StorageType,
    /// Aliases of the relations crossed, in order
    pub relation_aliases: Vec<String>,
}

impl ResolvedColumn {
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.alias, self.column)
    }
}
