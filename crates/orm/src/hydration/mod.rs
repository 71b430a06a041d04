//! Result Hydration
//!
//! Maps a flat row whose columns are named `alias__column` back onto a
//! Type graph. Relations are followed with the same rules the join planner
//! uses, so every alias is read by exactly the relation that joined it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::backends::{DatabaseRow, DatabaseValue};
use crate::error::OrmResult;
use crate::query::joins::should_follow;
use crate::schema::{FieldValue, SchemaRegistry, Type, TypeSchema, ALIAS_SEPARATOR};

type AliasGroups<'r> = HashMap<&'r str, HashMap<&'r str, &'r DatabaseValue>>;

/// Builds Types from rows produced by a select
#[derive(Debug, Clone, Copy)]
pub struct ResultHydrator<'a> {
    registry: &'a SchemaRegistry,
    exclusions: &'a [String],
}

impl<'a> ResultHydrator<'a> {
    pub fn new(registry: &'a SchemaRegistry, exclusions: &'a [String]) -> Self {
        Self { registry, exclusions }
    }

    /// Hydrate the root type, aliased by its table name
    pub fn hydrate(&self, schema: &Arc<TypeSchema>, row: &DatabaseRow) -> OrmResult<Type> {
        let groups = group_by_alias(row);
        let root_alias = schema.table.as_str();
        let mut visited = HashSet::from([root_alias.to_string()]);
        self.hydrate_alias(schema, root_alias, &groups, &mut visited)
    }

    pub fn hydrate_all(&self, schema: &Arc<TypeSchema>, rows: &[DatabaseRow]) -> OrmResult<Vec<Type>> {
        rows.iter().map(|row| self.hydrate(schema, row)).collect()
    }

    fn hydrate_alias(
        &self,
        schema: &Arc<TypeSchema>,
        alias: &str,
        groups: &AliasGroups<'_>,
        visited: &mut HashSet<String>,
    ) -> OrmResult<Type> {
        let mut record = Type::new(Arc::clone(schema));

        if let Some(columns) = groups.get(alias) {
            for property in record.properties_mut() {
                if let Some(raw) = columns.get(property.column()) {
                    property.hydrate(raw)?;
                }
            }
        }

        for relation in &schema.relations {
            if !should_follow(relation, self.exclusions, visited) {
                continue;
            }
            visited.insert(relation.alias.clone());

            let target = self.registry.resolve(&relation.target_type)?;
            let nested = self.hydrate_alias(&target, &relation.alias, groups, visited)?;

            // An unmatched outer join leaves the foreign key as it was read
            if !nested.is_empty() {
                record.set(&relation.local_property, FieldValue::Record(Box::new(nested)))?;
            }
        }

        Ok(record)
    }
}

/// Split every column on the first separator; other columns are ignored
fn group_by_alias(row: &DatabaseRow) -> AliasGroups<'_> {
    let mut groups: AliasGroups<'_> = HashMap::new();
    for (name, value) in row.iter() {
        if let Some((alias, column)) = name.split_once(ALIAS_SEPARATOR) {
            groups.entry(alias).or_default().insert(column, value);
        }
    }
    groups
}
