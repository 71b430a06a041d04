//! Relation join planning
//!
//! Relations are walked depth-first from the root type. An alias is joined
//! at most once per statement, which ends cycles and collapses diamonds.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::OrmResult;
use crate::schema::{Relation, SchemaRegistry, TypeSchema};

/// One join in a planned statement
#[derive(Debug, Clone)]
pub(crate) struct PlannedJoin {
    pub relation: Relation,
    pub parent_alias: String,
    pub target: Arc<TypeSchema>,
}

impl PlannedJoin {
    pub fn to_sql(&self) -> String {
        // Planning skips unknown kinds
        let keyword = self.relation.join.keyword().unwrap_or("LEFT JOIN");
        let condition = self.relation.join_condition(&self.parent_alias);
        if self.relation.alias == self.relation.target_table {
            format!("{} {} ON {}", keyword, self.relation.target_table, condition)
        } else {
            format!(
                "{} {} AS {} ON {}",
                keyword, self.relation.target_table, self.relation.alias, condition
            )
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct JoinPlan {
    pub root_alias: String,
    pub joins: Vec<PlannedJoin>,
}

impl JoinPlan {
    pub fn build(registry: &SchemaRegistry, root: &Arc<TypeSchema>, exclusions: &[String]) -> OrmResult<Self> {
        let root_alias = root.table.clone();
        let mut visited = HashSet::from([root_alias.clone()]);
        let mut joins = Vec::new();

        visit(registry, root, &root_alias, exclusions, &mut visited, &mut joins)?;

        Ok(Self { root_alias, joins })
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        alias == self.root_alias || self.joins.iter().any(|j| j.relation.alias == alias)
    }

    /// Local columns of the root carrying a joined relation
    pub fn root_foreign_columns(&self) -> impl Iterator<Item = &str> {
        self.joins
            .iter()
            .filter(|j| j.parent_alias == self.root_alias)
            .map(|j| j.relation.local_column.as_str())
    }
}

/// Whether a relation is followed from `visited`, shared with hydration
pub(crate) fn should_follow(relation: &Relation, exclusions: &[String], visited: &HashSet<String>) -> bool {
    if exclusions.iter().any(|e| relation.is_excluded_by(e)) {
        return false;
    }
    if visited.contains(&relation.alias) {
        return false;
    }
    relation.join.keyword().is_some()
}

fn visit(
    registry: &SchemaRegistry,
    schema: &Arc<TypeSchema>,
    parent_alias: &str,
    exclusions: &[String],
    visited: &mut HashSet<String>,
    joins: &mut Vec<PlannedJoin>,
) -> OrmResult<()> {
    for relation in &schema.relations {
        if relation.join.keyword().is_none() {
            tracing::warn!(
                type_identifier = %schema.identifier,
                relation = %relation.identifier,
                join = ?relation.join,
                "unrecognized join kind, relation not joined"
            );
            continue;
        }
        if !should_follow(relation, exclusions, visited) {
            continue;
        }

        let target = registry.resolve(&relation.target_type)?;
        visited.insert(relation.alias.clone());
        joins.push(PlannedJoin {
            relation: relation.clone(),
            parent_alias: parent_alias.to_string(),
            target: Arc::clone(&target),
        });

        visit(registry, &target, &relation.alias, exclusions, visited, joins)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaConfig;

    const SCHEMA: &str = r#"
properties:
  news::article-id: { label: Id, name: id, description: Id, type: integer, autoincrement: true }
  news::article-author: { label: Author, name: author_id, description: Author, type: integer }
  news::article-editor: { label: Editor, name: editor_id, description: Editor, type: integer }
  news::user-id: { label: Id, name: id, description: Id, type: integer, autoincrement: true }
  news::user-latest: { label: Latest, name: latest_article_id, description: Latest article, type: integer }
types:
  news::article:
    name: Article
    description: Articles
    database: news
    table: article
    properties: [news::article-id, news::article-author, news::article-editor]
    relations:
      author: { localProperty: news::article-author, relationType: news::user, relationProperty: news::user-id }
      editor: { localProperty: news::article-editor, relationType: news::user, relationProperty: news::user-id }
  news::user:
    name: User
    description: Users
    database: news
    table: users
    properties: [news::user-id, news::user-latest]
    relations:
      latest: { localProperty: news::user-latest, relationType: news::article, relationProperty: news::article-id, joinType: inner }
"#;

    fn registry(source: &str) -> SchemaRegistry {
        SchemaRegistry::new(SchemaConfig::from_yaml_str(source).unwrap())
    }

    #[test]
    fn test_diamond_and_cycle_join_each_alias_once() {
        let registry = registry(SCHEMA);
        let root = registry.resolve("news::article").unwrap();
        let plan = JoinPlan::build(&registry, &root, &[]).unwrap();

        // author joins users; editor shares the alias; users -> article is the root alias
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].relation.identifier, "author");
        assert_eq!(plan.joins[0].to_sql(), "LEFT JOIN users ON article.author_id = users.id");
    }

    #[test]
    fn test_distinct_aliases_are_both_joined() {
        let source = SCHEMA.replace(
            "relationProperty: news::user-id }\n      editor:",
            "relationProperty: news::user-id, alias: writer }\n      editor:",
        );
        let registry = registry(&source);
        let root = registry.resolve("news::article").unwrap();
        let plan = JoinPlan::build(&registry, &root, &[]).unwrap();

        let sql: Vec<String> = plan.joins.iter().map(PlannedJoin::to_sql).collect();
        assert_eq!(sql.len(), 2);
        assert_eq!(sql[0], "LEFT JOIN users AS writer ON article.author_id = writer.id");
        assert_eq!(sql[1], "LEFT JOIN users ON article.editor_id = users.id");
        assert_eq!(plan.root_foreign_columns().collect::<Vec<_>>(), vec!["author_id", "editor_id"]);
    }

    #[test]
    fn test_exclusions_prune_branches() {
        let registry = registry(SCHEMA);
        let root = registry.resolve("news::article").unwrap();

        let plan = JoinPlan::build(&registry, &root, &["author".to_string()]).unwrap();
        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].relation.identifier, "editor");

        let plan = JoinPlan::build(&registry, &root, &["*".to_string()]).unwrap();
        assert!(plan.joins.is_empty());

        let plan = JoinPlan::build(&registry, &root, &["users".to_string()]).unwrap();
        assert!(plan.joins.is_empty());
    }

    #[test]
    fn test_unknown_join_kind_is_skipped() {
        let source = SCHEMA.replace(
            "relationProperty: news::user-id }\n      editor:",
            "relationProperty: news::user-id, joinType: sideways }\n      editor:",
        );
        let registry = registry(&source);
        let root = registry.resolve("news::article").unwrap();
        let plan = JoinPlan::build(&registry, &root, &[]).unwrap();

        assert_eq!(plan.joins.len(), 1);
        assert_eq!(plan.joins[0].relation.identifier, "editor");
    }
}
