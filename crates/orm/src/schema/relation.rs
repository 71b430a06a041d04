//! Relations between types

use std::fmt;

/// How a relation is joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    /// Configured value that is not a known join kind
    Unknown(String),
}

impl JoinKind {
    /// Parse a configured join type; absent means left
    pub fn parse(value: Option<&str>) -> JoinKind {
        match value.map(|v| v.trim().to_lowercase()) {
            None => JoinKind::Left,
            Some(v) if v == "left" => JoinKind::Left,
            Some(v) if v == "inner" => JoinKind::Inner,
            Some(v) if v == "right" => JoinKind::Right,
            Some(_) => JoinKind::Unknown(value.unwrap_or_default().to_string()),
        }
    }

    /// SQL keyword, `None` for unknown kinds
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            JoinKind::Inner => Some("INNER JOIN"),
            JoinKind::Left => Some("LEFT JOIN"),
            JoinKind::Right => Some("RIGHT JOIN"),
            JoinKind::Unknown(_) => None,
        }
    }
}

/// Action applied to referencing rows on update or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
}

impl ReferentialAction {
    /// Anything other than `SET NULL` becomes `CASCADE`
    pub fn parse(value: Option<&str>) -> ReferentialAction {
        match value.map(|v| v.trim().to_uppercase()) {
            Some(v) if v == "SET NULL" => ReferentialAction::SetNull,
            _ => ReferentialAction::Cascade,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Link from a local property to a property on another type
///
/// The target type is held by identifier and resolved through the registry
/// when needed, so types may reference each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub identifier: String,
    /// Identifier of the local property
    pub local_property: String,
    pub local_column: String,
    pub target_type: String,
    /// Identifier of the property on the target type
    pub target_property: String,
    pub target_table: String,
    pub target_column: String,
    /// Name of the target table within one query, defaults to the target table
    pub alias: String,
    pub join: JoinKind,
    pub on_update: ReferentialAction,
    pub on_delete: ReferentialAction,
}

impl Relation {
    /// Join condition against the alias of the owning table
    pub fn join_condition(&self, parent_alias: &str) -> String {
        format!(
            "{}.{} = {}.{}",
            parent_alias, self.local_column, self.alias, self.target_column
        )
    }

    /// Whether an exclusion entry prunes this relation
    pub fn is_excluded_by(&self, exclusion: &str) -> bool {
        exclusion == "*"
            || exclusion == self.identifier
            || exclusion == self.alias
            || exclusion == self.target_table
            || exclusion == self.local_property
    }

    /// Whether a path segment names this relation
    pub fn matches(&self, segment: &str) -> bool {
        segment == self.identifier || segment == self.local_property || segment == self.local_column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author_relation() -> Relation {
        Relation {
            identifier: "author".to_string(),
            local_property: "blog::post-author".to_string(),
            local_column: "author_id".to_string(),
            target_type: "blog::author".to_string(),
            target_property: "blog::author-id".to_string(),
            target_table: "author".to_string(),
            target_column: "id".to_string(),
            alias: "writer".to_string(),
            join: JoinKind::Left,
            on_update: ReferentialAction::Cascade,
            on_delete: ReferentialAction::SetNull,
        }
    }

    #[test]
    fn test_join_kind_parsing() {
        assert_eq!(JoinKind::parse(None), JoinKind::Left);
        assert_eq!(JoinKind::parse(Some("INNER")), JoinKind::Inner);
        assert_eq!(JoinKind::parse(Some("right")), JoinKind::Right);
        assert_eq!(JoinKind::parse(Some("cross")), JoinKind::Unknown("cross".to_string()));
        assert_eq!(JoinKind::Unknown("cross".to_string()).keyword(), None);
    }

    #[test]
    fn test_referential_action_defaults_to_cascade() {
        assert_eq!(ReferentialAction::parse(Some("set null")), ReferentialAction::SetNull);
        assert_eq!(ReferentialAction::parse(Some("RESTRICT")), ReferentialAction::Cascade);
        assert_eq!(ReferentialAction::parse(None), ReferentialAction::Cascade);
    }

    #[test]
    fn test_join_condition_and_exclusions() {
        let relation = author_relation();
        assert_eq!(relation.join_condition("post"), "post.author_id = writer.id");

        for exclusion in ["*", "author", "writer", "author", "blog::post-author"] {
            assert!(relation.is_excluded_by(exclusion));
        }
        assert!(!relation.is_excluded_by("comment"));
    }
}
