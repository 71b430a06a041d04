//! The migration record type
//!
//! Migrations are stored as ordinary Types in the database named by
//! `migrations.database`, so they are read and written with the query builder.

use crate::config::SchemaConfig;
use crate::error::OrmResult;

pub const MIGRATION_TYPE: &str = "migration::migration";
pub const MIGRATION_TABLE: &str = "migration";

pub const ID: &str = "migration::migration-id";
pub const NAME: &str = "migration::migration-name";
pub const DATABASE: &str = "migration::migration-db";
pub const DIFF: &str = "migration::migration-diff";
pub const STATUS: &str = "migration::migration-status";
pub const TAG: &str = "migration::migration-tag";
pub const CREATED_AT: &str = "migration::migration-created_at";
pub const UPDATED_AT: &str = "migration::migration-updated_at";

const RECORD_SCHEMA: &str = r#"
properties:
  migration::migration-id:
    label: Id
    name: id
    description: Migration identifier
    type: integer
    autoincrement: true
  migration::migration-name:
    label: Name
    name: name
    description: Unique migration name
    type: string
    length: 255
    notnull: true
    unique: true
  migration::migration-db:
    label: Database
    name: db
    description: Database the migration applies to
    type: string
    length: 64
    notnull: true
    index: true
  migration::migration-diff:
    label: Diff
    name: diff
    description: Serialized schema diff
    type: text
    notnull: true
  migration::migration-status:
    label: Status
    name: status
    description: 0 while pending, 1 once applied
    type: smallint
    notnull: true
    default: 0
    index: true
  migration::migration-tag:
    label: Tag
    name: tag
    description: Generated unique tag
    type: string
    length: 32
    notnull: true
    unique: true
    default: { generator: tag }
  migration::migration-created_at:
    label: Created
    name: created_at
    description: Creation time
    type: datetime
    notnull: true
    default: { generator: now }
  migration::migration-updated_at:
    label: Updated
    name: updated_at
    description: Last status change
    type: datetime
types:
  migration::migration:
    name: Migration
    description: Schema migrations
    table: migration
    properties:
      - migration::migration-id
      - migration::migration-name
      - migration::migration-db
      - migration::migration-diff
      - migration::migration-status
      - migration::migration-tag
      - migration::migration-created_at
      - migration::migration-updated_at
"#;

/// Schema document declaring the migration record type in `database`
pub fn record_schema(database: &str) -> OrmResult<SchemaConfig> {
    let mut schema = SchemaConfig::from_yaml_str(RECORD_SCHEMA)?;
    if let Some(record) = schema.types.get_mut(MIGRATION_TYPE) {
        record.database = Some(database.to_string());
    }
    Ok(schema)
}
