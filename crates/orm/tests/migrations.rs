mod common;

use common::{context, BLOG_SCHEMA};
use strata_orm::migrations::definitions::GeneratedMigration;
use strata_orm::migrations::{SchemaDiff, TableSchema};
use strata_orm::{MigrationEngine, MigrationStatus, OrmError, SqlDialect};

const POST_ONLY_SCHEMA: &str = r#"
properties:
  blog::author-id: { label: Id, name: id, description: Author id, type: integer, autoincrement: true }
  blog::post-id: { label: Id, name: id, description: Post id, type: integer, autoincrement: true }
  blog::post-title: { label: Title, name: title, description: Title, type: string, length: 120, notnull: true }
  blog::post-author:
    label: Author
    name: author_id
    description: Author
    type: integer
    relation: { type: blog::author, property: blog::author-id }
types:
  blog::author:
    name: Author
    description: Authors
    database: other
    table: author
    properties: [blog::author-id]
  blog::post:
    name: Post
    description: Posts
    database: blog
    table: post
    properties: [blog::post-id, blog::post-title, blog::post-author]
"#;

const WIDER_NAME_SCHEMA: &str = r#"
properties:
  blog::author-id: { label: Id, name: id, description: Author id, type: integer, autoincrement: true }
  blog::author-name: { label: Name, name: name, description: Name, type: string, length: 120, notnull: true }
types:
  blog::author:
    name: Author
    description: Authors
    database: blog
    table: author
    properties: [blog::author-id, blog::author-name]
"#;

#[tokio::test]
async fn test_blog_end_to_end() {
    let ctx = context(POST_ONLY_SCHEMA).await;
    let engine = MigrationEngine::new(&ctx).unwrap();
    assert!(engine.setup().await.unwrap());

    let generated = engine.generate_for_database("blog").await.unwrap();
    assert_eq!(generated.diff.created.len(), 1);
    let post = &generated.diff.created[0];
    assert_eq!(post.name, "post");
    assert_eq!(post.foreign_keys.len(), 1);
    assert_eq!(post.foreign_keys[0].foreign_table, "author");
    assert!(generated.statements[0].starts_with("CREATE TABLE post ("));

    let saved = engine.save("2024-init", &generated).await.unwrap();
    assert_eq!(saved.status, MigrationStatus::Pending);
    assert_eq!(saved.database, "blog");
    assert_eq!(saved.tag.len(), 16);
    assert_eq!(engine.describe("2024-init").await.unwrap(), generated.statements);

    let report = engine.run("2024-init").await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.executed, generated.statements);

    let connection = ctx.connection("blog").await.unwrap();
    let table = connection.introspect_table("post").await.unwrap().unwrap();
    assert_eq!(table.foreign_keys[0].foreign_table, "author");

    let status = engine.status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].name, "2024-init");
    assert_eq!(status[0].status, MigrationStatus::Done);
    assert!(status[0].updated_at.is_some());

    // The live schema now matches the declarations
    assert!(engine.generate_for_database("blog").await.unwrap().is_empty());
    assert!(engine.generate_for_type("blog::post").await.unwrap().is_empty());

    let again = engine.run("2024-init").await.unwrap();
    assert!(again.skipped);
}

#[tokio::test]
async fn test_duplicate_names_are_refused() {
    let ctx = context(BLOG_SCHEMA).await;
    let engine = MigrationEngine::new(&ctx).unwrap();
    engine.setup().await.unwrap();

    let generated = engine.generate_for_database("blog").await.unwrap();
    engine.save("first", &generated).await.unwrap();

    let err = engine.save("first", &generated).await.unwrap_err();
    assert!(matches!(err, OrmError::MigrationSaveFailed { .. }));
}

#[tokio::test]
async fn test_partial_failure_keeps_migration_pending() {
    let ctx = context(BLOG_SCHEMA).await;
    let engine = MigrationEngine::new(&ctx).unwrap();
    engine.setup().await.unwrap();

    let mut alpha = TableSchema::new("alpha");
    alpha.columns.push(strata_orm::migrations::ColumnSchema::new("id", "INTEGER").autoincrement());
    let mut beta = TableSchema::new("beta");
    beta.columns.push(strata_orm::migrations::ColumnSchema::new("id", "INTEGER").autoincrement());

    let diff = SchemaDiff {
        created: vec![alpha, beta],
        dropped: vec![TableSchema::new("ghost")],
        ..Default::default()
    };
    let generated = GeneratedMigration {
        database: "blog".to_string(),
        dialect: SqlDialect::SQLite,
        statements: strata_orm::migrations::renderer::render(&diff, SqlDialect::SQLite),
        diff,
    };
    assert_eq!(generated.statements.len(), 3);
    engine.save("broken", &generated).await.unwrap();

    match engine.run("broken").await {
        Err(OrmError::MigrationPartiallyApplied { name, failures }) => {
            assert_eq!(name, "broken");
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].statement, "DROP TABLE ghost");
            assert!(failures[0].reason.contains("ghost"));
        }
        other => panic!("expected a partial failure, got {:?}", other),
    }

    let connection = ctx.connection("blog").await.unwrap();
    assert!(connection.introspect_table("alpha").await.unwrap().is_some());
    assert!(connection.introspect_table("beta").await.unwrap().is_some());

    let record = engine.find("broken").await.unwrap().unwrap();
    assert_eq!(record.status, MigrationStatus::Pending);
}

#[tokio::test]
async fn test_rollback_reverses_an_applied_migration() {
    let ctx = context(POST_ONLY_SCHEMA).await;
    let engine = MigrationEngine::new(&ctx).unwrap();
    engine.setup().await.unwrap();

    let generated = engine.generate_for_type("blog::post").await.unwrap();
    engine.save("posts", &generated).await.unwrap();

    assert!(matches!(
        engine.rollback("posts", true).await,
        Err(OrmError::MigrationNotApplied(_))
    ));
    engine.run("posts").await.unwrap();

    let plan = engine.rollback_plan("posts").await.unwrap();
    assert_eq!(plan.statements, vec!["DROP TABLE post".to_string()]);
    assert_eq!(plan.irreversible, vec!["drop table post and every row in it".to_string()]);

    let declined = engine.rollback("posts", false).await.unwrap();
    assert!(declined.skipped);
    let connection = ctx.connection("blog").await.unwrap();
    assert!(connection.introspect_table("post").await.unwrap().is_some());

    let report = engine.rollback("posts", true).await.unwrap();
    assert_eq!(report.executed, plan.statements);
    assert!(connection.introspect_table("post").await.unwrap().is_none());
    assert_eq!(engine.find("posts").await.unwrap().unwrap().status, MigrationStatus::Pending);
}

#[tokio::test]
async fn test_adding_a_property_alters_the_table() {
    let ctx = context(POST_ONLY_SCHEMA).await;
    let engine = MigrationEngine::new(&ctx).unwrap();
    engine.setup().await.unwrap();
    let connection = ctx.connection("blog").await.unwrap();
    connection
        .execute("CREATE TABLE post (id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, title VARCHAR(120) NOT NULL)", &[])
        .await
        .unwrap();

    let generated = engine.generate_for_type("blog::post").await.unwrap();
    assert!(generated.diff.created.is_empty());
    let table = &generated.diff.altered[0];
    assert_eq!(table.added_columns[0].name, "author_id");
    assert_eq!(table.added_foreign_keys.len(), 1);
    // A new foreign key needs a rebuild on SQLite
    assert_eq!(generated.statements[0], "PRAGMA foreign_keys = OFF");
    assert!(generated.statements[1].starts_with("CREATE TABLE __temp__post"));

    engine.save("author-link", &generated).await.unwrap();
    engine.run("author-link").await.unwrap();
    let rebuilt = connection.introspect_table("post").await.unwrap().unwrap();
    assert!(rebuilt.column("author_id").is_some());
    assert!(engine.generate_for_type("blog::post").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rebuilding_a_parent_keeps_referencing_rows() {
    let ctx = context(WIDER_NAME_SCHEMA).await;
    let engine = MigrationEngine::new(&ctx).unwrap();
    engine.setup().await.unwrap();
    let connection = ctx.connection("blog").await.unwrap();
    for sql in [
        "CREATE TABLE author (id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, name VARCHAR(80) NOT NULL)",
        "CREATE TABLE post (id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, author_id INTEGER, \
         FOREIGN KEY (author_id) REFERENCES author (id) ON DELETE CASCADE)",
        "INSERT INTO author (id, name) VALUES (1, 'Ann')",
        "INSERT INTO post (author_id) VALUES (1), (1)",
    ] {
        connection.execute(sql, &[]).await.unwrap();
    }

    let generated = engine.generate_for_type("blog::author").await.unwrap();
    assert_eq!(generated.diff.altered[0].changed_columns.len(), 1);
    engine.save("wider-name", &generated).await.unwrap();
    assert!(engine.run("wider-name").await.unwrap().succeeded());

    let author = connection.introspect_table("author").await.unwrap().unwrap();
    assert_eq!(author.column("name").unwrap().sql_type, "VARCHAR(120)");
    let posts = connection.fetch_all("SELECT id FROM post", &[]).await.unwrap();
    assert_eq!(posts.len(), 2);

    // Enforcement is back on once the rebuild is done
    let pragma = connection.fetch_optional("PRAGMA foreign_keys", &[]).await.unwrap().unwrap();
    assert_eq!(pragma.integer("foreign_keys"), Some(1));
    connection.execute("DELETE FROM author WHERE id = 1", &[]).await.unwrap();
    assert!(connection.fetch_all("SELECT id FROM post", &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_waits_for_a_rollback_in_progress() {
    let ctx = context(POST_ONLY_SCHEMA).await;
    let engine = MigrationEngine::new(&ctx).unwrap();
    engine.setup().await.unwrap();

    let generated = engine.generate_for_type("blog::post").await.unwrap();
    engine.save("posts", &generated).await.unwrap();
    engine.run("posts").await.unwrap();

    // The rollback is polled first and takes the lock; the run then sees the
    // pending record instead of the stale done one
    let (rolled_back, rerun) = tokio::join!(engine.rollback("posts", true), engine.run("posts"));
    assert_eq!(rolled_back.unwrap().executed, vec!["DROP TABLE post".to_string()]);
    let rerun = rerun.unwrap();
    assert!(!rerun.skipped);
    assert!(rerun.succeeded());

    let connection = ctx.connection("blog").await.unwrap();
    assert!(connection.introspect_table("post").await.unwrap().is_some());
    assert_eq!(engine.find("posts").await.unwrap().unwrap().status, MigrationStatus::Done);
}
