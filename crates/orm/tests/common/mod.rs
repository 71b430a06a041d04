#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use strata_orm::migrations::record::record_schema;
use strata_orm::{ConnectionManager, DataContext, MigrationEngine, SchemaConfig, SchemaRegistry, SqliteConnection};

/// Authors and posts; a post has two relations to author and an author
/// points back at a post
pub const BLOG_SCHEMA: &str = r#"
properties:
  blog::author-id: { label: Id, name: id, description: Author id, type: integer, autoincrement: true }
  blog::author-name:
    label: Name
    name: name
    description: Display name
    type: string
    length: 80
    notnull: true
    filters: [trim]
    validators: [{ name: length, options: { min: 2, max: 80 } }]
  blog::author-favourite: { label: Favourite, name: favourite_post_id, description: Favourite post, type: integer }
  blog::post-id: { label: Id, name: id, description: Post id, type: integer, autoincrement: true }
  blog::post-title:
    label: Title
    name: title
    description: Title
    type: string
    length: 120
    notnull: true
    index: true
  blog::post-published: { label: Published, name: published, description: Published flag, type: boolean, notnull: true, default: false }
  blog::post-views: { label: Views, name: views, description: View count, type: integer, notnull: true, default: 0 }
  blog::post-author: { label: Author, name: author_id, description: Author, type: integer }
  blog::post-editor: { label: Editor, name: editor_id, description: Editor, type: integer }
types:
  blog::author:
    name: Author
    description: Authors
    database: blog
    table: author
    properties: [blog::author-id, blog::author-name, blog::author-favourite]
    relations:
      favourite:
        localProperty: blog::author-favourite
        relationType: blog::post
        relationProperty: blog::post-id
        onDelete: SET NULL
  blog::post:
    name: Post
    description: Posts
    database: blog
    table: post
    properties:
      - blog::post-id
      - blog::post-title
      - blog::post-published
      - blog::post-views
      - blog::post-author
      - blog::post-editor
    relations:
      author:
        localProperty: blog::post-author
        relationType: blog::author
        relationProperty: blog::author-id
      editor:
        localProperty: blog::post-editor
        relationType: blog::author
        relationProperty: blog::author-id
"#;

/// Context over an in-memory SQLite database named `blog`
pub async fn context(schema: &str) -> DataContext {
    let mut config = SchemaConfig::from_yaml_str(schema).unwrap();
    config.merge(record_schema("blog").unwrap());

    let connections = ConnectionManager::new(HashMap::new());
    connections.register("blog", Arc::new(SqliteConnection::in_memory().await.unwrap()));
    DataContext::new(Arc::new(SchemaRegistry::new(config)), Arc::new(connections))
}

/// Context whose tables were created through a migration
pub async fn migrated_context(schema: &str) -> DataContext {
    let ctx = context(schema).await;
    let engine = MigrationEngine::new(&ctx).unwrap();
    engine.setup().await.unwrap();

    let generated = engine.generate_for_database("blog").await.unwrap();
    engine.save("initial", &generated).await.unwrap();
    engine.run("initial").await.unwrap();
    ctx
}
