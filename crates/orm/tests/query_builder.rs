mod common;

use common::{migrated_context, BLOG_SCHEMA};
use strata_orm::{DataContext, FieldValue, OrmError, RawParams, Type};

async fn author(ctx: &DataContext, name: &str) -> Type {
    let record = ctx.instantiate("blog::author").unwrap().with("blog::author-name", name).unwrap();
    ctx.create(record).execute().await.unwrap()
}

async fn post(ctx: &DataContext, title: &str, author: &Type, published: bool) -> Type {
    let record = ctx
        .instantiate("blog::post")
        .unwrap()
        .with("blog::post-title", title)
        .unwrap()
        .with("blog::post-published", published)
        .unwrap()
        .with("blog::post-author", author.autoincrement_value().clone())
        .unwrap();
    ctx.create(record).execute().await.unwrap()
}

#[tokio::test]
async fn test_create_then_fetch_round_trips_values() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "  Ann  ").await;
    assert!(!ann.is_empty());
    // Filters run before the write
    assert_eq!(ann.get("blog::author-name").unwrap(), &FieldValue::from("Ann"));

    let created = post(&ctx, "Hello", &ann, true).await;
    let id = created.autoincrement_value().clone();
    assert_eq!(created.get("blog::post-views").unwrap(), &FieldValue::Integer(0));

    let fetched = ctx
        .select("blog::post")
        .unwrap()
        .where_eq("blog::post-id", id.clone())
        .fetch()
        .await
        .unwrap();

    assert_eq!(fetched.autoincrement_value(), &id);
    assert_eq!(fetched.get("blog::post-title").unwrap(), &FieldValue::from("Hello"));
    assert_eq!(fetched.get("blog::post-published").unwrap(), &FieldValue::Bool(true));

    let nested = fetched.get("blog::post-author").unwrap().as_record().unwrap();
    assert_eq!(nested.get("blog::author-name").unwrap(), &FieldValue::from("Ann"));
    // The editor shares the author alias and stays a plain key
    assert!(fetched.get("blog::post-editor").unwrap().is_null());
}

#[tokio::test]
async fn test_fetch_without_match_is_empty() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let record = ctx
        .select("blog::post")
        .unwrap()
        .where_eq("blog::post-id", 404)
        .fetch()
        .await
        .unwrap();
    assert!(record.is_empty());
}

#[tokio::test]
async fn test_create_reports_validation_messages() {
    let ctx = migrated_context(BLOG_SCHEMA).await;

    let missing = ctx.instantiate("blog::post").unwrap();
    let err = ctx.create(missing).execute().await.unwrap_err();
    let messages = err.field_messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].field, "blog::post-title");
    assert_eq!(messages[0].code, "not_null");

    let short = ctx.instantiate("blog::author").unwrap().with("blog::author-name", "A").unwrap();
    let err = ctx.create(short).execute().await.unwrap_err();
    assert_eq!(err.field_messages()[0].code, "length");
}

#[tokio::test]
async fn test_update_requires_values_and_scopes_by_identity() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "Ann").await;
    let first = post(&ctx, "First", &ann, false).await;
    let second = post(&ctx, "Second", &ann, false).await;

    let err = ctx.update(first.clone()).execute().await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidInput { .. }));
    assert_eq!(err.field_messages()[0].code, "empty_update");

    // The extra predicate matches both rows, the identity keeps it to one
    let updated = ctx
        .update(first.clone())
        .set("blog::post-published", true)
        .where_eq("blog::post-author", ann.autoincrement_value().clone())
        .execute()
        .await
        .unwrap();
    assert_eq!(updated.get("blog::post-published").unwrap(), &FieldValue::Bool(true));

    let published = ctx
        .select("blog::post")
        .unwrap()
        .where_eq("blog::post-published", true)
        .fetch_all()
        .await
        .unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].autoincrement_value(), first.autoincrement_value());
    assert_ne!(published[0].autoincrement_value(), second.autoincrement_value());
}

#[tokio::test]
async fn test_update_validates_only_assigned_group() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "Ann").await;
    let created = post(&ctx, "Draft", &ann, false).await;

    // A record holding only its identity: the title is null but not assigned
    let partial = ctx
        .instantiate("blog::post")
        .unwrap()
        .with("blog::post-id", created.autoincrement_value().clone())
        .unwrap();
    ctx.update(partial.clone()).set("blog::post-views", 10).execute().await.unwrap();

    let err = ctx
        .update(partial)
        .set("blog::post-title", FieldValue::Null)
        .execute()
        .await
        .unwrap_err();
    assert_eq!(err.field_messages()[0].field, "blog::post-title");
}

#[tokio::test]
async fn test_update_without_identity_is_rejected() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let fresh = ctx.instantiate("blog::post").unwrap();
    let err = ctx.update(fresh).set("blog::post-views", 1).execute().await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(_)));
}

#[tokio::test]
async fn test_delete_needs_predicates_and_counts_rows() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "Ann").await;
    post(&ctx, "One", &ann, false).await;
    post(&ctx, "Two", &ann, false).await;
    post(&ctx, "Three", &ann, true).await;

    let err = ctx.delete("blog::post").unwrap().execute().await.unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(_)));

    let removed = ctx
        .delete("blog::post")
        .unwrap()
        .where_eq("blog::post-published", false)
        .execute()
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(ctx.select("blog::post").unwrap().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_relation_path_predicates_and_ordering() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "Ann").await;
    let bob = author(&ctx, "Bob").await;
    post(&ctx, "b-post", &ann, false).await;
    post(&ctx, "a-post", &ann, false).await;
    post(&ctx, "bob-post", &bob, false).await;

    let titles: Vec<FieldValue> = ctx
        .select("blog::post")
        .unwrap()
        .where_eq(["blog::post-author", "blog::author-name"], "Ann")
        .order_by_asc("blog::post-title")
        .fetch_all()
        .await
        .unwrap()
        .iter()
        .map(|p| p.get("blog::post-title").unwrap().clone())
        .collect();
    assert_eq!(titles, vec![FieldValue::from("a-post"), FieldValue::from("b-post")]);

    let others = ctx
        .select("blog::post")
        .unwrap()
        .where_not_in(["author", "name"], vec!["Ann"])
        .fetch_all_maps()
        .await
        .unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0]["blog::post-title"], "bob-post");
}

#[tokio::test]
async fn test_diamond_and_cycle_join_each_alias_once() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let (sql, _) = ctx.select("blog::post").unwrap().to_sql_with_params().unwrap();

    assert_eq!(sql.matches(" JOIN ").count(), 1);
    assert!(sql.contains("LEFT JOIN author ON post.author_id = author.id"));
    assert!(!sql.contains("JOIN post"));

    let (excluded, _) = ctx
        .select("blog::post")
        .unwrap()
        .exclude(["author"])
        .to_sql_with_params()
        .unwrap();
    assert!(!excluded.contains("JOIN"));
}

#[tokio::test]
async fn test_paths_through_unjoined_relations_are_rejected() {
    let ctx = migrated_context(BLOG_SCHEMA).await;

    let err = ctx
        .select("blog::post")
        .unwrap()
        .exclude(["author"])
        .where_eq(["author", "name"], "Ann")
        .to_sql_with_params()
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(_)));

    let err = ctx
        .select("blog::post")
        .unwrap()
        .where_eq("blog::post-missing", 1)
        .to_sql_with_params()
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidQuery(_) | OrmError::PropertyNotFound { .. }));
}

#[tokio::test]
async fn test_lazy_paging_and_raw_predicates() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "Ann").await;
    for i in 0..5 {
        post(&ctx, &format!("post-{}", i), &ann, i % 2 == 0).await;
    }

    let mut rows = ctx.select("blog::post").unwrap().limit(4).fetch_all_lazy(3);
    let mut seen = Vec::new();
    while let Some(record) = rows.next().await.unwrap() {
        seen.push(record.get("blog::post-title").unwrap().clone());
    }
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0], FieldValue::from("post-0"));

    rows.restart();
    assert!(rows.next_row().await.unwrap().is_some());

    let count = ctx
        .select("blog::post")
        .unwrap()
        .where_raw("post.published = ?", RawParams::Positional(vec![FieldValue::Bool(true)]))
        .count()
        .await
        .unwrap();
    assert_eq!(count, 3);
}

#[tokio::test]
async fn test_property_whitelist_keeps_identity_and_keys() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "Ann").await;
    post(&ctx, "Only", &ann, true).await;

    let select = ctx.select("blog::post").unwrap().properties(["blog::post-title"]);
    let (sql, _) = select.to_sql_with_params().unwrap();
    assert!(sql.contains("post.id AS post__id"));
    assert!(sql.contains("post.author_id AS post__author_id"));
    assert!(!sql.contains("post.views"));

    let record = select.fetch().await.unwrap();
    assert!(record.get("blog::post-views").unwrap().is_null());
    assert!(record.get("blog::post-author").unwrap().as_record().is_some());
}

#[tokio::test]
async fn test_update_can_move_the_identity() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "Ann").await;
    let original = ann.autoincrement_value().clone();

    let moved = ctx
        .update(ann)
        .set("blog::author-id", 10)
        .set("blog::author-name", "Ann2")
        .execute()
        .await
        .unwrap();
    assert_eq!(moved.autoincrement_value(), &FieldValue::Integer(10));

    let renamed = ctx
        .select("blog::author")
        .unwrap()
        .where_eq("blog::author-id", 10)
        .fetch()
        .await
        .unwrap();
    assert_eq!(renamed.get("blog::author-name").unwrap(), &FieldValue::from("Ann2"));

    let old = ctx
        .select("blog::author")
        .unwrap()
        .where_eq("blog::author-id", original)
        .fetch()
        .await
        .unwrap();
    assert!(old.is_empty());
}

#[tokio::test]
async fn test_ordering_by_two_aliases_of_one_table() {
    let schema = BLOG_SCHEMA.replace(
        "        localProperty: blog::post-editor\n",
        "        localProperty: blog::post-editor\n        alias: editor\n",
    );
    let ctx = migrated_context(&schema).await;
    let ann = author(&ctx, "Ann").await;
    let bob = author(&ctx, "Bob").await;
    for (title, writer, editor) in [("a", &ann, &ann), ("b", &ann, &bob), ("c", &bob, &ann)] {
        let record = ctx
            .instantiate("blog::post")
            .unwrap()
            .with("blog::post-title", title)
            .unwrap()
            .with("blog::post-author", writer.autoincrement_value().clone())
            .unwrap()
            .with("blog::post-editor", editor.autoincrement_value().clone())
            .unwrap();
        ctx.create(record).execute().await.unwrap();
    }

    let select = ctx
        .select("blog::post")
        .unwrap()
        .order_by_asc(["blog::post-author", "blog::author-name"])
        .order_by_desc(["blog::post-editor", "blog::author-name"])
        .order_by_desc(["blog::post-author", "blog::author-name"]);
    let (sql, _) = select.to_sql_with_params().unwrap();
    assert!(sql.ends_with("ORDER BY author.name ASC, editor.name DESC"));

    let titles: Vec<FieldValue> = select
        .fetch_all()
        .await
        .unwrap()
        .iter()
        .map(|p| p.get("blog::post-title").unwrap().clone())
        .collect();
    assert_eq!(titles, vec![FieldValue::from("b"), FieldValue::from("a"), FieldValue::from("c")]);

    // Excluding one relation by its local property keeps the other alias
    let (sql, _) = ctx
        .select("blog::post")
        .unwrap()
        .exclude(["blog::post-editor"])
        .to_sql_with_params()
        .unwrap();
    assert!(sql.contains("LEFT JOIN author ON post.author_id = author.id"));
    assert!(!sql.contains("AS editor"));
}

#[tokio::test]
async fn test_paginate_past_the_last_page_is_empty() {
    let ctx = migrated_context(BLOG_SCHEMA).await;
    let ann = author(&ctx, "Ann").await;
    for i in 0..5 {
        post(&ctx, &format!("post-{}", i), &ann, false).await;
    }

    let second = ctx
        .select("blog::post")
        .unwrap()
        .order_by_asc("blog::post-id")
        .paginate(2, 2)
        .fetch_all()
        .await
        .unwrap();
    let titles: Vec<FieldValue> = second.iter().map(|p| p.get("blog::post-title").unwrap().clone()).collect();
    assert_eq!(titles, vec![FieldValue::from("post-2"), FieldValue::from("post-3")]);

    let beyond = ctx
        .select("blog::post")
        .unwrap()
        .paginate(2, u64::MAX)
        .fetch_all()
        .await
        .unwrap();
    assert!(beyond.is_empty());
}
