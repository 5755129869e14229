//! PostgreSQL entity store tests.
//!
//! These run only when `TEST_DATABASE_URL` points at a scratch database;
//! otherwise each test returns early.

use blog_service::config::Config;
use blog_service::db::{create_pool, run_migrations, EntityStore, PostgresStore};
use blog_service::error::AppError;
use blog_service::models::{NewAuthor, NewComment, NewGroup, NewPost, PostFilter};
use uuid::Uuid;

async fn store() -> Option<PostgresStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let mut config = Config::for_memory().database;
    config.url = url;
    config.max_connections = 2;
    config.connect_timeout_secs = 5;

    let pool = create_pool(&config).await.expect("connect test database");
    run_migrations(&pool).await.expect("run migrations");
    Some(PostgresStore::new(pool))
}

fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

async fn author(store: &PostgresStore, prefix: &str) -> blog_service::models::Author {
    store
        .create_author(NewAuthor {
            username: unique(prefix),
            email: None,
            password_hash: "hash".to_string(),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn follow_edges_are_unique_and_never_self() {
    let Some(store) = store().await else { return };
    let leo = author(&store, "leo").await;
    let kim = author(&store, "kim").await;

    assert!(store.insert_follow(kim.id, leo.id).await.unwrap().is_some());
    assert!(store.insert_follow(kim.id, leo.id).await.unwrap().is_none());
    assert!(store.follow_exists(kim.id, leo.id).await.unwrap());

    let err = store.insert_follow(kim.id, kim.id).await.unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let search = &leo.username[..4];
    let follows = store
        .list_follows(kim.id, Some(&search.to_uppercase()))
        .await
        .unwrap();
    assert_eq!(follows.len(), 1);
    assert_eq!(follows[0].author, leo.username);
    assert_eq!(follows[0].user, kim.username);

    assert!(store.delete_follow(kim.id, leo.id).await.unwrap());
    assert!(!store.delete_follow(kim.id, leo.id).await.unwrap());
}

#[tokio::test]
async fn group_delete_nulls_posts_and_author_delete_cascades() {
    let Some(store) = store().await else { return };
    let leo = author(&store, "leo").await;
    let kim = author(&store, "kim").await;
    let slug = unique("grp");
    let group = store
        .create_group(NewGroup {
            title: "Group".to_string(),
            slug: slug.clone(),
            description: String::new(),
        })
        .await
        .unwrap();

    let post = store
        .insert_post(NewPost {
            author_id: leo.id,
            text: "grouped".to_string(),
            group_id: Some(group.id),
            image: None,
        })
        .await
        .unwrap();
    assert_eq!(post.author, leo.username);
    assert_eq!(store.count_posts(PostFilter::Group(group.id)).await.unwrap(), 1);

    let comment = store
        .insert_comment(NewComment {
            post_id: post.id,
            author_id: kim.id,
            text: Some("hi".to_string()),
        })
        .await
        .unwrap();
    store.insert_follow(kim.id, leo.id).await.unwrap();

    assert!(store.delete_group(group.id).await.unwrap());
    assert_eq!(store.find_post(post.id).await.unwrap().unwrap().group_id, None);

    assert!(store.delete_author(leo.id).await.unwrap());
    assert!(store.find_post(post.id).await.unwrap().is_none());
    assert!(store.find_comment(comment.id).await.unwrap().is_none());
    assert!(store.list_follows(kim.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn following_filter_lists_only_followed_authors() {
    let Some(store) = store().await else { return };
    let leo = author(&store, "leo").await;
    let ann = author(&store, "ann").await;
    let kim = author(&store, "kim").await;

    for (who, text) in [(&leo, "from leo"), (&ann, "from ann")] {
        store
            .insert_post(NewPost {
                author_id: who.id,
                text: text.to_string(),
                group_id: None,
                image: None,
            })
            .await
            .unwrap();
    }

    assert_eq!(store.count_posts(PostFilter::FollowedBy(kim.id)).await.unwrap(), 0);
    store.insert_follow(kim.id, leo.id).await.unwrap();

    let posts = store
        .list_posts(PostFilter::FollowedBy(kim.id), 10, 0)
        .await
        .unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].text, "from leo");
}
