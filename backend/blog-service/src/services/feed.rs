/// Feed assembly
///
/// Builds the ordered, paginated post listing for the global, group, profile
/// and following views. Page caching of the global feed is done by the web
/// handler on the rendered body, not here.
use crate::db::EntityStore;
use crate::error::{AppError, Result};
use crate::metrics::feed::{FEED_BUILD_DURATION_SECONDS, FEED_REQUEST_TOTAL};
use crate::middleware::{require_auth, AuthUser};
use crate::models::{Author, Group, Post, PostFilter};
use crate::services::pagination::{Page, Paginator};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    Global,
    /// Group slug
    Group(String),
    /// Author username
    Profile(String),
    /// Authors the viewer follows
    Following,
}

impl FeedScope {
    pub fn label(&self) -> &'static str {
        match self {
            FeedScope::Global => "global",
            FeedScope::Group(_) => "group",
            FeedScope::Profile(_) => "profile",
            FeedScope::Following => "following",
        }
    }
}

/// One page of a feed plus the entity the scope refers to
#[derive(Debug, Clone)]
pub struct Feed {
    pub page: Page<Post>,
    /// Set for `FeedScope::Group`
    pub group: Option<Group>,
    /// Set for `FeedScope::Profile`
    pub author: Option<Author>,
    /// Total posts by the profile author
    pub post_count: Option<usize>,
}

#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn EntityStore>,
    page_size: usize,
}

impl FeedService {
    pub fn new(store: Arc<dyn EntityStore>, page_size: usize) -> Self {
        Self { store, page_size }
    }

    pub async fn build_feed(
        &self,
        scope: FeedScope,
        viewer: Option<&AuthUser>,
        page_param: Option<&str>,
    ) -> Result<Feed> {
        let label = scope.label();
        FEED_REQUEST_TOTAL.with_label_values(&[label]).inc();
        let started = Instant::now();

        let mut group = None;
        let mut author = None;
        let filter = match &scope {
            FeedScope::Global => PostFilter::All,
            FeedScope::Group(slug) => {
                let found = self
                    .store
                    .find_group_by_slug(slug)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("group '{}'", slug)))?;
                let filter = PostFilter::Group(found.id);
                group = Some(found);
                filter
            }
            FeedScope::Profile(username) => {
                let found = self
                    .store
                    .find_author_by_username(username)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("author '{}'", username)))?;
                let filter = PostFilter::Author(found.id);
                author = Some(found);
                filter
            }
            FeedScope::Following => PostFilter::FollowedBy(require_auth(viewer)?.id),
        };

        let count = self.store.count_posts(filter).await?.max(0) as usize;
        let paginator = Paginator::new(count, self.page_size);
        let number = paginator.resolve(page_param);
        let posts = self
            .store
            .list_posts(
                filter,
                paginator.per_page() as i64,
                paginator.offset(number) as i64,
            )
            .await?;

        FEED_BUILD_DURATION_SECONDS
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());
        debug!(scope = label, page = number, count, "feed assembled");

        Ok(Feed {
            page: paginator.page(number, posts),
            post_count: author.as_ref().map(|_| count),
            group,
            author,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewAuthor, NewGroup, NewPost};

    async fn author(store: &Arc<dyn EntityStore>, name: &str) -> AuthUser {
        let a = store
            .create_author(NewAuthor {
                username: name.to_string(),
                email: None,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        AuthUser {
            id: a.id,
            username: a.username,
        }
    }

    async fn write(store: &Arc<dyn EntityStore>, author_id: i64, n: usize, group_id: Option<i64>) {
        for i in 0..n {
            store
                .insert_post(NewPost {
                    author_id,
                    text: format!("post number {}", i),
                    group_id,
                    image: None,
                })
                .await
                .unwrap();
        }
    }

    fn setup() -> (Arc<dyn EntityStore>, FeedService) {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let feed = FeedService::new(store.clone(), 10);
        (store, feed)
    }

    #[tokio::test]
    async fn test_global_feed_paginates_thirteen_posts() {
        let (store, feed) = setup();
        let leo = author(&store, "leo").await;
        write(&store, leo.id, 13, None).await;

        let first = feed.build_feed(FeedScope::Global, None, None).await.unwrap();
        assert_eq!(first.page.object_list.len(), 10);
        assert_eq!(first.page.object_list[0].text, "post number 12");

        let second = feed
            .build_feed(FeedScope::Global, None, Some("2"))
            .await
            .unwrap();
        assert_eq!(second.page.object_list.len(), 3);

        let third = feed
            .build_feed(FeedScope::Global, None, Some("3"))
            .await
            .unwrap();
        assert_eq!(third.page.number, 2);
        assert_eq!(third.page.object_list, second.page.object_list);
    }

    #[tokio::test]
    async fn test_group_feed_requires_existing_group() {
        let (store, feed) = setup();
        let leo = author(&store, "leo").await;
        let group = store
            .create_group(NewGroup {
                title: "Cats".to_string(),
                slug: "cats".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        write(&store, leo.id, 2, Some(group.id)).await;
        write(&store, leo.id, 3, None).await;

        let result = feed
            .build_feed(FeedScope::Group("cats".to_string()), None, None)
            .await
            .unwrap();
        assert_eq!(result.page.count, 2);
        assert_eq!(result.group.unwrap().title, "Cats");

        let err = feed
            .build_feed(FeedScope::Group("dogs".to_string()), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_profile_feed_carries_author_and_count() {
        let (store, feed) = setup();
        let leo = author(&store, "leo").await;
        let kim = author(&store, "kim").await;
        write(&store, leo.id, 12, None).await;
        write(&store, kim.id, 1, None).await;

        let result = feed
            .build_feed(FeedScope::Profile("leo".to_string()), None, None)
            .await
            .unwrap();
        assert_eq!(result.author.unwrap().username, "leo");
        assert_eq!(result.post_count, Some(12));
        assert!(result.page.object_list.iter().all(|p| p.author == "leo"));

        assert!(feed
            .build_feed(FeedScope::Profile("ghost".to_string()), None, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_following_feed() {
        let (store, feed) = setup();
        let leo = author(&store, "leo").await;
        let kim = author(&store, "kim").await;
        write(&store, kim.id, 5, None).await;
        write(&store, leo.id, 5, None).await;

        let err = feed
            .build_feed(FeedScope::Following, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let empty = feed
            .build_feed(FeedScope::Following, Some(&leo), None)
            .await
            .unwrap();
        assert!(empty.page.object_list.is_empty());
        assert_eq!(empty.page.num_pages, 1);

        store.insert_follow(leo.id, kim.id).await.unwrap();
        let followed = feed
            .build_feed(FeedScope::Following, Some(&leo), None)
            .await
            .unwrap();
        assert_eq!(followed.page.count, 5);
        assert!(followed.page.object_list.iter().all(|p| p.author == "kim"));
    }
}
