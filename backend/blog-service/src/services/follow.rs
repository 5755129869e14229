/// Follow graph manager
///
/// Every follow write goes through this service. Edges are directed
/// (follower -> author), unique per ordered pair and never point at the
/// follower themselves.
use crate::db::EntityStore;
use crate::error::{AppError, FieldErrors, Result};
use crate::metrics::feed::FOLLOW_MUTATIONS_TOTAL;
use crate::middleware::{can_follow, AuthUser};
use crate::models::{Author, Follow};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// API payload for creating a follow edge
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowInput {
    /// Username of the author to follow
    #[serde(default, alias = "author")]
    pub following: Option<String>,
}

#[derive(Clone)]
pub struct FollowService {
    store: Arc<dyn EntityStore>,
}

impl FollowService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    async fn author(&self, username: &str) -> Result<Author> {
        self.store
            .find_author_by_username(username)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("author '{}'", username)))
    }

    /// Idempotent follow; returns true if a new edge was created.
    /// Following yourself is ignored.
    pub async fn follow(&self, user: &AuthUser, target_username: &str) -> Result<bool> {
        let target = self.author(target_username).await?;

        if !can_follow(Some(user), &target) {
            debug!(author_id = user.id, "ignoring self-follow");
            FOLLOW_MUTATIONS_TOTAL.with_label_values(&["self"]).inc();
            return Ok(false);
        }

        let created = self.store.insert_follow(user.id, target.id).await?.is_some();
        let outcome = if created { "created" } else { "existing" };
        FOLLOW_MUTATIONS_TOTAL.with_label_values(&[outcome]).inc();

        if created {
            info!(follower_id = user.id, author_id = target.id, "follow created");
        }
        Ok(created)
    }

    /// Idempotent unfollow; returns true if an edge was removed.
    pub async fn unfollow(&self, user: &AuthUser, target_username: &str) -> Result<bool> {
        let target = self.author(target_username).await?;

        let removed = self.store.delete_follow(user.id, target.id).await?;
        let outcome = if removed { "removed" } else { "missing" };
        FOLLOW_MUTATIONS_TOTAL.with_label_values(&[outcome]).inc();

        if removed {
            info!(follower_id = user.id, author_id = target.id, "follow removed");
        }
        Ok(removed)
    }

    pub async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool> {
        if user_id == author_id {
            return Ok(false);
        }
        self.store.follow_exists(user_id, author_id).await
    }

    /// The viewer's own edges, optionally filtered by followed username
    pub async fn following_of(&self, user: &AuthUser, search: Option<&str>) -> Result<Vec<Follow>> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());
        self.store.list_follows(user.id, search).await
    }

    /// API create: same invariants as `follow`, but refusals are reported
    /// as validation errors instead of being ignored.
    pub async fn create_edge(&self, user: &AuthUser, input: FollowInput) -> Result<Follow> {
        let username = input
            .following
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::Validation(FieldErrors::single("following", "This field is required."))
            })?;

        let target = self
            .store
            .find_author_by_username(username)
            .await?
            .ok_or_else(|| {
                AppError::Validation(FieldErrors::single(
                    "following",
                    format!("Object with username={} does not exist.", username),
                ))
            })?;

        if !can_follow(Some(user), &target) {
            FOLLOW_MUTATIONS_TOTAL.with_label_values(&["self"]).inc();
            return Err(AppError::Validation(FieldErrors::single(
                "following",
                "You cannot follow yourself.",
            )));
        }

        match self.store.insert_follow(user.id, target.id).await? {
            Some(follow) => {
                FOLLOW_MUTATIONS_TOTAL.with_label_values(&["created"]).inc();
                info!(follower_id = user.id, author_id = target.id, "follow created");
                Ok(follow)
            }
            None => {
                FOLLOW_MUTATIONS_TOTAL.with_label_values(&["existing"]).inc();
                Err(AppError::Validation(FieldErrors::single(
                    "non_field_errors",
                    "The fields user, following must make a unique set.",
                )))
            }
        }
    }

    /// One of the viewer's own edges
    pub async fn get_edge(&self, user: &AuthUser, id: i64) -> Result<Follow> {
        self.store
            .find_follow(id)
            .await?
            .filter(|f| f.user_id == user.id)
            .ok_or_else(|| AppError::NotFound(format!("follow {}", id)))
    }

    pub async fn remove_edge(&self, user: &AuthUser, id: i64) -> Result<()> {
        let edge = self.get_edge(user, id).await?;
        self.store.delete_follow_by_id(edge.id).await?;
        FOLLOW_MUTATIONS_TOTAL.with_label_values(&["removed"]).inc();
        info!(follower_id = user.id, author_id = edge.author_id, "follow removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::NewAuthor;

    async fn setup() -> (FollowService, AuthUser, AuthUser, Arc<dyn EntityStore>) {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let mut users = Vec::new();
        for name in ["leo", "kim"] {
            let author = store
                .create_author(NewAuthor {
                    username: name.to_string(),
                    email: None,
                    password_hash: "hash".to_string(),
                })
                .await
                .unwrap();
            users.push(AuthUser {
                id: author.id,
                username: author.username,
            });
        }
        let kim = users.pop().unwrap();
        let leo = users.pop().unwrap();
        (FollowService::new(store.clone()), leo, kim, store)
    }

    #[tokio::test]
    async fn test_follow_twice_leaves_one_edge() {
        let (service, leo, _kim, _) = setup().await;

        assert!(service.follow(&leo, "kim").await.unwrap());
        assert!(!service.follow(&leo, "kim").await.unwrap());
        assert_eq!(service.following_of(&leo, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unfollow_missing_edge_is_noop() {
        let (service, leo, kim, _) = setup().await;

        assert!(!service.unfollow(&leo, "kim").await.unwrap());
        assert!(!service.is_following(leo.id, kim.id).await.unwrap());

        service.follow(&leo, "kim").await.unwrap();
        assert!(service.unfollow(&leo, "kim").await.unwrap());
        assert!(service.following_of(&leo, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_follow_is_ignored() {
        let (service, leo, _, _) = setup().await;

        assert!(!service.follow(&leo, "leo").await.unwrap());
        assert!(service.following_of(&leo, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_follow_unknown_author_is_not_found() {
        let (service, leo, _, _) = setup().await;
        let err = service.follow(&leo, "ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_edge_reports_validation_errors() {
        let (service, leo, _, _) = setup().await;

        let input = |name: &str| FollowInput {
            following: Some(name.to_string()),
        };

        let follow = service.create_edge(&leo, input("kim")).await.unwrap();
        assert_eq!(follow.user, "leo");
        assert_eq!(follow.author, "kim");

        let dup = service.create_edge(&leo, input("kim")).await.unwrap_err();
        assert!(matches!(dup, AppError::Validation(_)));

        let own = service.create_edge(&leo, input("leo")).await.unwrap_err();
        assert!(matches!(own, AppError::Validation(_)));

        let missing = service
            .create_edge(&leo, FollowInput::default())
            .await
            .unwrap_err();
        assert!(matches!(missing, AppError::Validation(_)));

        assert_eq!(service.following_of(&leo, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_edge_only_for_owner() {
        let (service, leo, kim, _) = setup().await;
        let follow = service
            .create_edge(
                &leo,
                FollowInput {
                    following: Some("kim".to_string()),
                },
            )
            .await
            .unwrap();

        let err = service.remove_edge(&kim, follow.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        service.remove_edge(&leo, follow.id).await.unwrap();
        assert!(!service.is_following(leo.id, kim.id).await.unwrap());
    }
}
