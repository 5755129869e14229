/// Comment service - comments attached to posts
use crate::db::EntityStore;
use crate::error::{AppError, Result};
use crate::middleware::{
    require_comment, require_comment_author, require_comment_deleter, AuthUser,
};
use crate::models::{Comment, NewComment};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Comment body; blank text is stored as no text
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: Option<String>,
}

impl CommentForm {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    fn normalized_text(self) -> Option<String> {
        self.text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn EntityStore>,
}

impl CommentService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    async fn ensure_post(&self, post_id: i64) -> Result<()> {
        match self.store.find_post(post_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("post {}", post_id))),
        }
    }

    /// Comments of a post, newest first
    pub async fn list(&self, post_id: i64) -> Result<Vec<Comment>> {
        self.ensure_post(post_id).await?;
        self.store.list_comments(post_id).await
    }

    pub async fn create(
        &self,
        viewer: Option<&AuthUser>,
        post_id: i64,
        form: CommentForm,
    ) -> Result<Comment> {
        let user = require_comment(viewer)?;
        self.ensure_post(post_id).await?;

        let comment = self
            .store
            .insert_comment(NewComment {
                post_id,
                author_id: user.id,
                text: form.normalized_text(),
            })
            .await?;

        info!(comment_id = comment.id, post_id, author_id = user.id, "comment created");
        Ok(comment)
    }

    /// A comment that belongs to the given post
    pub async fn get(&self, post_id: i64, id: i64) -> Result<Comment> {
        self.ensure_post(post_id).await?;
        self.store
            .find_comment(id)
            .await?
            .filter(|c| c.post_id == post_id)
            .ok_or_else(|| AppError::NotFound(format!("comment {}", id)))
    }

    pub async fn update(
        &self,
        viewer: Option<&AuthUser>,
        post_id: i64,
        id: i64,
        form: CommentForm,
    ) -> Result<Comment> {
        let comment = self.get(post_id, id).await?;
        require_comment_author(viewer, &comment)?;

        let text = match form.text {
            Some(_) => form.normalized_text(),
            None => comment.text.clone(),
        };

        self.store
            .update_comment(id, text)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("comment {}", id)))
    }

    pub async fn delete(&self, viewer: Option<&AuthUser>, post_id: i64, id: i64) -> Result<()> {
        let comment = self.get(post_id, id).await?;
        let user = require_comment_deleter(viewer, &comment)?;

        self.store.delete_comment(id).await?;
        info!(comment_id = id, post_id, author_id = user.id, "comment deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAuthor, NewPost};
    use crate::db::MemoryStore;

    async fn setup() -> (CommentService, AuthUser, AuthUser, i64, Arc<dyn EntityStore>) {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let mut users = Vec::new();
        for name in ["leo", "kim"] {
            let a = store
                .create_author(NewAuthor {
                    username: name.to_string(),
                    email: None,
                    password_hash: "hash".to_string(),
                })
                .await
                .unwrap();
            users.push(AuthUser {
                id: a.id,
                username: a.username,
            });
        }
        let kim = users.pop().unwrap();
        let leo = users.pop().unwrap();
        let post = store
            .insert_post(NewPost {
                author_id: leo.id,
                text: "Test Text".to_string(),
                group_id: None,
                image: None,
            })
            .await
            .unwrap();
        (CommentService::new(store.clone()), leo, kim, post.id, store)
    }

    #[tokio::test]
    async fn test_any_authenticated_viewer_can_comment() {
        let (service, _, kim, post_id, _) = setup().await;

        let comment = service
            .create(Some(&kim), post_id, CommentForm::new("Test Comment"))
            .await
            .unwrap();
        assert_eq!(comment.author, "kim");
        assert_eq!(comment.text.as_deref(), Some("Test Comment"));

        let err = service
            .create(None, post_id, CommentForm::new("anon"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_comments_listed_newest_first() {
        let (service, leo, _, post_id, _) = setup().await;
        service
            .create(Some(&leo), post_id, CommentForm::new("first"))
            .await
            .unwrap();
        service
            .create(Some(&leo), post_id, CommentForm::new("second"))
            .await
            .unwrap();

        let comments = service.list(post_id).await.unwrap();
        assert_eq!(comments[0].text.as_deref(), Some("second"));
        assert_eq!(comments[1].text.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_blank_text_is_stored_as_none() {
        let (service, leo, _, post_id, _) = setup().await;
        let comment = service
            .create(Some(&leo), post_id, CommentForm::new("   "))
            .await
            .unwrap();
        assert!(comment.text.is_none());
    }

    #[tokio::test]
    async fn test_only_author_can_change_comment() {
        let (service, leo, kim, post_id, _) = setup().await;
        let comment = service
            .create(Some(&leo), post_id, CommentForm::new("mine"))
            .await
            .unwrap();

        let err = service
            .update(Some(&kim), post_id, comment.id, CommentForm::new("theirs"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = service
            .delete(Some(&kim), post_id, comment.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let updated = service
            .update(Some(&leo), post_id, comment.id, CommentForm::new("edited"))
            .await
            .unwrap();
        assert_eq!(updated.text.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn test_deleting_post_removes_comments() {
        let (service, leo, _, post_id, store) = setup().await;
        let comment = service
            .create(Some(&leo), post_id, CommentForm::new("bye"))
            .await
            .unwrap();

        store.delete_post(post_id).await.unwrap();
        assert!(store.find_comment(comment.id).await.unwrap().is_none());
        assert!(matches!(
            service.list(post_id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
