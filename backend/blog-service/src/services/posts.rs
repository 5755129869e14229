/// Post service - business logic for post operations
///
/// Every mutation re-checks authorship against the stored post, so a
/// non-author request never reaches the store.
use crate::db::EntityStore;
use crate::error::{AppError, FieldErrors, Result};
use crate::middleware::{require_create, require_post_author, require_post_deleter, AuthUser};
use crate::models::{NewPost, Post, PostFilter, PostUpdate};
use serde::{de, Deserialize, Deserializer};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

const INVALID_GROUP: &str = "Select a valid choice. That choice is not one of the available choices.";

#[derive(Deserialize)]
#[serde(untagged)]
enum IdOrText {
    Id(i64),
    Text(String),
}

/// Accepts a numeric id, a numeric string, an empty string or null
pub(crate) fn optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<IdOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IdOrText::Id(id)) => Ok(Some(id)),
        Some(IdOrText::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(IdOrText::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid id '{}'", text))),
    }
}

/// Distinguishes an absent field from an explicit null
fn present_optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_id(deserializer).map(Some)
}

/// Post text and group, as submitted by the web form or the API
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PostForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub text: String,
    #[serde(default, deserialize_with = "optional_id")]
    pub group: Option<i64>,
}

impl PostForm {
    pub fn new(text: impl Into<String>, group: Option<i64>) -> Self {
        Self {
            text: text.into(),
            group,
        }
    }

    fn normalized(mut self) -> Self {
        self.text = self.text.trim().to_string();
        self
    }
}

/// Partial update; absent fields keep their stored value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostChanges {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "present_optional_id")]
    pub group: Option<Option<i64>>,
    #[serde(skip)]
    pub image: Option<Option<String>>,
}

impl From<PostForm> for PostChanges {
    fn from(form: PostForm) -> Self {
        Self {
            text: Some(form.text),
            group: Some(form.group),
            image: None,
        }
    }
}

#[derive(Clone)]
pub struct PostService {
    store: Arc<dyn EntityStore>,
}

impl PostService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Validate a form and check the referenced group exists
    pub async fn validate_form(&self, form: PostForm) -> Result<PostForm> {
        let form = form.normalized();
        let mut errors = match form.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        if let Some(group_id) = form.group {
            if self.store.find_group(group_id).await?.is_none() {
                errors.add("group", INVALID_GROUP);
            }
        }

        errors.into_result()?;
        Ok(form)
    }

    pub async fn create(
        &self,
        viewer: Option<&AuthUser>,
        form: PostForm,
        image: Option<String>,
    ) -> Result<Post> {
        let user = require_create(viewer)?;
        let form = self.validate_form(form).await?;

        let post = self
            .store
            .insert_post(NewPost {
                author_id: user.id,
                text: form.text,
                group_id: form.group,
                image,
            })
            .await?;

        info!(post_id = post.id, author_id = user.id, "post created");
        Ok(post)
    }

    pub async fn get(&self, id: i64) -> Result<Post> {
        self.store
            .find_post(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", id)))
    }

    /// Post addressed by author username and id; both must match
    pub async fn get_for_author(&self, username: &str, id: i64) -> Result<Post> {
        self.store
            .find_post(id)
            .await?
            .filter(|post| post.author == username)
            .ok_or_else(|| AppError::NotFound(format!("post {} by '{}'", id, username)))
    }

    /// Every post, newest first
    pub async fn list(&self) -> Result<Vec<Post>> {
        let count = self.store.count_posts(PostFilter::All).await?;
        self.store.list_posts(PostFilter::All, count, 0).await
    }

    pub async fn update(
        &self,
        viewer: Option<&AuthUser>,
        id: i64,
        changes: PostChanges,
    ) -> Result<Post> {
        let post = self.get(id).await?;
        let user = require_post_author(viewer, &post)?;

        let form = self
            .validate_form(PostForm {
                text: changes.text.unwrap_or_else(|| post.text.clone()),
                group: changes.group.unwrap_or(post.group_id),
            })
            .await?;

        let updated = self
            .store
            .update_post(
                id,
                PostUpdate {
                    text: form.text,
                    group_id: form.group,
                    image: changes.image.unwrap_or_else(|| post.image.clone()),
                },
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {}", id)))?;

        info!(post_id = id, author_id = user.id, "post updated");
        Ok(updated)
    }

    pub async fn delete(&self, viewer: Option<&AuthUser>, id: i64) -> Result<()> {
        let post = self.get(id).await?;
        let user = require_post_deleter(viewer, &post)?;

        self.store.delete_post(id).await?;
        info!(post_id = id, author_id = user.id, "post deleted");
        Ok(())
    }
}
