use crate::db::EntityStore;
use crate::error::{AppError, FieldErrors, Result};
use crate::models::{Group, NewGroup};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GroupForm {
    #[validate(length(min = 1, max = 200, message = "Ensure this field has at most 200 characters."))]
    pub title: String,
    #[validate(length(min = 1, max = 50, message = "Enter a valid slug."))]
    pub slug: String,
    #[serde(default)]
    pub description: String,
}

fn is_slug(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Clone)]
pub struct GroupService {
    store: Arc<dyn EntityStore>,
}

impl GroupService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<Group>> {
        self.store.list_groups().await
    }

    pub async fn get(&self, id: i64) -> Result<Group> {
        self.store
            .find_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {}", id)))
    }

    pub async fn create(&self, form: GroupForm) -> Result<Group> {
        let mut errors = match form.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };
        if !is_slug(&form.slug) {
            errors.add("slug", "Enter a valid slug.");
        }
        errors.into_result()?;

        let group = self
            .store
            .create_group(NewGroup {
                title: form.title,
                slug: form.slug,
                description: form.description,
            })
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AppError::Validation(FieldErrors::single(
                    "slug",
                    "Group with this slug already exists.",
                )),
                other => other,
            })?;

        info!(group_id = group.id, slug = %group.slug, "group created");
        Ok(group)
    }

    /// Delete a group; its posts stay and lose their group
    pub async fn delete(&self, id: i64) -> Result<()> {
        if !self.store.delete_group(id).await? {
            return Err(AppError::NotFound(format!("group {}", id)));
        }
        info!(group_id = id, "group deleted");
        Ok(())
    }

    pub async fn delete_by_slug(&self, slug: &str) -> Result<()> {
        let group = self
            .store
            .find_group_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group '{}'", slug)))?;
        self.delete(group.id).await
    }
}
