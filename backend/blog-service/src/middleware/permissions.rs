/// Authorization rules for blog-service
///
/// Pure predicates over (viewer, resource). Reads are open to everyone, so
/// only mutations and the follow views go through these checks. The
/// `require_*` helpers turn a failed check into `Unauthorized` when there is
/// no identity and `Forbidden` when the identity is not allowed.
use super::AuthUser;
use crate::error::{AppError, Result};
use crate::models::{Author, Comment, Post};

/// Viewer may edit the post; the author record must match, not only the name
pub fn can_edit(viewer: Option<&AuthUser>, post: &Post) -> bool {
    viewer.is_some_and(|v| v.id == post.author_id && v.username == post.author)
}

/// Viewer may delete the post
pub fn can_delete(viewer: Option<&AuthUser>, post: &Post) -> bool {
    can_edit(viewer, post)
}

pub fn can_edit_comment(viewer: Option<&AuthUser>, comment: &Comment) -> bool {
    viewer.is_some_and(|v| v.id == comment.author_id && v.username == comment.author)
}

pub fn can_delete_comment(viewer: Option<&AuthUser>, comment: &Comment) -> bool {
    can_edit_comment(viewer, comment)
}

pub fn can_comment(viewer: Option<&AuthUser>) -> bool {
    viewer.is_some()
}

pub fn can_create(viewer: Option<&AuthUser>) -> bool {
    viewer.is_some()
}

/// Authenticated and not targeting themselves
pub fn can_follow(viewer: Option<&AuthUser>, target: &Author) -> bool {
    viewer.is_some_and(|v| v.id != target.id)
}

/// Identity required
pub fn require_auth(viewer: Option<&AuthUser>) -> Result<&AuthUser> {
    viewer.ok_or_else(|| {
        AppError::Unauthorized("Authentication credentials were not provided".to_string())
    })
}

/// `Unauthorized` without identity, `Forbidden` when `allowed` is false
fn gate<'a>(viewer: Option<&'a AuthUser>, allowed: bool) -> Result<&'a AuthUser> {
    let user = require_auth(viewer)?;
    if allowed {
        Ok(user)
    } else {
        Err(AppError::Forbidden(
            "Changing another author's content is not allowed".to_string(),
        ))
    }
}

pub fn require_create(viewer: Option<&AuthUser>) -> Result<&AuthUser> {
    gate(viewer, can_create(viewer))
}

pub fn require_comment(viewer: Option<&AuthUser>) -> Result<&AuthUser> {
    gate(viewer, can_comment(viewer))
}

pub fn require_post_author<'a>(viewer: Option<&'a AuthUser>, post: &Post) -> Result<&'a AuthUser> {
    gate(viewer, can_edit(viewer, post))
}

pub fn require_post_deleter<'a>(viewer: Option<&'a AuthUser>, post: &Post) -> Result<&'a AuthUser> {
    gate(viewer, can_delete(viewer, post))
}

pub fn require_comment_author<'a>(
    viewer: Option<&'a AuthUser>,
    comment: &Comment,
) -> Result<&'a AuthUser> {
    gate(viewer, can_edit_comment(viewer, comment))
}

pub fn require_comment_deleter<'a>(
    viewer: Option<&'a AuthUser>,
    comment: &Comment,
) -> Result<&'a AuthUser> {
    gate(viewer, can_delete_comment(viewer, comment))
}
