/// Post endpoints: open reads, authenticated create, author-only writes
use super::{responses, PostResponse};
use crate::error::{FieldErrors, Result};
use crate::middleware::{require_post_author, AuthUser, Viewer};
use crate::services::{PostChanges, PostForm};
use crate::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn list_posts(state: web::Data<AppState>) -> Result<HttpResponse> {
    let posts = state.posts.list().await?;
    Ok(HttpResponse::Ok().json(responses::<_, PostResponse>(posts)))
}

pub async fn create_post(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<PostForm>,
) -> Result<HttpResponse> {
    let post = state.posts.create(Some(&user), req.into_inner(), None).await?;
    Ok(HttpResponse::Created().json(PostResponse::from(post)))
}

pub async fn get_post(state: web::Data<AppState>, post_id: web::Path<i64>) -> Result<HttpResponse> {
    let post = state.posts.get(post_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PostResponse::from(post)))
}

/// Full update; `text` must be present
pub async fn replace_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<i64>,
    req: web::Json<PostChanges>,
) -> Result<HttpResponse> {
    let post_id = post_id.into_inner();
    let changes = req.into_inner();

    // Non-authors get 403 before any body validation
    let post = state.posts.get(post_id).await?;
    require_post_author(viewer.user(), &post)?;
    if changes.text.is_none() {
        FieldErrors::single("text", "This field is required.").into_result()?;
    }

    let post = state.posts.update(viewer.user(), post_id, changes).await?;
    Ok(HttpResponse::Ok().json(PostResponse::from(post)))
}

pub async fn patch_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<i64>,
    req: web::Json<PostChanges>,
) -> Result<HttpResponse> {
    let post = state
        .posts
        .update(viewer.user(), post_id.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(PostResponse::from(post)))
}

pub async fn delete_post(
    state: web::Data<AppState>,
    viewer: Viewer,
    post_id: web::Path<i64>,
) -> Result<HttpResponse> {
    state.posts.delete(viewer.user(), post_id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
