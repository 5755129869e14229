/// Comment endpoints nested under a post
use super::{responses, CommentResponse};
use crate::error::Result;
use crate::middleware::{AuthUser, Viewer};
use crate::services::CommentForm;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn list_comments(
    state: web::Data<AppState>,
    post_id: web::Path<i64>,
) -> Result<HttpResponse> {
    let comments = state.comments.list(post_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(responses::<_, CommentResponse>(comments)))
}

pub async fn create_comment(
    state: web::Data<AppState>,
    user: AuthUser,
    post_id: web::Path<i64>,
    req: web::Json<CommentForm>,
) -> Result<HttpResponse> {
    let comment = state
        .comments
        .create(Some(&user), post_id.into_inner(), req.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(CommentResponse::from(comment)))
}

pub async fn get_comment(
    state: web::Data<AppState>,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let comment = state.comments.get(post_id, comment_id).await?;
    Ok(HttpResponse::Ok().json(CommentResponse::from(comment)))
}

/// Serves both PUT and PATCH; an absent `text` keeps the stored value
pub async fn update_comment(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<(i64, i64)>,
    req: web::Json<CommentForm>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let comment = state
        .comments
        .update(viewer.user(), post_id, comment_id, req.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(CommentResponse::from(comment)))
}

pub async fn delete_comment(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    state.comments.delete(viewer.user(), post_id, comment_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
