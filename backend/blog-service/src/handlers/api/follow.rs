/// Follow edges of the authenticated viewer
use super::{responses, FollowResponse};
use crate::error::Result;
use crate::middleware::AuthUser;
use crate::services::FollowInput;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct FollowSearch {
    /// Case-insensitive substring of the followed author's username
    pub search: Option<String>,
}

pub async fn list_follows(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<FollowSearch>,
) -> Result<HttpResponse> {
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let follows = state.follows.following_of(&user, search).await?;
    Ok(HttpResponse::Ok().json(responses::<_, FollowResponse>(follows)))
}

pub async fn create_follow(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<FollowInput>,
) -> Result<HttpResponse> {
    let follow = state.follows.create_edge(&user, req.into_inner()).await?;
    Ok(HttpResponse::Created().json(FollowResponse::from(follow)))
}

pub async fn get_follow(
    state: web::Data<AppState>,
    user: AuthUser,
    follow_id: web::Path<i64>,
) -> Result<HttpResponse> {
    let follow = state.follows.get_edge(&user, follow_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(FollowResponse::from(follow)))
}

pub async fn delete_follow(
    state: web::Data<AppState>,
    user: AuthUser,
    follow_id: web::Path<i64>,
) -> Result<HttpResponse> {
    state.follows.remove_edge(&user, follow_id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
