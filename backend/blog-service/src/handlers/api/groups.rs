/// Read-only group endpoints
use super::{responses, GroupResponse};
use crate::error::Result;
use crate::state::AppState;
use actix_web::{web, HttpResponse};

pub async fn list_groups(state: web::Data<AppState>) -> Result<HttpResponse> {
    let groups = state.groups.list().await?;
    Ok(HttpResponse::Ok().json(responses::<_, GroupResponse>(groups)))
}

pub async fn get_group(state: web::Data<AppState>, group_id: web::Path<i64>) -> Result<HttpResponse> {
    let group = state.groups.get(group_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(GroupResponse::from(group)))
}
