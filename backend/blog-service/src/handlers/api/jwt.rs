/// Token endpoints: obtain a pair, refresh an access token, verify a token
use crate::error::{AppError, FieldErrors, Result};
use crate::services::Credentials;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: Option<String>,
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(FieldErrors::single(field, "This field is required.")))
}

pub async fn create_token(
    state: web::Data<AppState>,
    req: web::Json<Credentials>,
) -> Result<HttpResponse> {
    let pair = state.accounts.obtain_pair(&req).await?;
    Ok(HttpResponse::Ok().json(json!({
        "access": pair.access,
        "refresh": pair.refresh,
    })))
}

pub async fn refresh_token(
    state: web::Data<AppState>,
    req: web::Json<RefreshRequest>,
) -> Result<HttpResponse> {
    let refresh = required("refresh", req.into_inner().refresh)?;
    let access = state.accounts.refresh(&refresh).await?;
    Ok(HttpResponse::Ok().json(json!({ "access": access })))
}

pub async fn verify_token(
    state: web::Data<AppState>,
    req: web::Json<VerifyRequest>,
) -> Result<HttpResponse> {
    let token = required("token", req.into_inner().token)?;
    state.accounts.verify(&token)?;
    Ok(HttpResponse::Ok().json(json!({})))
}
