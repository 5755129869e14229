/// Page rendering for the web surface
///
/// Pages are JSON documents of the form `{"template": name, "context": {...}}`.
/// Error pages and login redirects are produced by `error_handlers`, which
/// wraps the web scope and rewrites 401/404/500 responses.
use crate::models::{Author, Comment, Group, Post};
use crate::services::Page;
use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::middleware::{ErrorHandlerResponse, ErrorHandlers};
use actix_web::{HttpRequest, HttpResponse};
use serde_json::{json, Value};

pub fn render(template: &str, context: Value) -> HttpResponse {
    render_status(StatusCode::OK, template, context)
}

pub fn render_status(status: StatusCode, template: &str, context: Value) -> HttpResponse {
    HttpResponse::build(status).json(page_body(template, context))
}

pub fn page_body(template: &str, context: Value) -> Value {
    json!({ "template": template, "context": context })
}

pub fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Login page URL that returns to `next` afterwards
pub fn login_url(next: &str) -> String {
    format!(
        "/auth/login/?next={}",
        urlencoding::encode(next).replace("%2F", "/")
    )
}

/// Path plus query string, as the login redirect should restore it
pub fn full_path(req: &HttpRequest) -> String {
    req.uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.path().to_string())
}

pub fn post_view(post: &Post) -> Value {
    json!({
        "id": post.id,
        "text": post.text,
        "display": post.to_string(),
        "author": post.author,
        "pub_date": post.created_at,
        "group": post.group_id,
        "image": post.image,
    })
}

pub fn comment_view(comment: &Comment) -> Value {
    json!({
        "id": comment.id,
        "post": comment.post_id,
        "author": comment.author,
        "text": comment.text,
        "created": comment.created_at,
    })
}

pub fn author_view(author: &Author) -> Value {
    json!({
        "id": author.id,
        "username": author.username,
        "date_joined": author.date_joined,
    })
}

pub fn group_view(group: &Group) -> Value {
    json!({
        "id": group.id,
        "title": group.title,
        "slug": group.slug,
        "description": group.description,
    })
}

pub fn page_view(page: &Page<Post>) -> Value {
    json!({
        "object_list": page.object_list.iter().map(post_view).collect::<Vec<_>>(),
        "number": page.number,
        "num_pages": page.num_pages,
        "count": page.count,
        "has_next": page.has_next,
        "has_previous": page.has_previous,
        "next_page_number": page.next_page_number,
        "previous_page_number": page.previous_page_number,
    })
}

fn replace<B>(
    res: ServiceResponse<B>,
    build: impl FnOnce(&HttpRequest) -> HttpResponse,
) -> actix_web::Result<ErrorHandlerResponse<B>> {
    let (req, _) = res.into_parts();
    let response = build(&req);
    Ok(ErrorHandlerResponse::Response(
        ServiceResponse::new(req, response).map_into_right_body(),
    ))
}

fn to_login<B>(res: ServiceResponse<B>) -> actix_web::Result<ErrorHandlerResponse<B>> {
    replace(res, |req| redirect(&login_url(&full_path(req))))
}

fn not_found_page<B>(res: ServiceResponse<B>) -> actix_web::Result<ErrorHandlerResponse<B>> {
    replace(res, |req| {
        render_status(
            StatusCode::NOT_FOUND,
            "misc/404.html",
            json!({ "path": req.path() }),
        )
    })
}

fn server_error_page<B>(res: ServiceResponse<B>) -> actix_web::Result<ErrorHandlerResponse<B>> {
    replace(res, |_| {
        render_status(StatusCode::INTERNAL_SERVER_ERROR, "misc/500.html", json!({}))
    })
}

/// Error rewriting for the web scope
pub fn error_handlers<B: 'static>() -> ErrorHandlers<B> {
    ErrorHandlers::new()
        .handler(StatusCode::UNAUTHORIZED, to_login)
        .handler(StatusCode::NOT_FOUND, not_found_page)
        .handler(StatusCode::INTERNAL_SERVER_ERROR, server_error_page)
}
