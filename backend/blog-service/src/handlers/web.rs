/// Web page handlers
///
/// Each handler returns a rendered page context, a redirect, or an `AppError`
/// that the web scope's error handlers turn into a login redirect or an error
/// page. Form failures are re-rendered with the submitted input.
use crate::error::{AppError, FieldErrors, Result};
use crate::handlers::render::{
    author_view, comment_view, group_view, page_body, page_view, post_view, redirect, render,
};
use crate::middleware::Viewer;
use crate::models::PostFilter;
use crate::services::{CommentForm, Credentials, FeedScope, MediaStore, PostChanges, PostForm, SignupForm};
use crate::state::AppState;
use actix_multipart::Multipart;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Upper bound for a single multipart field
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

fn page_param(req: &HttpRequest) -> Option<String> {
    web::Query::<PageQuery>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().page)
}

/// Validation errors become field errors; anything else propagates
fn field_errors(err: AppError) -> Result<FieldErrors> {
    match err {
        AppError::Validation(errors) => Ok(errors),
        other => Err(other),
    }
}

/// Only same-site relative paths are followed after login
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n,
        _ => "/",
    }
}

fn post_url(username: &str, post_id: i64) -> String {
    format!("/{}/{}/", username, post_id)
}

fn form_view(form: &PostForm) -> Value {
    json!({ "text": form.text, "group": form.group })
}

// =====================================================================
// Post submissions (urlencoded or multipart)
// =====================================================================

struct Upload {
    filename: Option<String>,
    bytes: Vec<u8>,
}

struct PostSubmission {
    form: PostForm,
    image: Option<Upload>,
}

impl PostSubmission {
    async fn read(req: &HttpRequest, payload: web::Payload) -> Result<Self> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let mut payload = payload.into_inner();
            let form = web::Form::<PostForm>::from_request(req, &mut payload)
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            return Ok(Self {
                form: form.into_inner(),
                image: None,
            });
        }

        let mut multipart = Multipart::new(req.headers(), payload);
        let mut text = String::new();
        let mut group = None;
        let mut image = None;

        while let Some(mut field) = multipart
            .try_next()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field
                .content_disposition()
                .and_then(|cd| cd.get_filename())
                .map(str::to_string);

            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .try_next()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?
            {
                if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                    return Err(AppError::BadRequest(format!(
                        "field '{}' exceeds {} bytes",
                        name, MAX_UPLOAD_BYTES
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }

            match name.as_str() {
                "text" => text = String::from_utf8_lossy(&bytes).into_owned(),
                "group" => {
                    let raw = String::from_utf8_lossy(&bytes);
                    let raw = raw.trim();
                    group = if raw.is_empty() {
                        None
                    } else {
                        Some(raw.parse::<i64>().map_err(|_| {
                            AppError::BadRequest(format!("invalid group '{}'", raw))
                        })?)
                    };
                }
                // Browsers send an empty part when no file was chosen
                "image" if bytes.is_empty() && filename.as_deref().unwrap_or("").is_empty() => {}
                "image" => image = Some(Upload { filename, bytes }),
                other => debug!(field = other, "ignoring unknown form field"),
            }
        }

        Ok(Self {
            form: PostForm::new(text, group),
            image,
        })
    }

    /// Validate form fields and the image together so every problem is reported
    async fn validate(&self, state: &AppState) -> Result<FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Err(e) = state.posts.validate_form(self.form.clone()).await {
            errors.extend(field_errors(e)?);
        }
        if let Some(upload) = &self.image {
            if let Err(e) = MediaStore::validate_image(&upload.bytes) {
                errors.extend(field_errors(e)?);
            }
        }
        Ok(errors)
    }

    async fn store_image(&self, state: &AppState) -> Result<Option<String>> {
        match &self.image {
            Some(upload) => state
                .media
                .save_image(upload.filename.as_deref(), &upload.bytes)
                .await
                .map(Some),
            None => Ok(None),
        }
    }
}

async fn discard_image(state: &AppState, path: Option<&str>) {
    if let Some(path) = path {
        state.media.remove(path).await;
    }
}

async fn post_form_page(
    state: &AppState,
    form: Value,
    errors: &FieldErrors,
    rename: &str,
    post: Option<Value>,
) -> Result<HttpResponse> {
    let groups: Vec<Value> = state.groups.list().await?.iter().map(group_view).collect();
    Ok(render(
        "posts/new_post.html",
        json!({
            "form": form,
            "errors": errors,
            "groups": groups,
            "rename": rename,
            "post": post,
        }),
    ))
}

// =====================================================================
// Feeds
// =====================================================================

/// Global feed; the rendered page body is cached per page parameter
pub async fn index(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse> {
    let page = page_param(&req);
    let key = page.clone().unwrap_or_else(|| "1".to_string());

    if let Some(body) = state.page_cache.get(&key).await {
        return Ok(HttpResponse::Ok()
            .content_type("application/json")
            .body(body));
    }

    let feed = state
        .feed
        .build_feed(FeedScope::Global, None, page.as_deref())
        .await?;
    let body = serde_json::to_string(&page_body(
        "misc/index.html",
        json!({ "page": page_view(&feed.page) }),
    ))?;
    state.page_cache.put(&key, &body).await;

    Ok(HttpResponse::Ok()
        .content_type("application/json")
        .body(body))
}

pub async fn group_posts(
    req: HttpRequest,
    state: web::Data<AppState>,
    viewer: Viewer,
    slug: web::Path<String>,
) -> Result<HttpResponse> {
    let feed = state
        .feed
        .build_feed(
            FeedScope::Group(slug.into_inner()),
            viewer.user(),
            page_param(&req).as_deref(),
        )
        .await?;

    Ok(render(
        "posts/group.html",
        json!({
            "group": feed.group.as_ref().map(group_view),
            "page": page_view(&feed.page),
        }),
    ))
}

pub async fn follow_index(
    req: HttpRequest,
    state: web::Data<AppState>,
    viewer: Viewer,
) -> Result<HttpResponse> {
    let user = viewer.require()?;
    let feed = state
        .feed
        .build_feed(FeedScope::Following, Some(user), page_param(&req).as_deref())
        .await?;

    Ok(render(
        "posts/follow.html",
        json!({ "page": page_view(&feed.page) }),
    ))
}

pub async fn profile(
    req: HttpRequest,
    state: web::Data<AppState>,
    viewer: Viewer,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let feed = state
        .feed
        .build_feed(
            FeedScope::Profile(username.into_inner()),
            viewer.user(),
            page_param(&req).as_deref(),
        )
        .await?;

    let author = feed
        .author
        .as_ref()
        .ok_or_else(|| AppError::Internal("profile feed without author".to_string()))?;
    let following = match viewer.user() {
        Some(user) => state.follows.is_following(user.id, author.id).await?,
        None => false,
    };

    Ok(render(
        "posts/profile.html",
        json!({
            "author": author_view(author),
            "page": page_view(&feed.page),
            "post_count": feed.post_count,
            "following": following,
        }),
    ))
}

// =====================================================================
// Posts
// =====================================================================

pub async fn post_detail(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse> {
    let (username, post_id) = path.into_inner();
    let post = state.posts.get_for_author(&username, post_id).await?;
    let author = state
        .store
        .find_author(post.author_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("author '{}'", username)))?;
    let comments = state.comments.list(post.id).await?;
    let post_count = state
        .store
        .count_posts(PostFilter::Author(author.id))
        .await?;

    Ok(render(
        "posts/post.html",
        json!({
            "post": post_view(&post),
            "author": author_view(&author),
            "post_count": post_count,
            "comments": comments.iter().map(comment_view).collect::<Vec<_>>(),
            "form": { "text": "" },
        }),
    ))
}

pub async fn new_post_form(state: web::Data<AppState>, viewer: Viewer) -> Result<HttpResponse> {
    viewer.require()?;
    post_form_page(&state, form_view(&PostForm::default()), &FieldErrors::new(), "add", None).await
}

pub async fn new_post(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
    viewer: Viewer,
) -> Result<HttpResponse> {
    let user = viewer.require()?;
    let submission = PostSubmission::read(&req, payload).await?;

    let errors = submission.validate(&state).await?;
    if !errors.is_empty() {
        return post_form_page(&state, form_view(&submission.form), &errors, "add", None).await;
    }

    let image = submission.store_image(&state).await?;
    let post = match state.posts.create(Some(user), submission.form, image.clone()).await {
        Ok(post) => post,
        Err(e) => {
            discard_image(&state, image.as_deref()).await;
            return Err(e);
        }
    };
    info!(post_id = post.id, author = %user.username, "post published from web form");

    Ok(redirect("/"))
}

pub async fn post_edit_form(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse> {
    let user = viewer.require()?;
    let (username, post_id) = path.into_inner();
    if user.username != username {
        return Ok(redirect(&post_url(&username, post_id)));
    }

    let post = state.posts.get_for_author(&username, post_id).await?;
    let form = PostForm::new(post.text.clone(), post.group_id);
    post_form_page(
        &state,
        form_view(&form),
        &FieldErrors::new(),
        "edit",
        Some(post_view(&post)),
    )
    .await
}

pub async fn post_edit(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse> {
    let user = viewer.require()?;
    let (username, post_id) = path.into_inner();
    if user.username != username {
        return Ok(redirect(&post_url(&username, post_id)));
    }

    let post = state.posts.get_for_author(&username, post_id).await?;
    let submission = PostSubmission::read(&req, payload).await?;

    let errors = submission.validate(&state).await?;
    if !errors.is_empty() {
        return post_form_page(
            &state,
            form_view(&submission.form),
            &errors,
            "edit",
            Some(post_view(&post)),
        )
        .await;
    }

    let image = submission.store_image(&state).await?;
    let mut changes = PostChanges::from(submission.form);
    if image.is_some() {
        changes.image = Some(image.clone());
    }

    match state.posts.update(Some(user), post.id, changes).await {
        Ok(updated) => {
            if updated.image != post.image {
                discard_image(&state, post.image.as_deref()).await;
            }
        }
        Err(e) => {
            discard_image(&state, image.as_deref()).await;
            return Err(e);
        }
    }

    Ok(redirect(&post_url(&username, post_id)))
}

pub async fn add_comment(
    state: web::Data<AppState>,
    viewer: Viewer,
    path: web::Path<(String, i64)>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse> {
    let user = viewer.require()?;
    let (username, post_id) = path.into_inner();
    let post = state.posts.get_for_author(&username, post_id).await?;
    let form = form.into_inner();

    match state.comments.create(Some(user), post.id, form.clone()).await {
        Ok(_) => Ok(redirect(&post_url(&username, post_id))),
        Err(e) => {
            let errors = field_errors(e)?;
            let comments = state.comments.list(post.id).await?;
            Ok(render(
                "posts/comments.html",
                json!({
                    "post": post_view(&post),
                    "comments": comments.iter().map(comment_view).collect::<Vec<_>>(),
                    "form": { "text": form.text },
                    "errors": errors,
                }),
            ))
        }
    }
}

// =====================================================================
// Following
// =====================================================================

pub async fn profile_follow(
    state: web::Data<AppState>,
    viewer: Viewer,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let user = viewer.require()?;
    let username = username.into_inner();
    state.follows.follow(user, &username).await?;
    Ok(redirect(&format!("/{}/", username)))
}

pub async fn profile_unfollow(
    state: web::Data<AppState>,
    viewer: Viewer,
    username: web::Path<String>,
) -> Result<HttpResponse> {
    let user = viewer.require()?;
    let username = username.into_inner();
    state.follows.unfollow(user, &username).await?;
    Ok(redirect(&format!("/{}/", username)))
}

// =====================================================================
// Accounts
// =====================================================================

fn signup_view(form: &SignupForm) -> Value {
    json!({
        "username": form.username,
        "email": form.email,
        "first_name": form.first_name,
        "last_name": form.last_name,
    })
}

pub async fn signup_form() -> HttpResponse {
    render(
        "users/signup.html",
        json!({ "form": signup_view(&SignupForm::default()), "errors": {} }),
    )
}

pub async fn signup(
    state: web::Data<AppState>,
    form: web::Form<SignupForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    match state.accounts.signup(form.clone()).await {
        Ok(_) => Ok(redirect("/auth/login/")),
        Err(e) => Ok(render(
            "users/signup.html",
            json!({ "form": signup_view(&form), "errors": field_errors(e)? }),
        )),
    }
}

pub async fn login_form(query: web::Query<NextQuery>) -> HttpResponse {
    render(
        "users/login.html",
        json!({ "form": { "username": "" }, "next": query.next, "errors": {} }),
    )
}

pub async fn login(
    state: web::Data<AppState>,
    query: web::Query<NextQuery>,
    form: web::Form<LoginForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    let next = form.next.clone().or_else(|| query.into_inner().next);
    let credentials = Credentials {
        username: form.username.clone(),
        password: form.password,
    };

    let author = match state.accounts.authenticate(&credentials).await {
        Ok(author) => author,
        Err(AppError::Unauthorized(_)) => {
            let errors = FieldErrors::single(
                "__all__",
                "Please enter a correct username and password. Note that both fields may be case-sensitive.",
            );
            return Ok(render(
                "users/login.html",
                json!({ "form": { "username": form.username }, "next": next, "errors": errors }),
            ));
        }
        Err(e) => return Err(e),
    };

    let token = state.accounts.session_token(&author)?;
    let cookie = Cookie::build(state.session_cookie.clone(), token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies)
        .max_age(CookieDuration::seconds(state.issuer.access_ttl_secs()))
        .finish();

    info!(author_id = author.id, "session started");
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, safe_next(next.as_deref())))
        .cookie(cookie)
        .finish())
}

pub async fn logout(state: web::Data<AppState>) -> HttpResponse {
    let mut cookie = Cookie::build(state.session_cookie.clone(), "")
        .path("/")
        .finish();
    cookie.make_removal();

    HttpResponse::Ok()
        .cookie(cookie)
        .json(page_body("users/logged_out.html", json!({})))
}

// =====================================================================
// Static pages
// =====================================================================

pub async fn about_author() -> HttpResponse {
    render("about/author.html", json!({}))
}

pub async fn about_tech() -> HttpResponse {
    render("about/tech.html", json!({}))
}

/// Fallback for unmatched web paths
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse> {
    Err(AppError::NotFound(req.path().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next_only_follows_relative_paths() {
        assert_eq!(safe_next(Some("/new/")), "/new/");
        assert_eq!(safe_next(Some("//evil.example/")), "/");
        assert_eq!(safe_next(Some("https://evil.example/")), "/");
        assert_eq!(safe_next(None), "/");
    }

    #[test]
    fn test_field_errors_passes_other_errors_through() {
        let errors = field_errors(AppError::Validation(FieldErrors::single("text", "x"))).unwrap();
        assert!(errors.get("text").is_some());
        assert!(matches!(
            field_errors(AppError::NotFound("post".into())),
            Err(AppError::NotFound(_))
        ));
    }
}
