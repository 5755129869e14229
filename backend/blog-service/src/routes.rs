/// Route table
///
/// Registration order matters: operational routes first, then the `/api/v1`
/// scope, then the catch-all web scope whose `/{username}/` routes come last.
use crate::error::{AppError, Result};
use crate::handlers::{self, api, render};
use crate::metrics::serve_metrics;
use crate::middleware::IdentityMiddleware;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};

async fn api_not_found(req: HttpRequest) -> Result<HttpResponse> {
    Err(AppError::NotFound(format!("no route for {}", req.path())))
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into())
}

fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/jwt/create/").route(web::post().to(api::jwt::create_token)))
        .service(web::resource("/jwt/refresh/").route(web::post().to(api::jwt::refresh_token)))
        .service(web::resource("/jwt/verify/").route(web::post().to(api::jwt::verify_token)))
        .service(
            web::resource("/posts/")
                .route(web::get().to(api::posts::list_posts))
                .route(web::post().to(api::posts::create_post)),
        )
        .service(
            web::resource("/posts/{post_id}/")
                .route(web::get().to(api::posts::get_post))
                .route(web::put().to(api::posts::replace_post))
                .route(web::patch().to(api::posts::patch_post))
                .route(web::delete().to(api::posts::delete_post)),
        )
        .service(
            web::resource("/posts/{post_id}/comments/")
                .route(web::get().to(api::comments::list_comments))
                .route(web::post().to(api::comments::create_comment)),
        )
        .service(
            web::resource("/posts/{post_id}/comments/{comment_id}/")
                .route(web::get().to(api::comments::get_comment))
                .route(web::put().to(api::comments::update_comment))
                .route(web::patch().to(api::comments::update_comment))
                .route(web::delete().to(api::comments::delete_comment)),
        )
        .service(web::resource("/groups/").route(web::get().to(api::groups::list_groups)))
        .service(web::resource("/groups/{group_id}/").route(web::get().to(api::groups::get_group)))
        .service(
            web::resource("/follow/")
                .route(web::get().to(api::follow::list_follows))
                .route(web::post().to(api::follow::create_follow)),
        )
        .service(
            web::resource("/follow/{follow_id}/")
                .route(web::get().to(api::follow::get_follow))
                .route(web::delete().to(api::follow::delete_follow)),
        );
}

fn web_routes(cfg: &mut web::ServiceConfig) {
    use handlers::web as pages;

    cfg.service(web::resource("/").route(web::get().to(pages::index)))
        .service(web::resource("/group/{slug}/").route(web::get().to(pages::group_posts)))
        .service(
            web::resource("/new/")
                .route(web::get().to(pages::new_post_form))
                .route(web::post().to(pages::new_post)),
        )
        .service(web::resource("/follow/").route(web::get().to(pages::follow_index)))
        .service(
            web::resource("/auth/signup/")
                .route(web::get().to(pages::signup_form))
                .route(web::post().to(pages::signup)),
        )
        .service(
            web::resource("/auth/login/")
                .route(web::get().to(pages::login_form))
                .route(web::post().to(pages::login)),
        )
        .service(web::resource("/auth/logout/").route(web::get().to(pages::logout)))
        .service(web::resource("/about/author/").route(web::get().to(pages::about_author)))
        .service(web::resource("/about/tech/").route(web::get().to(pages::about_tech)))
        .service(web::resource("/{username}/follow/").route(web::get().to(pages::profile_follow)))
        .service(
            web::resource("/{username}/unfollow/").route(web::get().to(pages::profile_unfollow)),
        )
        .service(
            web::resource("/{username}/{post_id:\\d+}/edit/")
                .route(web::get().to(pages::post_edit_form))
                .route(web::post().to(pages::post_edit)),
        )
        .service(
            web::resource("/{username}/{post_id:\\d+}/comment/")
                .route(web::post().to(pages::add_comment)),
        )
        .service(
            web::resource("/{username}/{post_id:\\d+}/").route(web::get().to(pages::post_detail)),
        )
        .service(web::resource("/{username}/").route(web::get().to(pages::profile)));
}

/// Register every route on an app sharing `state`
pub fn configure(cfg: &mut web::ServiceConfig, state: web::Data<AppState>) {
    let issuer = state.issuer.clone();
    let store = state.store.clone();
    let session_cookie = state.session_cookie.clone();

    cfg.app_data(state)
        .app_data(json_config())
        .route("/metrics", web::get().to(serve_metrics))
        .route("/health", web::get().to(handlers::health_summary))
        .route("/health/ready", web::get().to(handlers::readiness_summary))
        .route("/health/live", web::get().to(handlers::liveness_check))
        .service(
            web::scope("/api/v1")
                .wrap(IdentityMiddleware::bearer(issuer.clone(), store.clone()))
                .configure(api_routes)
                .default_service(web::to(api_not_found)),
        )
        .service(
            web::scope("")
                .wrap(render::error_handlers())
                .wrap(IdentityMiddleware::session(issuer, store, session_cookie))
                .configure(web_routes)
                .default_service(web::to(handlers::web::not_found)),
        );
}
