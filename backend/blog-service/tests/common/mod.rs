//! Shared fixtures for the HTTP integration tests.
//!
//! Every test builds its own in-memory state so tests never share data.

#![allow(dead_code)]

use actix_web::cookie::Cookie;
use blog_service::db::EntityStore;
use blog_service::middleware::AuthUser;
use blog_service::models::{Author, Group, NewGroup, Post};
use blog_service::services::{PostForm, SignupForm};
use blog_service::{AppState, Config};
use std::path::Path;

pub const PASSWORD: &str = "correct-horse-battery";

/// 2x1 GIF
pub const SMALL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00, 0x00, 0x00,
    0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];

pub fn build_state(media_root: &Path) -> AppState {
    let mut config = Config::for_memory();
    config.app.media_root = media_root.to_string_lossy().into_owned();
    blog_service::memory_state(&config).expect("memory state")
}

pub async fn signup(state: &AppState, username: &str) -> Author {
    state
        .accounts
        .signup(SignupForm {
            username: username.to_string(),
            password1: PASSWORD.to_string(),
            password2: PASSWORD.to_string(),
            ..Default::default()
        })
        .await
        .expect("signup")
}

pub fn as_user(author: &Author) -> AuthUser {
    AuthUser {
        id: author.id,
        username: author.username.clone(),
    }
}

pub async fn publish(state: &AppState, author: &Author, text: &str, group: Option<i64>) -> Post {
    state
        .posts
        .create(Some(&as_user(author)), PostForm::new(text, group), None)
        .await
        .expect("create post")
}

pub async fn group(state: &AppState, title: &str, slug: &str) -> Group {
    state
        .store
        .create_group(NewGroup {
            title: title.to_string(),
            slug: slug.to_string(),
            description: String::new(),
        })
        .await
        .expect("create group")
}

/// Session cookie as the login view would set it
pub fn session(state: &AppState, author: &Author) -> Cookie<'static> {
    let token = state.accounts.session_token(author).expect("session token");
    Cookie::new(state.session_cookie.clone(), token)
}

pub fn bearer(state: &AppState, author: &Author) -> (&'static str, String) {
    let pair = state
        .issuer
        .issue_pair(author.id, &author.username)
        .expect("token pair");
    ("Authorization", format!("Bearer {}", pair.access))
}

/// Build a test service with the full route table
macro_rules! test_app {
    ($state:expr) => {{
        let data = actix_web::web::Data::new($state.clone());
        actix_web::test::init_service(
            actix_web::App::new()
                .configure(move |cfg| blog_service::routes::configure(cfg, data)),
        )
        .await
    }};
}
