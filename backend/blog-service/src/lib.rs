/// Blog Service Library
///
/// A blogging platform: authors publish posts (optionally filed under a group
/// and carrying an image), comment on posts and follow other authors. The same
/// domain is served as browser pages and as a token-authenticated JSON API.
///
/// # Modules
///
/// - `handlers`: web page, JSON API and health handlers
/// - `routes`: route table shared by the binary and the HTTP tests
/// - `models`: authors, groups, posts, comments and follow edges
/// - `services`: feeds, permissions-checked mutations, accounts and media
/// - `db`: the entity store trait with PostgreSQL and in-memory backends
/// - `cache`: global feed page cache
/// - `middleware`: viewer identity, permission predicates and HTTP metrics
/// - `error`: error types and handling
/// - `config`: configuration management
/// - `metrics`: Prometheus collectors
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;

use cache::PageCache;
use crypto_core::TokenIssuer;
use db::{EntityStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

/// State backed by the in-process store and page cache
pub fn memory_state(config: &Config) -> std::result::Result<AppState, crypto_core::TokenError> {
    let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
    let page_cache = PageCache::memory(Duration::from_secs(config.cache.page_ttl_secs));
    let issuer = Arc::new(TokenIssuer::new(
        &config.auth.jwt_secret,
        config.auth.access_ttl_secs,
        config.auth.refresh_ttl_secs,
    )?);
    Ok(AppState::new(config, store, page_cache, issuer))
}
