/// Shared application state handed to every handler through `web::Data`
use crate::cache::PageCache;
use crate::config::Config;
use crate::db::EntityStore;
use crate::services::{
    AccountService, CommentService, FeedService, FollowService, GroupService, MediaStore,
    PostService,
};
use crypto_core::TokenIssuer;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub page_cache: PageCache,
    pub issuer: Arc<TokenIssuer>,
    pub media: MediaStore,
    pub feed: FeedService,
    pub posts: PostService,
    pub comments: CommentService,
    pub groups: GroupService,
    pub follows: FollowService,
    pub accounts: AccountService,
    pub session_cookie: String,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn EntityStore>,
        page_cache: PageCache,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            feed: FeedService::new(store.clone(), config.feed.page_size),
            posts: PostService::new(store.clone()),
            comments: CommentService::new(store.clone()),
            groups: GroupService::new(store.clone()),
            follows: FollowService::new(store.clone()),
            accounts: AccountService::new(store.clone(), issuer.clone()),
            media: MediaStore::new(&config.app.media_root),
            session_cookie: config.auth.session_cookie_name.clone(),
            secure_cookies: config.app.is_production(),
            store,
            page_cache,
            issuer,
        }
    }
}
