/// Entity storage for authors, groups, posts, comments and follow edges
///
/// `EntityStore` is implemented by `PostgresStore` (production) and
/// `MemoryStore` (tests, local runs). Both enforce the same constraints:
/// unique usernames, unique group slugs, one follow edge per ordered pair,
/// cascading deletes from authors and posts, and `group = NULL` on posts of a
/// deleted group.
pub mod memory;
pub mod pool;
pub mod postgres;

pub use memory::MemoryStore;
pub use pool::{create_pool, run_migrations, MIGRATOR};
pub use postgres::PostgresStore;

use crate::error::Result;
use crate::models::{
    Author, Comment, Follow, Group, NewAuthor, NewComment, NewGroup, NewPost, Post, PostFilter,
    PostUpdate,
};

#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Verify the backing store is reachable
    async fn ping(&self) -> Result<()>;

    // Authors

    /// Fails with `Conflict` if the username is taken
    async fn create_author(&self, new: NewAuthor) -> Result<Author>;

    async fn find_author(&self, id: i64) -> Result<Option<Author>>;

    async fn find_author_by_username(&self, username: &str) -> Result<Option<Author>>;

    /// Removes the author with their posts, comments and follow edges
    async fn delete_author(&self, id: i64) -> Result<bool>;

    // Groups

    /// Fails with `Conflict` if the slug is taken
    async fn create_group(&self, new: NewGroup) -> Result<Group>;

    async fn find_group(&self, id: i64) -> Result<Option<Group>>;

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<Group>>;

    async fn list_groups(&self) -> Result<Vec<Group>>;

    /// Removes the group; its posts keep existing with no group
    async fn delete_group(&self, id: i64) -> Result<bool>;

    // Posts

    async fn insert_post(&self, new: NewPost) -> Result<Post>;

    async fn find_post(&self, id: i64) -> Result<Option<Post>>;

    async fn update_post(&self, id: i64, update: PostUpdate) -> Result<Option<Post>>;

    /// Removes the post and its comments
    async fn delete_post(&self, id: i64) -> Result<bool>;

    async fn count_posts(&self, filter: PostFilter) -> Result<i64>;

    /// Posts ordered newest first, ties broken by id descending
    async fn list_posts(&self, filter: PostFilter, limit: i64, offset: i64) -> Result<Vec<Post>>;

    // Comments

    async fn insert_comment(&self, new: NewComment) -> Result<Comment>;

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>>;

    async fn update_comment(&self, id: i64, text: Option<String>) -> Result<Option<Comment>>;

    async fn delete_comment(&self, id: i64) -> Result<bool>;

    /// Comments of a post, newest first
    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>>;

    // Follow edges

    /// Returns `None` when the edge already exists
    async fn insert_follow(&self, user_id: i64, author_id: i64) -> Result<Option<Follow>>;

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool>;

    async fn delete_follow_by_id(&self, id: i64) -> Result<bool>;

    async fn follow_exists(&self, user_id: i64, author_id: i64) -> Result<bool>;

    async fn find_follow(&self, id: i64) -> Result<Option<Follow>>;

    /// Edges where `user_id` is the follower, optionally narrowed to followed
    /// usernames containing `search` (case-insensitive)
    async fn list_follows(&self, user_id: i64, search: Option<&str>) -> Result<Vec<Follow>>;
}
