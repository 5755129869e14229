/// Business logic layer for blog-service
///
/// Services are stateless wrappers around the shared entity store; viewer
/// identity is passed into every call explicitly.
pub mod accounts;
pub mod comments;
pub mod feed;
pub mod follow;
pub mod groups;
pub mod media;
pub mod pagination;
pub mod posts;

pub use accounts::{AccountService, Credentials, SignupForm};
pub use comments::{CommentForm, CommentService};
pub use feed::{Feed, FeedScope, FeedService};
pub use follow::{FollowInput, FollowService};
pub use groups::{GroupForm, GroupService};
pub use media::MediaStore;
pub use pagination::{Page, Paginator};
pub use posts::{PostChanges, PostForm, PostService};
