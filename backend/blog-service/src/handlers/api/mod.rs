/// JSON API handlers mounted under `/api/v1`
///
/// Response bodies use the public field names (`author` as username,
/// `pub_date`, `group` as id) rather than the storage model.
pub mod comments;
pub mod follow;
pub mod groups;
pub mod jwt;
pub mod posts;

use crate::models::{Comment, Follow, Group, Post};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub text: String,
    pub author: String,
    pub pub_date: DateTime<Utc>,
    pub group: Option<i64>,
    pub image: Option<String>,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            text: post.text,
            author: post.author,
            pub_date: post.created_at,
            group: post.group_id,
            image: post.image,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub author: String,
    pub post: i64,
    pub text: Option<String>,
    pub created: DateTime<Utc>,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            author: comment.author,
            post: comment.post_id,
            text: comment.text,
            created: comment.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            title: group.title,
            slug: group.slug,
            description: group.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub id: i64,
    pub user: String,
    pub author: String,
}

impl From<Follow> for FollowResponse {
    fn from(follow: Follow) -> Self {
        Self {
            id: follow.id,
            user: follow.user,
            author: follow.author,
        }
    }
}

/// Convert a list of models into response bodies
pub(crate) fn responses<M, R: From<M>>(items: Vec<M>) -> Vec<R> {
    items.into_iter().map(R::from).collect()
}
