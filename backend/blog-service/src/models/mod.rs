/// Data models for blog-service
///
/// This module defines structures for:
/// - Author: registered account that writes posts and comments
/// - Group: topic a post can be filed under
/// - Post: a text entry with an optional group and image
/// - Comment: a reply attached to a post
/// - Follow: directed subscription edge between two authors
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Number of characters shown when a post is displayed in short form
pub const POST_DISPLAY_CHARS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Author {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub date_joined: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title)
    }
}

/// A post joined with its author's username
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author_id: i64,
    /// Author username
    pub author: String,
    pub group_id: Option<i64>,
    /// Stored image path relative to the media root
    pub image: Option<String>,
}

impl Post {
    /// Short display form: the first 15 characters of the text
    pub fn display_text(&self) -> String {
        self.text.chars().take(POST_DISPLAY_CHARS).collect()
    }
}

impl std::fmt::Display for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub author: String,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Follow {
    pub id: i64,
    /// Follower
    pub user_id: i64,
    pub user: String,
    /// Followed author
    pub author_id: i64,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct NewAuthor {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

/// Full replacement of a post's mutable fields
#[derive(Debug, Clone)]
pub struct PostUpdate {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: i64,
    pub text: Option<String>,
}

/// Row selection for post listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Group(i64),
    Author(i64),
    /// Posts by every author the given author follows
    FollowedBy(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str) -> Post {
        Post {
            id: 1,
            text: text.to_string(),
            created_at: Utc::now(),
            author_id: 1,
            author: "leo".to_string(),
            group_id: None,
            image: None,
        }
    }

    #[test]
    fn test_long_text_is_truncated_to_15_chars() {
        let p = post("The quick brown fox jumps over the lazy dog");
        assert_eq!(p.to_string(), "The quick brown");
        assert_eq!(p.display_text().chars().count(), 15);
    }

    #[test]
    fn test_short_text_displays_whole() {
        assert_eq!(post("hello").to_string(), "hello");
        assert_eq!(post("").to_string(), "");
    }

    #[test]
    fn test_display_counts_characters_not_bytes() {
        let p = post("Привет, как у тебя дела сегодня?");
        assert_eq!(p.to_string(), "Привет, как у т");
    }

    #[test]
    fn test_group_displays_title() {
        let group = Group {
            id: 3,
            title: "Rustaceans".to_string(),
            slug: "rust".to_string(),
            description: String::new(),
        };
        assert_eq!(group.to_string(), "Rustaceans");
    }

    #[test]
    fn test_author_hash_not_serialized() {
        let author = Author {
            id: 1,
            username: "leo".to_string(),
            email: None,
            password_hash: "$argon2id$secret".to_string(),
            date_joined: Utc::now(),
        };
        let json = serde_json::to_value(&author).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["username"], "leo");
    }
}
