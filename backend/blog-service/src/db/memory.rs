/// In-process entity store
///
/// All tables live behind one `RwLock`, so every mutation (including the
/// cascades) happens inside a single write section.
use super::EntityStore;
use crate::error::{AppError, Result};
use crate::models::{
    Author, Comment, Follow, Group, NewAuthor, NewComment, NewGroup, NewPost, Post, PostFilter,
    PostUpdate,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct PostRow {
    id: i64,
    text: String,
    created_at: DateTime<Utc>,
    author_id: i64,
    group_id: Option<i64>,
    image: Option<String>,
}

#[derive(Debug, Clone)]
struct CommentRow {
    id: i64,
    post_id: i64,
    author_id: i64,
    text: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct FollowRow {
    id: i64,
    user_id: i64,
    author_id: i64,
}

#[derive(Debug, Default)]
struct Sequences {
    author: i64,
    group: i64,
    post: i64,
    comment: i64,
    follow: i64,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Default)]
struct Tables {
    seq: Sequences,
    authors: BTreeMap<i64, Author>,
    groups: BTreeMap<i64, Group>,
    posts: BTreeMap<i64, PostRow>,
    comments: BTreeMap<i64, CommentRow>,
    follows: BTreeMap<i64, FollowRow>,
}

impl Tables {
    fn username(&self, author_id: i64) -> String {
        self.authors
            .get(&author_id)
            .map(|a| a.username.clone())
            .unwrap_or_default()
    }

    fn require_author(&self, author_id: i64) -> Result<()> {
        if self.authors.contains_key(&author_id) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("author {}", author_id)))
        }
    }

    fn require_group(&self, group_id: Option<i64>) -> Result<()> {
        match group_id {
            Some(id) if !self.groups.contains_key(&id) => {
                Err(AppError::NotFound(format!("group {}", id)))
            }
            _ => Ok(()),
        }
    }

    fn post(&self, row: &PostRow) -> Post {
        Post {
            id: row.id,
            text: row.text.clone(),
            created_at: row.created_at,
            author_id: row.author_id,
            author: self.username(row.author_id),
            group_id: row.group_id,
            image: row.image.clone(),
        }
    }

    fn comment(&self, row: &CommentRow) -> Comment {
        Comment {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            author: self.username(row.author_id),
            text: row.text.clone(),
            created_at: row.created_at,
        }
    }

    fn follow(&self, row: &FollowRow) -> Follow {
        Follow {
            id: row.id,
            user_id: row.user_id,
            user: self.username(row.user_id),
            author_id: row.author_id,
            author: self.username(row.author_id),
        }
    }

    fn matches(&self, row: &PostRow, filter: PostFilter) -> bool {
        match filter {
            PostFilter::All => true,
            PostFilter::Group(group_id) => row.group_id == Some(group_id),
            PostFilter::Author(author_id) => row.author_id == author_id,
            PostFilter::FollowedBy(user_id) => self
                .follows
                .values()
                .any(|f| f.user_id == user_id && f.author_id == row.author_id),
        }
    }

    fn remove_post_cascade(&mut self, post_id: i64) -> bool {
        let removed = self.posts.remove(&post_id).is_some();
        if removed {
            self.comments.retain(|_, c| c.post_id != post_id);
        }
        removed
    }
}

/// Entity store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_author(&self, new: NewAuthor) -> Result<Author> {
        let mut tables = self.tables.write();
        if tables.authors.values().any(|a| a.username == new.username) {
            return Err(AppError::Conflict(format!(
                "username '{}' already exists",
                new.username
            )));
        }

        let author = Author {
            id: next(&mut tables.seq.author),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            date_joined: Utc::now(),
        };
        tables.authors.insert(author.id, author.clone());
        Ok(author)
    }

    async fn find_author(&self, id: i64) -> Result<Option<Author>> {
        Ok(self.tables.read().authors.get(&id).cloned())
    }

    async fn find_author_by_username(&self, username: &str) -> Result<Option<Author>> {
        Ok(self
            .tables
            .read()
            .authors
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn delete_author(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.authors.remove(&id).is_none() {
            return Ok(false);
        }

        let owned: Vec<i64> = tables
            .posts
            .values()
            .filter(|p| p.author_id == id)
            .map(|p| p.id)
            .collect();
        for post_id in owned {
            tables.remove_post_cascade(post_id);
        }
        tables.comments.retain(|_, c| c.author_id != id);
        tables
            .follows
            .retain(|_, f| f.user_id != id && f.author_id != id);
        Ok(true)
    }

    async fn create_group(&self, new: NewGroup) -> Result<Group> {
        let mut tables = self.tables.write();
        if tables.groups.values().any(|g| g.slug == new.slug) {
            return Err(AppError::Conflict(format!(
                "group slug '{}' already exists",
                new.slug
            )));
        }

        let group = Group {
            id: next(&mut tables.seq.group),
            title: new.title,
            slug: new.slug,
            description: new.description,
        };
        tables.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn find_group(&self, id: i64) -> Result<Option<Group>> {
        Ok(self.tables.read().groups.get(&id).cloned())
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        Ok(self
            .tables
            .read()
            .groups
            .values()
            .find(|g| g.slug == slug)
            .cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        Ok(self.tables.read().groups.values().cloned().collect())
    }

    async fn delete_group(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.groups.remove(&id).is_none() {
            return Ok(false);
        }
        for post in tables.posts.values_mut() {
            if post.group_id == Some(id) {
                post.group_id = None;
            }
        }
        Ok(true)
    }

    async fn insert_post(&self, new: NewPost) -> Result<Post> {
        let mut tables = self.tables.write();
        tables.require_author(new.author_id)?;
        tables.require_group(new.group_id)?;

        let row = PostRow {
            id: next(&mut tables.seq.post),
            text: new.text,
            created_at: Utc::now(),
            author_id: new.author_id,
            group_id: new.group_id,
            image: new.image,
        };
        let post = tables.post(&row);
        tables.posts.insert(row.id, row);
        Ok(post)
    }

    async fn find_post(&self, id: i64) -> Result<Option<Post>> {
        let tables = self.tables.read();
        Ok(tables.posts.get(&id).map(|row| tables.post(row)))
    }

    async fn update_post(&self, id: i64, update: PostUpdate) -> Result<Option<Post>> {
        let mut tables = self.tables.write();
        tables.require_group(update.group_id)?;

        let Some(row) = tables.posts.get_mut(&id) else {
            return Ok(None);
        };
        row.text = update.text;
        row.group_id = update.group_id;
        row.image = update.image;
        let row = row.clone();
        Ok(Some(tables.post(&row)))
    }

    async fn delete_post(&self, id: i64) -> Result<bool> {
        Ok(self.tables.write().remove_post_cascade(id))
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<i64> {
        let tables = self.tables.read();
        Ok(tables
            .posts
            .values()
            .filter(|row| tables.matches(row, filter))
            .count() as i64)
    }

    async fn list_posts(&self, filter: PostFilter, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let tables = self.tables.read();
        let mut rows: Vec<&PostRow> = tables
            .posts
            .values()
            .filter(|row| tables.matches(row, filter))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .map(|row| tables.post(row))
            .collect())
    }

    async fn insert_comment(&self, new: NewComment) -> Result<Comment> {
        let mut tables = self.tables.write();
        tables.require_author(new.author_id)?;
        if !tables.posts.contains_key(&new.post_id) {
            return Err(AppError::NotFound(format!("post {}", new.post_id)));
        }

        let row = CommentRow {
            id: next(&mut tables.seq.comment),
            post_id: new.post_id,
            author_id: new.author_id,
            text: new.text,
            created_at: Utc::now(),
        };
        let comment = tables.comment(&row);
        tables.comments.insert(row.id, row);
        Ok(comment)
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>> {
        let tables = self.tables.read();
        Ok(tables.comments.get(&id).map(|row| tables.comment(row)))
    }

    async fn update_comment(&self, id: i64, text: Option<String>) -> Result<Option<Comment>> {
        let mut tables = self.tables.write();
        let Some(row) = tables.comments.get_mut(&id) else {
            return Ok(None);
        };
        row.text = text;
        let row = row.clone();
        Ok(Some(tables.comment(&row)))
    }

    async fn delete_comment(&self, id: i64) -> Result<bool> {
        Ok(self.tables.write().comments.remove(&id).is_some())
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let tables = self.tables.read();
        let mut rows: Vec<&CommentRow> = tables
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows.into_iter().map(|row| tables.comment(row)).collect())
    }

    async fn insert_follow(&self, user_id: i64, author_id: i64) -> Result<Option<Follow>> {
        let mut tables = self.tables.write();
        tables.require_author(user_id)?;
        tables.require_author(author_id)?;
        if user_id == author_id {
            return Err(AppError::BadRequest("an author cannot follow themselves".into()));
        }
        if tables
            .follows
            .values()
            .any(|f| f.user_id == user_id && f.author_id == author_id)
        {
            return Ok(None);
        }

        let row = FollowRow {
            id: next(&mut tables.seq.follow),
            user_id,
            author_id,
        };
        tables.follows.insert(row.id, row);
        Ok(Some(tables.follow(&row)))
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let mut tables = self.tables.write();
        let before = tables.follows.len();
        tables
            .follows
            .retain(|_, f| !(f.user_id == user_id && f.author_id == author_id));
        Ok(tables.follows.len() < before)
    }

    async fn delete_follow_by_id(&self, id: i64) -> Result<bool> {
        Ok(self.tables.write().follows.remove(&id).is_some())
    }

    async fn follow_exists(&self, user_id: i64, author_id: i64) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .follows
            .values()
            .any(|f| f.user_id == user_id && f.author_id == author_id))
    }

    async fn find_follow(&self, id: i64) -> Result<Option<Follow>> {
        let tables = self.tables.read();
        Ok(tables.follows.get(&id).map(|row| tables.follow(row)))
    }

    async fn list_follows(&self, user_id: i64, search: Option<&str>) -> Result<Vec<Follow>> {
        let tables = self.tables.read();
        let needle = search.map(str::to_lowercase);
        Ok(tables
            .follows
            .values()
            .filter(|f| f.user_id == user_id)
            .map(|row| tables.follow(row))
            .filter(|f| match &needle {
                Some(needle) => f.author.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn author(store: &MemoryStore, username: &str) -> Author {
        store
            .create_author(NewAuthor {
                username: username.to_string(),
                email: None,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
    }

    async fn post(store: &MemoryStore, author_id: i64, text: &str, group_id: Option<i64>) -> Post {
        store
            .insert_post(NewPost {
                author_id,
                text: text.to_string(),
                group_id,
                image: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let store = MemoryStore::new();
        author(&store, "leo").await;
        let err = store
            .create_author(NewAuthor {
                username: "leo".to_string(),
                email: None,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_list_posts_newest_first_with_id_tiebreak() {
        let store = MemoryStore::new();
        let leo = author(&store, "leo").await;
        let first = post(&store, leo.id, "first", None).await;
        let second = post(&store, leo.id, "second", None).await;

        let posts = store.list_posts(PostFilter::All, 10, 0).await.unwrap();
        assert_eq!(posts[0].id, second.id);
        assert_eq!(posts[1].id, first.id);
        assert_eq!(posts[0].author, "leo");
    }

    #[tokio::test]
    async fn test_delete_group_nulls_posts() {
        let store = MemoryStore::new();
        let leo = author(&store, "leo").await;
        let group = store
            .create_group(NewGroup {
                title: "Cats".to_string(),
                slug: "cats".to_string(),
                description: String::new(),
            })
            .await
            .unwrap();
        let p = post(&store, leo.id, "meow", Some(group.id)).await;

        assert!(store.delete_group(group.id).await.unwrap());
        let p = store.find_post(p.id).await.unwrap().unwrap();
        assert_eq!(p.group_id, None);
    }

    #[tokio::test]
    async fn test_delete_author_cascades() {
        let store = MemoryStore::new();
        let leo = author(&store, "leo").await;
        let kim = author(&store, "kim").await;
        let leo_post = post(&store, leo.id, "by leo", None).await;
        let kim_post = post(&store, kim.id, "by kim", None).await;
        store
            .insert_comment(NewComment {
                post_id: kim_post.id,
                author_id: leo.id,
                text: Some("nice".to_string()),
            })
            .await
            .unwrap();
        store.insert_follow(leo.id, kim.id).await.unwrap();
        store.insert_follow(kim.id, leo.id).await.unwrap();

        assert!(store.delete_author(leo.id).await.unwrap());

        assert!(store.find_post(leo_post.id).await.unwrap().is_none());
        assert!(store.list_comments(kim_post.id).await.unwrap().is_empty());
        assert!(store.list_follows(kim.id, None).await.unwrap().is_empty());
        assert!(!store.follow_exists(leo.id, kim.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_follow_is_unique_per_pair() {
        let store = MemoryStore::new();
        let leo = author(&store, "leo").await;
        let kim = author(&store, "kim").await;

        assert!(store.insert_follow(leo.id, kim.id).await.unwrap().is_some());
        assert!(store.insert_follow(leo.id, kim.id).await.unwrap().is_none());
        assert_eq!(store.list_follows(leo.id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_follows_search_is_case_insensitive() {
        let store = MemoryStore::new();
        let leo = author(&store, "leo").await;
        let kim = author(&store, "KimChi").await;
        let ann = author(&store, "ann").await;
        store.insert_follow(leo.id, kim.id).await.unwrap();
        store.insert_follow(leo.id, ann.id).await.unwrap();

        let found = store.list_follows(leo.id, Some("kim")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].author, "KimChi");
        assert_eq!(found[0].user, "leo");
    }
}
