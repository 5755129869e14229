use super::EntityStore;
use crate::error::Result;
use crate::models::{
    Author, Comment, Follow, Group, NewAuthor, NewComment, NewGroup, NewPost, Post, PostFilter,
    PostUpdate,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

const POST_COLUMNS: &str = r#"
    SELECT p.id, p.text, p.created_at, p.author_id, a.username AS author, p.group_id, p.image
    FROM posts p
    JOIN authors a ON a.id = p.author_id
"#;

const COMMENT_COLUMNS: &str = r#"
    SELECT c.id, c.post_id, c.author_id, a.username AS author, c.text, c.created_at
    FROM comments c
    JOIN authors a ON a.id = c.author_id
"#;

const FOLLOW_COLUMNS: &str = r#"
    SELECT f.id, f.user_id, u.username AS "user", f.author_id, a.username AS author
    FROM follows f
    JOIN authors u ON u.id = f.user_id
    JOIN authors a ON a.id = f.author_id
"#;

fn push_post_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: PostFilter) {
    match filter {
        PostFilter::All => {}
        PostFilter::Group(group_id) => {
            qb.push(" WHERE p.group_id = ").push_bind(group_id);
        }
        PostFilter::Author(author_id) => {
            qb.push(" WHERE p.author_id = ").push_bind(author_id);
        }
        PostFilter::FollowedBy(user_id) => {
            qb.push(" WHERE p.author_id IN (SELECT f.author_id FROM follows f WHERE f.user_id = ")
                .push_bind(user_id)
                .push(")");
        }
    }
}

/// Escape LIKE wildcards so a search term only matches literally
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// PostgreSQL-backed entity store
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl EntityStore for PostgresStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_author(&self, new: NewAuthor) -> Result<Author> {
        let author = sqlx::query_as::<_, Author>(
            r#"
            INSERT INTO authors (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, date_joined
            "#,
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.pool)
        .await?;

        debug!(author_id = author.id, "author created");
        Ok(author)
    }

    async fn find_author(&self, id: i64) -> Result<Option<Author>> {
        let author = sqlx::query_as::<_, Author>(
            "SELECT id, username, email, password_hash, date_joined FROM authors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(author)
    }

    async fn find_author_by_username(&self, username: &str) -> Result<Option<Author>> {
        let author = sqlx::query_as::<_, Author>(
            "SELECT id, username, email, password_hash, date_joined FROM authors WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(author)
    }

    async fn delete_author(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_group(&self, new: NewGroup) -> Result<Group> {
        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (title, slug, description)
            VALUES ($1, $2, $3)
            RETURNING id, title, slug, description
            "#,
        )
        .bind(&new.title)
        .bind(&new.slug)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(group)
    }

    async fn find_group(&self, id: i64) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, title, slug, description FROM groups WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn find_group_by_slug(&self, slug: &str) -> Result<Option<Group>> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT id, title, slug, description FROM groups WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn list_groups(&self) -> Result<Vec<Group>> {
        let groups = sqlx::query_as::<_, Group>(
            "SELECT id, title, slug, description FROM groups ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(groups)
    }

    async fn delete_group(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_post(&self, new: NewPost) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            WITH inserted AS (
                INSERT INTO posts (text, author_id, group_id, image)
                VALUES ($1, $2, $3, $4)
                RETURNING id, text, created_at, author_id, group_id, image
            )
            SELECT i.id, i.text, i.created_at, i.author_id, a.username AS author, i.group_id, i.image
            FROM inserted i
            JOIN authors a ON a.id = i.author_id
            "#,
        )
        .bind(&new.text)
        .bind(new.author_id)
        .bind(new.group_id)
        .bind(&new.image)
        .fetch_one(&self.pool)
        .await?;

        debug!(post_id = post.id, author_id = post.author_id, "post inserted");
        Ok(post)
    }

    async fn find_post(&self, id: i64) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(&format!("{} WHERE p.id = $1", POST_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(post)
    }

    async fn update_post(&self, id: i64, update: PostUpdate) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            WITH updated AS (
                UPDATE posts SET text = $2, group_id = $3, image = $4
                WHERE id = $1
                RETURNING id, text, created_at, author_id, group_id, image
            )
            SELECT u.id, u.text, u.created_at, u.author_id, a.username AS author, u.group_id, u.image
            FROM updated u
            JOIN authors a ON a.id = u.author_id
            "#,
        )
        .bind(id)
        .bind(&update.text)
        .bind(update.group_id)
        .bind(&update.image)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    async fn delete_post(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_posts(&self, filter: PostFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM posts p");
        push_post_filter(&mut qb, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn list_posts(&self, filter: PostFilter, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let mut qb = QueryBuilder::<Postgres>::new(POST_COLUMNS);
        push_post_filter(&mut qb, filter);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let posts = qb.build_query_as::<Post>().fetch_all(&self.pool).await?;
        Ok(posts)
    }

    async fn insert_comment(&self, new: NewComment) -> Result<Comment> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING id, post_id, author_id, text, created_at
            )
            SELECT i.id, i.post_id, i.author_id, a.username AS author, i.text, i.created_at
            FROM inserted i
            JOIN authors a ON a.id = i.author_id
            "#,
        )
        .bind(new.post_id)
        .bind(new.author_id)
        .bind(&new.text)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(&format!("{} WHERE c.id = $1", COMMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn update_comment(&self, id: i64, text: Option<String>) -> Result<Option<Comment>> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET text = $2
                WHERE id = $1
                RETURNING id, post_id, author_id, text, created_at
            )
            SELECT u.id, u.post_id, u.author_id, a.username AS author, u.text, u.created_at
            FROM updated u
            JOIN authors a ON a.id = u.author_id
            "#,
        )
        .bind(id)
        .bind(&text)
        .fetch_optional(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(&format!(
            "{} WHERE c.post_id = $1 ORDER BY c.created_at DESC, c.id DESC",
            COMMENT_COLUMNS
        ))
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    async fn insert_follow(&self, user_id: i64, author_id: i64) -> Result<Option<Follow>> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO follows (user_id, author_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, author_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(id) => self.find_follow(id).await,
            None => Ok(None),
        }
    }

    async fn delete_follow(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_follow_by_id(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn follow_exists(&self, user_id: i64, author_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn find_follow(&self, id: i64) -> Result<Option<Follow>> {
        let follow = sqlx::query_as::<_, Follow>(&format!("{} WHERE f.id = $1", FOLLOW_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(follow)
    }

    async fn list_follows(&self, user_id: i64, search: Option<&str>) -> Result<Vec<Follow>> {
        let mut qb = QueryBuilder::<Postgres>::new(FOLLOW_COLUMNS);
        qb.push(" WHERE f.user_id = ").push_bind(user_id);
        if let Some(search) = search {
            qb.push(" AND a.username ILIKE ").push_bind(like_pattern(search));
        }
        qb.push(" ORDER BY f.id");

        let follows = qb.build_query_as::<Follow>().fetch_all(&self.pool).await?;
        Ok(follows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("leo"), "%leo%");
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
    }
}
