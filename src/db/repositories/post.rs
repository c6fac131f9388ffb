//! Post repository

use crate::db::{Backend, DynDatabasePool};
use crate::models::Post;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

const POST_COLUMNS: &str = "id, page_id, content, reply_to, created_at, updated_at";

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Posts of a page, newest first
    async fn list_by_page(&self, page_id: i64) -> Result<Vec<Post>>;

    async fn update_content(&self, id: i64, content: &str) -> Result<Post>;

    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let sql = r#"
            INSERT INTO posts (page_id, content, reply_to, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
        "#;
        let now = Utc::now();
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(post.page_id)
                .bind(&post.content)
                .bind(post.reply_to)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.last_insert_rowid()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(post.page_id)
                .bind(&post.content)
                .bind(post.reply_to)
                .bind(now)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.last_insert_id() as i64),
        };
        let id = id.context("Failed to create post")?;

        Ok(Post {
            id,
            created_at: now,
            updated_at: now,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let post = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(row_to_post_sqlite)),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(row_to_post_mysql)),
        };
        post.context("Failed to get post by ID")
    }

    async fn list_by_page(&self, page_id: i64) -> Result<Vec<Post>> {
        // Ties on created_at fall back to insertion order.
        let sql = format!(
            "SELECT {} FROM posts WHERE page_id = ? ORDER BY created_at DESC, id DESC",
            POST_COLUMNS
        );
        let posts = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(page_id)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(row_to_post_sqlite).collect::<Vec<_>>()),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(page_id)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(row_to_post_mysql).collect::<Vec<_>>()),
        };
        posts.context("Failed to list posts")
    }

    async fn update_content(&self, id: i64, content: &str) -> Result<Post> {
        let sql = "UPDATE posts SET content = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(content)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(content)
                .bind(now)
                .bind(id)
                .execute(pool)
                .await
                .map(|_| ()),
        };
        result.context("Failed to update post")?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM posts WHERE id = ?";
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql).bind(id).execute(pool).await.map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql).bind(id).execute(pool).await.map(|_| ()),
        };
        result.context("Failed to delete post")
    }
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        page_id: row.get("page_id"),
        content: row.get("content"),
        reply_to: row.get("reply_to"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Post {
    Post {
        id: row.get("id"),
        page_id: row.get("page_id"),
        content: row.get("content"),
        reply_to: row.get("reply_to"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
