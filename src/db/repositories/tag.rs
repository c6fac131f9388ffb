//! Tag repository
//!
//! Tags are unique by name and linked to pages through `page_tags`.
//! Both links and tags use set semantics: repeating an insert is a no-op.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Return the tag with this name, creating it first if needed
    async fn get_or_create(&self, name: &str) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Tags linked to a page, ordered by name
    async fn list_by_page(&self, page_id: i64) -> Result<Vec<Tag>>;

    async fn attach(&self, page_id: i64, tag_id: i64) -> Result<()>;

    /// Unlink a tag from a page; `false` when it was not linked
    async fn detach(&self, page_id: i64, tag_id: i64) -> Result<bool>;
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_or_create(&self, name: &str) -> Result<Tag> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_or_create_tag_sqlite(pool, name).await,
            Backend::Mysql(pool) => get_or_create_tag_mysql(pool, name).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let sql = "SELECT id, name, created_at FROM tags WHERE id = ?";
        let tag = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(row_to_tag_sqlite)),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(row_to_tag_mysql)),
        };
        tag.context("Failed to get tag by ID")
    }

    async fn list_by_page(&self, page_id: i64) -> Result<Vec<Tag>> {
        let sql = r#"
            SELECT t.id, t.name, t.created_at
            FROM tags t
            INNER JOIN page_tags pt ON pt.tag_id = t.id
            WHERE pt.page_id = ?
            ORDER BY t.name
        "#;
        let tags = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(page_id)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(row_to_tag_sqlite).collect::<Vec<_>>()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(page_id)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(row_to_tag_mysql).collect::<Vec<_>>()),
        };
        tags.context("Failed to list page tags")
    }

    async fn attach(&self, page_id: i64, tag_id: i64) -> Result<()> {
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("INSERT OR IGNORE INTO page_tags (page_id, tag_id) VALUES (?, ?)")
                    .bind(page_id)
                    .bind(tag_id)
                    .execute(pool)
                    .await
                    .map(|_| ())
            }
            Backend::Mysql(pool) => {
                sqlx::query("INSERT IGNORE INTO page_tags (page_id, tag_id) VALUES (?, ?)")
                    .bind(page_id)
                    .bind(tag_id)
                    .execute(pool)
                    .await
                    .map(|_| ())
            }
        };
        result.context("Failed to attach tag to page")
    }

    async fn detach(&self, page_id: i64, tag_id: i64) -> Result<bool> {
        let sql = "DELETE FROM page_tags WHERE page_id = ? AND tag_id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(page_id)
                .bind(tag_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(page_id)
                .bind(tag_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        };
        Ok(affected.context("Failed to detach tag from page")? > 0)
    }
}

async fn get_or_create_tag_sqlite(pool: &SqlitePool, name: &str) -> Result<Tag> {
    sqlx::query("INSERT OR IGNORE INTO tags (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    let row = sqlx::query("SELECT id, name, created_at FROM tags WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .context("Failed to get tag by name")?;
    Ok(row_to_tag_sqlite(&row))
}

async fn get_or_create_tag_mysql(pool: &MySqlPool, name: &str) -> Result<Tag> {
    sqlx::query("INSERT IGNORE INTO tags (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    let row = sqlx::query("SELECT id, name, created_at FROM tags WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .context("Failed to get tag by name")?;
    Ok(row_to_tag_mysql(&row))
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Page, User, UserRole};

    async fn setup() -> (SqlxTagRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let user = User::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "hash".to_string(),
            UserRole::User,
        );
        let user = SqlxUserRepository::new(pool.clone())
            .create_with_page(&user, &Page::for_owner(0, "alice".to_string()))
            .await
            .expect("Failed to create user");
        let page_id: i64 = sqlx::query_scalar("SELECT id FROM pages WHERE owner_id = ?")
            .bind(user.id)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        (SqlxTagRepository::new(pool), page_id)
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_existing() {
        let (repo, _) = setup().await;
        let first = repo.get_or_create("rust").await.unwrap();
        let second = repo.get_or_create("rust").await.unwrap();
        assert_eq!(first.id, second.id);

        let found = repo.get_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(found.name, "rust");
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attach_list_detach() {
        let (repo, page_id) = setup().await;
        let web = repo.get_or_create("web").await.unwrap();
        let async_tag = repo.get_or_create("async").await.unwrap();

        repo.attach(page_id, web.id).await.unwrap();
        repo.attach(page_id, async_tag.id).await.unwrap();
        repo.attach(page_id, web.id).await.unwrap();

        let names: Vec<String> = repo
            .list_by_page(page_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["async", "web"]);

        assert!(repo.detach(page_id, web.id).await.unwrap());
        assert!(!repo.detach(page_id, web.id).await.unwrap());
        assert_eq!(repo.list_by_page(page_id).await.unwrap().len(), 1);
    }
}
