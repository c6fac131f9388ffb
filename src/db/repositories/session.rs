//! Session repository
//!
//! Sessions are opaque tokens. A token is valid while its row exists and
//! `expires_at` lies in the future; logout and blocking delete rows.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Look up a session by token
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Revoke every session of a user, returning how many were removed
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    async fn delete_expired(&self) -> Result<u64>;
}

pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        let sql = "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)";
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(pool)
                .await
                .map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&session.id)
                .bind(session.user_id)
                .bind(session.expires_at)
                .bind(session.created_at)
                .execute(pool)
                .await
                .map(|_| ()),
        };
        result.context("Failed to create session")?;
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let sql = "SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?";
        let session = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| {
                    row.map(|row| Session {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        expires_at: row.get("expires_at"),
                        created_at: row.get("created_at"),
                    })
                }),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| {
                    row.map(|row| Session {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        expires_at: row.get("expires_at"),
                        created_at: row.get("created_at"),
                    })
                }),
        };
        session.context("Failed to get session")
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE id = ?";
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql).bind(id).execute(pool).await.map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql).bind(id).execute(pool).await.map(|_| ()),
        };
        result.context("Failed to delete session")
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE user_id = ?";
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(user_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(user_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        };
        affected.context("Failed to delete user sessions")
    }

    async fn delete_expired(&self) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let now = Utc::now();
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        };
        affected.context("Failed to delete expired sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{Page, User, UserRole};
    use chrono::Duration;

    async fn setup() -> (SqlxSessionRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");

        let users = SqlxUserRepository::new(pool.clone());
        let user = User::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "hash".to_string(),
            UserRole::User,
        );
        let user = users
            .create_with_page(&user, &Page::for_owner(0, "alice".to_string()))
            .await
            .expect("Failed to create user");

        (SqlxSessionRepository::new(pool), user.id)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (repo, user_id) = setup().await;
        let session = repo.create(&Session::issue(user_id, 7)).await.unwrap();

        let found = repo.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (repo, user_id) = setup().await;
        let session = repo.create(&Session::issue(user_id, 7)).await.unwrap();

        repo.delete(&session.id).await.unwrap();
        assert!(repo.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let (repo, user_id) = setup().await;
        let a = repo.create(&Session::issue(user_id, 7)).await.unwrap();
        let b = repo.create(&Session::issue(user_id, 7)).await.unwrap();

        assert_eq!(repo.delete_by_user(user_id).await.unwrap(), 2);
        assert!(repo.get_by_id(&a.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_sessions() {
        let (repo, user_id) = setup().await;
        let live = repo.create(&Session::issue(user_id, 7)).await.unwrap();

        let mut stale = Session::issue(user_id, 7);
        stale.expires_at = Utc::now() - Duration::hours(1);
        let stale = repo.create(&stale).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
        assert!(repo.get_by_id(&stale.id).await.unwrap().is_none());
    }
}
