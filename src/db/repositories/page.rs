//! Page repository
//!
//! Besides the page rows themselves this repository owns the two
//! relationship sets of a page: `page_followers` and `page_follow_requests`.
//! Both have a composite primary key, so membership is a set and repeated
//! inserts are ignored.
//!
//! Batch accept and reject run in a single transaction each.

use super::user::{row_to_user_mysql, row_to_user_sqlite, USER_COLUMNS_U};
use crate::db::{Backend, DynDatabasePool};
use crate::models::{Page, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const PAGE_COLUMNS: &str =
    "p.id, p.owner_id, p.name, p.description, p.is_private, p.created_at, p.updated_at";

/// Which relationship set of a page to read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Followers,
    FollowRequests,
}

impl Membership {
    fn table(self) -> &'static str {
        match self {
            Membership::Followers => "page_followers",
            Membership::FollowRequests => "page_follow_requests",
        }
    }
}

#[async_trait]
pub trait PageRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<Page>>;

    async fn get_by_owner(&self, owner_id: i64) -> Result<Option<Page>>;

    /// All pages ordered by id; pages of blocked owners only when asked for
    async fn list(&self, include_blocked_owners: bool) -> Result<Vec<Page>>;

    /// Persist name, description and privacy
    async fn update(&self, page: &Page) -> Result<Page>;

    /// Members of one relationship set, ordered by username
    async fn list_members(&self, page_id: i64, set: Membership) -> Result<Vec<User>>;

    async fn is_member(&self, page_id: i64, user_id: i64, set: Membership) -> Result<bool>;

    /// Insert into a relationship set; an existing member is left alone
    async fn add_member(&self, page_id: i64, user_id: i64, set: Membership) -> Result<()>;

    /// Make the user a follower and drop any pending request, in one transaction
    async fn follow(&self, page_id: i64, user_id: i64) -> Result<()>;

    /// Move pending requesters to followers in one transaction.
    ///
    /// Users without a pending request are skipped. Returns how many users
    /// were promoted.
    async fn accept_follow_requests(&self, page_id: i64, user_ids: &[i64]) -> Result<u64>;

    /// Drop pending requests in one transaction, returning how many existed
    async fn reject_follow_requests(&self, page_id: i64, user_ids: &[i64]) -> Result<u64>;
}

pub struct SqlxPageRepository {
    pool: DynDatabasePool,
}

impl SqlxPageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PageRepository for SqlxPageRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Page>> {
        let sql = format!("SELECT {} FROM pages p WHERE p.id = ?", PAGE_COLUMNS);
        let page = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(row_to_page_sqlite)),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(row_to_page_mysql)),
        };
        page.context("Failed to get page by ID")
    }

    async fn get_by_owner(&self, owner_id: i64) -> Result<Option<Page>> {
        let sql = format!("SELECT {} FROM pages p WHERE p.owner_id = ?", PAGE_COLUMNS);
        let page = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(owner_id)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(row_to_page_sqlite)),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(owner_id)
                .fetch_optional(pool)
                .await
                .map(|row| row.as_ref().map(row_to_page_mysql)),
        };
        page.context("Failed to get page by owner")
    }

    async fn list(&self, include_blocked_owners: bool) -> Result<Vec<Page>> {
        let filter = if include_blocked_owners {
            ""
        } else {
            "WHERE u.is_blocked = 0"
        };
        let sql = format!(
            "SELECT {} FROM pages p INNER JOIN users u ON u.id = p.owner_id {} ORDER BY p.id",
            PAGE_COLUMNS, filter
        );
        let pages = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(row_to_page_sqlite).collect::<Vec<_>>()),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .fetch_all(pool)
                .await
                .map(|rows| rows.iter().map(row_to_page_mysql).collect::<Vec<_>>()),
        };
        pages.context("Failed to list pages")
    }

    async fn update(&self, page: &Page) -> Result<Page> {
        let sql = r#"
            UPDATE pages
            SET name = ?, description = ?, is_private = ?, updated_at = ?
            WHERE id = ?
        "#;
        let now = Utc::now();
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&page.name)
                .bind(&page.description)
                .bind(page.is_private)
                .bind(now)
                .bind(page.id)
                .execute(pool)
                .await
                .map(|_| ()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&page.name)
                .bind(&page.description)
                .bind(page.is_private)
                .bind(now)
                .bind(page.id)
                .execute(pool)
                .await
                .map(|_| ()),
        };
        result.context("Failed to update page")?;

        self.get_by_id(page.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Page not found after update"))
    }

    async fn list_members(&self, page_id: i64, set: Membership) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users u INNER JOIN {} m ON m.user_id = u.id WHERE m.page_id = ? ORDER BY u.username",
            USER_COLUMNS_U,
            set.table()
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(page_id)
                    .fetch_all(pool)
                    .await
                    .with_context(|| format!("Failed to list {}", set.table()))?;
                rows.iter().map(row_to_user_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(page_id)
                    .fetch_all(pool)
                    .await
                    .with_context(|| format!("Failed to list {}", set.table()))?;
                rows.iter().map(row_to_user_mysql).collect()
            }
        }
    }

    async fn is_member(&self, page_id: i64, user_id: i64, set: Membership) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE page_id = ? AND user_id = ?",
            set.table()
        );
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar::<_, i64>(&sql)
                    .bind(page_id)
                    .bind(user_id)
                    .fetch_one(pool)
                    .await
            }
            Backend::Mysql(pool) => {
                sqlx::query_scalar::<_, i64>(&sql)
                    .bind(page_id)
                    .bind(user_id)
                    .fetch_one(pool)
                    .await
            }
        };
        Ok(count.with_context(|| format!("Failed to check {}", set.table()))? > 0)
    }

    async fn add_member(&self, page_id: i64, user_id: i64, set: Membership) -> Result<()> {
        let result = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let sql = format!(
                    "INSERT OR IGNORE INTO {} (page_id, user_id, created_at) VALUES (?, ?, ?)",
                    set.table()
                );
                sqlx::query(&sql)
                    .bind(page_id)
                    .bind(user_id)
                    .bind(Utc::now())
                    .execute(pool)
                    .await
                    .map(|_| ())
            }
            Backend::Mysql(pool) => {
                let sql = format!(
                    "INSERT IGNORE INTO {} (page_id, user_id, created_at) VALUES (?, ?, ?)",
                    set.table()
                );
                sqlx::query(&sql)
                    .bind(page_id)
                    .bind(user_id)
                    .bind(Utc::now())
                    .execute(pool)
                    .await
                    .map(|_| ())
            }
        };
        result.with_context(|| format!("Failed to insert into {}", set.table()))
    }

    async fn follow(&self, page_id: i64, user_id: i64) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => follow_sqlite(pool, page_id, user_id).await,
            Backend::Mysql(pool) => follow_mysql(pool, page_id, user_id).await,
        }
    }

    async fn accept_follow_requests(&self, page_id: i64, user_ids: &[i64]) -> Result<u64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => accept_requests_sqlite(pool, page_id, user_ids).await,
            Backend::Mysql(pool) => accept_requests_mysql(pool, page_id, user_ids).await,
        }
    }

    async fn reject_follow_requests(&self, page_id: i64, user_ids: &[i64]) -> Result<u64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => reject_requests_sqlite(pool, page_id, user_ids).await,
            Backend::Mysql(pool) => reject_requests_mysql(pool, page_id, user_ids).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn follow_sqlite(pool: &SqlitePool, page_id: i64, user_id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM page_follow_requests WHERE page_id = ? AND user_id = ?")
        .bind(page_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove follow request")?;

    sqlx::query("INSERT OR IGNORE INTO page_followers (page_id, user_id, created_at) VALUES (?, ?, ?)")
        .bind(page_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to add follower")?;

    tx.commit().await.context("Failed to commit follow")
}

async fn accept_requests_sqlite(pool: &SqlitePool, page_id: i64, user_ids: &[i64]) -> Result<u64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut promoted = 0;

    for &user_id in user_ids {
        let removed = sqlx::query("DELETE FROM page_follow_requests WHERE page_id = ? AND user_id = ?")
            .bind(page_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to remove follow request")?
            .rows_affected();
        if removed == 0 {
            continue;
        }

        sqlx::query("INSERT OR IGNORE INTO page_followers (page_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(page_id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .context("Failed to add follower")?;
        promoted += 1;
    }

    tx.commit().await.context("Failed to commit accepted requests")?;
    Ok(promoted)
}

async fn reject_requests_sqlite(pool: &SqlitePool, page_id: i64, user_ids: &[i64]) -> Result<u64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut removed = 0;

    for &user_id in user_ids {
        removed += sqlx::query("DELETE FROM page_follow_requests WHERE page_id = ? AND user_id = ?")
            .bind(page_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to remove follow request")?
            .rows_affected();
    }

    tx.commit().await.context("Failed to commit rejected requests")?;
    Ok(removed)
}

fn row_to_page_sqlite(row: &sqlx::sqlite::SqliteRow) -> Page {
    Page {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        description: row.get("description"),
        is_private: row.get("is_private"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn follow_mysql(pool: &MySqlPool, page_id: i64, user_id: i64) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM page_follow_requests WHERE page_id = ? AND user_id = ?")
        .bind(page_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove follow request")?;

    sqlx::query("INSERT IGNORE INTO page_followers (page_id, user_id, created_at) VALUES (?, ?, ?)")
        .bind(page_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to add follower")?;

    tx.commit().await.context("Failed to commit follow")
}

async fn accept_requests_mysql(pool: &MySqlPool, page_id: i64, user_ids: &[i64]) -> Result<u64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut promoted = 0;

    for &user_id in user_ids {
        let removed = sqlx::query("DELETE FROM page_follow_requests WHERE page_id = ? AND user_id = ?")
            .bind(page_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to remove follow request")?
            .rows_affected();
        if removed == 0 {
            continue;
        }

        sqlx::query("INSERT IGNORE INTO page_followers (page_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(page_id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .context("Failed to add follower")?;
        promoted += 1;
    }

    tx.commit().await.context("Failed to commit accepted requests")?;
    Ok(promoted)
}

async fn reject_requests_mysql(pool: &MySqlPool, page_id: i64, user_ids: &[i64]) -> Result<u64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;
    let mut removed = 0;

    for &user_id in user_ids {
        removed += sqlx::query("DELETE FROM page_follow_requests WHERE page_id = ? AND user_id = ?")
            .bind(page_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to remove follow request")?
            .rows_affected();
    }

    tx.commit().await.context("Failed to commit rejected requests")?;
    Ok(removed)
}

fn row_to_page_mysql(row: &sqlx::mysql::MySqlRow) -> Page {
    Page {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        name: row.get("name"),
        description: row.get("description"),
        is_private: row.get("is_private"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;

    struct Fixture {
        pages: SqlxPageRepository,
        users: SqlxUserRepository,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = create_test_pool().await.expect("Failed to create test pool");
            migrations::run_migrations(&pool).await.expect("Failed to run migrations");
            Self {
                pages: SqlxPageRepository::new(pool.clone()),
                users: SqlxUserRepository::new(pool),
            }
        }

        async fn user_with_page(&self, username: &str) -> (User, Page) {
            let user = User::new(
                username.to_string(),
                format!("{}@example.com", username),
                "hash".to_string(),
                UserRole::User,
            );
            let user = self
                .users
                .create_with_page(&user, &Page::for_owner(0, username.to_string()))
                .await
                .expect("Failed to create user");
            let page = self.pages.get_by_owner(user.id).await.unwrap().unwrap();
            (user, page)
        }

        async fn usernames(&self, page_id: i64, set: Membership) -> Vec<String> {
            self.pages
                .list_members(page_id, set)
                .await
                .unwrap()
                .into_iter()
                .map(|u| u.username)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_get_and_update_page() {
        let f = Fixture::new().await;
        let (owner, mut page) = f.user_with_page("alice").await;
        assert_eq!(page.owner_id, owner.id);
        assert_eq!(page.name, "alice");

        page.is_private = true;
        page.description = "notes".to_string();
        let updated = f.pages.update(&page).await.unwrap();
        assert!(updated.is_private);
        assert_eq!(updated.description, "notes");

        assert!(f.pages.get_by_id(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_hides_blocked_owners_unless_asked() {
        let f = Fixture::new().await;
        f.user_with_page("alice").await;
        let (mut bob, _) = f.user_with_page("bob").await;
        bob.is_blocked = true;
        f.users.update(&bob).await.unwrap();

        assert_eq!(f.pages.list(true).await.unwrap().len(), 2);
        let visible = f.pages.list(false).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_ne!(visible[0].owner_id, bob.id);
    }

    #[tokio::test]
    async fn test_add_member_is_idempotent() {
        let f = Fixture::new().await;
        let (_, page) = f.user_with_page("alice").await;
        let (bob, _) = f.user_with_page("bob").await;

        f.pages.add_member(page.id, bob.id, Membership::Followers).await.unwrap();
        f.pages.add_member(page.id, bob.id, Membership::Followers).await.unwrap();

        assert_eq!(f.usernames(page.id, Membership::Followers).await, vec!["bob"]);
        assert!(f.pages.is_member(page.id, bob.id, Membership::Followers).await.unwrap());
        assert!(!f.pages.is_member(page.id, bob.id, Membership::FollowRequests).await.unwrap());
    }

    #[tokio::test]
    async fn test_accept_moves_only_pending_requests() {
        let f = Fixture::new().await;
        let (_, page) = f.user_with_page("alice").await;
        let (bob, _) = f.user_with_page("bob").await;
        let (carol, _) = f.user_with_page("carol").await;

        f.pages.add_member(page.id, bob.id, Membership::FollowRequests).await.unwrap();

        let promoted = f
            .pages
            .accept_follow_requests(page.id, &[bob.id, carol.id])
            .await
            .unwrap();
        assert_eq!(promoted, 1);
        assert_eq!(f.usernames(page.id, Membership::Followers).await, vec!["bob"]);
        assert!(f.usernames(page.id, Membership::FollowRequests).await.is_empty());
    }

    #[tokio::test]
    async fn test_reject_leaves_followers_untouched() {
        let f = Fixture::new().await;
        let (_, page) = f.user_with_page("alice").await;
        let (bob, _) = f.user_with_page("bob").await;
        let (carol, _) = f.user_with_page("carol").await;

        f.pages.add_member(page.id, bob.id, Membership::FollowRequests).await.unwrap();
        f.pages.add_member(page.id, carol.id, Membership::Followers).await.unwrap();

        let removed = f
            .pages
            .reject_follow_requests(page.id, &[bob.id, carol.id])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(f.usernames(page.id, Membership::FollowRequests).await.is_empty());
        assert_eq!(f.usernames(page.id, Membership::Followers).await, vec!["carol"]);
    }

    #[tokio::test]
    async fn test_follow_clears_pending_request() {
        let f = Fixture::new().await;
        let (_, page) = f.user_with_page("alice").await;
        let (bob, _) = f.user_with_page("bob").await;

        f.pages.add_member(page.id, bob.id, Membership::FollowRequests).await.unwrap();
        f.pages.follow(page.id, bob.id).await.unwrap();
        f.pages.follow(page.id, bob.id).await.unwrap();

        assert_eq!(f.usernames(page.id, Membership::Followers).await, vec!["bob"]);
        assert!(f.usernames(page.id, Membership::FollowRequests).await.is_empty());
    }
}
