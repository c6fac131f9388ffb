//! User repository
//!
//! - `UserRepository` trait: persistence port for accounts
//! - `SqlxUserRepository`: SQLite and MySQL implementation
//!
//! Accounts are created together with their page in one transaction, so a
//! user without a page never becomes visible.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Page, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, avatar_url, is_blocked, created_at, updated_at";

/// `USER_COLUMNS` qualified with the `u` alias, for joins
pub(super) const USER_COLUMNS_U: &str = "u.id, u.username, u.email, u.password_hash, u.role, \
    u.avatar_url, u.is_blocked, u.created_at, u.updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and its page atomically, returning the stored user
    async fn create_with_page(&self, user: &User, page: &Page) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist role, avatar and block state
    async fn update(&self, user: &User) -> Result<User>;

    async fn count(&self) -> Result<i64>;

    /// Case-insensitive substring search on username, ordered by username
    async fn search(&self, query: &str) -> Result<Vec<User>>;
}

pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create_with_page(&self, user: &User, page: &Page) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user, page).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user, page).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_sqlite(pool, "id = ?", Lookup::Id(id)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, "id = ?", Lookup::Id(id)).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_sqlite(pool, "username = ?", Lookup::Text(username)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, "username = ?", Lookup::Text(username)).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_sqlite(pool, "email = ?", Lookup::Text(email)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, "email = ?", Lookup::Text(email)).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => update_user_mysql(pool, user).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM users";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await,
            Backend::Mysql(pool) => sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await,
        };
        count.context("Failed to count users")
    }

    async fn search(&self, query: &str) -> Result<Vec<User>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        match self.pool.backend() {
            Backend::Sqlite(pool) => search_users_sqlite(pool, &pattern).await,
            Backend::Mysql(pool) => search_users_mysql(pool, &pattern).await,
        }
    }
}

/// Bound value of a single-row lookup
#[derive(Clone, Copy)]
enum Lookup<'a> {
    Id(i64),
    Text(&'a str),
}

/// Escape LIKE wildcards so they match literally (escape character `\`)
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User, page: &Page) -> Result<User> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, avatar_url, is_blocked, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(&user.avatar_url)
    .bind(user.is_blocked)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create user")?
    .last_insert_rowid();

    sqlx::query(
        r#"
        INSERT INTO pages (owner_id, name, description, is_private, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&page.name)
    .bind(&page.description)
    .bind(page.is_private)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create page for user")?;

    tx.commit().await.context("Failed to commit user creation")?;

    Ok(User {
        id,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_sqlite(pool: &SqlitePool, filter: &str, key: Lookup<'_>) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, filter);
    let query = sqlx::query(&sql);
    let query = match key {
        Lookup::Id(id) => query.bind(id),
        Lookup::Text(text) => query.bind(text),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", filter))?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET role = ?, avatar_url = ?, is_blocked = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(user.role.to_string())
    .bind(&user.avatar_url)
    .bind(user.is_blocked)
    .bind(Utc::now())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_sqlite(pool, "id = ?", Lookup::Id(user.id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn search_users_sqlite(pool: &SqlitePool, pattern: &str) -> Result<Vec<User>> {
    let sql = format!(
        r"SELECT {} FROM users WHERE LOWER(username) LIKE ? ESCAPE '\' ORDER BY username",
        USER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(pattern)
        .fetch_all(pool)
        .await
        .context("Failed to search users")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

pub(super) fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        avatar_url: row.get("avatar_url"),
        is_blocked: row.get("is_blocked"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User, page: &Page) -> Result<User> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, role, avatar_url, is_blocked, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.to_string())
    .bind(&user.avatar_url)
    .bind(user.is_blocked)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create user")?
    .last_insert_id() as i64;

    sqlx::query(
        r#"
        INSERT INTO pages (owner_id, name, description, is_private, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(&page.name)
    .bind(&page.description)
    .bind(page.is_private)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create page for user")?;

    tx.commit().await.context("Failed to commit user creation")?;

    Ok(User {
        id,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_mysql(pool: &MySqlPool, filter: &str, key: Lookup<'_>) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, filter);
    let query = sqlx::query(&sql);
    let query = match key {
        Lookup::Id(id) => query.bind(id),
        Lookup::Text(text) => query.bind(text),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", filter))?;

    row.as_ref().map(row_to_user_mysql).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET role = ?, avatar_url = ?, is_blocked = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(user.role.to_string())
    .bind(&user.avatar_url)
    .bind(user.is_blocked)
    .bind(Utc::now())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_mysql(pool, "id = ?", Lookup::Id(user.id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn search_users_mysql(pool: &MySqlPool, pattern: &str) -> Result<Vec<User>> {
    let sql = format!(
        r"SELECT {} FROM users WHERE LOWER(username) LIKE ? ESCAPE '\\' ORDER BY username",
        USER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(pattern)
        .fetch_all(pool)
        .await
        .context("Failed to search users")?;

    rows.iter().map(row_to_user_mysql).collect()
}

pub(super) fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    let role_str: String = row.get("role");
    let role = UserRole::from_str(&role_str)
        .with_context(|| format!("Invalid role in database: {}", role_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        avatar_url: row.get("avatar_url"),
        is_blocked: row.get("is_blocked"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    async fn create(repo: &SqlxUserRepository, username: &str) -> User {
        let user = User::new(
            username.to_string(),
            format!("{}@example.com", username),
            "hash".to_string(),
            UserRole::User,
        );
        let page = Page::for_owner(0, username.to_string());
        repo.create_with_page(&user, &page).await.expect("Failed to create user")
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let repo = setup().await;
        let created = create(&repo, "alice").await;
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.role, UserRole::User);
        assert!(!by_id.is_blocked);

        let by_name = repo.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        let by_email = repo.get_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_also_creates_page() {
        let repo = setup().await;
        let user = create(&repo, "alice").await;

        let sqlite = repo.pool.as_sqlite().unwrap();
        let owner: i64 = sqlx::query_scalar("SELECT owner_id FROM pages WHERE owner_id = ?")
            .bind(user.id)
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(owner, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_username_leaves_no_trace() {
        let repo = setup().await;
        create(&repo, "alice").await;

        let dup = User::new(
            "alice".to_string(),
            "other@example.com".to_string(),
            "hash".to_string(),
            UserRole::User,
        );
        let page = Page::for_owner(0, "alice".to_string());
        assert!(repo.create_with_page(&dup, &page).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_block_state() {
        let repo = setup().await;
        let mut user = create(&repo, "alice").await;

        user.is_blocked = true;
        user.avatar_url = Some("/uploads/avatars/a.png".to_string());
        let updated = repo.update(&user).await.unwrap();

        assert!(updated.is_blocked);
        assert_eq!(updated.avatar_url.as_deref(), Some("/uploads/avatars/a.png"));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let repo = setup().await;
        create(&repo, "Alice").await;
        create(&repo, "malicious").await;
        create(&repo, "bob").await;

        let found: Vec<String> = repo
            .search("ALI")
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(found, vec!["Alice", "malicious"]);
    }

    #[tokio::test]
    async fn test_search_treats_wildcards_literally() {
        let repo = setup().await;
        create(&repo, "snake_case").await;
        create(&repo, "snakecase").await;

        let found = repo.search("e_c").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "snake_case");

        assert!(repo.search("%").await.unwrap().is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("plain"), "plain");
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }
}
