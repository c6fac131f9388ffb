//! Account lifecycle
//!
//! Registration (with optional avatar), login and logout through opaque
//! session tokens, session validation for the auth middleware, the admin
//! block toggle, and username search.
//!
//! The first account ever registered becomes an administrator.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{LoginInput, Page, RegisterInput, Session, User, UserRole};
use crate::services::avatar::{AvatarError, AvatarStore};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use std::sync::Arc;

pub const DEFAULT_SESSION_DAYS: i64 = 7;
pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MAX_EMAIL_LENGTH: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown email, wrong password or blocked account
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Invalid {field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("No user named '{0}'")]
    UsernameNotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl UserServiceError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field,
            message: message.into(),
        }
    }
}

impl From<AvatarError> for UserServiceError {
    fn from(err: AvatarError) -> Self {
        match err {
            AvatarError::Io(e) => Self::InternalError(e),
            other => Self::invalid("avatar", other.to_string()),
        }
    }
}

/// Registration payload after validation and normalization
#[derive(Debug)]
struct NewAccount {
    username: String,
    email: String,
    password: String,
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    avatar_store: Arc<dyn AvatarStore>,
    session_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        avatar_store: Arc<dyn AvatarStore>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            avatar_store,
            session_days: DEFAULT_SESSION_DAYS,
        }
    }

    pub fn with_session_days(mut self, days: i64) -> Self {
        self.session_days = days;
        self
    }

    /// Create an account and its page.
    ///
    /// Nothing is uploaded or stored unless the payload is valid and both
    /// username and email are free.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let account = validate_registration(&input)?;

        if self
            .user_repo
            .get_by_username(&account.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                account.username
            )));
        }
        if self
            .user_repo
            .get_by_email(&account.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                account.email
            )));
        }

        let role = if self.user_repo.count().await.context("Failed to count users")? == 0 {
            UserRole::Admin
        } else {
            UserRole::User
        };
        let password_hash = hash_password(&account.password)?;

        let mut user = User::new(account.username, account.email, password_hash, role);
        if let Some(avatar) = &input.avatar {
            user.avatar_url = Some(self.avatar_store.store(avatar).await?);
        }

        let page = Page::for_owner(0, user.username.clone());
        match self.user_repo.create_with_page(&user, &page).await {
            Ok(created) => {
                tracing::info!(user_id = created.id, role = %created.role, "Registered {}", created.username);
                Ok(created)
            }
            Err(e) => {
                if let Some(url) = &user.avatar_url {
                    self.avatar_store.discard(url).await;
                }
                Err(e.context("Failed to create user").into())
            }
        }
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        let email = required(input.email.as_deref(), "email")?.to_lowercase();
        let password = input
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| UserServiceError::invalid("password", "This field is required"))?;

        let user = self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to look up user")?
            .ok_or_else(|| UserServiceError::AuthenticationError("Invalid email or password".into()))?;

        if !verify_password(password, &user.password_hash)? {
            return Err(UserServiceError::AuthenticationError(
                "Invalid email or password".into(),
            ));
        }
        if user.is_blocked {
            return Err(UserServiceError::AuthenticationError("User is blocked".into()));
        }

        let session = self
            .session_repo
            .create(&Session::issue(user.id, self.session_days))
            .await
            .context("Failed to create session")?;

        tracing::debug!(user_id = user.id, "Opened session");
        Ok((session, user))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Unknown or expired tokens and blocked users yield `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            self.session_repo
                .delete(&session.id)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get session user")?;
        Ok(user.filter(|u| !u.is_blocked))
    }

    /// Flip the blocked flag of `username`.
    ///
    /// Blocking also revokes every session of the target.
    pub async fn toggle_block(&self, acting: &User, username: &str) -> Result<User, UserServiceError> {
        if !acting.is_admin() {
            return Err(UserServiceError::Forbidden(
                "Only administrators can block users".into(),
            ));
        }

        let username = required(Some(username), "username")?;
        let mut target = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to look up user")?
            .ok_or_else(|| UserServiceError::UsernameNotFound(username.to_string()))?;

        if target.id == acting.id {
            return Err(UserServiceError::Forbidden("Administrators cannot block themselves".into()));
        }

        target.is_blocked = !target.is_blocked;
        let updated = self.user_repo.update(&target).await.context("Failed to update user")?;

        if updated.is_blocked {
            let revoked = self
                .session_repo
                .delete_by_user(updated.id)
                .await
                .context("Failed to revoke sessions")?;
            tracing::info!(admin = acting.id, revoked, "Blocked {}", updated.username);
        } else {
            tracing::info!(admin = acting.id, "Unblocked {}", updated.username);
        }

        Ok(updated)
    }

    /// Case-insensitive substring search on usernames
    pub async fn search(&self, query: &str) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.search(query.trim()).await.context("Failed to search users")?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to look up user")?)
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, UserServiceError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| UserServiceError::invalid(field, "This field is required"))
}

fn validate_registration(input: &RegisterInput) -> Result<NewAccount, UserServiceError> {
    let username = required(input.username.as_deref(), "username")?;
    let email = required(input.email.as_deref(), "email")?.to_lowercase();
    let password = input
        .password
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| UserServiceError::invalid("password", "This field is required"))?;

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(UserServiceError::invalid(
            "username",
            format!("Must be at most {} characters", MAX_USERNAME_LENGTH),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '+' | '@'))
    {
        // ASCII only, so SQL LOWER() matches Rust lowercasing in search
        return Err(UserServiceError::invalid(
            "username",
            "Only ASCII letters, digits and @ . + - _ are allowed",
        ));
    }

    let well_formed = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && !domain.is_empty() && !domain.contains('@'))
        .unwrap_or(false);
    if !well_formed || email.len() > MAX_EMAIL_LENGTH {
        return Err(UserServiceError::invalid("email", "Enter a valid email address"));
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(UserServiceError::invalid(
            "password",
            format!("Must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }

    Ok(NewAccount {
        username: username.to_string(),
        email,
        password: password.to_string(),
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::repositories::SqlxSessionRepository;
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::AvatarUpload;

    async fn setup() -> (DynDatabasePool, UserService, Arc<MemoryAvatarStore>) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let avatars = Arc::new(MemoryAvatarStore::default());
        let service = user_service(&pool, avatars.clone());
        (pool, service, avatars)
    }

    async fn user_count(pool: &DynDatabasePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_user_is_admin() {
        let (_pool, service, _) = setup().await;
        let first = service.register(registration("alice")).await.unwrap();
        let second = service.register(registration("bob")).await.unwrap();

        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::User);
        assert!(first.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_creates_page() {
        let (pool, service, _) = setup().await;
        let user = service.register(registration("alice")).await.unwrap();

        let name: String = sqlx::query_scalar("SELECT name FROM pages WHERE owner_id = ?")
            .bind(user.id)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(name, "alice");
    }

    #[tokio::test]
    async fn test_register_merges_avatar_url() {
        let (_pool, service, avatars) = setup().await;
        let mut input = registration("alice");
        input.avatar = Some(AvatarUpload {
            file_name: "me.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        });

        let user = service.register(input).await.unwrap();
        assert_eq!(user.avatar_url.as_deref(), Some("/uploads/avatars/0-me.png"));
        assert_eq!(avatars.stored.lock().unwrap().len(), 1);
    }

    /// Accepts every check but fails the final insert
    struct FailingUserRepository;

    #[async_trait::async_trait]
    impl UserRepository for FailingUserRepository {
        async fn create_with_page(&self, _user: &User, _page: &Page) -> anyhow::Result<User> {
            Err(anyhow::anyhow!("database is locked"))
        }

        async fn get_by_id(&self, _id: i64) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn get_by_username(&self, _username: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn get_by_email(&self, _email: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn update(&self, _user: &User) -> anyhow::Result<User> {
            Err(anyhow::anyhow!("database is locked"))
        }

        async fn count(&self) -> anyhow::Result<i64> {
            Ok(0)
        }

        async fn search(&self, _query: &str) -> anyhow::Result<Vec<User>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_register_discards_avatar_when_insert_fails() {
        let (pool, _, _) = setup().await;
        let avatars = Arc::new(MemoryAvatarStore::default());
        let service = UserService::new(
            Arc::new(FailingUserRepository),
            SqlxSessionRepository::boxed(pool),
            avatars.clone(),
        );
        let mut input = registration("alice");
        input.avatar = Some(AvatarUpload {
            file_name: "me.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        });

        let result = service.register(input).await;
        assert!(matches!(result, Err(UserServiceError::InternalError(_))));

        let stored = avatars.stored.lock().unwrap().clone();
        assert_eq!(stored, vec!["/uploads/avatars/0-me.png".to_string()]);
        assert_eq!(*avatars.discarded.lock().unwrap(), stored);
    }

    #[tokio::test]
    async fn test_register_duplicates_rejected() {
        let (pool, service, _) = setup().await;
        service.register(registration("alice")).await.unwrap();

        let same_name = service.register(registration("alice")).await;
        assert!(matches!(same_name, Err(UserServiceError::UserExists(_))));

        let mut same_email = registration("alicia");
        same_email.email = Some("ALICE@example.com".to_string());
        let result = service.register(same_email).await;
        assert!(matches!(result, Err(UserServiceError::UserExists(_))));

        assert_eq!(user_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (pool, service, avatars) = setup().await;

        let cases: Vec<(RegisterInput, &str)> = vec![
            (RegisterInput { username: None, ..registration("a") }, "username"),
            (RegisterInput { username: Some("   ".into()), ..registration("a") }, "username"),
            (RegisterInput { username: Some("bad name".into()), ..registration("a") }, "username"),
            (RegisterInput { username: Some("Élise".into()), ..registration("a") }, "username"),
            (RegisterInput { email: Some("no-at-sign".into()), ..registration("a") }, "email"),
            (RegisterInput { email: Some("@example.com".into()), ..registration("a") }, "email"),
            (RegisterInput { password: Some("short".into()), ..registration("a") }, "password"),
            (RegisterInput { password: None, ..registration("a") }, "password"),
        ];

        for (mut input, expected) in cases {
            input.avatar = Some(AvatarUpload {
                file_name: "x.png".into(),
                content_type: "image/png".into(),
                data: vec![0],
            });
            match service.register(input).await {
                Err(UserServiceError::ValidationError { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected validation error on {}, got {:?}", expected, other),
            }
        }

        assert_eq!(user_count(&pool).await, 0);
        assert!(avatars.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let (_pool, service, _) = setup().await;
        let user = service.register(registration("alice")).await.unwrap();

        let (session, logged_in) = service.login(login_as("alice")).await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_email_is_case_insensitive() {
        let (_pool, service, _) = setup().await;
        service.register(registration("alice")).await.unwrap();

        let mut input = login_as("alice");
        input.email = Some("Alice@Example.COM".to_string());
        assert!(service.login(input).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_failures() {
        let (_pool, service, _) = setup().await;
        service.register(registration("alice")).await.unwrap();

        let mut wrong = login_as("alice");
        wrong.password = Some("password124".to_string());
        assert!(matches!(service.login(wrong).await, Err(UserServiceError::AuthenticationError(_))));

        assert!(matches!(
            service.login(login_as("nobody")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));

        let missing = LoginInput { email: None, password: Some("password123".into()) };
        assert!(matches!(
            service.login(missing).await,
            Err(UserServiceError::ValidationError { field: "email", .. })
        ));
    }

    #[tokio::test]
    async fn test_block_requires_admin() {
        let (_pool, service, _) = setup().await;
        service.register(registration("admin")).await.unwrap();
        let bob = service.register(registration("bob")).await.unwrap();
        service.register(registration("carol")).await.unwrap();

        let result = service.toggle_block(&bob, "carol").await;
        assert!(matches!(result, Err(UserServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_block_unknown_username() {
        let (_pool, service, _) = setup().await;
        let admin = service.register(registration("admin")).await.unwrap();

        let result = service.toggle_block(&admin, "ghost").await;
        assert!(matches!(result, Err(UserServiceError::UsernameNotFound(name)) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_block_revokes_sessions_and_prevents_login() {
        let (_pool, service, _) = setup().await;
        let admin = service.register(registration("admin")).await.unwrap();
        service.register(registration("bob")).await.unwrap();
        let (session, _) = service.login(login_as("bob")).await.unwrap();

        let blocked = service.toggle_block(&admin, "bob").await.unwrap();
        assert!(blocked.is_blocked);
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(matches!(
            service.login(login_as("bob")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));

        let unblocked = service.toggle_block(&admin, "bob").await.unwrap();
        assert!(!unblocked.is_blocked);
        assert!(service.login(login_as("bob")).await.is_ok());
    }

    #[tokio::test]
    async fn test_admin_cannot_block_self() {
        let (_pool, service, _) = setup().await;
        let admin = service.register(registration("admin")).await.unwrap();
        assert!(matches!(
            service.toggle_block(&admin, "admin").await,
            Err(UserServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_search() {
        let (_pool, service, _) = setup().await;
        service.register(registration("Alice")).await.unwrap();
        service.register(registration("bob")).await.unwrap();

        let found = service.search("  aLi ").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "Alice");
    }

    #[test]
    fn test_avatar_error_mapping() {
        let err: UserServiceError = AvatarError::TooLarge { max: 10 }.into();
        assert!(matches!(err, UserServiceError::ValidationError { field: "avatar", .. }));

        let err: UserServiceError = AvatarError::Io(anyhow::anyhow!("disk full")).into();
        assert!(matches!(err, UserServiceError::InternalError(_)));
    }
}
