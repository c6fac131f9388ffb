//! Shared fixtures for service tests

use crate::db::repositories::{
    PageRepository, PostRepository, SqlxPageRepository, SqlxPostRepository, SqlxTagRepository,
    SqlxUserRepository, TagRepository, UserRepository,
};
use crate::db::{create_test_pool, migrations};
use crate::models::{AvatarUpload, Page, User, UserRole};
use crate::services::avatar::{AvatarError, AvatarStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Avatar store that keeps URLs in memory
#[derive(Default)]
pub struct MemoryAvatarStore {
    pub stored: Mutex<Vec<String>>,
    pub discarded: Mutex<Vec<String>>,
}

#[async_trait]
impl AvatarStore for MemoryAvatarStore {
    async fn store(&self, upload: &AvatarUpload) -> Result<String, AvatarError> {
        let mut stored = self.stored.lock().unwrap();
        let url = format!("/uploads/avatars/{}-{}", stored.len(), upload.file_name);
        stored.push(url.clone());
        Ok(url)
    }

    async fn discard(&self, url: &str) {
        self.discarded.lock().unwrap().push(url.to_string());
    }
}

/// Migrated in-memory database with the user and content repositories
pub struct Harness {
    pub users: Arc<dyn UserRepository>,
    pub pages: Arc<dyn PageRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub tags: Arc<dyn TagRepository>,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        Self {
            users: SqlxUserRepository::boxed(pool.clone()),
            pages: SqlxPageRepository::boxed(pool.clone()),
            posts: SqlxPostRepository::boxed(pool.clone()),
            tags: SqlxTagRepository::boxed(pool),
        }
    }

    /// Insert a user and its page directly, skipping password hashing
    pub async fn user(&self, username: &str, role: UserRole) -> (User, Page) {
        let user = User::new(
            username.to_string(),
            format!("{}@example.com", username),
            "unused-hash".to_string(),
            role,
        );
        let user = self
            .users
            .create_with_page(&user, &Page::for_owner(0, username.to_string()))
            .await
            .expect("Failed to create user");
        let page = self
            .pages
            .get_by_owner(user.id)
            .await
            .expect("Failed to load page")
            .expect("Page created with user");
        (user, page)
    }

    pub async fn set_private(&self, page: &Page, is_private: bool) -> Page {
        let mut page = page.clone();
        page.is_private = is_private;
        self.pages.update(&page).await.expect("Failed to update page")
    }

    pub async fn set_blocked(&self, user: &User, is_blocked: bool) -> User {
        let mut user = user.clone();
        user.is_blocked = is_blocked;
        self.users.update(&user).await.expect("Failed to update user")
    }
}
