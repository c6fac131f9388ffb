//! Avatar storage
//!
//! Registration hands the uploaded file to an [`AvatarStore`] and keeps the
//! URL it returns. The shipped implementation writes into the configured
//! upload directory, which the router serves statically.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::models::AvatarUpload;

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("Unsupported avatar type: {0}")]
    UnsupportedType(String),

    #[error("Avatar too large: maximum is {max} bytes")]
    TooLarge { max: u64 },

    #[error("Avatar file is empty")]
    Empty,

    #[error("Failed to store avatar: {0}")]
    Io(#[from] anyhow::Error),
}

/// Storage port for avatar images
#[async_trait]
pub trait AvatarStore: Send + Sync {
    /// Persist the file and return its public URL
    async fn store(&self, upload: &AvatarUpload) -> Result<String, AvatarError>;

    /// Remove a previously stored file; unknown URLs are ignored
    async fn discard(&self, url: &str);
}

/// Stores avatars under `<upload.path>/avatars`
pub struct LocalAvatarStore {
    config: UploadConfig,
}

impl LocalAvatarStore {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    fn dir(&self) -> PathBuf {
        self.config.path.join("avatars")
    }

    fn url_prefix(&self) -> String {
        format!("{}/avatars/", self.config.public_prefix.trim_end_matches('/'))
    }

    fn check(&self, upload: &AvatarUpload) -> Result<(), AvatarError> {
        if !self.config.is_type_allowed(&upload.content_type) {
            return Err(AvatarError::UnsupportedType(upload.content_type.clone()));
        }
        if upload.data.is_empty() {
            return Err(AvatarError::Empty);
        }
        if upload.data.len() as u64 > self.config.max_file_size {
            return Err(AvatarError::TooLarge {
                max: self.config.max_file_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AvatarStore for LocalAvatarStore {
    async fn store(&self, upload: &AvatarUpload) -> Result<String, AvatarError> {
        self.check(upload)?;

        let dir = self.dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {:?}: {}", dir, e))?;

        let file_name = format!(
            "{}.{}",
            Uuid::new_v4().simple(),
            self.config.get_extension(&upload.content_type)
        );
        fs::write(dir.join(&file_name), &upload.data)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", file_name, e))?;

        tracing::debug!(file = %file_name, original = %upload.file_name, size = upload.data.len(), "Stored avatar");
        Ok(format!("{}{}", self.url_prefix(), file_name))
    }

    async fn discard(&self, url: &str) {
        let Some(file_name) = url.strip_prefix(&self.url_prefix()) else {
            return;
        };
        if file_name.is_empty() || file_name.contains('/') || file_name.contains("..") {
            return;
        }
        if let Err(e) = fs::remove_file(self.dir().join(file_name)).await {
            tracing::warn!("Failed to remove avatar {}: {}", file_name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LocalAvatarStore {
        LocalAvatarStore::new(UploadConfig {
            path: dir.path().to_path_buf(),
            max_file_size: 16,
            ..UploadConfig::default()
        })
    }

    fn png(bytes: usize) -> AvatarUpload {
        AvatarUpload {
            file_name: "me.png".to_string(),
            content_type: "image/png".to_string(),
            data: vec![7u8; bytes],
        }
    }

    #[tokio::test]
    async fn test_store_writes_file_and_returns_url() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let url = store.store(&png(8)).await.unwrap();
        assert!(url.starts_with("/uploads/avatars/"));
        assert!(url.ends_with(".png"));

        let file_name = url.trim_start_matches("/uploads/avatars/");
        let written = std::fs::read(dir.path().join("avatars").join(file_name)).unwrap();
        assert_eq!(written.len(), 8);

        store.discard(&url).await;
        assert!(!dir.path().join("avatars").join(file_name).exists());
    }

    #[tokio::test]
    async fn test_store_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        assert!(matches!(store.store(&png(17)).await, Err(AvatarError::TooLarge { max: 16 })));
        assert!(matches!(store.store(&png(0)).await, Err(AvatarError::Empty)));

        let mut exe = png(4);
        exe.content_type = "application/x-msdownload".to_string();
        assert!(matches!(store.store(&exe).await, Err(AvatarError::UnsupportedType(_))));

        assert!(!dir.path().join("avatars").exists());
    }

    #[tokio::test]
    async fn test_discard_ignores_foreign_urls() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.discard("https://elsewhere.example/a.png").await;
        store.discard("/uploads/avatars/../config.yml").await;
    }
}
