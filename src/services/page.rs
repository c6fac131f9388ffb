//! Page service
//!
//! Reads and owner updates of pages, plus the visibility rule the post and
//! tag services build on:
//!
//! - admins and moderators see every page and its content
//! - a page whose owner is blocked is hidden from everyone else
//! - the posts and tags of a private page are visible only to its owner and
//!   its followers

use crate::db::repositories::{Membership, PageRepository, UserRepository};
use crate::models::{Page, UpdatePageInput, User};
use anyhow::Context;
use std::sync::Arc;

pub const MAX_PAGE_NAME_LENGTH: usize = 80;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Errors shared by the page, post and tag services
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid {field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl ContentError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field,
            message: message.into(),
        }
    }
}

pub struct PageService {
    page_repo: Arc<dyn PageRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl PageService {
    pub fn new(page_repo: Arc<dyn PageRepository>, user_repo: Arc<dyn UserRepository>) -> Self {
        Self {
            page_repo,
            user_repo,
        }
    }

    /// Pages the viewer may see; blocked owners' pages only for staff
    pub async fn list(&self, viewer: &User) -> Result<Vec<Page>, ContentError> {
        Ok(self
            .page_repo
            .list(viewer.is_staff())
            .await
            .context("Failed to list pages")?)
    }

    pub async fn get(&self, viewer: &User, id: i64) -> Result<Page, ContentError> {
        let page = self.find(id).await?;
        self.ensure_visible(viewer, &page).await?;
        Ok(page)
    }

    /// The viewer's own page
    pub async fn own_page(&self, viewer: &User) -> Result<Page, ContentError> {
        self.page_repo
            .get_by_owner(viewer.id)
            .await
            .context("Failed to get own page")?
            .ok_or_else(|| ContentError::NotFound("Page".into()))
    }

    pub async fn update(&self, viewer: &User, id: i64, input: UpdatePageInput) -> Result<Page, ContentError> {
        let mut page = self.owned_page(viewer, id).await?;

        if let Some(name) = &input.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ContentError::invalid("name", "This field may not be blank"));
            }
            if name.chars().count() > MAX_PAGE_NAME_LENGTH {
                return Err(ContentError::invalid(
                    "name",
                    format!("Must be at most {} characters", MAX_PAGE_NAME_LENGTH),
                ));
            }
        }
        if let Some(description) = &input.description {
            if description.chars().count() > MAX_DESCRIPTION_LENGTH {
                return Err(ContentError::invalid(
                    "description",
                    format!("Must be at most {} characters", MAX_DESCRIPTION_LENGTH),
                ));
            }
        }

        let was_private = page.is_private;
        input.apply(&mut page);
        let updated = self.page_repo.update(&page).await.context("Failed to update page")?;
        tracing::debug!(page_id = updated.id, is_private = updated.is_private, "Updated page");

        if was_private && !updated.is_private {
            self.promote_pending_requests(&updated).await?;
        }
        Ok(updated)
    }

    /// Turn every pending requester of a page that went public into a follower
    async fn promote_pending_requests(&self, page: &Page) -> Result<(), ContentError> {
        let pending: Vec<i64> = self
            .page_repo
            .list_members(page.id, Membership::FollowRequests)
            .await
            .context("Failed to list follow requests")?
            .into_iter()
            .map(|user| user.id)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let promoted = self
            .page_repo
            .accept_follow_requests(page.id, &pending)
            .await
            .context("Failed to promote follow requests")?;
        tracing::info!(page_id = page.id, promoted, "Page made public, pending requests accepted");
        Ok(())
    }

    /// A page whose posts and tags the viewer may read
    pub async fn readable_page(&self, viewer: &User, id: i64) -> Result<Page, ContentError> {
        let page = self.get(viewer, id).await?;
        if !page.is_private || page.is_owned_by(viewer.id) || viewer.is_staff() {
            return Ok(page);
        }

        let follows = self
            .page_repo
            .is_member(page.id, viewer.id, Membership::Followers)
            .await
            .context("Failed to check follower")?;
        if follows {
            Ok(page)
        } else {
            Err(ContentError::Forbidden("This page is private".into()))
        }
    }

    /// A page the viewer owns, for writes
    pub async fn owned_page(&self, viewer: &User, id: i64) -> Result<Page, ContentError> {
        let page = self.find(id).await?;
        if page.is_owned_by(viewer.id) {
            Ok(page)
        } else {
            Err(ContentError::Forbidden("Only the page owner may do this".into()))
        }
    }

    async fn find(&self, id: i64) -> Result<Page, ContentError> {
        self.page_repo
            .get_by_id(id)
            .await
            .context("Failed to get page")?
            .ok_or_else(|| ContentError::NotFound("Page".into()))
    }

    async fn ensure_visible(&self, viewer: &User, page: &Page) -> Result<(), ContentError> {
        if viewer.is_staff() || page.is_owned_by(viewer.id) {
            return Ok(());
        }
        let owner_blocked = self
            .user_repo
            .get_by_id(page.owner_id)
            .await
            .context("Failed to get page owner")?
            .map(|owner| owner.is_blocked)
            .unwrap_or(true);
        if owner_blocked {
            Err(ContentError::Forbidden("The owner of this page is blocked".into()))
        } else {
            Ok(())
        }
    }
}
