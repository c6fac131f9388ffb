//! Follow relationships between users and pages
//!
//! Following a public page adds the caller to its followers straight away.
//! Following a private page queues a follow request that the page owner
//! accepts or rejects, in batches, by username.
//!
//! Batches are all-or-nothing: every username is resolved before anything is
//! written, and the writes of one batch share a transaction.

use crate::db::repositories::{Membership, PageRepository, UserRepository};
use crate::models::{Page, User};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Operations on the caller's own page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowAction {
    ListFollowers,
    ListFollowRequests,
    AcceptRequests,
    RejectRequests,
}

impl FollowAction {
    /// The relationship set rendered after the action
    pub fn view(self) -> RelationshipView {
        match self {
            FollowAction::ListFollowers | FollowAction::AcceptRequests => RelationshipView::Followers,
            FollowAction::ListFollowRequests | FollowAction::RejectRequests => {
                RelationshipView::FollowRequests
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipView {
    Followers,
    FollowRequests,
}

impl From<RelationshipView> for Membership {
    fn from(view: RelationshipView) -> Self {
        match view {
            RelationshipView::Followers => Membership::Followers,
            RelationshipView::FollowRequests => Membership::FollowRequests,
        }
    }
}

/// Result of a follow request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowOutcome {
    /// Queued on a private page
    Requested,
    Following,
}

#[derive(Debug, thiserror::Error)]
pub enum RelationshipError {
    #[error("You cannot follow yourself")]
    SelfFollow,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Page not found")]
    PageNotFound,

    #[error("Invalid {field}: {message}")]
    ValidationError { field: &'static str, message: String },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct RelationshipService {
    page_repo: Arc<dyn PageRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl RelationshipService {
    pub fn new(page_repo: Arc<dyn PageRepository>, user_repo: Arc<dyn UserRepository>) -> Self {
        Self {
            page_repo,
            user_repo,
        }
    }

    /// Follow the page of `target_username`, or ask to when it is private
    pub async fn send_follow_request(
        &self,
        current: &User,
        target_username: &str,
    ) -> Result<FollowOutcome, RelationshipError> {
        let target_username = target_username.trim();
        if target_username.is_empty() {
            return Err(RelationshipError::ValidationError {
                field: "username",
                message: "This field is required".into(),
            });
        }

        let target = self.find_user(target_username).await?;
        if target.id == current.id {
            return Err(RelationshipError::SelfFollow);
        }
        if target.is_blocked && !current.is_staff() {
            return Err(RelationshipError::Forbidden(format!(
                "User '{}' is blocked",
                target.username
            )));
        }

        let page = self.page_of(&target).await?;
        let already_following = self
            .page_repo
            .is_member(page.id, current.id, Membership::Followers)
            .await
            .context("Failed to check follower")?;
        if already_following {
            return Ok(FollowOutcome::Following);
        }

        let outcome = if page.is_private {
            self.page_repo
                .add_member(page.id, current.id, Membership::FollowRequests)
                .await
                .context("Failed to record follow request")?;
            FollowOutcome::Requested
        } else {
            // A request left over from when the page was private goes away here
            self.page_repo
                .follow(page.id, current.id)
                .await
                .context("Failed to record follow")?;
            FollowOutcome::Following
        };

        tracing::debug!(page_id = page.id, follower = current.id, ?outcome, "Follow request");
        Ok(outcome)
    }

    pub async fn list_followers(&self, page: &Page) -> Result<Vec<User>, RelationshipError> {
        self.members(page, RelationshipView::Followers).await
    }

    pub async fn list_follow_requests(&self, page: &Page) -> Result<Vec<User>, RelationshipError> {
        self.members(page, RelationshipView::FollowRequests).await
    }

    /// Promote pending requesters to followers; returns the followers
    pub async fn accept_follow_requests(
        &self,
        page: &Page,
        usernames: &[String],
    ) -> Result<Vec<User>, RelationshipError> {
        let ids = self.resolve_usernames(usernames).await?;
        let promoted = self
            .page_repo
            .accept_follow_requests(page.id, &ids)
            .await
            .context("Failed to accept follow requests")?;
        tracing::info!(page_id = page.id, promoted, "Accepted follow requests");
        self.list_followers(page).await
    }

    /// Drop pending requests; returns the remaining requests
    pub async fn reject_follow_requests(
        &self,
        page: &Page,
        usernames: &[String],
    ) -> Result<Vec<User>, RelationshipError> {
        let ids = self.resolve_usernames(usernames).await?;
        let removed = self
            .page_repo
            .reject_follow_requests(page.id, &ids)
            .await
            .context("Failed to reject follow requests")?;
        tracing::info!(page_id = page.id, removed, "Rejected follow requests");
        self.list_follow_requests(page).await
    }

    /// Run an action against the caller's own page and render its view
    pub async fn apply(
        &self,
        current: &User,
        action: FollowAction,
        usernames: &[String],
    ) -> Result<Vec<User>, RelationshipError> {
        let page = self.page_of(current).await?;
        match action {
            FollowAction::ListFollowers => self.list_followers(&page).await,
            FollowAction::ListFollowRequests => self.list_follow_requests(&page).await,
            FollowAction::AcceptRequests => self.accept_follow_requests(&page, usernames).await,
            FollowAction::RejectRequests => self.reject_follow_requests(&page, usernames).await,
        }
    }

    async fn members(&self, page: &Page, view: RelationshipView) -> Result<Vec<User>, RelationshipError> {
        Ok(self
            .page_repo
            .list_members(page.id, view.into())
            .await
            .context("Failed to list page members")?)
    }

    async fn find_user(&self, username: &str) -> Result<User, RelationshipError> {
        self.user_repo
            .get_by_username(username)
            .await
            .context("Failed to look up user")?
            .ok_or_else(|| RelationshipError::UserNotFound(username.to_string()))
    }

    async fn page_of(&self, user: &User) -> Result<Page, RelationshipError> {
        self.page_repo
            .get_by_owner(user.id)
            .await
            .context("Failed to get page")?
            .ok_or(RelationshipError::PageNotFound)
    }

    /// Resolve every username before any write; the first miss fails the batch
    async fn resolve_usernames(&self, usernames: &[String]) -> Result<Vec<i64>, RelationshipError> {
        let mut ids = Vec::with_capacity(usernames.len());
        for username in usernames {
            let user = self.find_user(username.trim()).await?;
            if !ids.contains(&user.id) {
                ids.push(user.id);
            }
        }
        Ok(ids)
    }
}
