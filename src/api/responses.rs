//! Shared API response types
//!
//! Handlers never serialize models directly; these shapes keep private
//! fields (password hashes, emails of other users) out of responses.

use serde::Serialize;

use crate::models::{Page, Post, Tag, User};
use crate::services::{FollowOutcome, RelationshipView};

/// Full user record, only ever shown to the user themselves or to admins
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub avatar_url: Option<String>,
    pub is_blocked: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.to_string(),
            avatar_url: user.avatar_url,
            is_blocked: user.is_blocked,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Public view of a user, used in search results and follower lists
#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            avatar_url: user.avatar_url,
        }
    }
}

/// One of the two membership lists of a page
#[derive(Debug, Serialize)]
pub struct RelationshipResponse {
    pub view: RelationshipView,
    pub users: Vec<UserSummary>,
}

impl RelationshipResponse {
    pub fn new(view: RelationshipView, users: Vec<User>) -> Self {
        Self {
            view,
            users: users.into_iter().map(UserSummary::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub status: FollowOutcome,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub fn success() -> Self {
        Self { message: "success" }
    }
}

#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub is_private: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Page> for PageResponse {
    fn from(page: Page) -> Self {
        Self {
            id: page.id,
            owner_id: page.owner_id,
            name: page.name,
            description: page.description,
            is_private: page.is_private,
            created_at: page.created_at.to_rfc3339(),
            updated_at: page.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub page_id: i64,
    pub content: String,
    pub reply_to: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id,
            page_id: post.page_id,
            content: post.content,
            reply_to: post.reply_to,
            created_at: post.created_at.to_rfc3339(),
            updated_at: post.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub id: i64,
    pub name: String,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
        }
    }
}

/// Convert a list of models into their response shapes
pub fn render<T, R: From<T>>(items: Vec<T>) -> Vec<R> {
    items.into_iter().map(R::from).collect()
}
