//! Page model
//!
//! Each user owns one page. Posts and tags hang off the page, and the page
//! carries the follow relationships: confirmed followers, and pending follow
//! requests when the page is private.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    /// Private pages queue follow requests for owner approval
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    /// Default page created together with a new account
    pub fn for_owner(owner_id: i64, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            owner_id,
            name,
            description: String::new(),
            is_private: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }
}

/// Partial update of a page; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePageInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: Option<bool>,
}

impl UpdatePageInput {
    pub fn apply(&self, page: &mut Page) {
        if let Some(name) = &self.name {
            page.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            page.description = description.clone();
        }
        if let Some(is_private) = self.is_private {
            page.is_private = is_private;
        }
    }
}
