//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post published on a page, optionally replying to another post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub page_id: i64,
    pub content: String,
    pub reply_to: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn new(page_id: i64, content: String, reply_to: Option<i64>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            page_id,
            content,
            reply_to,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub content: String,
    #[serde(default)]
    pub reply_to: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePostInput {
    pub content: String,
}
