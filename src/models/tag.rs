//! Tag model
//!
//! Tags are shared across pages: attaching a tag by name reuses the existing
//! row when one with that name exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    pub fn new(name: String) -> Self {
        Self {
            id: 0,
            name,
            created_at: Utc::now(),
        }
    }
}

/// Request body for attaching a tag to a page
#[derive(Debug, Clone, Deserialize)]
pub struct AttachTagInput {
    pub name: String,
}
