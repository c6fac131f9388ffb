//! Data models
//!
//! Plain serde structs shared by the repositories, services and handlers.

mod page;
mod post;
mod session;
mod tag;
mod user;

pub use page::{Page, UpdatePageInput};
pub use post::{CreatePostInput, Post, UpdatePostInput};
pub use session::Session;
pub use tag::{AttachTagInput, Tag};
pub use user::{AvatarUpload, LoginInput, RegisterInput, User, UserRole};
