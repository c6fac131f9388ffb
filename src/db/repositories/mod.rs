//! Database repositories
//!
//! One persistence port per entity, each with an SQLx implementation that
//! dispatches on the configured driver.

pub mod page;
pub mod post;
pub mod session;
pub mod tag;
pub mod user;

pub use page::{Membership, PageRepository, SqlxPageRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{escape_like, SqlxUserRepository, UserRepository};
