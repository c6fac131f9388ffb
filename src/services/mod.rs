//! Services layer
//!
//! Business rules sit here, between the HTTP handlers and the repositories.
//! Each service returns its own `thiserror` enum; the API layer maps those
//! onto HTTP responses.

pub mod avatar;
pub mod page;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod relationship;
pub mod tag;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use avatar::{AvatarError, AvatarStore, LocalAvatarStore};
pub use page::{ContentError, PageService};
pub use password::{hash_password, verify_password};
pub use post::PostService;
pub use rate_limiter::LoginRateLimiter;
pub use relationship::{
    FollowAction, FollowOutcome, RelationshipError, RelationshipService, RelationshipView,
};
pub use tag::TagService;
pub use user::{UserService, UserServiceError};
