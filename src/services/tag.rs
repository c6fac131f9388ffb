//! Tag service
//!
//! Tags are attached to pages by name; an existing tag with the same name is
//! reused. Listing follows the page visibility rule.

use crate::db::repositories::TagRepository;
use crate::models::{Tag, User};
use crate::services::page::{ContentError, PageService};
use anyhow::Context;
use std::sync::Arc;

pub const MAX_TAG_LENGTH: usize = 50;

pub struct TagService {
    pages: Arc<PageService>,
    tag_repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(pages: Arc<PageService>, tag_repo: Arc<dyn TagRepository>) -> Self {
        Self { pages, tag_repo }
    }

    /// Tags of a page, by name
    pub async fn list(&self, viewer: &User, page_id: i64) -> Result<Vec<Tag>, ContentError> {
        let page = self.pages.readable_page(viewer, page_id).await?;
        Ok(self
            .tag_repo
            .list_by_page(page.id)
            .await
            .context("Failed to list tags")?)
    }

    pub async fn attach(&self, viewer: &User, page_id: i64, name: &str) -> Result<Tag, ContentError> {
        let page = self.pages.owned_page(viewer, page_id).await?;
        let name = normalize_tag_name(name)?;

        let tag = self
            .tag_repo
            .get_or_create(&name)
            .await
            .context("Failed to create tag")?;
        self.tag_repo
            .attach(page.id, tag.id)
            .await
            .context("Failed to attach tag")?;
        Ok(tag)
    }

    pub async fn detach(&self, viewer: &User, page_id: i64, tag_id: i64) -> Result<(), ContentError> {
        let page = self.pages.owned_page(viewer, page_id).await?;
        let detached = self
            .tag_repo
            .detach(page.id, tag_id)
            .await
            .context("Failed to detach tag")?;
        if detached {
            Ok(())
        } else {
            Err(ContentError::NotFound("Tag".into()))
        }
    }
}

fn normalize_tag_name(name: &str) -> Result<String, ContentError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ContentError::invalid("name", "This field may not be blank"));
    }
    if name.chars().count() > MAX_TAG_LENGTH {
        return Err(ContentError::invalid(
            "name",
            format!("Must be at most {} characters", MAX_TAG_LENGTH),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use crate::services::testing::Harness;

    fn service(h: &Harness) -> TagService {
        let pages = Arc::new(PageService::new(h.pages.clone(), h.users.clone()));
        TagService::new(pages, h.tags.clone())
    }

    #[tokio::test]
    async fn test_attach_reuses_tags_across_pages() {
        let h = Harness::new().await;
        let svc = service(&h);
        let (alice, alice_page) = h.user("alice", UserRole::User).await;
        let (bob, bob_page) = h.user("bob", UserRole::User).await;

        let a = svc.attach(&alice, alice_page.id, " rust ").await.unwrap();
        let b = svc.attach(&bob, bob_page.id, "rust").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.name, "rust");
    }

    #[tokio::test]
    async fn test_list_sorted_and_detach() {
        let h = Harness::new().await;
        let svc = service(&h);
        let (alice, page) = h.user("alice", UserRole::User).await;

        let zed = svc.attach(&alice, page.id, "zed").await.unwrap();
        svc.attach(&alice, page.id, "async").await.unwrap();

        let names: Vec<String> = svc.list(&alice, page.id).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["async", "zed"]);

        svc.detach(&alice, page.id, zed.id).await.unwrap();
        assert!(matches!(svc.detach(&alice, page.id, zed.id).await, Err(ContentError::NotFound(_))));
        assert_eq!(svc.list(&alice, page.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_only_owner_attaches() {
        let h = Harness::new().await;
        let svc = service(&h);
        let (_, page) = h.user("alice", UserRole::User).await;
        let (bob, _) = h.user("bob", UserRole::User).await;

        assert!(matches!(svc.attach(&bob, page.id, "spam").await, Err(ContentError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let h = Harness::new().await;
        let svc = service(&h);
        let (alice, page) = h.user("alice", UserRole::User).await;

        assert!(matches!(
            svc.attach(&alice, page.id, "  ").await,
            Err(ContentError::ValidationError { field: "name", .. })
        ));
    }
}
