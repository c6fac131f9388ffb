//! Post service
//!
//! Reading follows the page visibility rule; writing is reserved for the
//! page owner, except that staff may also delete.

use crate::db::repositories::PostRepository;
use crate::models::{CreatePostInput, Post, UpdatePostInput, User};
use crate::services::page::{ContentError, PageService};
use anyhow::Context;
use std::sync::Arc;

pub const MAX_POST_LENGTH: usize = 1000;

pub struct PostService {
    pages: Arc<PageService>,
    post_repo: Arc<dyn PostRepository>,
}

impl PostService {
    pub fn new(pages: Arc<PageService>, post_repo: Arc<dyn PostRepository>) -> Self {
        Self { pages, post_repo }
    }

    /// Posts of a page, newest first
    pub async fn list(&self, viewer: &User, page_id: i64) -> Result<Vec<Post>, ContentError> {
        let page = self.pages.readable_page(viewer, page_id).await?;
        Ok(self
            .post_repo
            .list_by_page(page.id)
            .await
            .context("Failed to list posts")?)
    }

    pub async fn get(&self, viewer: &User, page_id: i64, id: i64) -> Result<Post, ContentError> {
        let page = self.pages.readable_page(viewer, page_id).await?;
        self.find_on_page(page.id, id).await
    }

    pub async fn create(
        &self,
        viewer: &User,
        page_id: i64,
        input: CreatePostInput,
    ) -> Result<Post, ContentError> {
        let page = self.pages.owned_page(viewer, page_id).await?;
        let content = validate_content(&input.content)?;

        if let Some(reply_to) = input.reply_to {
            self.ensure_reply_target(viewer, reply_to).await?;
        }

        let post = self
            .post_repo
            .create(&Post::new(page.id, content, input.reply_to))
            .await
            .context("Failed to create post")?;
        tracing::debug!(page_id = page.id, post_id = post.id, "Created post");
        Ok(post)
    }

    pub async fn update(
        &self,
        viewer: &User,
        page_id: i64,
        id: i64,
        input: UpdatePostInput,
    ) -> Result<Post, ContentError> {
        let page = self.pages.owned_page(viewer, page_id).await?;
        let post = self.find_on_page(page.id, id).await?;
        let content = validate_content(&input.content)?;

        Ok(self
            .post_repo
            .update_content(post.id, &content)
            .await
            .context("Failed to update post")?)
    }

    pub async fn delete(&self, viewer: &User, page_id: i64, id: i64) -> Result<(), ContentError> {
        let page = if viewer.is_staff() {
            self.pages.get(viewer, page_id).await?
        } else {
            self.pages.owned_page(viewer, page_id).await?
        };
        let post = self.find_on_page(page.id, id).await?;

        self.post_repo
            .delete(post.id)
            .await
            .context("Failed to delete post")?;
        tracing::info!(page_id = page.id, post_id = post.id, by = viewer.id, "Deleted post");
        Ok(())
    }

    /// A reply may only point at a post the author can read. Missing and
    /// unreadable posts give the same error.
    async fn ensure_reply_target(&self, viewer: &User, reply_to: i64) -> Result<(), ContentError> {
        let unknown = || ContentError::invalid("reply_to", format!("Post {} does not exist", reply_to));

        let replied = self
            .post_repo
            .get_by_id(reply_to)
            .await
            .context("Failed to look up replied post")?
            .ok_or_else(unknown)?;
        match self.pages.readable_page(viewer, replied.page_id).await {
            Ok(_) => Ok(()),
            Err(ContentError::InternalError(e)) => Err(ContentError::InternalError(e)),
            Err(_) => Err(unknown()),
        }
    }

    async fn find_on_page(&self, page_id: i64, id: i64) -> Result<Post, ContentError> {
        self.post_repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .filter(|post| post.page_id == page_id)
            .ok_or_else(|| ContentError::NotFound("Post".into()))
    }
}

fn validate_content(content: &str) -> Result<String, ContentError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ContentError::invalid("content", "This field may not be blank"));
    }
    if content.chars().count() > MAX_POST_LENGTH {
        return Err(ContentError::invalid(
            "content",
            format!("Must be at most {} characters", MAX_POST_LENGTH),
        ));
    }
    Ok(content.to_string())
}
