//! Reconciliation engine.
//!
//! `CommentHandler` decides whether to create, update, hide or delete tagged
//! comments, calling the wrapped `PlatformHandler` one step at a time. A
//! failing platform call aborts the operation; steps already applied remotely
//! are not rolled back.

use tracing::info;

use super::marker::render;
use super::{Comment, PlatformHandler};
use crate::error::Result;

/// Tag used when none is configured.
pub const DEFAULT_TAG: &str = "compost-comment";

/// What `update_comment` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// No tagged comment existed, a new one was posted.
    Created { reference: String },
    /// The latest tagged comment was rewritten in place.
    Updated { reference: String },
    /// The latest tagged comment already had the rendered body.
    Unchanged { reference: String },
}

impl UpdateOutcome {
    pub fn reference(&self) -> &str {
        match self {
            UpdateOutcome::Created { reference }
            | UpdateOutcome::Updated { reference }
            | UpdateOutcome::Unchanged { reference } => reference,
        }
    }
}

/// What `hide_and_new_comment` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HideAndNewOutcome {
    pub hidden: usize,
    pub already_hidden: usize,
    pub created: String,
}

/// What `delete_and_new_comment` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteAndNewOutcome {
    pub deleted: usize,
    pub created: String,
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Finds, creates, updates, hides and deletes tagged comments on one target.
pub struct CommentHandler {
    platform: Box<dyn PlatformHandler>,
    tag: String,
}

impl CommentHandler {
    /// Wrap a platform handler. An empty or missing tag uses [`DEFAULT_TAG`].
    pub fn new(platform: Box<dyn PlatformHandler>, tag: Option<&str>) -> Self {
        let tag = tag
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TAG)
            .to_string();
        Self { platform, tag }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    async fn matching_comments(&self) -> Result<Vec<Box<dyn Comment>>> {
        info!("Finding matching comments for tag {}", self.tag);

        let comments = self.platform.find_matching_comments(&self.tag).await?;
        info!(
            "Found {} matching comment{}",
            comments.len(),
            plural(comments.len())
        );

        Ok(comments)
    }

    /// The most recent tagged comment, or `None` if there are none.
    pub async fn latest_matching_comment(&self) -> Result<Option<Box<dyn Comment>>> {
        let mut comments = self.matching_comments().await?;
        comments.sort_by(|a, b| a.recency_cmp(b.as_ref()));
        Ok(comments.into_iter().next())
    }

    /// Make the latest tagged comment carry `body`, creating one if needed.
    ///
    /// Leaves the remote untouched when the stored body already matches.
    pub async fn update_comment(&self, body: &str) -> Result<UpdateOutcome> {
        let rendered = render(body, &self.tag);

        match self.latest_matching_comment().await? {
            Some(latest) if latest.body() == rendered => {
                info!(
                    "Not updating comment since the latest one matches exactly: {}",
                    latest.reference()
                );
                Ok(UpdateOutcome::Unchanged {
                    reference: latest.reference().to_string(),
                })
            }
            Some(latest) => {
                info!("Updating comment {}", latest.reference());
                self.platform
                    .update_comment(latest.as_ref(), &rendered)
                    .await?;
                Ok(UpdateOutcome::Updated {
                    reference: latest.reference().to_string(),
                })
            }
            None => {
                info!("Creating new comment");
                let created = self.platform.create_comment(&rendered).await?;
                info!("Created new comment {}", created.reference());
                Ok(UpdateOutcome::Created {
                    reference: created.reference().to_string(),
                })
            }
        }
    }

    /// Post `body` as-is, without the tag marker.
    pub async fn new_comment(&self, body: &str) -> Result<Box<dyn Comment>> {
        info!("Creating new comment");
        let created = self.platform.create_comment(body).await?;
        info!("Created new comment {}", created.reference());
        Ok(created)
    }

    /// Hide every visible tagged comment, then post `body`.
    ///
    /// Fails before touching the platform if it cannot hide comments.
    pub async fn hide_and_new_comment(&self, body: &str) -> Result<HideAndNewOutcome> {
        self.platform.check_hide_supported()?;
        let comments = self.matching_comments().await?;
        let (already_hidden, hidden) = self.hide_comments(&comments).await?;
        let created = self.new_comment(body).await?;

        Ok(HideAndNewOutcome {
            hidden,
            already_hidden,
            created: created.reference().to_string(),
        })
    }

    /// Returns (already hidden, newly hidden).
    async fn hide_comments(&self, comments: &[Box<dyn Comment>]) -> Result<(usize, usize)> {
        let visible: Vec<&dyn Comment> = comments
            .iter()
            .map(|c| &**c)
            .filter(|c| !c.is_hidden())
            .collect();
        let already_hidden = comments.len() - visible.len();

        if already_hidden > 0 {
            info!(
                "{} comment{} already hidden",
                already_hidden,
                if already_hidden == 1 { " is" } else { "s are" }
            );
        }
        info!("Hiding {} comment{}", visible.len(), plural(visible.len()));

        for comment in &visible {
            info!("Hiding comment {}", comment.reference());
            self.platform.hide_comment(*comment).await?;
        }

        Ok((already_hidden, visible.len()))
    }

    /// Delete every tagged comment, hidden or not, then post `body`.
    pub async fn delete_and_new_comment(&self, body: &str) -> Result<DeleteAndNewOutcome> {
        let comments = self.matching_comments().await?;

        info!("Deleting {} comment{}", comments.len(), plural(comments.len()));
        for comment in &comments {
            info!("Deleting comment {}", comment.reference());
            self.platform.delete_comment(&**comment).await?;
        }

        let created = self.new_comment(body).await?;
        Ok(DeleteAndNewOutcome {
            deleted: comments.len(),
            created: created.reference().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryPlatform;

    #[test]
    fn test_empty_tag_falls_back_to_default() {
        let platform = MemoryPlatform::new();
        assert_eq!(
            CommentHandler::new(Box::new(platform.clone()), Some("")).tag(),
            DEFAULT_TAG
        );
        assert_eq!(
            CommentHandler::new(Box::new(platform.clone()), None).tag(),
            DEFAULT_TAG
        );
        assert_eq!(
            CommentHandler::new(Box::new(platform), Some("infracost")).tag(),
            "infracost"
        );
    }

    #[tokio::test]
    async fn test_update_creates_rendered_body_when_none_match() {
        let platform = MemoryPlatform::new();
        let handler = CommentHandler::new(Box::new(platform.clone()), None);

        let outcome = handler.update_comment("hello").await.unwrap();

        assert!(matches!(outcome, UpdateOutcome::Created { .. }));
        let bodies = platform.bodies();
        assert_eq!(bodies, vec![render("hello", DEFAULT_TAG)]);
    }

    #[tokio::test]
    async fn test_new_comment_posts_body_verbatim() {
        let platform = MemoryPlatform::new();
        let handler = CommentHandler::new(Box::new(platform.clone()), None);

        handler.new_comment("plain").await.unwrap();

        assert_eq!(platform.bodies(), vec!["plain".to_string()]);
        assert_eq!(platform.calls().create, 1);
    }

    #[tokio::test]
    async fn test_update_only_touches_latest() {
        let platform = MemoryPlatform::new();
        let old = platform.seed(&render("old", DEFAULT_TAG), false);
        let newest = platform.seed(&render("newer", DEFAULT_TAG), false);
        let handler = CommentHandler::new(Box::new(platform.clone()), None);

        let outcome = handler.update_comment("latest").await.unwrap();

        assert_eq!(
            outcome,
            UpdateOutcome::Updated {
                reference: newest.clone()
            }
        );
        assert_eq!(platform.body_of(&old).unwrap(), render("old", DEFAULT_TAG));
        assert_eq!(
            platform.body_of(&newest).unwrap(),
            render("latest", DEFAULT_TAG)
        );
    }

    #[tokio::test]
    async fn test_hide_failure_aborts_before_create() {
        let platform = MemoryPlatform::without_hide();
        platform.seed(&render("x", DEFAULT_TAG), false);
        let handler = CommentHandler::new(Box::new(platform.clone()), None);

        let err = handler.hide_and_new_comment("y").await.unwrap_err();

        assert!(err.is_not_implemented());
        assert_eq!(platform.calls().create, 0);
    }

    #[tokio::test]
    async fn test_find_failure_is_surfaced() {
        let platform = MemoryPlatform::new();
        platform.fail_next_find("rate limited");
        let handler = CommentHandler::new(Box::new(platform.clone()), None);

        let err = handler.delete_and_new_comment("y").await.unwrap_err();

        assert!(err.to_string().contains("rate limited"));
        assert_eq!(platform.calls().create, 0);
    }
}
