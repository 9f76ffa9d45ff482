//! Comment and platform capability contracts.
//!
//! These traits define what the reconciliation engine needs from a platform:
//! - `Comment`: a platform comment as seen by the engine
//! - `PlatformHandler`: the primitive find/create/update/delete/hide calls
//!
//! Each platform provides its own implementation of both. The engine never
//! inspects platform-specific fields; backends recover their own comment type
//! with [`downcast_comment`].

pub mod handler;
pub mod marker;

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;

use crate::error::{CompostError, Result};

pub use handler::{
    CommentHandler, DeleteAndNewOutcome, HideAndNewOutcome, UpdateOutcome, DEFAULT_TAG,
};
pub use marker::{has_tag, render, tag_marker};

/// A comment on a pull/merge request or commit.
pub trait Comment: fmt::Debug + Send + Sync {
    /// Body as stored on the platform.
    fn body(&self) -> &str;

    /// Stable reference, usually the URL of the comment's HTML page.
    fn reference(&self) -> &str;

    /// True if the comment is hidden or minimized.
    fn is_hidden(&self) -> bool;

    /// Recency ordering against a comment of the same variant.
    ///
    /// `Ordering::Less` means `self` sorts first, i.e. is more recent.
    /// Comments of a different variant compare as `Equal`.
    fn recency_cmp(&self, other: &dyn Comment) -> Ordering;

    fn as_any(&self) -> &dyn Any;
}

/// Recover a backend's concrete comment type.
pub fn downcast_comment<'a, T: Comment + 'static>(
    comment: &'a dyn Comment,
    expected: &'static str,
) -> Result<&'a T> {
    comment
        .as_any()
        .downcast_ref::<T>()
        .ok_or(CompostError::CommentMismatch { expected })
}

/// Platform-specific comment API calls.
///
/// Guarantees expected by the engine:
/// - `find_matching_comments(tag)` returns exactly the comments whose body
///   contains [`tag_marker`]`(tag)`, in any order.
/// - `hide_comment` returns `CompostError::NotImplemented` when the platform
///   cannot hide comments, and so does `check_hide_supported`.
#[async_trait]
pub trait PlatformHandler: Send + Sync {
    /// Fails with `CompostError::NotImplemented` if `hide_comment` can never
    /// succeed on this platform. Makes no network calls.
    fn check_hide_supported(&self) -> Result<()> {
        Ok(())
    }

    async fn find_matching_comments(&self, tag: &str) -> Result<Vec<Box<dyn Comment>>>;

    async fn create_comment(&self, body: &str) -> Result<Box<dyn Comment>>;

    async fn update_comment(&self, comment: &dyn Comment, body: &str) -> Result<()>;

    async fn delete_comment(&self, comment: &dyn Comment) -> Result<()>;

    async fn hide_comment(&self, comment: &dyn Comment) -> Result<()>;
}
