//! Compost Core
//!
//! Keeps a single status comment up to date on a pull/merge request or
//! commit. The crate provides:
//!
//! - the `Comment` / `PlatformHandler` capability traits every platform
//!   backend implements
//! - `CommentHandler`, the reconciliation engine (update, new, hide-and-new,
//!   delete-and-new, latest)
//! - `PlatformRegistry`, mapping (platform, target type) to handler factories
//! - `DetectorRegistry` and the GitHub Actions / GitLab CI detectors

pub mod comment;
pub mod detect;
pub mod error;
pub mod fakes;
pub mod registry;
pub mod target;

pub use comment::{
    downcast_comment, has_tag, render, tag_marker, Comment, CommentHandler, DeleteAndNewOutcome,
    HideAndNewOutcome, PlatformHandler, UpdateOutcome, DEFAULT_TAG,
};
pub use detect::{
    DetectOptions, DetectResult, Detector, DetectorRegistry, Env, GitHubActionsDetector,
    GitLabCiDetector, ProcessEnv,
};
pub use error::{CompostError, Result};
pub use registry::{HandlerRequest, PlatformHandlerFactory, PlatformRegistry};
pub use target::{parse_platform, PlatformCredentials, TargetType, GITHUB, GITLAB};
