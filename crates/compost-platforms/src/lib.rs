//! Compost Platforms
//!
//! GitHub and GitLab implementations of `PlatformHandler`, plus
//! `register_platforms` to install their factories into a `PlatformRegistry`.

mod http;

pub mod github;
pub mod gitlab;

use compost_core::{PlatformHandler, PlatformRegistry, TargetType, GITHUB, GITLAB};

pub use github::{GitHubComment, GitHubHandler};
pub use gitlab::{GitLabHandler, GitLabNote};

/// Register the GitHub and GitLab factories for both target types.
pub fn register_platforms(registry: &mut PlatformRegistry) {
    registry
        .register(GITHUB, TargetType::PullRequest, |req| {
            Ok(Box::new(GitHubHandler::pull_request(req)?) as Box<dyn PlatformHandler>)
        })
        .register(GITHUB, TargetType::Commit, |req| {
            Ok(Box::new(GitHubHandler::commit(req)?) as Box<dyn PlatformHandler>)
        })
        .register(GITLAB, TargetType::PullRequest, |req| {
            Ok(Box::new(GitLabHandler::merge_request(req)?) as Box<dyn PlatformHandler>)
        })
        .register(GITLAB, TargetType::Commit, |req| {
            Ok(Box::new(GitLabHandler::commit(req)?) as Box<dyn PlatformHandler>)
        });
}
