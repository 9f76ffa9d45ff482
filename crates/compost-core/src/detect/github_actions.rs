//! GitHub Actions detector.

use std::path::Path;

use serde::Deserialize;

use super::env::{expect_var, optional_var, require_var};
use super::{resolve_target, DetectOptions, DetectResult, Detector, Env};
use crate::error::{CompostError, Result};
use crate::target::{PlatformCredentials, GITHUB};

/// The parts of `$GITHUB_EVENT_PATH` the detector reads.
#[derive(Debug, Default, Deserialize)]
struct EventPayload {
    pull_request: Option<PullRequestEvent>,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    number: Option<u64>,
    head: Option<HeadRef>,
}

#[derive(Debug, Deserialize)]
struct HeadRef {
    sha: Option<String>,
}

impl EventPayload {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| {
            CompostError::Detection(format!(
                "failed to read GitHub event payload {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_slice(&content).map_err(|e| {
            CompostError::Detection(format!(
                "failed to parse GitHub event payload {}: {e}",
                path.display()
            ))
        })
    }

    fn pull_request_number(&self) -> Option<String> {
        self.pull_request
            .as_ref()
            .and_then(|pr| pr.number)
            .filter(|n| *n > 0)
            .map(|n| n.to_string())
    }

    fn head_sha(&self) -> Option<String> {
        self.pull_request
            .as_ref()
            .and_then(|pr| pr.head.as_ref())
            .and_then(|head| head.sha.clone())
    }
}

/// Recognises a GitHub Actions run.
///
/// Inside a `pull_request` event the target is the pull request; otherwise
/// (or when commits are requested) it is the pull request's head SHA, falling
/// back to `GITHUB_SHA`.
#[derive(Debug, Clone)]
pub struct GitHubActionsDetector<E> {
    env: E,
}

impl<E: Env> GitHubActionsDetector<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Env> Detector for GitHubActionsDetector<E> {
    fn display_name(&self) -> &str {
        "GitHub Actions"
    }

    fn detect(&self, opts: &DetectOptions) -> Result<DetectResult> {
        let env: &dyn Env = &self.env;

        expect_var(env, "GITHUB_ACTIONS", "true")?;
        let token = require_var(env, "GITHUB_TOKEN", true)?;
        let project = require_var(env, "GITHUB_REPOSITORY", false)?;
        let api_url = optional_var(env, "GITHUB_API_URL", false);

        let event = match optional_var(env, "GITHUB_EVENT_PATH", false) {
            Some(path) => EventPayload::load(Path::new(&path))?,
            None => EventPayload::default(),
        };

        let target = resolve_target(
            opts.target_type,
            || Ok(event.pull_request_number()),
            || Ok(event.head_sha().or_else(|| optional_var(env, "GITHUB_SHA", false))),
        )?;

        Ok(DetectResult {
            platform: GITHUB.to_string(),
            project,
            target_type: target.target_type,
            target_ref: target.target_ref,
            credentials: PlatformCredentials::new(Some(token), api_url),
        })
    }
}
