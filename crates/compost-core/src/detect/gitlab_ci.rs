//! GitLab CI detector.

use super::env::{expect_var, optional_var, require_var};
use super::{resolve_target, DetectOptions, DetectResult, Detector, Env};
use crate::error::Result;
use crate::target::{PlatformCredentials, GITLAB};

/// Recognises a GitLab CI job.
///
/// Merge request pipelines target the merge request (`CI_MERGE_REQUEST_IID`);
/// branch pipelines target `CI_COMMIT_SHA`.
#[derive(Debug, Clone)]
pub struct GitLabCiDetector<E> {
    env: E,
}

impl<E: Env> GitLabCiDetector<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Env> Detector for GitLabCiDetector<E> {
    fn display_name(&self) -> &str {
        "GitLab CI"
    }

    fn detect(&self, opts: &DetectOptions) -> Result<DetectResult> {
        let env: &dyn Env = &self.env;

        expect_var(env, "GITLAB_CI", "true")?;
        let token = require_var(env, "GITLAB_TOKEN", true)?;
        let project = require_var(env, "CI_PROJECT_PATH", false)?;
        let server_url = optional_var(env, "CI_SERVER_URL", false);

        let target = resolve_target(
            opts.target_type,
            || Ok(optional_var(env, "CI_MERGE_REQUEST_IID", false)),
            || Ok(optional_var(env, "CI_COMMIT_SHA", false)),
        )?;

        Ok(DetectResult {
            platform: GITLAB.to_string(),
            project,
            target_type: target.target_type,
            target_ref: target.target_ref,
            credentials: PlatformCredentials::new(Some(token), server_url),
        })
    }
}
