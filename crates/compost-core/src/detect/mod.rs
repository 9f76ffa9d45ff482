//! CI environment auto-detection.
//!
//! Detectors are probed in registration order. A detector answers one of:
//! - `Ok(DetectResult)`: the environment was recognised, stop here
//! - `Err(CompostError::DetectionSkipped)`: not this environment, try the next
//! - any other error: this environment, but misconfigured; abort the chain

pub mod env;
pub mod github_actions;
pub mod gitlab_ci;

use std::fmt;

use tracing::{debug, info};

use crate::error::{CompostError, Result};
use crate::registry::HandlerRequest;
use crate::target::{PlatformCredentials, TargetType, GITHUB, GITLAB};

pub use env::{Env, ProcessEnv};
pub use github_actions::GitHubActionsDetector;
pub use gitlab_ci::GitLabCiDetector;

/// Filters that narrow detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectOptions {
    /// Only consult detectors for this platform.
    pub platform: Option<String>,
    /// Only resolve targets of this type.
    pub target_type: Option<TargetType>,
}

/// A recognised environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectResult {
    pub platform: String,
    pub project: String,
    pub target_type: TargetType,
    /// Pull/merge request number or commit SHA. Never empty.
    pub target_ref: String,
    pub credentials: PlatformCredentials,
}

impl DetectResult {
    /// The factory request for the detected target.
    pub fn handler_request(&self) -> HandlerRequest {
        HandlerRequest {
            project: self.project.clone(),
            target_ref: self.target_ref.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

/// A probe for one CI environment.
pub trait Detector: Send + Sync {
    fn display_name(&self) -> &str;

    fn detect(&self, opts: &DetectOptions) -> Result<DetectResult>;
}

struct DetectorEntry {
    platforms: Vec<String>,
    detector: Box<dyn Detector>,
}

/// Ordered list of detectors, built once at startup.
#[derive(Default)]
pub struct DetectorRegistry {
    entries: Vec<DetectorEntry>,
}

impl fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| e.detector.display_name()))
            .finish()
    }
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// GitHub Actions then GitLab CI, reading `env`.
    pub fn with_defaults<E>(env: E) -> Self
    where
        E: Env + Clone + 'static,
    {
        let mut registry = Self::new();
        registry
            .register(&[GITHUB], GitHubActionsDetector::new(env.clone()))
            .register(&[GITLAB], GitLabCiDetector::new(env));
        registry
    }

    /// Append a detector serving `platforms`.
    pub fn register<D>(&mut self, platforms: &[&str], detector: D) -> &mut Self
    where
        D: Detector + 'static,
    {
        self.entries.push(DetectorEntry {
            platforms: platforms.iter().map(|p| p.to_string()).collect(),
            detector: Box::new(detector),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the chain. The first detector to succeed wins.
    pub fn detect(&self, opts: &DetectOptions) -> Result<DetectResult> {
        for entry in &self.entries {
            if let Some(platform) = &opts.platform {
                if !entry.platforms.iter().any(|p| p == platform) {
                    continue;
                }
            }

            let detector = entry.detector.as_ref();
            debug!("Checking for {}", detector.display_name());

            match detector.detect(opts) {
                Ok(result) => {
                    info!(
                        "Detected {} (platform: {}, target type: {}, target ref: {})",
                        detector.display_name(),
                        result.platform,
                        result.target_type,
                        result.target_ref
                    );
                    return Ok(result);
                }
                Err(CompostError::DetectionSkipped(reason)) => {
                    debug!(
                        "Could not detect {} environment: {reason}",
                        detector.display_name()
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(CompostError::EnvironmentNotDetected)
    }
}

/// Resolved target before it is wrapped into a `DetectResult`.
pub(crate) struct Target {
    pub target_type: TargetType,
    pub target_ref: String,
}

/// Pick the target from the candidates a detector found.
///
/// A pull request wins unless the filter pins commits; the commit SHA is used
/// when no pull request was found and the filter allows commits. Lookups are
/// lazy so a commit-only variable is only read when needed.
pub(crate) fn resolve_target<P, C>(
    filter: Option<TargetType>,
    pull_request: P,
    commit: C,
) -> Result<Target>
where
    P: FnOnce() -> Result<Option<String>>,
    C: FnOnce() -> Result<Option<String>>,
{
    if matches!(filter, None | Some(TargetType::PullRequest)) {
        if let Some(target_ref) = pull_request()?.filter(|r| !r.is_empty()) {
            return Ok(Target {
                target_type: TargetType::PullRequest,
                target_ref,
            });
        }
    }

    if matches!(filter, None | Some(TargetType::Commit)) {
        if let Some(target_ref) = commit()?.filter(|r| !r.is_empty()) {
            return Ok(Target {
                target_type: TargetType::Commit,
                target_ref,
            });
        }
    }

    Err(CompostError::Detection(match filter {
        Some(target_type) => format!("could not determine target ref for {target_type}"),
        None => "could not determine target ref".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{Script, ScriptedDetector};
    use std::sync::atomic::Ordering;

    fn result(platform: &str) -> DetectResult {
        DetectResult {
            platform: platform.to_string(),
            project: "owner/repo".to_string(),
            target_type: TargetType::Commit,
            target_ref: "2ca7182".to_string(),
            credentials: PlatformCredentials::default(),
        }
    }

    #[test]
    fn test_platform_filter_skips_other_detectors() {
        let github = ScriptedDetector::new("GitHub", Script::Detect(result("github")));
        let gitlab = ScriptedDetector::new("GitLab", Script::Detect(result("gitlab")));
        let github_calls = github.call_counter();

        let mut registry = DetectorRegistry::new();
        registry.register(&["github"], github).register(&["gitlab"], gitlab);

        let detected = registry
            .detect(&DetectOptions {
                platform: Some("gitlab".to_string()),
                target_type: None,
            })
            .unwrap();

        assert_eq!(detected.platform, "gitlab");
        assert_eq!(github_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_registry_is_not_detected() {
        let registry = DetectorRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.detect(&DetectOptions::default()),
            Err(CompostError::EnvironmentNotDetected)
        ));
    }

    #[test]
    fn test_resolve_target_prefers_pull_request() {
        let target = resolve_target(
            None,
            || Ok(Some("12".to_string())),
            || panic!("commit lookup should not run"),
        )
        .unwrap();
        assert_eq!(target.target_type, TargetType::PullRequest);
        assert_eq!(target.target_ref, "12");
    }

    #[test]
    fn test_resolve_target_falls_back_to_commit() {
        let target = resolve_target(None, || Ok(None), || Ok(Some("abc".to_string()))).unwrap();
        assert_eq!(target.target_type, TargetType::Commit);
    }

    #[test]
    fn test_resolve_target_commit_filter_ignores_pull_request() {
        let target = resolve_target(
            Some(TargetType::Commit),
            || panic!("pull request lookup should not run"),
            || Ok(Some("abc".to_string())),
        )
        .unwrap();
        assert_eq!(target.target_ref, "abc");
    }

    #[test]
    fn test_resolve_target_failure_is_hard() {
        let err = resolve_target(Some(TargetType::PullRequest), || Ok(None), || Ok(None))
            .err()
            .unwrap();
        assert!(!err.is_detection_skipped());
        assert!(err.to_string().contains("pull-request"));
    }
}
