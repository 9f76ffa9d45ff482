//! Platform names, target types and credentials shared by detectors and
//! platform handlers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CompostError;

pub const GITHUB: &str = "github";
pub const GITLAB: &str = "gitlab";

/// Platforms the CLI knows how to target.
pub const KNOWN_PLATFORMS: &[&str] = &[GITHUB, GITLAB];

/// Validate a user-supplied platform name.
pub fn parse_platform(s: &str) -> Result<&'static str, CompostError> {
    KNOWN_PLATFORMS
        .iter()
        .copied()
        .find(|platform| *platform == s)
        .ok_or_else(|| {
            CompostError::InvalidInput(format!(
                "invalid platform '{s}', valid options are 'github', 'gitlab'"
            ))
        })
}

/// What a comment is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetType {
    /// A pull request (GitHub) or merge request (GitLab).
    PullRequest,
    Commit,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::PullRequest => "pull-request",
            TargetType::Commit => "commit",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = CompostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pr" | "pull-request" | "mr" | "merge-request" => Ok(TargetType::PullRequest),
            "commit" => Ok(TargetType::Commit),
            other => Err(CompostError::InvalidInput(format!(
                "invalid target type '{other}', valid options are 'pull-request' ('pr'), \
                 'merge-request' ('mr'), 'commit'"
            ))),
        }
    }
}

/// Credentials and endpoint override handed to a platform handler factory.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PlatformCredentials {
    pub token: Option<String>,
    /// API or server URL; `None` uses the platform's public endpoint.
    pub endpoint: Option<String>,
}

impl PlatformCredentials {
    pub fn new(token: Option<String>, endpoint: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            endpoint: endpoint.filter(|e| !e.is_empty()),
        }
    }
}

impl fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("token", &self.token.as_ref().map(|_| "************"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
