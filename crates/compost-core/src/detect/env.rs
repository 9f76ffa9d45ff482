//! Environment variable access for detectors.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{CompostError, Result};

/// Source of environment variables.
pub trait Env: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Env for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

fn sanitize(value: &str, secret: bool) -> &str {
    if secret {
        "************"
    } else {
        value
    }
}

/// Read a variable, treating unset and empty alike.
pub(crate) fn optional_var(env: &dyn Env, name: &str, secret: bool) -> Option<String> {
    let value = env.var(name).filter(|v| !v.is_empty())?;
    debug!("{name} environment variable is set to {}", sanitize(&value, secret));
    Some(value)
}

/// Read a variable that must be set; a missing value skips the detector.
pub(crate) fn require_var(env: &dyn Env, name: &str, secret: bool) -> Result<String> {
    optional_var(env, name, secret).ok_or_else(|| {
        CompostError::DetectionSkipped(format!("{name} environment variable is not set"))
    })
}

/// Check a variable holds `expected`; anything else skips the detector.
pub(crate) fn expect_var(env: &dyn Env, name: &str, expected: &str) -> Result<()> {
    let value = require_var(env, name, false)?;
    if value != expected {
        return Err(CompostError::DetectionSkipped(format!(
            "{name} environment variable is set to {value}, expected {expected}"
        )));
    }
    Ok(())
}
