//! Platform handler factory registry.
//!
//! Built once at startup, then only read. Entries map a platform name and a
//! target type to a constructor for that platform's `PlatformHandler`.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::comment::PlatformHandler;
use crate::error::{CompostError, Result};
use crate::target::{PlatformCredentials, TargetType};

/// Everything a factory needs to build a handler for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRequest {
    /// Repository name or path, e.g. `owner/repo`.
    pub project: String,
    /// Pull/merge request number or commit SHA.
    pub target_ref: String,
    pub credentials: PlatformCredentials,
}

/// Constructor for a platform handler.
pub type PlatformHandlerFactory =
    Arc<dyn Fn(&HandlerRequest) -> Result<Box<dyn PlatformHandler>> + Send + Sync>;

struct FactoryEntry {
    platform: String,
    target_type: TargetType,
    factory: PlatformHandlerFactory,
}

/// Lookup table from (platform, target type) to handler factory.
#[derive(Default)]
pub struct PlatformRegistry {
    entries: Vec<FactoryEntry>,
}

impl fmt::Debug for PlatformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| format!("{} ({})", e.platform, e.target_type)),
            )
            .finish()
    }
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. The first registration for a pair wins.
    pub fn register<F>(&mut self, platform: &str, target_type: TargetType, factory: F) -> &mut Self
    where
        F: Fn(&HandlerRequest) -> Result<Box<dyn PlatformHandler>> + Send + Sync + 'static,
    {
        self.entries.push(FactoryEntry {
            platform: platform.to_string(),
            target_type,
            factory: Arc::new(factory),
        });
        self
    }

    /// Look up the factory for a pair.
    pub fn factory(&self, platform: &str, target_type: TargetType) -> Result<PlatformHandlerFactory> {
        self.entries
            .iter()
            .find(|e| e.platform == platform && e.target_type == target_type)
            .map(|e| Arc::clone(&e.factory))
            .ok_or_else(|| CompostError::Unsupported {
                platform: platform.to_string(),
                target_type: target_type.to_string(),
            })
    }

    /// Look up the factory for a pair and build a handler with it.
    pub fn create_handler(
        &self,
        platform: &str,
        target_type: TargetType,
        request: &HandlerRequest,
    ) -> Result<Box<dyn PlatformHandler>> {
        let factory = self.factory(platform, target_type)?;
        debug!(
            "Creating {platform} ({target_type}) handler for {} {}",
            request.project, request.target_ref
        );
        factory(request)
    }

    /// Registered (platform, target type) pairs in registration order.
    pub fn supported(&self) -> Vec<(String, TargetType)> {
        self.entries
            .iter()
            .map(|e| (e.platform.clone(), e.target_type))
            .collect()
    }
}
