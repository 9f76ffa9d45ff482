//! In-memory fakes for the capability traits (testing only)
//!
//! Provides `MemoryPlatform` (a `PlatformHandler` that keeps comments in a
//! vector and counts calls) and `ScriptedDetector` (a `Detector` with a fixed
//! answer) so engine and detector-chain behaviour can be exercised without a
//! network.

use std::any::Any;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::comment::{downcast_comment, has_tag, Comment, PlatformHandler};
use crate::detect::{DetectOptions, DetectResult, Detector};
use crate::error::{CompostError, Result};

// ---------------------------------------------------------------------------
// MemoryPlatform
// ---------------------------------------------------------------------------

/// Comment stored by [`MemoryPlatform`]. Larger `created` is more recent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryComment {
    pub id: u64,
    pub created: u64,
    pub body: String,
    pub hidden: bool,
    pub reference: String,
}

impl Comment for MemoryComment {
    fn body(&self) -> &str {
        &self.body
    }

    fn reference(&self) -> &str {
        &self.reference
    }

    fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn recency_cmp(&self, other: &dyn Comment) -> Ordering {
        match other.as_any().downcast_ref::<MemoryComment>() {
            Some(other) => other
                .created
                .cmp(&self.created)
                .then_with(|| other.id.cmp(&self.id)),
            None => Ordering::Equal,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Number of calls made against a [`MemoryPlatform`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub find: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub hide: usize,
}

impl CallCounts {
    /// Calls that changed remote state.
    pub fn mutations(&self) -> usize {
        self.create + self.update + self.delete + self.hide
    }
}

#[derive(Debug, Default)]
struct PlatformState {
    comments: Vec<MemoryComment>,
    next_id: u64,
    calls: CallCounts,
    fail_next_find: Option<String>,
    /// Mutation count at which to fail, and the error message.
    fail_at_mutation: Option<(usize, String)>,
}

impl PlatformState {
    /// Called after a mutation is counted, before it is applied.
    fn injected_failure(&mut self, operation: &str) -> Result<()> {
        let due = matches!(&self.fail_at_mutation, Some((at, _)) if *at == self.calls.mutations());
        if !due {
            return Ok(());
        }
        let message = self
            .fail_at_mutation
            .take()
            .map(|(_, message)| message)
            .unwrap_or_default();
        Err(CompostError::Transport {
            operation: operation.to_string(),
            message,
        })
    }
}

/// In-memory platform. Clones share state, so a test can keep one clone
/// while the engine owns another.
#[derive(Debug, Clone)]
pub struct MemoryPlatform {
    state: Arc<Mutex<PlatformState>>,
    supports_hide: bool,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlatformState::default())),
            supports_hide: true,
        }
    }

    /// A platform whose `hide_comment` is not implemented.
    pub fn without_hide() -> Self {
        Self {
            supports_hide: false,
            ..Self::new()
        }
    }

    /// Insert a comment that is more recent than every existing one.
    /// Returns its reference.
    pub fn seed(&self, body: &str, hidden: bool) -> String {
        let created = {
            let state = self.state.lock().unwrap();
            state.comments.iter().map(|c| c.created).max().unwrap_or(0) + 1
        };
        self.seed_at(body, hidden, created)
    }

    /// Insert a comment with an explicit creation rank.
    pub fn seed_at(&self, body: &str, hidden: bool, created: u64) -> String {
        let mut state = self.state.lock().unwrap();
        let comment = Self::make_comment(&mut state, body, hidden, created);
        let reference = comment.reference.clone();
        state.comments.push(comment);
        reference
    }

    fn make_comment(
        state: &mut PlatformState,
        body: &str,
        hidden: bool,
        created: u64,
    ) -> MemoryComment {
        state.next_id += 1;
        MemoryComment {
            id: state.next_id,
            created,
            body: body.to_string(),
            hidden,
            reference: format!("memory://comments/{}", state.next_id),
        }
    }

    /// Make the next `find_matching_comments` call fail.
    pub fn fail_next_find(&self, message: &str) {
        self.state.lock().unwrap().fail_next_find = Some(message.to_string());
    }

    /// Make the `n`th create/update/delete/hide call from now fail without
    /// applying its change. `n` starts at 1.
    pub fn fail_nth_mutation(&self, n: usize, message: &str) {
        let mut state = self.state.lock().unwrap();
        let at = state.calls.mutations() + n;
        state.fail_at_mutation = Some((at, message.to_string()));
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().unwrap().calls
    }

    /// Bodies of all stored comments in insertion order.
    pub fn bodies(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.comments.iter().map(|c| c.body.clone()).collect()
    }

    pub fn comments(&self) -> Vec<MemoryComment> {
        self.state.lock().unwrap().comments.clone()
    }

    pub fn body_of(&self, reference: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .comments
            .iter()
            .find(|c| c.reference == reference)
            .map(|c| c.body.clone())
    }
}

#[async_trait]
impl PlatformHandler for MemoryPlatform {
    async fn find_matching_comments(&self, tag: &str) -> Result<Vec<Box<dyn Comment>>> {
        let mut state = self.state.lock().unwrap();
        state.calls.find += 1;
        if let Some(message) = state.fail_next_find.take() {
            return Err(CompostError::Transport {
                operation: "find matching comments".to_string(),
                message,
            });
        }
        Ok(state
            .comments
            .iter()
            .filter(|c| has_tag(&c.body, tag))
            .map(|c| Box::new(c.clone()) as Box<dyn Comment>)
            .collect())
    }

    async fn create_comment(&self, body: &str) -> Result<Box<dyn Comment>> {
        let mut state = self.state.lock().unwrap();
        state.calls.create += 1;
        state.injected_failure("create comment")?;
        let created = state.comments.iter().map(|c| c.created).max().unwrap_or(0) + 1;
        let comment = Self::make_comment(&mut state, body, false, created);
        state.comments.push(comment.clone());
        Ok(Box::new(comment))
    }

    async fn update_comment(&self, comment: &dyn Comment, body: &str) -> Result<()> {
        let target = downcast_comment::<MemoryComment>(comment, "memory")?;
        let mut state = self.state.lock().unwrap();
        state.calls.update += 1;
        state.injected_failure("update comment")?;
        let stored = state
            .comments
            .iter_mut()
            .find(|c| c.id == target.id)
            .ok_or_else(|| CompostError::Api {
                operation: "update comment".to_string(),
                status: 404,
                message: format!("comment {} not found", target.id),
            })?;
        stored.body = body.to_string();
        Ok(())
    }

    async fn delete_comment(&self, comment: &dyn Comment) -> Result<()> {
        let target = downcast_comment::<MemoryComment>(comment, "memory")?;
        let mut state = self.state.lock().unwrap();
        state.calls.delete += 1;
        state.injected_failure("delete comment")?;
        state.comments.retain(|c| c.id != target.id);
        Ok(())
    }

    fn check_hide_supported(&self) -> Result<()> {
        if self.supports_hide {
            return Ok(());
        }
        Err(CompostError::NotImplemented {
            platform: "memory".to_string(),
            operation: "hide comment".to_string(),
        })
    }

    async fn hide_comment(&self, comment: &dyn Comment) -> Result<()> {
        self.check_hide_supported()?;
        let target = downcast_comment::<MemoryComment>(comment, "memory")?;
        let mut state = self.state.lock().unwrap();
        state.calls.hide += 1;
        state.injected_failure("hide comment")?;
        if let Some(stored) = state.comments.iter_mut().find(|c| c.id == target.id) {
            stored.hidden = true;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedDetector
// ---------------------------------------------------------------------------

/// Fixed answer returned by a [`ScriptedDetector`].
#[derive(Debug, Clone)]
pub enum Script {
    Skip,
    Fail(String),
    Detect(DetectResult),
}

/// Detector that always gives the same answer and counts its calls.
#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    name: String,
    script: Script,
    calls: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared call counter; stays valid after the detector is registered.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Detector for ScriptedDetector {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn detect(&self, _opts: &DetectOptions) -> Result<DetectResult> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        match &self.script {
            Script::Skip => Err(CompostError::DetectionSkipped(format!(
                "{} does not apply",
                self.name
            ))),
            Script::Fail(message) => Err(CompostError::Detection(message.clone())),
            Script::Detect(result) => Ok(result.clone()),
        }
    }
}
