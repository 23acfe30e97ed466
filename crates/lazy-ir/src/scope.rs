//! Diagnostic scopes and provenance for nodes under construction.
//!
//! A [`BuildContext`] is threaded through every node-construction call. It owns the nested
//! scope names that get stamped into each new node's [`MetaData`] and, optionally, the
//! provenance collaborator that supplies source frames. None of it influences hashing or shapes.
//!
//! ```rust,ignore
//! let ctx = BuildContext::new();
//! {
//!     let _forward = ctx.push_scope("forward");
//!     let y = graph.add(&ctx, NodeSpec::new(OpKind::get("add"), [a, b], shape));
//!     // y's metadata scope is "forward.1"
//! }
//! ```

use std::cell::RefCell;
use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};

use crate::env;
use crate::node::MetaData;

/// One source frame attached to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl From<&Location<'_>> for SourceLocation {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Provenance collaborator, queried once per node when installed.
pub trait ProvenanceSource: Send {
    fn frames(&self) -> Vec<SourceLocation>;
}

#[derive(Debug, Clone)]
struct ScopeEntry {
    name: String,
    saved_next_id: usize,
}

/// Stack of active scope names.
///
/// Entries are recorded as `name.N`, where `N` counts the scopes opened so far at the same
/// depth, so sibling scopes with equal names stay distinguishable in dumps.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    entries: Vec<ScopeEntry>,
    next_id: usize,
    epoch: u64,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            epoch: 0,
        }
    }

    /// Pushes `name` and returns the new depth.
    pub fn push(&mut self, name: &str) -> usize {
        let id = self.next_id;
        self.entries.push(ScopeEntry {
            name: format!("{name}.{id}"),
            saved_next_id: id + 1,
        });
        self.next_id = 1;
        self.entries.len()
    }

    pub fn pop(&mut self) -> bool {
        match self.entries.pop() {
            Some(entry) => {
                self.next_id = entry.saved_next_id;
                true
            }
            None => false,
        }
    }

    /// Pops until at most `depth` entries remain.
    pub fn truncate(&mut self, depth: usize) {
        while self.entries.len() > depth {
            self.pop();
        }
    }

    /// Clears every entry and starts a new epoch.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.next_id = 1;
        self.epoch += 1;
    }

    /// Number of resets so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active path joined with `/`; empty at top level.
    pub fn current(&self) -> String {
        self.entries
            .iter()
            .map(|entry| entry.name.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-trace construction context.
///
/// Not `Sync`: each trace (and therefore each thread building one) owns its own context, so
/// concurrent traces never interleave scope names.
pub struct BuildContext {
    scopes: RefCell<ScopeStack>,
    capture_locations: bool,
    provenance: Option<Box<dyn ProvenanceSource>>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self {
            scopes: RefCell::new(ScopeStack::new()),
            capture_locations: false,
            provenance: None,
        }
    }

    /// Honors `LAZY_IR_DEBUG` for call-site capture.
    pub fn from_env() -> Self {
        Self::new().with_location_capture(env::debug_enabled())
    }

    pub fn with_location_capture(mut self, enabled: bool) -> Self {
        self.capture_locations = enabled;
        self
    }

    pub fn with_provenance(mut self, provenance: Box<dyn ProvenanceSource>) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Enters a scope; it is left when the returned guard drops.
    pub fn push_scope(&self, name: &str) -> ScopeGuard<'_> {
        let mut scopes = self.scopes.borrow_mut();
        let depth = scopes.push(name);
        ScopeGuard {
            ctx: self,
            depth,
            epoch: scopes.epoch(),
        }
    }

    /// Runs `f` inside the scope `name`.
    pub fn scoped<R>(&self, name: &str, f: impl FnOnce() -> R) -> R {
        let guard = self.push_scope(name);
        let result = f();
        drop(guard);
        result
    }

    /// Clears every scope, including ones whose guards are still alive; those guards then
    /// leave later scopes untouched when they drop.
    pub fn reset(&self) {
        self.scopes.borrow_mut().reset();
    }

    pub fn current_scope(&self) -> String {
        self.scopes.borrow().current()
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.borrow().depth()
    }

    pub(crate) fn metadata(&self, caller: &Location<'_>) -> MetaData {
        let mut frames = Vec::new();
        if self.capture_locations {
            frames.push(SourceLocation::from(caller));
        }
        if let Some(provenance) = &self.provenance {
            frames.extend(provenance.frames());
        }
        MetaData {
            scope: self.current_scope(),
            frames,
        }
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("scope", &self.current_scope())
            .field("capture_locations", &self.capture_locations)
            .field("provenance", &self.provenance.is_some())
            .finish()
    }
}

/// RAII guard returned by [`BuildContext::push_scope`].
#[must_use = "the scope is popped as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    ctx: &'a BuildContext,
    depth: usize,
    epoch: u64,
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        let mut scopes = self.ctx.scopes.borrow_mut();
        if scopes.epoch() == self.epoch {
            scopes.truncate(self.depth.saturating_sub(1));
        }
    }
}
