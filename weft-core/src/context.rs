//! Invocation context passed to component handlers.
//!
//! The context carries the three pieces of host state every handler may
//! consult: cooperative cancellation, the replica's leader flag, and the
//! trace identity of the current flow pass.

use crate::types::TraceId;
use tokio_util::sync::CancellationToken;

/// Context for a single handler invocation (and any workers it spawns).
///
/// Cloning is cheap; clones share the same cancellation token. Use
/// [`Context::child`] to open a nested cancel scope and
/// [`Context::detached`] for host writes that must not be interrupted by
/// the invocation's cancellation (metadata patches, cleanup redraws).
#[derive(Debug, Clone)]
pub struct Context {
    cancel: CancellationToken,
    leader: bool,
    trace: TraceId,
}

impl Context {
    /// Create a root context for a non-leader replica.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            leader: false,
            trace: TraceId::new(),
        }
    }

    /// Create a root context for the leader replica.
    pub fn leader() -> Self {
        Self::new().with_leader(true)
    }

    /// Set the leader flag.
    #[must_use]
    pub fn with_leader(mut self, leader: bool) -> Self {
        self.leader = leader;
        self
    }

    /// Whether this replica is the elected leader for the node.
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// The trace id of the current flow pass.
    pub fn trace_id(&self) -> TraceId {
        self.trace
    }

    /// Derive a context carrying a fresh trace id.
    ///
    /// Used by autonomous emitters to start a new flow pass per tick.
    #[must_use]
    pub fn with_new_trace(&self) -> Self {
        Self {
            cancel: self.cancel.clone(),
            leader: self.leader,
            trace: TraceId::new(),
        }
    }

    /// Open a child cancel scope.
    ///
    /// The child is cancelled when this context is cancelled; cancelling
    /// the child (via its [`Context::cancel_token`]) leaves the parent
    /// untouched. The returned token clone is the stored "cancel handle"
    /// in the canonical run/stop pattern.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            leader: self.leader,
            trace: self.trace,
        }
    }

    /// Derive a context with a fresh, unrelated cancellation token.
    ///
    /// Metadata patches and cleanup redraws use this so a cancelled run
    /// can still persist its final state.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self {
            cancel: CancellationToken::new(),
            leader: self.leader,
            trace: self.trace,
        }
    }

    /// The cancellation token backing this context.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether this context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait until this context is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_flag() {
        assert!(!Context::new().is_leader());
        assert!(Context::leader().is_leader());
        assert!(!Context::leader().with_leader(false).is_leader());
    }

    #[test]
    fn child_cancels_with_parent() {
        let parent = Context::new();
        let child = parent.child();
        parent.cancel_token().cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn child_cancel_leaves_parent() {
        let parent = Context::new();
        let child = parent.child();
        child.cancel_token().cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn detached_survives_cancellation() {
        let ctx = Context::leader();
        let detached = ctx.detached();
        ctx.cancel_token().cancel();
        assert!(!detached.is_cancelled());
        assert!(detached.is_leader());
    }

    #[test]
    fn new_trace_changes_identity() {
        let ctx = Context::new();
        let tick = ctx.with_new_trace();
        assert_ne!(ctx.trace_id(), tick.trace_id());
    }
}
