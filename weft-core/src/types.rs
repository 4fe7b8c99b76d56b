//! Strongly-typed identifiers.

use std::fmt;
use uuid::Uuid;

/// Identifier tying together the emissions of one logical flow pass.
///
/// Long-running emitters (cron, ticker, scheduler) mint a fresh trace for
/// every autonomous tick so downstream logs can be correlated per tick
/// rather than per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Generate a new random trace id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_ids_are_unique() {
        assert_ne!(TraceId::new(), TraceId::new());
    }

    #[test]
    fn trace_id_display_is_compact() {
        let id = TraceId::new();
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert!(!s.contains('-'));
    }
}
