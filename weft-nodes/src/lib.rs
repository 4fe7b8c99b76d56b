//! Standard component library for the Weft flow module.
//!
//! This crate provides the built-in components, grouped the way they sit
//! in a flow:
//!
//! ## Triggers (`triggers::*`)
//! - [`triggers::Signal`] - Blocking flow trigger (Send/Reset)
//! - [`triggers::Cron`] - Scheduled emitter driven by cron expressions
//! - [`triggers::Ticker`] - Fixed-delay periodic emitter
//!
//! ## Flow Control (`flow::*`)
//! - [`flow::Router`] - Condition-ordered routing onto dynamic ports
//! - [`flow::Scheduler`] - One-shot task pool with per-id timers
//! - [`flow::Mixer`] - Latest-value mixing over named inputs
//! - [`flow::Delay`] - Sleep-then-forward
//! - [`flow::AsyncRelay`] - Bounded non-blocking pass-through
//!
//! ## Data (`data::*`)
//! - [`data::Split`] - Sequential array fan-out
//! - [`data::GroupBy`] - Dot-path partitioning
//! - [`data::ArrayGet`] - 1-based element access
//! - [`data::Inject`] - Stored-config enrichment
//! - [`data::Modify`] - Pass-through transformer
//! - [`data::DebugSink`] - Inspection sink
//!
//! ## Storage (`store::*`)
//! - [`store::KvStore`] - Metadata-backed document store with queries

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data;
pub mod flow;
pub mod store;
pub mod triggers;

use std::sync::Arc;
use weft_core::ComponentRegistry;

pub use data::{ArrayGet, DebugSink, GroupBy, Inject, Modify, Split};
pub use flow::{AsyncRelay, Delay, Mixer, Router, Scheduler};
pub use store::KvStore;
pub use triggers::{Cron, Signal, Ticker};

/// Register every component kind of this library.
pub fn register_all(registry: &mut ComponentRegistry) {
    registry.register(Arc::new(Signal::default()));
    registry.register(Arc::new(Cron::default()));
    registry.register(Arc::new(Ticker::default()));
    registry.register(Arc::new(Scheduler::new()));
    registry.register(Arc::new(Router::default()));
    registry.register(Arc::new(Split));
    registry.register(Arc::new(Mixer::default()));
    registry.register(Arc::new(GroupBy));
    registry.register(Arc::new(ArrayGet::default()));
    registry.register(Arc::new(Inject::default()));
    registry.register(Arc::new(Delay));
    registry.register(Arc::new(AsyncRelay::new()));
    registry.register(Arc::new(DebugSink::default()));
    registry.register(Arc::new(Modify));
    registry.register(Arc::new(KvStore::new()));
}

/// Prelude for commonly used types.
pub mod prelude {
    pub use crate::data::{ArrayGet, DebugSink, GroupBy, Inject, Modify, Split};
    pub use crate::flow::{AsyncRelay, Delay, Mixer, Router, Scheduler};
    pub use crate::register_all;
    pub use crate::store::KvStore;
    pub use crate::triggers::{Cron, Signal, Ticker};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_holds_the_full_library() {
        let mut registry = ComponentRegistry::new();
        register_all(&mut registry);

        assert_eq!(registry.len(), 15);
        for kind in [
            "signal",
            "cron",
            "ticker",
            "scheduler",
            "router",
            "array_split",
            "mixer",
            "group_by",
            "array_get",
            "inject",
            "delay",
            "async",
            "debug",
            "common_modify",
            "kv",
        ] {
            assert!(registry.contains(kind), "missing kind {kind}");
            assert!(registry.create(kind).is_some());
        }
    }

    #[test]
    fn instances_are_fresh_per_create() {
        let mut registry = ComponentRegistry::new();
        register_all(&mut registry);

        let a = registry.create("kv").unwrap();
        let b = registry.create("kv").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn no_user_port_shadows_a_system_port() {
        let mut registry = ComponentRegistry::new();
        register_all(&mut registry);

        for info in registry.kinds() {
            let instance = registry.create(&info.name).unwrap();
            for port in instance.ports() {
                if port.name.starts_with('_') {
                    assert!(
                        matches!(
                            port.name.as_str(),
                            weft_core::RECONCILE_PORT
                                | weft_core::SETTINGS_PORT
                                | weft_core::CONTROL_PORT
                                | weft_core::STATE_PORT
                        ),
                        "component {} exposes reserved-style port {}",
                        info.name,
                        port.name
                    );
                }
            }
        }
    }
}
