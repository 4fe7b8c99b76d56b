//! Weft Core Library
//!
//! Foundational types and traits for the Weft flow module: the component
//! contract, the system-port protocol, metadata-backed persistence
//! primitives, and the in-process test harness.
//!
//! # Overview
//!
//! A Weft module hosts a registry of component kinds. Each kind is a
//! factory producing component instances: stateful objects that react to
//! messages on named input ports and emit messages on named output ports.
//! The host routes emissions over edges, persists per-node metadata, and
//! elects a leader replica per node; everything a component sees of that
//! machinery goes through the [`traits::Emitter`] it receives with every
//! invocation.
//!
//! # Key Components
//!
//! - **Traits**: [`traits::Component`] and [`traits::EmitHandler`], the
//!   two sides of the node contract
//! - **Messages**: [`message::Packet`] (inbound) and
//!   [`message::EmitMessage`] (outbound, including metadata patches)
//! - **Context**: cancellation, leader flag, and trace identity
//! - **Value**: dynamic field access and predicate evaluation
//! - **Testing**: [`testing::Harness`], an in-process node driver with
//!   metadata simulation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod message;
pub mod prelude;
pub mod registry;
pub mod state;
pub mod testing;
pub mod traits;
pub mod types;
pub mod value;

pub use context::Context;
pub use error::{Result, WeftError};
pub use message::{EmitMessage, MetadataPatch, Packet};
pub use registry::ComponentRegistry;
pub use state::{Metadata, NodeState};
pub use traits::{
    Component, ComponentFuture, ComponentInfo, EmitFuture, EmitHandler, Emitter, Port, Position,
    CONTROL_PORT, RECONCILE_PORT, SETTINGS_PORT, STATE_PORT,
};
pub use types::TraceId;
pub use value::Value;
