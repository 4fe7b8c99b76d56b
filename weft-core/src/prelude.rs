//! Prelude for convenient imports.
//!
//! # Example
//!
//! ```ignore
//! use weft_core::prelude::*;
//! ```

// Error handling
pub use crate::error::{Result, WeftError};

// Context and identity
pub use crate::context::Context;
pub use crate::types::TraceId;

// Messages and state
pub use crate::message::{EmitMessage, MetadataPatch, Packet};
pub use crate::state::{Metadata, NodeState};

// The node contract
pub use crate::traits::{
    Component, ComponentFuture, ComponentInfo, EmitFuture, EmitHandler, Emitter, Port, Position,
    CONTROL_PORT, RECONCILE_PORT, SETTINGS_PORT, STATE_PORT,
};

// Registry and dynamic values
pub use crate::registry::ComponentRegistry;
pub use crate::value::Value;
