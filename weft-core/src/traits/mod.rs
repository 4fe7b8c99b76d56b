//! Core abstractions: the component contract and the emit handler.

mod component;
mod emit;

pub use component::{
    Component, ComponentFuture, ComponentInfo, Port, Position, CONTROL_PORT, RECONCILE_PORT,
    SETTINGS_PORT, STATE_PORT,
};
pub use emit::{EmitFuture, EmitHandler, Emitter};
