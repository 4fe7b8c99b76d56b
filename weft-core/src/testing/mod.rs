//! In-process test support for components.

mod harness;

pub use harness::{Harness, PortMessage};
