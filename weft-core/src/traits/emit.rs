//! The emit handler: a component's only channel to the outside.

use crate::context::Context;
use crate::error::Result;
use crate::message::EmitMessage;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future returned by emit calls.
pub type EmitFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Host-provided callable for producing outbound messages and for
/// interacting with the system ports.
///
/// - A regular output port delivers downstream and resolves with the
///   downstream result. On a port declared blocking, the call does not
///   resolve until the target edge ends; cancelling the passed context is
///   indistinguishable from downstream completion.
/// - The reconcile port accepts [`EmitMessage::Patch`] (metadata
///   mutation, applied atomically and re-delivered as a snapshot later)
///   and [`EmitMessage::Refresh`] (re-notify interested ports).
/// - The control port accepts dashboard redraw payloads.
pub trait EmitHandler: Send + Sync {
    /// Emit `msg` on `port`.
    fn emit<'a>(&'a self, ctx: Context, port: &'a str, msg: EmitMessage) -> EmitFuture<'a>;
}

/// Shared handle to the emit handler.
///
/// Cheap to clone; long-running components clone it into their worker
/// tasks for the duration of the run phase.
pub type Emitter = Arc<dyn EmitHandler>;
