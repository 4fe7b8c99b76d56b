//! In-process component driver.
//!
//! The harness wraps a single component instance, plays the host's role
//! on the emit side, and simulates the metadata lifecycle: patches apply
//! immediately to an in-memory map, and [`Harness::reconcile`] re-delivers
//! that map as a snapshot the way the host's debounced reconciler would.

use crate::context::Context;
use crate::error::{Result, WeftError};
use crate::message::{EmitMessage, Packet};
use crate::state::{Metadata, NodeState};
use crate::traits::{Component, EmitFuture, EmitHandler, Emitter, Port, RECONCILE_PORT};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A single captured output: port name plus payload.
#[derive(Debug, Clone)]
pub struct PortMessage {
    /// The port the component emitted on.
    pub port: String,
    /// The emitted payload.
    pub data: JsonValue,
}

struct Shared {
    metadata: Mutex<Metadata>,
    outputs: Mutex<Vec<PortMessage>>,
    blocking: Mutex<HashSet<String>>,
    refreshes: AtomicUsize,
}

struct HarnessEmitter {
    shared: Arc<Shared>,
}

impl EmitHandler for HarnessEmitter {
    fn emit<'a>(&'a self, ctx: Context, port: &'a str, msg: EmitMessage) -> EmitFuture<'a> {
        Box::pin(async move {
            match msg {
                EmitMessage::Patch(patch) => {
                    if port != RECONCILE_PORT {
                        return Err(WeftError::invalid_message(
                            port,
                            "metadata patches are only valid on the reconcile port",
                        ));
                    }
                    let mut metadata = self.shared.metadata.lock();
                    patch.apply(&mut metadata)
                }
                EmitMessage::Refresh => {
                    self.shared.refreshes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                EmitMessage::Value(data) => {
                    self.shared.outputs.lock().push(PortMessage {
                        port: port.to_string(),
                        data,
                    });
                    let is_blocking = self.shared.blocking.lock().contains(port);
                    if is_blocking {
                        // Simulate a blocking edge whose target only ends
                        // when the emit context is cancelled.
                        ctx.cancelled().await;
                    }
                    Ok(())
                }
            }
        })
    }
}

/// Test driver for a single component instance.
///
/// Clones share the instance, metadata, and captured outputs; use
/// [`Harness::new_pod`] for a fresh instance instead.
#[derive(Clone)]
pub struct Harness {
    component: Arc<dyn Component>,
    shared: Arc<Shared>,
}

impl Harness {
    /// Wrap a fresh instance produced from the given prototype.
    pub fn new(prototype: &dyn Component) -> Self {
        Self::with_metadata(prototype.instance(), Metadata::new())
    }

    fn with_metadata(component: Arc<dyn Component>, metadata: Metadata) -> Self {
        Self {
            component,
            shared: Arc::new(Shared {
                metadata: Mutex::new(metadata),
                outputs: Mutex::new(Vec::new()),
                blocking: Mutex::new(HashSet::new()),
                refreshes: AtomicUsize::new(0),
            }),
        }
    }

    /// The emit handler this harness hands to the component.
    pub fn emitter(&self) -> Emitter {
        Arc::new(HarnessEmitter {
            shared: self.shared.clone(),
        })
    }

    /// Deliver a message with an explicit context.
    pub async fn handle_with(&self, ctx: Context, port: &str, msg: Packet) -> Result<()> {
        self.component
            .handle(ctx, self.emitter(), port, msg)
            .await
    }

    /// Deliver a JSON payload on a port (non-leader context).
    pub async fn send(&self, port: &str, data: JsonValue) -> Result<()> {
        self.handle_with(Context::new(), port, Packet::Value(data))
            .await
    }

    /// Deliver a JSON payload on a port with the leader flag set.
    pub async fn send_as_leader(&self, port: &str, data: JsonValue) -> Result<()> {
        self.handle_with(Context::leader(), port, Packet::Value(data))
            .await
    }

    /// Simulate a reconcile delivery with the current metadata (non-leader).
    pub async fn reconcile(&self) -> Result<()> {
        let snapshot = NodeState::with_metadata(self.metadata());
        self.handle_with(Context::new(), RECONCILE_PORT, Packet::Node(snapshot))
            .await
    }

    /// Simulate a reconcile delivery with the leader flag set.
    pub async fn reconcile_as_leader(&self) -> Result<()> {
        let snapshot = NodeState::with_metadata(self.metadata());
        self.handle_with(Context::leader(), RECONCILE_PORT, Packet::Node(snapshot))
            .await
    }

    /// Simulate a pod restart: fresh instance, same metadata, no captured
    /// outputs.
    pub fn new_pod(&self) -> Self {
        Self::with_metadata(self.component.instance(), self.metadata())
    }

    /// Mark an output port as blocking: emits on it resolve only when the
    /// emit context is cancelled.
    pub fn mark_blocking(&self, port: &str) {
        self.shared.blocking.lock().insert(port.to_string());
    }

    /// Snapshot of the simulated metadata map.
    pub fn metadata(&self) -> Metadata {
        self.shared.metadata.lock().clone()
    }

    /// Inject a metadata entry, as if written by another replica.
    pub fn insert_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.shared.metadata.lock().insert(key.into(), value.into());
    }

    /// All captured outputs in emission order.
    pub fn outputs(&self) -> Vec<PortMessage> {
        self.shared.outputs.lock().clone()
    }

    /// Payloads captured on one port, in emission order.
    pub fn port_outputs(&self, port: &str) -> Vec<JsonValue> {
        self.shared
            .outputs
            .lock()
            .iter()
            .filter(|m| m.port == port)
            .map(|m| m.data.clone())
            .collect()
    }

    /// Drop captured outputs (metadata is kept).
    pub fn clear_outputs(&self) {
        self.shared.outputs.lock().clear();
    }

    /// Number of reconcile-redraw requests the component has emitted.
    pub fn refresh_count(&self) -> usize {
        self.shared.refreshes.load(Ordering::SeqCst)
    }

    /// The component's current port descriptors.
    pub fn ports(&self) -> Vec<Port> {
        self.component.ports()
    }

    /// Find a port descriptor by name.
    pub fn port(&self, name: &str) -> Option<Port> {
        self.component.ports().into_iter().find(|p| p.name == name)
    }
}
