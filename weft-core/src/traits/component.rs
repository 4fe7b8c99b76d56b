//! Component trait and port descriptors.

use crate::context::Context;
use crate::error::Result;
use crate::message::Packet;
use crate::traits::emit::Emitter;
use serde_json::Value as JsonValue;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Reconcile port: inbound node snapshots, outbound metadata patches and
/// redraw requests.
pub const RECONCILE_PORT: &str = "_reconcile";
/// Settings port: inbound component settings.
pub const SETTINGS_PORT: &str = "_settings";
/// Control port: inbound operator actions (leader-only side effects),
/// outbound dashboard redraws.
pub const CONTROL_PORT: &str = "_control";
/// State port: inbound persisted state blob for blocking-edge targets;
/// a null payload means the state was deleted.
pub const STATE_PORT: &str = "_state";

/// Visual-layout hint for a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    /// Top edge of the node.
    Top,
    /// Bottom edge of the node.
    Bottom,
    /// Left edge of the node (conventional for inputs).
    #[default]
    Left,
    /// Right edge of the node (conventional for outputs).
    Right,
}

/// A port descriptor: the schema-level interface the host and UI see.
#[derive(Debug, Clone)]
pub struct Port {
    /// Port name. Underscore-prefixed names are reserved for system ports.
    pub name: String,
    /// Display label.
    pub label: String,
    /// Whether the port is output-capable.
    pub source: bool,
    /// Visual-layout hint.
    pub position: Position,
    /// Whether emits on this port block until the target edge ends.
    pub blocking: bool,
    /// Example payload; the host derives the port schema from it.
    pub configuration: JsonValue,
}

impl Port {
    /// Create an input port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            source: false,
            position: Position::default(),
            blocking: false,
            configuration: JsonValue::Null,
        }
    }

    /// Create the reconcile system port.
    pub fn reconcile() -> Self {
        Self::new(RECONCILE_PORT)
    }

    /// Create the settings system port with its example configuration.
    pub fn settings(configuration: JsonValue) -> Self {
        Self::new(SETTINGS_PORT)
            .labeled("Settings")
            .with_config(configuration)
    }

    /// Create the control system port with its example configuration.
    ///
    /// Control ports are marked as sources: components redraw their
    /// dashboards by emitting on them.
    pub fn control(configuration: JsonValue) -> Self {
        Self::new(CONTROL_PORT)
            .labeled("Control")
            .source()
            .with_config(configuration)
    }

    /// Mark the port as output-capable.
    #[must_use]
    pub fn source(mut self) -> Self {
        self.source = true;
        self
    }

    /// Mark emits on this port as blocking.
    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Set the display label.
    #[must_use]
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the visual-layout hint.
    #[must_use]
    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Set the example configuration payload.
    #[must_use]
    pub fn with_config(mut self, configuration: JsonValue) -> Self {
        self.configuration = configuration;
        self
    }
}

/// Static description of a component kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Stable kind name (the registry key).
    pub name: String,
    /// Short human description.
    pub description: String,
    /// Long-form usage notes shown in the UI.
    pub info: String,
    /// Tags for palette grouping.
    pub tags: Vec<String>,
}

impl ComponentInfo {
    /// Create component info with the given kind name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            info: String::new(),
            tags: Vec::new(),
        }
    }

    /// Set the short description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the long-form usage notes.
    #[must_use]
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = info.into();
        self
    }

    /// Set the tag list.
    #[must_use]
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_string()).collect();
        self
    }
}

/// A boxed future returned by component handlers.
pub type ComponentFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// The core trait every component kind implements.
///
/// Instances never own threads in isolation: concurrency comes from the
/// host dispatching overlapping handler calls and from workers the
/// instance spawns for timer/cron/async emission. All shared state must
/// therefore live behind locks, and handlers must assume concurrent
/// invocations across different ports.
///
/// # Example
///
/// ```ignore
/// use weft_core::prelude::*;
///
/// struct Echo;
///
/// impl Component for Echo {
///     fn instance(&self) -> Arc<dyn Component> {
///         Arc::new(Echo)
///     }
///
///     fn info(&self) -> ComponentInfo {
///         ComponentInfo::new("echo").with_description("Echo")
///     }
///
///     fn ports(&self) -> Vec<Port> {
///         vec![Port::new("in"), Port::new("out").source().at(Position::Right)]
///     }
///
///     fn handle<'a>(
///         &'a self,
///         ctx: Context,
///         emit: Emitter,
///         port: &'a str,
///         msg: Packet,
///     ) -> ComponentFuture<'a> {
///         Box::pin(async move {
///             let value = msg.decode::<serde_json::Value>(port)?;
///             emit.emit(ctx, "out", EmitMessage::Value(value)).await
///         })
///     }
/// }
/// ```
pub trait Component: Send + Sync {
    /// Produce a fresh instance of this kind.
    fn instance(&self) -> Arc<dyn Component>;

    /// Static description of the kind.
    fn info(&self) -> ComponentInfo;

    /// Current port descriptor list. Dynamic: may change as settings
    /// mutate, and any UI-visible state must be mirrored into the
    /// descriptors' example configurations.
    fn ports(&self) -> Vec<Port>;

    /// Handle one inbound message on `port`.
    ///
    /// The emit handler is furnished per invocation; it may be captured
    /// into a background worker only for the duration of the instance's
    /// run phase (signal, cron, ticker, scheduler document this).
    fn handle<'a>(
        &'a self,
        ctx: Context,
        emit: Emitter,
        port: &'a str,
        msg: Packet,
    ) -> ComponentFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn port_builder() {
        let port = Port::new("out")
            .labeled("Out")
            .source()
            .blocking()
            .at(Position::Right)
            .with_config(json!({"context": null}));

        assert_eq!(port.name, "out");
        assert_eq!(port.label, "Out");
        assert!(port.source);
        assert!(port.blocking);
        assert_eq!(port.position, Position::Right);
    }

    #[test]
    fn system_port_names() {
        assert_eq!(Port::reconcile().name, "_reconcile");
        assert_eq!(Port::settings(JsonValue::Null).name, "_settings");
        let control = Port::control(json!({"reset": true}));
        assert_eq!(control.name, "_control");
        assert!(control.source);
    }

    #[test]
    fn component_info_builder() {
        let info = ComponentInfo::new("cron")
            .with_description("Cron")
            .with_tags(&["SDK"]);

        assert_eq!(info.name, "cron");
        assert_eq!(info.description, "Cron");
        assert_eq!(info.tags, vec!["SDK".to_string()]);
    }
}
