//! Modify component (transformer pass-through).
//!
//! Semantically a no-op: forwards the incoming context verbatim. Exists so
//! the host's edge-layer configuration can reshape the payload in transit.

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the modify component.
pub const COMPONENT_NAME: &str = "common_modify";
/// Input port.
pub const IN_PORT: &str = "in";
/// Output port.
pub const OUT_PORT: &str = "out";

#[derive(Debug, Deserialize)]
struct InMessage {
    #[serde(default)]
    context: JsonValue,
}

/// Pass-through transformer.
#[derive(Debug, Default)]
pub struct Modify;

impl Component for Modify {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self)
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Modify")
            .with_info("Sends a new message after incoming message received")
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new(IN_PORT)
                .labeled("In")
                .with_config(json!({ "context": null })),
            Port::new(OUT_PORT)
                .labeled("Out")
                .source()
                .at(Position::Right),
        ]
    }

    fn handle<'a>(
        &'a self,
        ctx: Context,
        emit: Emitter,
        port: &'a str,
        msg: Packet,
    ) -> ComponentFuture<'a> {
        Box::pin(async move {
            if port != IN_PORT {
                return Err(WeftError::unknown_port(port));
            }
            let input: InMessage = msg.decode(port)?;
            emit.emit(ctx, OUT_PORT, EmitMessage::Value(input.context))
                .await
        })
    }
}
