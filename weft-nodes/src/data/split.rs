//! Split component (array iterator).
//!
//! Emits one message per array element, sequentially: the next emission
//! begins only after the previous one returns. A downstream error stops
//! the iteration and propagates to the caller.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the split component.
pub const COMPONENT_NAME: &str = "array_split";
/// Input port.
pub const IN_PORT: &str = "in";
/// Output port.
pub const OUT_PORT: &str = "out";

#[derive(Debug, Deserialize)]
struct InMessage {
    #[serde(default)]
    context: JsonValue,
    array: Vec<JsonValue>,
}

#[derive(Debug, Serialize)]
struct OutMessage {
    context: JsonValue,
    item: JsonValue,
}

/// Sequential array fan-out.
#[derive(Debug, Default)]
pub struct Split;

impl Component for Split {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self)
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Split Array")
            .with_info(
                "Array iterator. Input: context + array. Emits one message per array element \
                 on Out, each containing {context, item}. Elements are processed sequentially - \
                 next item sent after previous Out completes. Use to process lists item by item.",
            )
            .with_tags(&["SDK", "ARRAY"])
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new(IN_PORT)
                .labeled("In")
                .with_config(json!({ "context": null, "array": [] })),
            Port::new(OUT_PORT)
                .labeled("Out")
                .source()
                .at(Position::Right)
                .with_config(json!({ "context": null, "item": null })),
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

            for item in input.array {
                let out = OutMessage {
                    context: input.context.clone(),
                    item,
                };
                emit.emit(ctx.clone(), OUT_PORT, EmitMessage::json(&out)?)
                    .await?;
            }
            Ok(())
        })
    }
}
