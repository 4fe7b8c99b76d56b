//! Array-get component (1-based element access).
//!
//! Resolves `array[index-1]` for numbered-reference patterns where users
//! pick items by number from a previously displayed list. Errors go to the
//! error port when it is enabled, otherwise back to the caller.

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the array-get component.
pub const COMPONENT_NAME: &str = "array_get";
/// Request port.
pub const REQUEST_PORT: &str = "request";
/// Result port.
pub const RESULT_PORT: &str = "result";
/// Optional error port.
pub const ERROR_PORT: &str = "error";

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    #[serde(default)]
    enable_error_port: bool,
}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    context: JsonValue,
    array: Vec<JsonValue>,
    index: i64,
}

/// 1-based array element accessor.
#[derive(Debug, Default)]
pub struct ArrayGet {
    settings: RwLock<Settings>,
}

impl ArrayGet {
    async fn fail(
        &self,
        ctx: Context,
        emit: &Emitter,
        context: JsonValue,
        message: String,
    ) -> Result<()> {
        if self.settings.read().enable_error_port {
            let payload = json!({ "context": context, "error": message });
            return emit.emit(ctx, ERROR_PORT, EmitMessage::Value(payload)).await;
        }
        Err(WeftError::validation(message))
    }
}

impl Component for ArrayGet {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::default())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Array Get")
            .with_info(
                "Get an element from an array by 1-based index. Returns the item or an error \
                 if index is out of range. Useful for numbered reference patterns where users \
                 select items by number from a previously displayed list.",
            )
            .with_tags(&["SDK", "ARRAY"])
    }

    fn ports(&self) -> Vec<Port> {
        let enable_error_port = self.settings.read().enable_error_port;

        let mut ports = vec![
            Port::settings(json!({ "enableErrorPort": enable_error_port })),
            Port::new(REQUEST_PORT)
                .labeled("Request")
                .with_config(json!({
                    "context": null,
                    "array": ["first", "second", "third"],
                    "index": 1,
                })),
            Port::new(RESULT_PORT)
                .labeled("Result")
                .source()
                .at(Position::Right)
                .with_config(json!({ "context": null, "item": "first", "index": 1 })),
        ];

        if enable_error_port {
            ports.push(
                Port::new(ERROR_PORT)
                    .labeled("Error")
                    .source()
                    .at(Position::Bottom)
                    .with_config(json!({ "context": null, "error": "" })),
            );
        }

        ports
    }

    fn handle<'a>(
        &'a self,
        ctx: Context,
        emit: Emitter,
        port: &'a str,
        msg: Packet,
    ) -> ComponentFuture<'a> {
        Box::pin(async move {
            match port {
                SETTINGS_PORT => {
                    let settings: Settings =
                        msg.decode(port).map_err(|e| WeftError::InvalidSettings {
                            cause: e.to_string(),
                        })?;
                    *self.settings.write() = settings;
                    Ok(())
                }

                REQUEST_PORT => {
                    let request: Request = msg.decode(port)?;

                    if request.array.is_empty() {
                        return self
                            .fail(
                                ctx,
                                &emit,
                                request.context,
                                "array is empty — run a list command first".to_string(),
                            )
                            .await;
                    }
                    if request.index < 1 {
                        return self
                            .fail(
                                ctx,
                                &emit,
                                request.context,
                                format!("index must be >= 1, got {}", request.index),
                            )
                            .await;
                    }
                    let len = request.array.len();
                    if request.index as usize > len {
                        return self
                            .fail(
                                ctx,
                                &emit,
                                request.context,
                                format!(
                                    "item #{} not found — list has {} item(s)",
                                    request.index, len
                                ),
                            )
                            .await;
                    }

                    let item = request.array[(request.index - 1) as usize].clone();
                    let payload = json!({
                        "context": request.context,
                        "item": item,
                        "index": request.index,
                    });
                    emit.emit(ctx, RESULT_PORT, EmitMessage::Value(payload)).await
                }

                _ => Err(WeftError::unknown_port(port)),
            }
        })
    }
}
