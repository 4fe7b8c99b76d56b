//! Debug component (message sink).
//!
//! Stashes the latest payload and requests a reconcile redraw so the
//! control descriptor reflects it. No output ports.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the debug component.
pub const COMPONENT_NAME: &str = "debug";
/// Input port.
pub const IN_PORT: &str = "in";

#[derive(Debug, Deserialize)]
struct Settings {
    #[serde(default)]
    context: JsonValue,
}

#[derive(Debug, Deserialize)]
struct InMessage {
    #[serde(default)]
    context: JsonValue,
}

/// Flow endpoint for inspecting data.
#[derive(Debug, Default)]
pub struct DebugSink {
    last: Mutex<JsonValue>,
}

impl Component for DebugSink {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::default())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Debug")
            .with_info(
                "Message sink for inspection. Receives messages on In (no output ports). \
                 Displays last received message in Control port. Use as flow endpoint to \
                 inspect data or terminate unused branches.",
            )
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        let last = self.last.lock().clone();
        vec![
            Port::new(IN_PORT)
                .labeled("In")
                .with_config(json!({ "context": null })),
            Port::control(json!({ "context": &last })),
            Port::settings(json!({ "context": last })),
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
            match port {
                SETTINGS_PORT => {
                    let settings: Settings =
                        msg.decode(port).map_err(|e| WeftError::InvalidSettings {
                            cause: e.to_string(),
                        })?;
                    *self.last.lock() = settings.context;
                    Ok(())
                }
                IN_PORT => {
                    let input: InMessage = msg.decode(port)?;
                    *self.last.lock() = input.context;
                    emit.emit(ctx.detached(), RECONCILE_PORT, EmitMessage::Refresh)
                        .await
                }
                _ => Err(WeftError::unknown_port(port)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::testing::Harness;

    #[tokio::test]
    async fn stashes_last_value_and_redraws() {
        let harness = Harness::new(&DebugSink::default());
        harness
            .send(IN_PORT, json!({"context": {"seen": true}}))
            .await
            .unwrap();

        assert_eq!(harness.refresh_count(), 1);
        let control = harness.port(CONTROL_PORT).unwrap();
        assert_eq!(control.configuration, json!({"context": {"seen": true}}));
        // A sink: nothing emitted on data ports.
        assert!(harness.outputs().is_empty());
    }

    #[tokio::test]
    async fn settings_seed_the_display() {
        let harness = Harness::new(&DebugSink::default());
        harness
            .send(SETTINGS_PORT, json!({"context": "seed"}))
            .await
            .unwrap();
        let control = harness.port(CONTROL_PORT).unwrap();
        assert_eq!(control.configuration, json!({"context": "seed"}));
    }
}
