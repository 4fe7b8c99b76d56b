//! Inject component (config enrichment).
//!
//! Accumulates a stored config via the Config port and attaches it to
//! every message passing through. The config survives replica restarts
//! via metadata; the settings-from-port guard keeps a delayed reconcile
//! from overwriting freshly received config.

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the inject component.
pub const COMPONENT_NAME: &str = "inject";
/// Config input port.
pub const CONFIG_PORT: &str = "config";
/// Message input port.
pub const MESSAGE_PORT: &str = "message";
/// Output port.
pub const OUTPUT_PORT: &str = "output";
/// Optional error port, present while `configRequired` is set.
pub const ERROR_PORT: &str = "error";

/// Metadata key holding the JSON-encoded config.
pub const METADATA_KEY_CONFIG: &str = "inject-config";

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    #[serde(default)]
    config_required: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigMessage {
    data: JsonValue,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    context: JsonValue,
}

/// Config injection with metadata persistence.
#[derive(Debug, Default)]
pub struct Inject {
    settings: Mutex<Settings>,
    config: Mutex<JsonValue>,
    config_from_port: AtomicBool,
}

impl Component for Inject {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::default())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Inject")
            .with_info(
                "Injects stored configuration into passing messages. Send config once, then \
                 every message passing through gets it attached. Config persists across pod \
                 restarts via metadata.",
            )
            .with_tags(&["Data", "Config", "Enrich"])
    }

    fn ports(&self) -> Vec<Port> {
        let settings = *self.settings.lock();

        let mut ports = vec![
            Port::reconcile(),
            Port::settings(json!({ "configRequired": settings.config_required })),
            Port::new(CONFIG_PORT)
                .labeled("Config")
                .at(Position::Top)
                .with_config(json!({ "data": null })),
            Port::new(MESSAGE_PORT)
                .labeled("Message")
                .with_config(json!({ "context": null })),
            Port::new(OUTPUT_PORT)
                .labeled("Output")
                .source()
                .at(Position::Right)
                .with_config(json!({ "context": null, "config": null })),
        ];

        if settings.config_required {
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
                RECONCILE_PORT => {
                    let Some(node) = msg.node() else {
                        return Ok(());
                    };
                    let Some(raw) = node.get(METADATA_KEY_CONFIG) else {
                        return Ok(());
                    };
                    if self.config_from_port.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    if let Ok(config) = serde_json::from_str::<JsonValue>(raw) {
                        *self.config.lock() = config;
                    }
                    Ok(())
                }

                SETTINGS_PORT => {
                    let settings: Settings =
                        msg.decode(port).map_err(|e| WeftError::InvalidSettings {
                            cause: e.to_string(),
                        })?;
                    *self.settings.lock() = settings;
                    Ok(())
                }

                CONFIG_PORT => {
                    let config: ConfigMessage = msg.decode(port)?;
                    let encoded = serde_json::to_string(&config.data)
                        .map_err(|e| WeftError::Serialization(e.to_string()))?;
                    *self.config.lock() = config.data;
                    self.config_from_port.store(true, Ordering::SeqCst);

                    emit.emit(
                        ctx.detached(),
                        RECONCILE_PORT,
                        EmitMessage::patch(move |meta| {
                            meta.insert(METADATA_KEY_CONFIG.to_string(), encoded);
                            Ok(())
                        }),
                    )
                    .await
                }

                MESSAGE_PORT => {
                    let message: Message = msg.decode(port)?;
                    let config = self.config.lock().clone();

                    if self.settings.lock().config_required && config.is_null() {
                        let payload = json!({
                            "context": message.context,
                            "error": "config not set",
                        });
                        return emit.emit(ctx, ERROR_PORT, EmitMessage::Value(payload)).await;
                    }

                    let payload = json!({ "context": message.context, "config": config });
                    emit.emit(ctx, OUTPUT_PORT, EmitMessage::Value(payload)).await
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
    async fn injects_stored_config() {
        let harness = Harness::new(&Inject::default());
        harness
            .send(CONFIG_PORT, json!({"data": {"a": "x"}}))
            .await
            .unwrap();
        harness
            .send(MESSAGE_PORT, json!({"context": "t1"}))
            .await
            .unwrap();

        assert_eq!(
            harness.port_outputs(OUTPUT_PORT),
            vec![json!({"context": "t1", "config": {"a": "x"}})]
        );
        assert_eq!(
            harness.metadata().get(METADATA_KEY_CONFIG).map(String::as_str),
            Some(r#"{"a":"x"}"#)
        );
    }

    #[tokio::test]
    async fn config_required_routes_to_error_port() {
        let harness = Harness::new(&Inject::default());
        harness
            .send(SETTINGS_PORT, json!({"configRequired": true}))
            .await
            .unwrap();
        harness
            .send(MESSAGE_PORT, json!({"context": "t"}))
            .await
            .unwrap();

        assert_eq!(
            harness.port_outputs(ERROR_PORT),
            vec![json!({"context": "t", "error": "config not set"})]
        );
        assert!(harness.port_outputs(OUTPUT_PORT).is_empty());
    }

    #[tokio::test]
    async fn guard_blocks_stale_reconcile() {
        let harness = Harness::new(&Inject::default());
        harness
            .send(CONFIG_PORT, json!({"data": "fresh"}))
            .await
            .unwrap();

        harness.insert_metadata(METADATA_KEY_CONFIG, r#""stale""#);
        harness.reconcile().await.unwrap();

        harness.send(MESSAGE_PORT, json!({"context": 1})).await.unwrap();
        assert_eq!(
            harness.port_outputs(OUTPUT_PORT),
            vec![json!({"context": 1, "config": "fresh"})]
        );
    }

    #[tokio::test]
    async fn error_port_descriptor_follows_settings() {
        let harness = Harness::new(&Inject::default());
        assert!(harness.port(ERROR_PORT).is_none());

        harness
            .send(SETTINGS_PORT, json!({"configRequired": true}))
            .await
            .unwrap();
        assert!(harness.port(ERROR_PORT).is_some());
    }
}
