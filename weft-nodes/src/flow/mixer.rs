//! Mixer component.
//!
//! Remembers the latest value seen on each configured named input and,
//! when a trigger input fires, emits a record mixing all remembered values
//! plus the name of the port that initiated the emission.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the mixer component.
pub const COMPONENT_NAME: &str = "mixer";
/// Output port.
pub const OUTPUT_PORT: &str = "output";

/// Key under which an input's last value appears in the mixed record.
///
/// Input names are folded to an upper-cased suffix so they cannot collide
/// with the `from` marker.
pub fn prop_name(input: &str) -> String {
    format!("context{}", input.to_uppercase())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InputSettings {
    name: String,
    trigger: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Settings {
    inputs: Vec<InputSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inputs: vec![
                InputSettings {
                    name: "A".to_string(),
                    trigger: true,
                },
                InputSettings {
                    name: "B".to_string(),
                    trigger: true,
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Input {
    #[serde(default)]
    context: JsonValue,
}

/// Latest-value mixer.
#[derive(Debug, Default)]
pub struct Mixer {
    settings: Mutex<Settings>,
    inputs: Mutex<Map<String, JsonValue>>,
}

impl Mixer {
    fn input_settings(&self, port: &str) -> Option<InputSettings> {
        self.settings
            .lock()
            .inputs
            .iter()
            .find(|i| i.name == port)
            .cloned()
    }
}

impl Component for Mixer {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::default())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Mixer")
            .with_info("Mixes latest values on input ports into single message.")
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        let settings = self.settings.lock().clone();

        let mut example = Map::new();
        for input in &settings.inputs {
            example.insert(prop_name(&input.name), JsonValue::Null);
        }
        example.insert("from".to_string(), json!(""));

        let mut ports = vec![
            Port::settings(json!({
                "inputs": settings
                    .inputs
                    .iter()
                    .map(|i| json!({"name": i.name, "trigger": i.trigger}))
                    .collect::<Vec<_>>(),
            })),
            Port::new(OUTPUT_PORT)
                .labeled("Output")
                .source()
                .at(Position::Right)
                .with_config(JsonValue::Object(example)),
        ];

        for input in &settings.inputs {
            ports.push(
                Port::new(&input.name)
                    .labeled(input.name.to_uppercase())
                    .with_config(json!({ "context": null })),
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
            if port == SETTINGS_PORT {
                let settings: Settings =
                    msg.decode(port).map_err(|e| WeftError::InvalidSettings {
                        cause: e.to_string(),
                    })?;
                if settings.inputs.is_empty() {
                    return Err(WeftError::InvalidSettings {
                        cause: "at least one input is required".to_string(),
                    });
                }
                *self.settings.lock() = settings;
                // New wiring invalidates remembered values.
                self.inputs.lock().clear();
                return Ok(());
            }

            let Some(input_settings) = self.input_settings(port) else {
                return Err(WeftError::unknown_port(port));
            };
            let input: Input = msg.decode(port)?;

            let mixed = {
                let mut inputs = self.inputs.lock();
                inputs.insert(prop_name(port), input.context);
                if !input_settings.trigger {
                    return Ok(());
                }
                let mut mixed = inputs.clone();
                mixed.insert("from".to_string(), json!(port));
                mixed
            };

            emit.emit(ctx, OUTPUT_PORT, EmitMessage::Value(JsonValue::Object(mixed)))
                .await
        })
    }
}
