//! Router component (condition-ordered routing).
//!
//! Evaluates the message's condition list in order and emits the context
//! on the output port of the first condition that holds. Output ports are
//! derived from the configured routes, so the descriptor list regenerates
//! on every settings update.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the router component.
pub const COMPONENT_NAME: &str = "router";
/// Input port.
pub const IN_PORT: &str = "input";
/// Fallback output port, present when enabled via settings.
pub const DEFAULT_PORT: &str = "default";

/// Output port name for a route.
pub fn route_port_name(route: &str) -> String {
    format!("out_{}", route.to_lowercase())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    routes: Vec<String>,
    #[serde(default)]
    enable_default_port: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            routes: vec!["A".to_string(), "B".to_string()],
            enable_default_port: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Condition {
    route: String,
    condition: bool,
}

#[derive(Debug, Deserialize)]
struct InMessage {
    #[serde(default)]
    context: JsonValue,
    conditions: Vec<Condition>,
}

/// First-match message router.
#[derive(Debug, Default)]
pub struct Router {
    settings: Mutex<Settings>,
}

impl Component for Router {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::default())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Router")
            .with_info("Routes incoming messages depends on message itself.")
            .with_tags(&["SDK"])
    }

    fn ports(&self) -> Vec<Port> {
        let settings = self.settings.lock().clone();

        let first_route = settings
            .routes
            .first()
            .cloned()
            .unwrap_or_else(|| "A".to_string());

        let mut ports = vec![
            Port::settings(json!({
                "routes": &settings.routes,
                "enableDefaultPort": settings.enable_default_port,
            })),
            Port::new(IN_PORT).labeled("IN").with_config(json!({
                "context": null,
                "conditions": [{ "route": first_route, "condition": true }],
            })),
        ];

        for route in &settings.routes {
            ports.push(
                Port::new(route_port_name(route))
                    .labeled(route.to_uppercase())
                    .source()
                    .at(Position::Right),
            );
        }

        if settings.enable_default_port {
            ports.push(
                Port::new(DEFAULT_PORT)
                    .labeled("Default")
                    .source()
                    .at(Position::Bottom),
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
                    if settings.routes.is_empty() {
                        return Err(WeftError::InvalidSettings {
                            cause: "routes must not be empty".to_string(),
                        });
                    }
                    *self.settings.lock() = settings;
                    Ok(())
                }

                IN_PORT => {
                    let input: InMessage = msg.decode(port)?;

                    for condition in &input.conditions {
                        if condition.condition {
                            let out = route_port_name(&condition.route);
                            return emit
                                .emit(ctx, &out, EmitMessage::Value(input.context))
                                .await;
                        }
                    }

                    if self.settings.lock().enable_default_port {
                        return emit
                            .emit(ctx, DEFAULT_PORT, EmitMessage::Value(input.context))
                            .await;
                    }
                    // No match and no default port: drop.
                    Ok(())
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
    async fn routes_to_first_true_condition() {
        let harness = Harness::new(&Router::default());
        harness
            .send(
                SETTINGS_PORT,
                json!({"routes": ["A", "B"], "enableDefaultPort": false}),
            )
            .await
            .unwrap();

        harness
            .send(
                IN_PORT,
                json!({
                    "context": "c",
                    "conditions": [
                        {"route": "A", "condition": false},
                        {"route": "B", "condition": true},
                    ],
                }),
            )
            .await
            .unwrap();

        assert_eq!(harness.port_outputs("out_b"), vec![json!("c")]);
        assert_eq!(harness.outputs().len(), 1);
    }

    #[tokio::test]
    async fn no_match_without_default_drops() {
        let harness = Harness::new(&Router::default());
        harness
            .send(
                IN_PORT,
                json!({"context": 1, "conditions": [{"route": "A", "condition": false}]}),
            )
            .await
            .unwrap();
        assert!(harness.outputs().is_empty());
    }

    #[tokio::test]
    async fn no_match_with_default_emits_there() {
        let harness = Harness::new(&Router::default());
        harness
            .send(
                SETTINGS_PORT,
                json!({"routes": ["A"], "enableDefaultPort": true}),
            )
            .await
            .unwrap();

        harness
            .send(
                IN_PORT,
                json!({"context": "x", "conditions": [{"route": "A", "condition": false}]}),
            )
            .await
            .unwrap();
        assert_eq!(harness.port_outputs(DEFAULT_PORT), vec![json!("x")]);
    }

    #[tokio::test]
    async fn descriptors_track_routes() {
        let harness = Harness::new(&Router::default());
        harness
            .send(
                SETTINGS_PORT,
                json!({"routes": ["Alpha", "Beta"], "enableDefaultPort": true}),
            )
            .await
            .unwrap();

        let names: Vec<_> = harness.ports().into_iter().map(|p| p.name).collect();
        assert!(names.contains(&"out_alpha".to_string()));
        assert!(names.contains(&"out_beta".to_string()));
        assert!(names.contains(&DEFAULT_PORT.to_string()));
    }

    #[tokio::test]
    async fn empty_routes_are_invalid_settings() {
        let harness = Harness::new(&Router::default());
        let err = harness
            .send(SETTINGS_PORT, json!({"routes": []}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E102");
    }
}
