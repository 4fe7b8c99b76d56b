//! Group-by component.
//!
//! Partitions an array of items by the value resolved at a dot-notation
//! path. Groups are emitted in ascending key order; items whose path does
//! not resolve land in the empty-string bucket.

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the group-by component.
pub const COMPONENT_NAME: &str = "group_by";
/// Input port.
pub const IN_PORT: &str = "in";
/// Output port.
pub const OUT_PORT: &str = "out";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InMessage {
    #[serde(default)]
    context: JsonValue,
    items: Vec<JsonValue>,
    group_by_path: String,
}

/// Array partitioner.
#[derive(Debug, Default)]
pub struct GroupBy;

/// Resolve the grouping key for one item.
fn group_key(item: &JsonValue, path: &str) -> String {
    Value::from(item.clone())
        .get_field(path)
        .and_then(|v| v.as_string())
        .unwrap_or_default()
}

impl Component for GroupBy {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self)
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Group By")
            .with_info(
                "Groups an array of items by a specified field path. Input: items array + \
                 groupByPath (e.g., 'labels.app'). Output: array of groups sorted by key, \
                 each with key, items, and count.",
            )
            .with_tags(&["SDK", "Array", "Aggregate"])
    }

    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new(IN_PORT).labeled("In").with_config(json!({
                "context": null,
                "items": [],
                "groupByPath": "labels.app",
            })),
            Port::new(OUT_PORT)
                .labeled("Out")
                .source()
                .at(Position::Right)
                .with_config(json!({
                    "context": null,
                    "groups": [
                        { "key": "group-a", "items": [], "count": 2 },
                        { "key": "group-b", "items": [], "count": 1 },
                    ],
                    "total": 3,
                })),
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
            if input.group_by_path.is_empty() {
                return Err(WeftError::validation("groupByPath is required"));
            }

            let total = input.items.len();
            let mut buckets: BTreeMap<String, Vec<JsonValue>> = BTreeMap::new();
            for item in input.items {
                let key = group_key(&item, &input.group_by_path);
                buckets.entry(key).or_default().push(item);
            }

            let groups: Vec<JsonValue> = buckets
                .into_iter()
                .map(|(key, items)| {
                    json!({ "key": key, "count": items.len(), "items": items })
                })
                .collect();

            let payload = json!({
                "context": input.context,
                "groups": groups,
                "total": total,
            });
            emit.emit(ctx, OUT_PORT, EmitMessage::Value(payload)).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::testing::Harness;

    #[tokio::test]
    async fn groups_sorted_by_key_with_counts() {
        let harness = Harness::new(&GroupBy);
        harness
            .send(
                IN_PORT,
                json!({
                    "context": "c",
                    "items": [
                        {"kind": "pod", "name": "b"},
                        {"kind": "svc", "name": "s"},
                        {"kind": "pod", "name": "a"},
                    ],
                    "groupByPath": "kind",
                }),
            )
            .await
            .unwrap();

        let out = &harness.port_outputs(OUT_PORT)[0];
        assert_eq!(out["total"], json!(3));
        assert_eq!(out["groups"][0]["key"], json!("pod"));
        assert_eq!(out["groups"][0]["count"], json!(2));
        assert_eq!(out["groups"][1]["key"], json!("svc"));
        assert_eq!(out["groups"][1]["count"], json!(1));
    }

    #[tokio::test]
    async fn missing_path_goes_to_empty_key_bucket() {
        let harness = Harness::new(&GroupBy);
        harness
            .send(
                IN_PORT,
                json!({
                    "items": [{"a": 1}, {"labels": {"app": "web"}}],
                    "groupByPath": "labels.app",
                }),
            )
            .await
            .unwrap();

        let out = &harness.port_outputs(OUT_PORT)[0];
        assert_eq!(out["groups"][0]["key"], json!(""));
        assert_eq!(out["groups"][1]["key"], json!("web"));
    }

    #[tokio::test]
    async fn empty_items_produce_zero_groups() {
        let harness = Harness::new(&GroupBy);
        harness
            .send(IN_PORT, json!({"items": [], "groupByPath": "kind"}))
            .await
            .unwrap();

        let out = &harness.port_outputs(OUT_PORT)[0];
        assert_eq!(out["groups"], json!([]));
        assert_eq!(out["total"], json!(0));
    }

    #[tokio::test]
    async fn empty_path_is_rejected() {
        let harness = Harness::new(&GroupBy);
        let err = harness
            .send(IN_PORT, json!({"items": [], "groupByPath": ""}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E201");
    }

    #[test]
    fn key_resolution_is_case_insensitive_on_fallback() {
        let item = json!({"Labels": {"App": "api"}});
        assert_eq!(group_key(&item, "labels.app"), "api");
        assert_eq!(group_key(&json!({"x": 1}), "labels.app"), "");
    }
}
