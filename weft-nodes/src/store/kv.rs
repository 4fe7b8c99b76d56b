//! Key-value store component.
//!
//! Metadata-backed keyed document store with predicate queries. Documents
//! are JSON objects addressed by a configurable primary key; every record
//! is mirrored into metadata under `kv-<key>`, which is what survives
//! replica restarts. Persistence is best-effort: the host debounces
//! metadata writes, so data written within the debounce window can be
//! lost on a crash. Best suited for state that gets periodically
//! refreshed.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weft_core::prelude::*;

/// Kind name of the KV component.
pub const COMPONENT_NAME: &str = "kv";

/// Store/delete input port.
pub const STORE_PORT: &str = "store";
/// Query input port.
pub const QUERY_PORT: &str = "query";
/// Query result output port.
pub const QUERY_RESULT_PORT: &str = "query_result";
/// Optional store acknowledgement output port.
pub const STORE_ACK_PORT: &str = "store_ack";

/// Prefix of the metadata keys mirroring records.
pub const METADATA_PREFIX: &str = "kv-";
/// Record count cap when settings leave it unset.
pub const DEFAULT_MAX_RECORDS: usize = 100;
/// Per-record serialized size cap in bytes.
pub const MAX_RECORD_SIZE_BYTES: usize = 32 * 1024;

/// A stored document: a JSON object with arbitrary values.
pub type Document = Map<String, JsonValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    document: Document,
    primary_key: String,
    #[serde(default)]
    max_records: usize,
    #[serde(default)]
    enable_store_ack: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let mut document = Document::new();
        document.insert("id".to_string(), json!("ID"));
        Self {
            document,
            primary_key: "id".to_string(),
            max_records: DEFAULT_MAX_RECORDS,
            enable_store_ack: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Store,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreRequest {
    #[serde(default)]
    context: JsonValue,
    operation: Operation,
    document: Document,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    context: JsonValue,
    #[serde(default)]
    query: String,
}

/// Metadata-backed document store with predicate queries.
///
/// The store and query flows carry independent context markers
/// (store → store_ack, query → query_result) so the host can track their
/// type propagation separately.
#[derive(Debug)]
pub struct KvStore {
    settings: RwLock<Settings>,
    /// Primary key → JSON-serialized document. Ordered so queries walk
    /// records in ascending key order.
    records: RwLock<BTreeMap<String, String>>,
    store_used: AtomicBool,
}

impl KvStore {
    /// Create an empty store with default settings.
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(Settings::default()),
            records: RwLock::new(BTreeMap::new()),
            store_used: AtomicBool::new(false),
        }
    }

    fn control_config(&self) -> JsonValue {
        json!({
            "records": self.records.read().len(),
            "reset": true,
        })
    }

    async fn redraw_control(&self, ctx: &Context, emit: &Emitter) {
        let _ = emit
            .emit(
                ctx.detached(),
                CONTROL_PORT,
                EmitMessage::Value(self.control_config()),
            )
            .await;
    }

    async fn handle_store(&self, ctx: Context, emit: Emitter, request: StoreRequest) -> Result<()> {
        let (primary_key, max_records, enable_ack) = {
            let settings = self.settings.read();
            (
                settings.primary_key.clone(),
                settings.max_records,
                settings.enable_store_ack,
            )
        };

        let key = match request.document.get(&primary_key) {
            None => {
                return Err(WeftError::PrimaryKey {
                    cause: format!("primary key {primary_key:?} not found in document"),
                })
            }
            Some(JsonValue::String(s)) if s.is_empty() => {
                return Err(WeftError::PrimaryKey {
                    cause: "primary key cannot be empty".to_string(),
                })
            }
            Some(JsonValue::String(s)) => s.clone(),
            Some(other) => {
                return Err(WeftError::PrimaryKey {
                    cause: format!("primary key must be a string, got {other}"),
                })
            }
        };

        self.store_used.store(true, Ordering::SeqCst);
        let meta_key = format!("{METADATA_PREFIX}{key}");

        match request.operation {
            Operation::Store => {
                let data = serde_json::to_string(&request.document)
                    .map_err(|e| WeftError::Serialization(e.to_string()))?;
                if data.len() > MAX_RECORD_SIZE_BYTES {
                    return Err(WeftError::DocumentTooLarge {
                        size: data.len(),
                        max: MAX_RECORD_SIZE_BYTES,
                    });
                }

                {
                    let mut records = self.records.write();
                    if !records.contains_key(&key) && records.len() >= max_records {
                        return Err(WeftError::StoreFull {
                            count: records.len(),
                            max: max_records,
                        });
                    }
                    records.insert(key.clone(), data.clone());
                }

                emit.emit(
                    ctx.detached(),
                    RECONCILE_PORT,
                    EmitMessage::patch(move |meta| {
                        meta.insert(meta_key, data);
                        Ok(())
                    }),
                )
                .await?;
            }

            Operation::Delete => {
                self.records.write().remove(&key);
                emit.emit(
                    ctx.detached(),
                    RECONCILE_PORT,
                    EmitMessage::patch(move |meta| {
                        meta.remove(&meta_key);
                        Ok(())
                    }),
                )
                .await?;
            }
        }

        self.redraw_control(&ctx, &emit).await;

        if enable_ack {
            let ack = json!({ "context": &request.context, "request": &request });
            return emit.emit(ctx, STORE_ACK_PORT, EmitMessage::Value(ack)).await;
        }
        Ok(())
    }

    async fn handle_query(&self, ctx: Context, emit: Emitter, request: QueryRequest) -> Result<()> {
        let records = self.records.read().clone();
        let mut results = Vec::new();

        for (key, raw) in &records {
            let Ok(document) = serde_json::from_str::<JsonValue>(raw) else {
                continue;
            };
            if !request.query.is_empty() {
                let matched = Value::from(document.clone()).eval_predicate(&request.query);
                if matched != Some(true) {
                    continue;
                }
            }
            results.push(json!({ "key": key, "document": document }));
        }

        let count = results.len();
        let payload = json!({
            "context": request.context,
            "results": results,
            "count": count,
            "query": request.query,
        });
        emit.emit(ctx, QUERY_RESULT_PORT, EmitMessage::Value(payload))
            .await
    }
}

impl Default for KvStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for KvStore {
    fn instance(&self) -> Arc<dyn Component> {
        Arc::new(Self::new())
    }

    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(COMPONENT_NAME)
            .with_description("Key-Value Store")
            .with_info(
                "Key-value store backed by node metadata. Stores documents with a configurable \
                 schema and primary key. Supports predicate queries. Persistence is \
                 best-effort: writes are debounced before reaching the host, so data may be \
                 lost on a crash within that window. Multi-replica safe but eventually \
                 consistent. Best suited for state that gets periodically refreshed.",
            )
            .with_tags(&["KV", "Storage", "Data"])
    }

    fn ports(&self) -> Vec<Port> {
        let settings = self.settings.read().clone();

        let mut ports = vec![
            Port::reconcile(),
            Port::settings(json!({
                "document": &settings.document,
                "primaryKey": settings.primary_key,
                "maxRecords": settings.max_records,
                "enableStoreAck": settings.enable_store_ack,
            })),
            Port::control(self.control_config()),
            Port::new(STORE_PORT).labeled("Store").with_config(json!({
                "context": null,
                "operation": "store",
                "document": &settings.document,
            })),
            Port::new(QUERY_PORT).labeled("Query").with_config(json!({
                "context": null,
                "query": "$.status == 'DOWN'",
            })),
            Port::new(QUERY_RESULT_PORT)
                .labeled("Query Result")
                .source()
                .at(Position::Right)
                .with_config(json!({
                    "context": null,
                    "results": [{ "key": "", "document": &settings.document }],
                    "count": 0,
                    "query": "",
                })),
        ];

        if settings.enable_store_ack {
            ports.push(
                Port::new(STORE_ACK_PORT)
                    .labeled("Store Ack")
                    .source()
                    .at(Position::Right)
                    .with_config(json!({
                        "context": null,
                        "request": { "operation": "store", "document": &settings.document },
                    })),
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
                    if self.store_used.load(Ordering::SeqCst) {
                        return Ok(());
                    }
                    let mut records = self.records.write();
                    for (key, value) in &node.metadata {
                        if let Some(record_key) = key.strip_prefix(METADATA_PREFIX) {
                            records.insert(record_key.to_string(), value.clone());
                        }
                    }
                    Ok(())
                }

                SETTINGS_PORT => {
                    let mut settings: Settings =
                        msg.decode(port).map_err(|e| WeftError::InvalidSettings {
                            cause: e.to_string(),
                        })?;
                    if settings.document.is_empty() {
                        return Err(WeftError::InvalidSettings {
                            cause: "document must have at least one field".to_string(),
                        });
                    }
                    if settings.primary_key.is_empty() {
                        return Err(WeftError::InvalidSettings {
                            cause: "primary key cannot be empty".to_string(),
                        });
                    }
                    if !settings.document.contains_key(&settings.primary_key) {
                        return Err(WeftError::InvalidSettings {
                            cause: format!(
                                "primary key {:?} not found in document",
                                settings.primary_key
                            ),
                        });
                    }
                    if settings.max_records == 0 {
                        settings.max_records = DEFAULT_MAX_RECORDS;
                    }
                    *self.settings.write() = settings;
                    Ok(())
                }

                CONTROL_PORT => {
                    if !ctx.is_leader() {
                        return Ok(());
                    }
                    #[derive(Deserialize)]
                    struct ControlMsg {
                        #[serde(default)]
                        reset: bool,
                    }
                    let control: ControlMsg = msg.decode(port)?;
                    if !control.reset {
                        return Ok(());
                    }

                    self.records.write().clear();
                    self.store_used.store(false, Ordering::SeqCst);

                    emit.emit(
                        ctx.detached(),
                        RECONCILE_PORT,
                        EmitMessage::patch(|meta| {
                            meta.retain(|key, _| !key.starts_with(METADATA_PREFIX));
                            Ok(())
                        }),
                    )
                    .await?;

                    self.redraw_control(&ctx, &emit).await;
                    Ok(())
                }

                STORE_PORT => {
                    let request: StoreRequest = msg.decode(port)?;
                    self.handle_store(ctx, emit, request).await
                }

                QUERY_PORT => {
                    let request: QueryRequest = msg.decode(port)?;
                    self.handle_query(ctx, emit, request).await
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

    async fn store_doc(harness: &Harness, document: JsonValue) {
        harness
            .send(
                STORE_PORT,
                json!({"operation": "store", "document": document}),
            )
            .await
            .unwrap();
    }

    async fn query_all(harness: &Harness) -> JsonValue {
        harness.clear_outputs();
        harness.send(QUERY_PORT, json!({"query": ""})).await.unwrap();
        harness.port_outputs(QUERY_RESULT_PORT).remove(0)
    }

    #[tokio::test]
    async fn store_and_query_all() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "ep1", "status": "UP"})).await;

        let result = query_all(&harness).await;
        assert_eq!(result["count"], json!(1));
        assert_eq!(result["results"][0]["key"], json!("ep1"));
        assert_eq!(result["results"][0]["document"]["status"], json!("UP"));
    }

    #[tokio::test]
    async fn query_by_predicate() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "ep1", "status": "UP"})).await;
        store_doc(&harness, json!({"id": "ep2", "status": "DOWN"})).await;

        harness.clear_outputs();
        harness
            .send(QUERY_PORT, json!({"query": "$.status == 'DOWN'"}))
            .await
            .unwrap();

        let result = harness.port_outputs(QUERY_RESULT_PORT).remove(0);
        assert_eq!(result["count"], json!(1));
        assert_eq!(result["results"][0]["key"], json!("ep2"));
    }

    #[tokio::test]
    async fn results_are_in_ascending_key_order() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "b"})).await;
        store_doc(&harness, json!({"id": "a"})).await;
        store_doc(&harness, json!({"id": "c"})).await;

        let result = query_all(&harness).await;
        let keys: Vec<_> = result["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["key"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn store_delete_store_round_trip() {
        let harness = Harness::new(&KvStore::new());
        let doc = json!({"id": "ep1", "status": "UP"});
        store_doc(&harness, doc.clone()).await;
        harness
            .send(
                STORE_PORT,
                json!({"operation": "delete", "document": {"id": "ep1"}}),
            )
            .await
            .unwrap();
        assert!(!harness.metadata().contains_key("kv-ep1"));

        store_doc(&harness, doc.clone()).await;
        let result = query_all(&harness).await;
        assert_eq!(result["count"], json!(1));
        assert_eq!(result["results"][0]["document"], doc);
    }

    #[tokio::test]
    async fn metadata_mirrors_records() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "ep1", "status": "UP"})).await;

        let raw = harness.metadata().get("kv-ep1").cloned().unwrap();
        let document: JsonValue = serde_json::from_str(&raw).unwrap();
        assert_eq!(document["status"], json!("UP"));
    }

    #[tokio::test]
    async fn pod_restart_restores_records() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "ep1", "status": "DOWN"})).await;

        let pod2 = harness.new_pod();
        pod2.reconcile().await.unwrap();

        let result = query_all(&pod2).await;
        assert_eq!(result["count"], json!(1));
        assert_eq!(result["results"][0]["document"]["status"], json!("DOWN"));
    }

    #[tokio::test]
    async fn stale_reconcile_does_not_overwrite() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "ep1", "status": "UP"})).await;

        harness.insert_metadata("kv-ep1", r#"{"id":"ep1","status":"STALE"}"#);
        harness.reconcile().await.unwrap();

        let result = query_all(&harness).await;
        assert_eq!(result["results"][0]["document"]["status"], json!("UP"));
    }

    #[tokio::test]
    async fn rejects_bad_primary_keys() {
        let harness = Harness::new(&KvStore::new());

        let err = harness
            .send(
                STORE_PORT,
                json!({"operation": "store", "document": {"name": "no-pk"}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E301");

        let err = harness
            .send(
                STORE_PORT,
                json!({"operation": "store", "document": {"id": ""}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E301");

        let err = harness
            .send(
                STORE_PORT,
                json!({"operation": "store", "document": {"id": 42}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E301");
    }

    #[tokio::test]
    async fn enforces_record_size_limit() {
        let harness = Harness::new(&KvStore::new());
        let big = "x".repeat(33 * 1024);
        let err = harness
            .send(
                STORE_PORT,
                json!({"operation": "store", "document": {"id": "big", "data": big}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E302");
    }

    #[tokio::test]
    async fn enforces_max_records_but_allows_updates() {
        let harness = Harness::new(&KvStore::new());
        harness
            .send(
                SETTINGS_PORT,
                json!({
                    "document": {"id": ""},
                    "primaryKey": "id",
                    "maxRecords": 2,
                    "enableStoreAck": false,
                }),
            )
            .await
            .unwrap();

        store_doc(&harness, json!({"id": "a"})).await;
        store_doc(&harness, json!({"id": "b"})).await;

        let err = harness
            .send(
                STORE_PORT,
                json!({"operation": "store", "document": {"id": "c"}}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E303");

        // Updating an existing key is still allowed at capacity.
        store_doc(&harness, json!({"id": "a", "updated": "yes"})).await;
    }

    #[tokio::test]
    async fn reset_clears_records_guard_and_metadata() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "ep1", "status": "UP"})).await;

        harness
            .send_as_leader(CONTROL_PORT, json!({"reset": true}))
            .await
            .unwrap();

        assert!(harness.metadata().is_empty());
        let result = query_all(&harness).await;
        assert_eq!(result["count"], json!(0));

        // Guard cleared: a later reconcile repopulates from metadata again.
        harness.insert_metadata("kv-ep9", r#"{"id":"ep9"}"#);
        harness.reconcile().await.unwrap();
        let result = query_all(&harness).await;
        assert_eq!(result["count"], json!(1));
    }

    #[tokio::test]
    async fn reset_requires_leader() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "ep1"})).await;

        harness
            .send(CONTROL_PORT, json!({"reset": true}))
            .await
            .unwrap();
        assert!(harness.metadata().contains_key("kv-ep1"));
    }

    #[tokio::test]
    async fn store_ack_emitted_when_enabled() {
        let harness = Harness::new(&KvStore::new());
        harness
            .send(
                SETTINGS_PORT,
                json!({
                    "document": {"id": ""},
                    "primaryKey": "id",
                    "maxRecords": 0,
                    "enableStoreAck": true,
                }),
            )
            .await
            .unwrap();

        harness
            .send(
                STORE_PORT,
                json!({"context": "c", "operation": "store", "document": {"id": "a"}}),
            )
            .await
            .unwrap();

        let acks = harness.port_outputs(STORE_ACK_PORT);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0]["context"], json!("c"));
        assert_eq!(acks[0]["request"]["document"]["id"], json!("a"));
    }

    #[tokio::test]
    async fn unparseable_records_are_skipped_in_queries() {
        let harness = Harness::new(&KvStore::new());
        store_doc(&harness, json!({"id": "good", "status": "UP"})).await;
        // Simulate a corrupt metadata entry restored on a fresh pod.
        let pod2 = harness.new_pod();
        pod2.insert_metadata("kv-bad", "{not json");
        pod2.reconcile().await.unwrap();

        let result = query_all(&pod2).await;
        assert_eq!(result["count"], json!(1));
        assert_eq!(result["results"][0]["key"], json!("good"));
    }

    #[tokio::test]
    async fn settings_validation() {
        let harness = Harness::new(&KvStore::new());

        let err = harness
            .send(
                SETTINGS_PORT,
                json!({"document": {}, "primaryKey": "id", "maxRecords": 0, "enableStoreAck": false}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E102");

        let err = harness
            .send(
                SETTINGS_PORT,
                json!({"document": {"name": ""}, "primaryKey": "id", "maxRecords": 0, "enableStoreAck": false}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E102");
    }
}
