//! Inbound and outbound message payloads.
//!
//! Payloads are dynamically typed: every inbound message is a [`Packet`]
//! the handler decodes into the typed shape expected on that port, and
//! every outbound message is an [`EmitMessage`]. The reconcile port is
//! special on the outbound side: it carries metadata patches and redraw
//! requests instead of data.

use crate::error::{Result, WeftError};
use crate::state::{Metadata, NodeState};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt;

/// An inbound payload, tagged at runtime.
///
/// Handlers perform a type-discriminated match against the shape expected
/// on the receiving port; [`Packet::decode`] surfaces mismatches as
/// invalid-message errors.
#[derive(Debug, Clone)]
pub enum Packet {
    /// JSON payload for regular, settings, control, and state ports.
    Value(JsonValue),
    /// Node snapshot delivered on the reconcile port.
    Node(NodeState),
}

impl Packet {
    /// Build a packet from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Value)
            .map_err(|e| WeftError::Serialization(e.to_string()))
    }

    /// A null payload (state deletion, empty control poke).
    pub fn null() -> Self {
        Self::Value(JsonValue::Null)
    }

    /// Decode the payload into the typed shape expected on `port`.
    pub fn decode<T: DeserializeOwned>(&self, port: &str) -> Result<T> {
        match self {
            Self::Value(value) => serde_json::from_value(value.clone())
                .map_err(|e| WeftError::invalid_message(port, e.to_string())),
            Self::Node(_) => Err(WeftError::invalid_message(
                port,
                "expected a data payload, got a node snapshot",
            )),
        }
    }

    /// The node snapshot, if this is a reconcile delivery.
    pub fn node(&self) -> Option<&NodeState> {
        match self {
            Self::Node(node) => Some(node),
            Self::Value(_) => None,
        }
    }

    /// The raw JSON value, if this is a data payload.
    pub fn value(&self) -> Option<&JsonValue> {
        match self {
            Self::Value(value) => Some(value),
            Self::Node(_) => None,
        }
    }

    /// Whether this is a null data payload.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Value(JsonValue::Null))
    }
}

impl From<JsonValue> for Packet {
    fn from(value: JsonValue) -> Self {
        Self::Value(value)
    }
}

impl From<NodeState> for Packet {
    fn from(node: NodeState) -> Self {
        Self::Node(node)
    }
}

/// A metadata mutation, applied atomically by the host to the canonical
/// node record. The host re-delivers an updated reconcile snapshot after
/// commit (debounced, best-effort).
pub struct MetadataPatch(Box<dyn FnOnce(&mut Metadata) -> Result<()> + Send>);

impl MetadataPatch {
    /// Wrap a mutation closure.
    pub fn new(f: impl FnOnce(&mut Metadata) -> Result<()> + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Apply the mutation to a metadata map.
    pub fn apply(self, metadata: &mut Metadata) -> Result<()> {
        (self.0)(metadata)
    }
}

impl fmt::Debug for MetadataPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetadataPatch")
    }
}

/// An outbound payload handed to the emit handler.
#[derive(Debug)]
pub enum EmitMessage {
    /// Data payload for output, control, and state ports.
    Value(JsonValue),
    /// Metadata mutation, valid only on the reconcile port.
    Patch(MetadataPatch),
    /// Null reconcile emit: ask the host to re-notify interested ports
    /// (typically so visual state updates).
    Refresh,
}

impl EmitMessage {
    /// Build a data payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Self::Value)
            .map_err(|e| WeftError::Serialization(e.to_string()))
    }

    /// Build a metadata patch.
    pub fn patch(f: impl FnOnce(&mut Metadata) -> Result<()> + Send + 'static) -> Self {
        Self::Patch(MetadataPatch::new(f))
    }

    /// The raw JSON value, if this is a data payload.
    pub fn value(&self) -> Option<&JsonValue> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Probe {
        context: String,
        count: u32,
    }

    #[test]
    fn decode_matching_shape() {
        let packet = Packet::Value(json!({"context": "t1", "count": 3}));
        let probe: Probe = packet.decode("in").unwrap();
        assert_eq!(
            probe,
            Probe {
                context: "t1".to_string(),
                count: 3
            }
        );
    }

    #[test]
    fn decode_mismatch_is_invalid_message() {
        let packet = Packet::Value(json!({"count": "not a number"}));
        let err = packet.decode::<Probe>("in").unwrap_err();
        assert_eq!(err.code(), "E101");
        assert!(err.to_string().contains("in"));
    }

    #[test]
    fn decode_node_snapshot_as_data_fails() {
        let packet = Packet::from(NodeState::new());
        assert!(packet.decode::<Probe>("in").is_err());
        assert!(packet.node().is_some());
    }

    #[test]
    fn patch_applies_to_metadata() {
        let patch = MetadataPatch::new(|meta| {
            meta.insert("signal-running".to_string(), "true".to_string());
            Ok(())
        });
        let mut meta = Metadata::new();
        patch.apply(&mut meta).unwrap();
        assert_eq!(meta.get("signal-running").map(String::as_str), Some("true"));
    }

    #[test]
    fn null_packet() {
        assert!(Packet::null().is_null());
        assert!(!Packet::Value(json!(1)).is_null());
    }
}
