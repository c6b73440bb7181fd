//! Envelope carried on every channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One message published on a named channel.
///
/// The payload stays raw JSON until a subscriber decodes it, so malformed
/// backend output reaches the subscriber and can be dropped there instead of
/// being rejected at publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
    /// Channel the event was published on
    pub channel: String,
    #[cfg_attr(feature = "typescript", ts(type = "unknown"))]
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    /// Create a new envelope with auto-generated ID and timestamp
    pub fn new(channel: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            channel: channel.into(),
            payload,
        }
    }

    /// Decode the payload into `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opwatch_core::OperationUpdate;
    use serde_json::json;

    #[test]
    fn test_envelope_creation() {
        let envelope = EventEnvelope::new("operation_sideload", json!({}));
        assert_eq!(envelope.channel, "operation_sideload");
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_envelope_ids_are_unique() {
        let a = EventEnvelope::new("c", json!(null));
        let b = EventEnvelope::new("c", json!(null));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_decode_update() {
        let envelope = EventEnvelope::new(
            "operation_sideload",
            json!({ "updateType": "started", "stepId": "install" }),
        );
        let update: OperationUpdate = envelope.decode().unwrap();
        assert_eq!(update, OperationUpdate::started("install"));
    }

    #[test]
    fn test_decode_garbage() {
        let envelope = EventEnvelope::new("operation_sideload", json!("not an update"));
        assert!(envelope.decode::<OperationUpdate>().is_err());
    }
}
