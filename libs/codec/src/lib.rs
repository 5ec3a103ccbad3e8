//! Envelope codec for inter-service bus messages.
//!
//! Every message on the bus is a JSON envelope: who sent it (`source_id`),
//! a unique `event_id` for tracing and idempotency, a slash-delimited logical
//! `uri` the router dispatches on, a creation timestamp fixed at +07:00, and
//! an opaque payload whose shape is implied by the uri.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Envelope timestamps are expressed in the exchange's local offset.
pub const MARKET_UTC_OFFSET_HOURS: i32 = 7;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("envelope serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// The unit of inter-service communication.
///
/// `event_id` is unique per envelope instance and never reused; `timestamp`
/// is assigned once at construction. Neither is an ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub source_id: Option<String>,
    pub event_id: String,
    pub uri: Option<String>,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build a fresh envelope with a new event id and current timestamp.
    pub fn new(source_id: impl Into<String>, uri: impl Into<String>, payload: Value) -> Self {
        Self {
            source_id: Some(source_id.into()),
            event_id: Uuid::new_v4().to_string(),
            uri: Some(uri.into()),
            timestamp: market_now(),
            payload,
        }
    }
}

/// Current time at the fixed market offset.
pub fn market_now() -> DateTime<FixedOffset> {
    match FixedOffset::east_opt(MARKET_UTC_OFFSET_HOURS * 3600) {
        Some(offset) => Utc::now().with_timezone(&offset),
        None => Utc::now().fixed_offset(),
    }
}

/// Serialize a fresh envelope to bus bytes.
pub fn encode(source_id: &str, uri: &str, payload: Value) -> Result<Vec<u8>> {
    let envelope = Envelope::new(source_id, uri, payload);
    serde_json::to_vec(&envelope).map_err(CodecError::Serialize)
}

/// Parse bus bytes back into an envelope.
///
/// Retry/drop policy on malformed input belongs to the caller.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    serde_json::from_slice(bytes).map_err(CodecError::MalformedEnvelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_preserves_source_uri_and_payload() {
        let payload = json!({"stockId": "VCB", "matchPrice": "86.4"});
        let bytes = encode("realtime-1", "/stock/updateMatchPrice", payload.clone()).unwrap();

        let envelope = decode(&bytes).unwrap();
        assert_eq!(envelope.source_id.as_deref(), Some("realtime-1"));
        assert_eq!(envelope.uri.as_deref(), Some("/stock/updateMatchPrice"));
        assert_eq!(envelope.payload, payload);
        assert!(!envelope.event_id.is_empty());
    }

    #[test]
    fn event_ids_are_unique_per_envelope() {
        let a = Envelope::new("s", "/u", Value::Null);
        let b = Envelope::new("s", "/u", Value::Null);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn timestamp_carries_the_fixed_offset() {
        let envelope = Envelope::new("s", "/u", Value::Null);
        assert_eq!(
            envelope.timestamp.offset().local_minus_utc(),
            MARKET_UTC_OFFSET_HOURS * 3600
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));
    }

    #[test]
    fn decode_accepts_missing_payload() {
        let bytes = br#"{"sourceId":null,"eventId":"e1","uri":"/x","timestamp":"2025-01-06T09:00:00+07:00"}"#;
        let envelope = decode(bytes).unwrap();
        assert_eq!(envelope.payload, Value::Null);
    }
}
