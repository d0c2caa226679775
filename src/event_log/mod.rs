/// Durable Event Store - append-only log of verification results
///
/// Every verification attempt is recorded locally as a pending record and
/// later reconciled with the remote authority by the sync engine. Records
/// are never updated except for the one-way pending -> synced transition.

pub mod export;
pub mod store;

pub use store::EventStore;

use crate::error::{VerifyLogError, VerifyLogResult};
use serde::{Deserialize, Serialize};

/// Locally persisted verification event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationLogRecord {
    pub id: i64,
    /// Milliseconds since epoch, assigned at append
    pub timestamp: i64,
    /// Serialized verification result, normally JSON text
    pub payload: String,
    pub synced: bool,
}

impl VerificationLogRecord {
    /// Parse the stored payload back into structured form
    pub fn payload_value(&self) -> VerifyLogResult<serde_json::Value> {
        serde_json::from_str(&self.payload).map_err(|e| {
            VerifyLogError::DeserializationFailure(format!(
                "record {} payload is not valid JSON: {}",
                self.id, e
            ))
        })
    }

    /// Payload as delivered to the remote authority
    ///
    /// Unparseable payloads are wrapped as `{"raw": ...}` so they are still
    /// delivered rather than dropped.
    pub fn delivery_payload(&self) -> DeliveryPayload {
        match self.payload_value() {
            Ok(value) => DeliveryPayload::Structured(value),
            Err(e) => {
                tracing::debug!("{}; sending raw wrapper", e);
                DeliveryPayload::Raw {
                    raw: self.payload.clone(),
                }
            }
        }
    }

    /// Build the envelope posted to `/api/logs`
    pub fn submission(&self) -> LogSubmission {
        LogSubmission {
            id: self.id,
            timestamp: self.timestamp,
            synced: self.synced,
            data: self.delivery_payload(),
        }
    }
}

/// Reconstituted payload of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeliveryPayload {
    /// Payload parsed as JSON
    Structured(serde_json::Value),
    /// Payload that could not be parsed, forwarded verbatim
    Raw { raw: String },
}

impl DeliveryPayload {
    pub fn is_raw(&self) -> bool {
        matches!(self, DeliveryPayload::Raw { .. })
    }
}

/// Body of a `POST /api/logs` request
#[derive(Debug, Clone, Serialize)]
pub struct LogSubmission {
    pub id: i64,
    pub timestamp: i64,
    pub synced: bool,
    pub data: DeliveryPayload,
}

/// Notifications published by the event store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Appended { id: i64 },
    Cleared,
}

/// Record counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub total: i64,
    pub synced: i64,
    pub pending: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(payload: &str) -> VerificationLogRecord {
        VerificationLogRecord {
            id: 7,
            timestamp: 1_700_000_000_000,
            payload: payload.to_string(),
            synced: false,
        }
    }

    #[test]
    fn test_structured_payload_is_reconstituted() {
        let rec = record(r#"{"verified":true,"issuer":"did:web:issuer"}"#);
        let body = serde_json::to_value(rec.submission()).unwrap();
        assert_eq!(body["id"], 7);
        assert_eq!(body["synced"], false);
        assert_eq!(body["data"]["issuer"], "did:web:issuer");
    }

    #[test]
    fn test_unparseable_payload_is_wrapped() {
        let rec = record("not json at all");
        assert!(matches!(
            rec.payload_value(),
            Err(VerifyLogError::DeserializationFailure(_))
        ));

        let payload = rec.delivery_payload();
        assert!(payload.is_raw());
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "raw": "not json at all" })
        );
    }
}
