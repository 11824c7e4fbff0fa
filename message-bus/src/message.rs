//! Message envelope for pub/sub

use crate::types::{MessageType, PartitionKey};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID (UUIDv7 for ordering)
    pub id: Uuid,

    /// Message type
    pub message_type: MessageType,

    /// Partition key for routing
    pub partition_key: PartitionKey,

    /// Payload (JSON-serialized)
    pub payload: serde_json::Value,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Correlation ID (command that produced this message)
    pub correlation_id: Option<String>,

    /// Headers (metadata)
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Create new message
    pub fn new(
        message_type: MessageType,
        partition_key: PartitionKey,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            message_type,
            partition_key,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
            headers: HashMap::new(),
        }
    }

    /// Create message from any serializable payload
    pub fn from_payload<T: Serialize>(
        message_type: MessageType,
        partition_key: PartitionKey,
        payload: &T,
    ) -> crate::Result<Self> {
        Ok(Self::new(
            message_type,
            partition_key,
            serde_json::to_value(payload)?,
        ))
    }

    /// Set correlation ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Decode the payload into a typed value
    pub fn decode_payload<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Routing subject for this message
    pub fn subject(&self) -> String {
        format!(
            "{}.{}",
            self.message_type.subject_prefix(),
            self.partition_key.to_subject_segment()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Request {
        index: u8,
        flight: String,
    }

    #[test]
    fn test_message_subject() {
        let msg = Message::new(
            MessageType::OracleRequest,
            PartitionKey::Flight(3),
            json!({}),
        );

        assert_eq!(msg.subject(), "surety.oracle.request.flight.3");
    }

    #[test]
    fn test_typed_payload() {
        let request = Request {
            index: 7,
            flight: "ND1309".to_string(),
        };
        let msg = Message::from_payload(MessageType::OracleRequest, PartitionKey::Global, &request)
            .unwrap()
            .with_correlation_id("cmd-1");

        assert_eq!(msg.payload["index"], 7);
        assert_eq!(msg.decode_payload::<Request>().unwrap(), request);
        assert_eq!(msg.correlation_id.as_deref(), Some("cmd-1"));
    }

    #[test]
    fn test_message_bytes() {
        let msg = Message::new(
            MessageType::FundsWithdrawn,
            PartitionKey::Passenger("0xp".to_string()),
            json!({"amount": "0.75"}),
        )
        .with_header("source", "surety-engine");

        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_wrong_shape() {
        let msg = Message::new(MessageType::OracleRequest, PartitionKey::Global, json!([1, 2]));
        assert!(msg.decode_payload::<Request>().is_err());
    }
}
