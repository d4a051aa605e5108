//! Message types delivered to listeners, including core identifiers.
//!
//! The container treats a [`Message`] as opaque: it is passed to the listener
//! unchanged and never mutated by the dispatch path.

use crate::error::{SerializationError, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated broker queue name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > 255 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-255 bytes".to_string(),
            });
        }

        if name.chars().any(|c| c.is_control()) {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "control characters are not allowed".to_string(),
            });
        }

        if name.trim() != name {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "no leading or trailing whitespace".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier for a message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Broker-assigned delivery tag, scoped to the channel that delivered the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeliveryTag(u64);

impl DeliveryTag {
    pub fn new(tag: u64) -> Self {
        Self(tag)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// Broker metadata travelling with a message body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageProperties {
    pub message_id: MessageId,
    pub correlation_id: Option<String>,
    pub content_type: Option<String>,
    pub headers: HashMap<String, String>,
    pub delivery_tag: Option<DeliveryTag>,
    pub redelivered: bool,
    pub consumer_queue: Option<QueueName>,
    pub received_at: Option<Timestamp>,
}

/// A message delivered to a listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "bytes_serde")]
    pub body: Bytes,
    pub properties: MessageProperties,
}

/// Custom serialization for Bytes
mod bytes_serde {
    use base64::{engine::general_purpose, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = general_purpose::STANDARD.encode(bytes);
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

impl Message {
    /// Create new message with body and a fresh message ID
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            properties: MessageProperties::default(),
        }
    }

    /// Create a JSON message from a serializable value
    pub fn from_json<T: Serialize>(value: &T) -> Result<Self, SerializationError> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(Bytes::from(body)).with_content_type("application/json".to_string()))
    }

    /// Add a header
    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.properties.headers.insert(key, value);
        self
    }

    /// Add correlation ID for tracking
    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.properties.correlation_id = Some(correlation_id);
        self
    }

    /// Set content type
    pub fn with_content_type(mut self, content_type: String) -> Self {
        self.properties.content_type = Some(content_type);
        self
    }

    /// Record the broker delivery metadata
    pub fn with_delivery(mut self, tag: DeliveryTag, queue: QueueName, redelivered: bool) -> Self {
        self.properties.delivery_tag = Some(tag);
        self.properties.consumer_queue = Some(queue);
        self.properties.redelivered = redelivered;
        self.properties.received_at = Some(Timestamp::now());
        self
    }

    pub fn message_id(&self) -> &MessageId {
        &self.properties.message_id
    }

    pub fn delivery_tag(&self) -> Option<DeliveryTag> {
        self.properties.delivery_tag
    }

    /// Interpret the body as UTF-8 text
    pub fn body_as_str(&self) -> Result<&str, SerializationError> {
        std::str::from_utf8(&self.body).map_err(|_| SerializationError::InvalidUtf8)
    }

    /// Deserialize the body as JSON
    pub fn body_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, SerializationError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl From<&str> for Message {
    fn from(body: &str) -> Self {
        Self::new(Bytes::copy_from_slice(body.as_bytes()))
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
