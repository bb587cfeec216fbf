//! Captured events handed to the transport.
//!
//! An [`Event`] is a JSON object. Its `event_id` and `type` keys are read
//! straight from the payload, so whatever the integration put there is what
//! goes on the wire.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Payload key holding the event id.
pub const EVENT_ID_KEY: &str = "event_id";
/// Payload key holding the event type.
pub const TYPE_KEY: &str = "type";

/// Errors raised when building an [`Event`] from arbitrary JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The payload was not a JSON object.
    #[error("event payload must be a JSON object")]
    NotAnObject,
    /// The payload has no string `event_id`.
    #[error("event payload is missing a string event_id")]
    MissingEventId,
    /// The payload `type` is present but not a string.
    #[error("event type must be a string")]
    InvalidType,
}

/// Logical event type as it appears in the payload's `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Error report. Serialised as `"event"`.
    Event,
    /// Performance transaction.
    Transaction,
    /// Any other item type.
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Event => "event",
            Self::Transaction => "transaction",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "event" => Self::Event,
            "transaction" => Self::Transaction,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

/// Immutable event payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    payload: Map<String, Value>,
}

impl Event {
    /// Create an event of `kind` with a freshly generated id.
    pub fn new(kind: EventKind) -> Self {
        let mut payload = Map::new();
        payload.insert(
            EVENT_ID_KEY.into(),
            Value::String(Uuid::new_v4().simple().to_string()),
        );
        payload.insert(TYPE_KEY.into(), Value::String(kind.as_str().to_string()));
        Self { payload }
    }

    pub fn error() -> Self {
        Self::new(EventKind::Event)
    }

    pub fn transaction() -> Self {
        Self::new(EventKind::Transaction)
    }

    /// Wrap an existing JSON object.
    ///
    /// A missing `type` is filled in as `"event"`.
    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let Value::Object(mut payload) = value else {
            return Err(EventError::NotAnObject);
        };
        if !matches!(payload.get(EVENT_ID_KEY), Some(Value::String(_))) {
            return Err(EventError::MissingEventId);
        }
        match payload.get(TYPE_KEY) {
            None => {
                payload.insert(TYPE_KEY.into(), Value::String(EventKind::Event.to_string()));
            }
            Some(Value::String(_)) => {}
            Some(_) => return Err(EventError::InvalidType),
        }
        Ok(Self { payload })
    }

    /// Return a copy with `key` set to `value`.
    ///
    /// Overwriting `event_id` or `type` with a non-string is ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        if (key == EVENT_ID_KEY || key == TYPE_KEY) && !value.is_string() {
            return self;
        }
        self.payload.insert(key, value);
        self
    }

    pub fn event_id(&self) -> &str {
        self.payload
            .get(EVENT_ID_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn kind(&self) -> EventKind {
        self.payload
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .map(EventKind::from)
            .unwrap_or(EventKind::Event)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

impl TryFrom<Value> for Event {
    type Error = EventError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}
