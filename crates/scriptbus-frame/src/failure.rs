//! Failure envelope.
//!
//! A handler-reported error travels as ordinary data: a JSON object whose
//! reserved key maps to the message. Any top-level object carrying that key
//! is read back as a [`Failure`], so application payloads must never be
//! plain objects containing it.

use serde_json::{Map, Value};

/// Reserved object key marking a failure envelope.
pub const FAILURE_KEY: &str = "$failure";

/// An application-level error reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Failure {
    message: String,
}

impl Failure {
    /// Create a failure with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Wire form: `{"$failure": message}`.
    pub fn to_envelope(&self) -> Value {
        let mut map = Map::with_capacity(1);
        map.insert(FAILURE_KEY.to_string(), Value::String(self.message.clone()));
        Value::Object(map)
    }
}

/// A delivered value: plain data or a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    Failure(Failure),
}

impl Reply {
    /// Encode for the wire, wrapping failures in the envelope.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Failure(failure) => failure.to_envelope(),
        }
    }

    /// Decode a received value, unwrapping failure envelopes.
    pub fn from_wire(value: Value) -> Self {
        match value {
            Value::Object(mut map) if map.contains_key(FAILURE_KEY) => {
                let message = match map.remove(FAILURE_KEY) {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                Self::Failure(Failure::new(message))
            }
            other => Self::Value(other),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The plain value, if this is not a failure.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// Turn a failure into `Err`.
    pub fn into_result(self) -> std::result::Result<Value, Failure> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Failure> for Reply {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}
