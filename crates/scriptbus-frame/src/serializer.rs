use serde_json::Value;

use crate::error::Result;

/// Converts values to and from the text carried in frame payloads.
///
/// Implementations must round-trip every representable value exactly.
pub trait Serializer: Send + Sync + 'static {
    fn serialize(&self, value: &Value) -> Result<String>;

    /// Parse failures surface as [`FrameError::Json`](crate::FrameError::Json).
    fn deserialize(&self, raw: &str) -> Result<Value>;
}

/// Compact JSON via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn deserialize(&self, raw: &str) -> Result<Value> {
        Ok(serde_json::from_str(raw)?)
    }
}
