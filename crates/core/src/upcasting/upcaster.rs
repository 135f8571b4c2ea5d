use dispatch_errors::{DispatchError, DispatchResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;

/// A serialized message tagged with its schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedMessage {
    pub message_type: String,
    pub version: u32,
    pub payload: Value,
}

impl VersionedMessage {
    pub fn new<S: Into<String>>(message_type: S, version: u32, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            version,
            payload,
        }
    }
}

/// Converts a single message type from `from_version` to `to_version`.
pub trait MessageUpcaster: Send + Sync {
    fn message_type(&self) -> &str;

    fn from_version(&self) -> u32;

    fn to_version(&self) -> u32;

    fn upcast(&self, payload: Value) -> DispatchResult<Value>;
}

/// Upcaster over raw JSON.
pub struct JsonUpcaster<F> {
    message_type: String,
    from_version: u32,
    to_version: u32,
    convert: F,
}

impl<F> JsonUpcaster<F>
where
    F: Fn(Value) -> DispatchResult<Value> + Send + Sync,
{
    pub fn new<S: Into<String>>(message_type: S, from_version: u32, to_version: u32, convert: F) -> Self {
        Self {
            message_type: message_type.into(),
            from_version,
            to_version,
            convert,
        }
    }
}

impl<F> MessageUpcaster for JsonUpcaster<F>
where
    F: Fn(Value) -> DispatchResult<Value> + Send + Sync,
{
    fn message_type(&self) -> &str {
        &self.message_type
    }

    fn from_version(&self) -> u32 {
        self.from_version
    }

    fn to_version(&self) -> u32 {
        self.to_version
    }

    fn upcast(&self, payload: Value) -> DispatchResult<Value> {
        (self.convert)(payload)
    }
}

/// Upcaster between two concrete message structs.
pub struct TypedUpcaster<Old, New, F> {
    message_type: String,
    from_version: u32,
    to_version: u32,
    convert: F,
    _types: PhantomData<fn(Old) -> New>,
}

impl<Old, New, F> TypedUpcaster<Old, New, F>
where
    Old: DeserializeOwned,
    New: Serialize,
    F: Fn(Old) -> New + Send + Sync,
{
    pub fn new<S: Into<String>>(message_type: S, from_version: u32, to_version: u32, convert: F) -> Self {
        Self {
            message_type: message_type.into(),
            from_version,
            to_version,
            convert,
            _types: PhantomData,
        }
    }

    fn error(&self, message: String) -> DispatchError {
        DispatchError::Upcast {
            message_type: self.message_type.clone(),
            from_version: self.from_version,
            message,
        }
    }
}

impl<Old, New, F> MessageUpcaster for TypedUpcaster<Old, New, F>
where
    Old: DeserializeOwned,
    New: Serialize,
    F: Fn(Old) -> New + Send + Sync,
{
    fn message_type(&self) -> &str {
        &self.message_type
    }

    fn from_version(&self) -> u32 {
        self.from_version
    }

    fn to_version(&self) -> u32 {
        self.to_version
    }

    fn upcast(&self, payload: Value) -> DispatchResult<Value> {
        let old: Old = serde_json::from_value(payload).map_err(|e| self.error(e.to_string()))?;
        serde_json::to_value((self.convert)(old)).map_err(|e| self.error(e.to_string()))
    }
}
