//! JSON message serializer with an explicit type-name registry.

use dispatch_domain::{short_type_name, DispatchMessage, MessageSerializer};
use dispatch_errors::{DispatchError, DispatchResult};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

type DeserializeFn = Arc<dyn Fn(&str) -> DispatchResult<Box<dyn DispatchMessage>> + Send + Sync>;

/// Messages are looked up by the name given at registration, by their full
/// Rust type path, or by the short type name.
#[derive(Default, Clone)]
pub struct JsonMessageSerializer {
    types: HashMap<String, DeserializeFn>,
}

impl JsonMessageSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(self) -> Self
    where
        T: DispatchMessage + DeserializeOwned,
    {
        let full = std::any::type_name::<T>();
        let short = short_type_name(full).to_string();
        self.register_as::<T>(full).register_as::<T>(short)
    }

    pub fn register_as<T>(mut self, name: impl Into<String>) -> Self
    where
        T: DispatchMessage + DeserializeOwned,
    {
        let deserialize: DeserializeFn = Arc::new(|payload: &str| {
            let message: T = serde_json::from_str(payload)?;
            Ok(Box::new(message) as Box<dyn DispatchMessage>)
        });
        self.types.insert(name.into(), deserialize);
        self
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

impl MessageSerializer for JsonMessageSerializer {
    fn serialize(&self, message: &dyn DispatchMessage) -> DispatchResult<String> {
        Ok(message.to_value()?.to_string())
    }

    fn deserialize(
        &self,
        payload: &str,
        type_name: &str,
    ) -> DispatchResult<Option<Box<dyn DispatchMessage>>> {
        match self.types.get(type_name) {
            Some(deserialize) => deserialize(payload)
                .map(Some)
                .map_err(|e| DispatchError::Serialization(format!("{type_name}: {e}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct InvoiceDue {
        invoice_id: u64,
    }

    #[test]
    fn test_deserialize_by_short_and_full_name() {
        let serializer = JsonMessageSerializer::new().register::<InvoiceDue>();

        let message = serializer
            .deserialize(r#"{"invoice_id":7}"#, "InvoiceDue")
            .unwrap()
            .unwrap();
        assert_eq!(
            message.downcast_ref::<InvoiceDue>(),
            Some(&InvoiceDue { invoice_id: 7 })
        );

        let full = std::any::type_name::<InvoiceDue>();
        assert!(serializer.deserialize(r#"{"invoice_id":7}"#, full).unwrap().is_some());
    }

    #[test]
    fn test_unknown_type_is_none_and_bad_payload_is_error() {
        let serializer = JsonMessageSerializer::new().register_as::<InvoiceDue>("billing.invoice-due");

        assert!(serializer.deserialize("{}", "Unknown").unwrap().is_none());
        let err = serializer
            .deserialize("{not json", "billing.invoice-due")
            .err()
            .unwrap();
        assert!(matches!(err, DispatchError::Serialization(_)));
    }

    #[test]
    fn test_serialize() {
        let serializer = JsonMessageSerializer::new();
        let payload = serializer.serialize(&InvoiceDue { invoice_id: 3 }).unwrap();
        assert_eq!(payload, r#"{"invoice_id":3}"#);
    }
}
