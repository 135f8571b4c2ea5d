use super::pipeline::UpcastingPipeline;
use super::upcaster::MessageUpcaster;
use dispatch_errors::{DispatchError, DispatchResult};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

type UpcasterFactory = Box<dyn FnOnce() -> Arc<dyn MessageUpcaster> + Send>;

enum Pending {
    Explicit(Arc<dyn MessageUpcaster>),
    Factory(UpcasterFactory),
    Scanned(Arc<dyn MessageUpcaster>),
}

#[derive(Default)]
pub struct UpcastingPipelineBuilder {
    pending: Vec<Pending>,
    auto_upcast_on_replay: bool,
}

impl UpcastingPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_upcaster<U: MessageUpcaster + 'static>(mut self, upcaster: U) -> Self {
        self.pending.push(Pending::Explicit(Arc::new(upcaster)));
        self
    }

    pub fn register_shared(mut self, upcaster: Arc<dyn MessageUpcaster>) -> Self {
        self.pending.push(Pending::Explicit(upcaster));
        self
    }

    /// 工厂只在构建时执行一次
    pub fn register_upcaster_factory<U, F>(mut self, factory: F) -> Self
    where
        U: MessageUpcaster + 'static,
        F: FnOnce() -> U + Send + 'static,
    {
        self.pending.push(Pending::Factory(Box::new(move || {
            Arc::new(factory()) as Arc<dyn MessageUpcaster>
        })));
        self
    }

    /// Adds every upcaster from `catalog` accepted by `filter`. Upcasters that
    /// do not move forward (`from >= to`) are skipped without error.
    pub fn scan<I, F>(mut self, catalog: I, filter: F) -> Self
    where
        I: IntoIterator<Item = Arc<dyn MessageUpcaster>>,
        F: Fn(&dyn MessageUpcaster) -> bool,
    {
        for upcaster in catalog {
            if upcaster.from_version() < upcaster.to_version() && filter(upcaster.as_ref()) {
                self.pending.push(Pending::Scanned(upcaster));
            }
        }
        self
    }

    pub fn enable_auto_upcast_on_replay(mut self, enabled: bool) -> Self {
        self.auto_upcast_on_replay = enabled;
        self
    }

    /// Fails if an explicitly registered upcaster does not move forward.
    /// Duplicate `(type, from_version)` pairs keep the first registration.
    pub fn build(self) -> DispatchResult<UpcastingPipeline> {
        let mut chains: HashMap<String, BTreeMap<u32, Arc<dyn MessageUpcaster>>> = HashMap::new();

        for pending in self.pending {
            let upcaster = match pending {
                Pending::Explicit(u) | Pending::Scanned(u) => u,
                Pending::Factory(factory) => factory(),
            };

            if upcaster.from_version() >= upcaster.to_version() {
                return Err(DispatchError::invalid_argument(format!(
                    "upcaster for {} must move forward, got v{} -> v{}",
                    upcaster.message_type(),
                    upcaster.from_version(),
                    upcaster.to_version()
                )));
            }

            let chain = chains
                .entry(upcaster.message_type().to_string())
                .or_default();
            if chain.contains_key(&upcaster.from_version()) {
                warn!(
                    message_type = upcaster.message_type(),
                    from_version = upcaster.from_version(),
                    "Duplicate upcaster ignored"
                );
                continue;
            }
            chain.insert(upcaster.from_version(), upcaster);
        }

        Ok(UpcastingPipeline::new(chains, self.auto_upcast_on_replay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upcasting::{JsonUpcaster, TypedUpcaster, VersionedMessage};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    #[derive(Debug, Serialize, Deserialize)]
    struct UserCreatedV1 {
        name: String,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct UserCreatedV2 {
        first_name: String,
        last_name: String,
    }

    fn v1_to_v2() -> TypedUpcaster<UserCreatedV1, UserCreatedV2, impl Fn(UserCreatedV1) -> UserCreatedV2> {
        TypedUpcaster::new("UserCreated", 1, 2, |old: UserCreatedV1| {
            let mut parts = old.name.splitn(2, ' ');
            UserCreatedV2 {
                first_name: parts.next().unwrap_or_default().to_string(),
                last_name: parts.next().unwrap_or_default().to_string(),
            }
        })
    }

    fn add_field(
        from: u32,
        field: &'static str,
    ) -> JsonUpcaster<impl Fn(Value) -> DispatchResult<Value>> {
        JsonUpcaster::new("UserCreated", from, from + 1, move |mut v: Value| {
            v[field] = json!(true);
            Ok(v)
        })
    }

    fn full_chain() -> UpcastingPipeline {
        UpcastingPipelineBuilder::new()
            .register_upcaster(add_field(3, "verified"))
            .register_upcaster(v1_to_v2())
            .register_upcaster_factory(|| add_field(2, "active"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_multi_hop_upcast_in_one_call() {
        let pipeline = full_chain();
        let result = pipeline
            .upcast(VersionedMessage::new(
                "UserCreated",
                1,
                json!({ "name": "Ada Lovelace" }),
            ))
            .unwrap();

        assert_eq!(result.version, 4);
        assert_eq!(result.payload["first_name"], "Ada");
        assert_eq!(result.payload["last_name"], "Lovelace");
        assert_eq!(result.payload["active"], true);
        assert_eq!(result.payload["verified"], true);
    }

    #[test]
    fn test_latest_version_and_reachability() {
        let pipeline = full_chain();
        assert_eq!(pipeline.get_latest_version("UserCreated"), 4);
        assert_eq!(pipeline.get_latest_version("Unknown"), 0);
        assert!(pipeline.can_upcast("UserCreated", 1, 4));
        assert!(pipeline.can_upcast("UserCreated", 2, 3));
        assert!(!pipeline.can_upcast("UserCreated", 4, 5));
        assert!(!pipeline.can_upcast("UserCreated", 3, 2));
        assert!(!pipeline.can_upcast("Unknown", 1, 2));
    }

    #[test]
    fn test_latest_version_is_noop_upcast() {
        let pipeline = full_chain();
        let message = VersionedMessage::new("UserCreated", 4, json!({ "x": 1 }));
        assert_eq!(pipeline.upcast(message.clone()).unwrap(), message);

        let other = VersionedMessage::new("OrderPlaced", 1, json!({}));
        assert_eq!(pipeline.upcast(other.clone()).unwrap(), other);
    }

    #[test]
    fn test_explicit_backward_registration_rejected() {
        let result = UpcastingPipelineBuilder::new()
            .register_upcaster(JsonUpcaster::new("UserCreated", 2, 2, Ok))
            .build();
        assert!(matches!(result, Err(DispatchError::InvalidArgument(_))));
    }

    #[test]
    fn test_scan_filters_invalid_and_unwanted() {
        let catalog: Vec<Arc<dyn MessageUpcaster>> = vec![
            Arc::new(add_field(1, "a")),
            Arc::new(JsonUpcaster::new("UserCreated", 3, 1, Ok)),
            Arc::new(JsonUpcaster::new("Internal", 1, 2, Ok)),
        ];
        let pipeline = UpcastingPipelineBuilder::new()
            .scan(catalog, |u| u.message_type() != "Internal")
            .enable_auto_upcast_on_replay(true)
            .build()
            .unwrap();

        assert_eq!(pipeline.registered_types(), vec!["UserCreated"]);
        assert_eq!(pipeline.upcaster_count("UserCreated"), 1);
        assert!(pipeline.is_auto_upcast_on_replay_enabled());
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let pipeline = UpcastingPipelineBuilder::new()
            .register_upcaster(add_field(1, "first"))
            .register_upcaster(add_field(1, "second"))
            .build()
            .unwrap();
        let result = pipeline.upcast_value("UserCreated", 1, json!({})).unwrap();
        assert_eq!(result.0, 2);
        assert_eq!(result.1["first"], true);
        assert!(result.1.get("second").is_none());
    }

    #[test]
    fn test_typed_upcaster_error_carries_version() {
        let pipeline = UpcastingPipelineBuilder::new()
            .register_upcaster(v1_to_v2())
            .build()
            .unwrap();
        let err = pipeline
            .upcast_value("UserCreated", 1, json!({ "unexpected": 1 }))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Upcast { from_version: 1, .. }
        ));
    }
}
