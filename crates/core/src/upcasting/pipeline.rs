use super::upcaster::{MessageUpcaster, VersionedMessage};
use dispatch_errors::{DispatchError, DispatchResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Version-chain resolver. Immutable once built.
pub struct UpcastingPipeline {
    chains: HashMap<String, BTreeMap<u32, Arc<dyn MessageUpcaster>>>,
    auto_upcast_on_replay: bool,
}

impl UpcastingPipeline {
    pub(super) fn new(
        chains: HashMap<String, BTreeMap<u32, Arc<dyn MessageUpcaster>>>,
        auto_upcast_on_replay: bool,
    ) -> Self {
        Self {
            chains,
            auto_upcast_on_replay,
        }
    }

    pub fn empty() -> Self {
        Self::new(HashMap::new(), false)
    }

    pub fn is_auto_upcast_on_replay_enabled(&self) -> bool {
        self.auto_upcast_on_replay
    }

    /// Applies upcasters hop by hop until no upcaster starts at the current version.
    pub fn upcast(&self, message: VersionedMessage) -> DispatchResult<VersionedMessage> {
        let VersionedMessage {
            message_type,
            version,
            payload,
        } = message;
        let (version, payload) = self.upcast_value(&message_type, version, payload)?;
        Ok(VersionedMessage {
            message_type,
            version,
            payload,
        })
    }

    pub fn upcast_value(
        &self,
        message_type: &str,
        version: u32,
        payload: Value,
    ) -> DispatchResult<(u32, Value)> {
        let Some(chain) = self.chains.get(message_type) else {
            return Ok((version, payload));
        };

        let mut current = version;
        let mut payload = payload;
        while let Some(upcaster) = chain.get(&current) {
            payload = upcaster.upcast(payload).map_err(|e| match e {
                DispatchError::Upcast { .. } => e,
                other => DispatchError::Upcast {
                    message_type: message_type.to_string(),
                    from_version: current,
                    message: other.to_string(),
                },
            })?;
            debug!(
                message_type,
                from_version = current,
                to_version = upcaster.to_version(),
                "Message upcast"
            );
            current = upcaster.to_version();
        }
        Ok((current, payload))
    }

    /// 从版本1可达的最终版本，没有升级器时为0
    pub fn get_latest_version(&self, message_type: &str) -> u32 {
        let Some(chain) = self.chains.get(message_type) else {
            return 0;
        };
        let mut current = 1;
        while let Some(upcaster) = chain.get(&current) {
            current = upcaster.to_version();
        }
        current
    }

    pub fn can_upcast(&self, message_type: &str, from_version: u32, to_version: u32) -> bool {
        if from_version == to_version {
            return true;
        }
        let Some(chain) = self.chains.get(message_type) else {
            return false;
        };
        let mut current = from_version;
        while let Some(upcaster) = chain.get(&current) {
            current = upcaster.to_version();
            if current == to_version {
                return true;
            }
            if current > to_version {
                return false;
            }
        }
        false
    }

    pub fn registered_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.chains.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn upcaster_count(&self, message_type: &str) -> usize {
        self.chains.get(message_type).map_or(0, BTreeMap::len)
    }
}
