//! Mock implementations of the domain ports
//!
//! In-memory, `Mutex`-backed and recording, so tests can assert on the calls
//! that reached them and inject failures.

use async_trait::async_trait;
use chrono::Utc;
use dispatch_domain::{
    CoordinationBackend, DispatchMessage, Dispatcher, MessageContext, MessageResult,
    OperationMonitor, OperationOutcome, OperationToken, ScheduleStore, ScheduledMessage,
    SecurityEvent, SecurityEventSink, SecurityEventType, SecuritySeverity,
};
use dispatch_errors::{DispatchError, DispatchResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Security sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSecurityEventSink {
    events: Mutex<Vec<SecurityEvent>>,
    fail: bool,
}

impl RecordingSecurityEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose every call returns an error
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl SecurityEventSink for RecordingSecurityEventSink {
    async fn log_security_event(
        &self,
        event_type: SecurityEventType,
        description: &str,
        severity: SecuritySeverity,
        context: Option<&MessageContext>,
    ) -> DispatchResult<()> {
        if self.fail {
            return Err(DispatchError::Internal("security sink unavailable".into()));
        }
        self.events.lock().unwrap().push(SecurityEvent {
            event_type,
            description: description.to_string(),
            severity,
            message_id: context.map(|c| c.message_id.clone()),
            correlation_id: context.map(|c| c.correlation_id.clone()),
            tenant_id: context.and_then(|c| c.tenant_id.clone()),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}

/// Mock ScheduleStore that records stores, completions and disposal
#[derive(Debug, Clone, Default)]
pub struct MockScheduleStore {
    schedules: Arc<Mutex<HashMap<String, ScheduledMessage>>>,
    stored: Arc<Mutex<Vec<ScheduledMessage>>>,
    completed: Arc<Mutex<Vec<String>>>,
    dispose_calls: Arc<AtomicUsize>,
    fail_get_all: Arc<AtomicBool>,
}

impl MockScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: Vec<ScheduledMessage>) -> Self {
        let store = Self::new();
        {
            let mut map = store.schedules.lock().unwrap();
            for schedule in schedules {
                map.insert(schedule.id.clone(), schedule);
            }
        }
        store
    }

    pub fn get(&self, id: &str) -> Option<ScheduledMessage> {
        self.schedules.lock().unwrap().get(id).cloned()
    }

    /// 按调用顺序返回传给 `store` 的所有值
    pub fn stored(&self) -> Vec<ScheduledMessage> {
        self.stored.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_get_all(&self, fail: bool) {
        self.fail_get_all.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScheduleStore for MockScheduleStore {
    async fn get_all(&self) -> DispatchResult<Vec<ScheduledMessage>> {
        if self.fail_get_all.load(Ordering::SeqCst) {
            return Err(DispatchError::Network("schedule store offline".into()));
        }
        Ok(self.schedules.lock().unwrap().values().cloned().collect())
    }

    async fn store(&self, message: ScheduledMessage) -> DispatchResult<()> {
        self.stored.lock().unwrap().push(message.clone());
        self.schedules
            .lock()
            .unwrap()
            .insert(message.id.clone(), message);
        Ok(())
    }

    async fn complete(&self, id: &str) -> DispatchResult<()> {
        self.completed.lock().unwrap().push(id.to_string());
        self.schedules.lock().unwrap().remove(id);
        Ok(())
    }

    async fn dispose(&self) -> DispatchResult<()> {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A message as seen by [`RecordingDispatcher`]
#[derive(Debug, Clone)]
pub struct DispatchedMessage {
    pub message_type: &'static str,
    pub payload: serde_json::Value,
    pub context: MessageContext,
}

/// Dispatcher that records messages instead of running handlers
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    dispatched: Mutex<Vec<DispatchedMessage>>,
    failing_types: Mutex<HashSet<String>>,
    remaining_failures: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages whose short type name equals `message_type` yield failed results
    pub fn fail_type<S: Into<String>>(self, message_type: S) -> Self {
        self.failing_types.lock().unwrap().insert(message_type.into());
        self
    }

    /// The next `count` dispatches yield failed results
    pub fn fail_next(self, count: usize) -> Self {
        self.remaining_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Every dispatch sleeps for `delay` before recording
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn dispatched(&self) -> Vec<DispatchedMessage> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.dispatched.lock().unwrap().len()
    }

    fn should_fail(&self, message_type: &str) -> bool {
        let short = dispatch_domain::short_type_name(message_type);
        if self.failing_types.lock().unwrap().contains(short) {
            return true;
        }
        self.remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(
        &self,
        message: &dyn DispatchMessage,
        context: &mut MessageContext,
    ) -> DispatchResult<MessageResult> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.dispatched.lock().unwrap().push(DispatchedMessage {
            message_type: message.message_type(),
            payload: message.to_value()?,
            context: context.clone(),
        });

        if self.should_fail(message.message_type()) {
            Ok(MessageResult::failure("recorded failure"))
        } else {
            Ok(MessageResult::success())
        }
    }
}

/// Operation monitor that records every completed operation
#[derive(Debug, Default)]
pub struct RecordingOperationMonitor {
    started: Mutex<Vec<String>>,
    completed: Mutex<Vec<(String, OperationOutcome)>>,
}

impl RecordingOperationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn completed(&self) -> Vec<(String, OperationOutcome)> {
        self.completed.lock().unwrap().clone()
    }

    pub fn outcomes(&self, outcome: OperationOutcome) -> usize {
        self.completed
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, o)| *o == outcome)
            .count()
    }
}

impl OperationMonitor for RecordingOperationMonitor {
    fn start_operation(&self, operation_name: &str, timeout: Duration) -> OperationToken {
        self.started.lock().unwrap().push(operation_name.to_string());
        OperationToken::new(operation_name, timeout)
    }

    fn complete_operation(&self, token: OperationToken, outcome: OperationOutcome) {
        self.completed
            .lock()
            .unwrap()
            .push((token.operation_name, outcome));
    }
}

#[derive(Debug, Clone)]
struct MockEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MockEntry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-memory coordination backend with per-method call counters and a
/// switch that turns every call into a network error.
#[derive(Debug, Clone, Default)]
pub struct MockCoordinationBackend {
    values: Arc<Mutex<HashMap<String, MockEntry>>>,
    sets: Arc<Mutex<HashMap<String, HashSet<String>>>>,
    calls: Arc<Mutex<HashMap<&'static str, usize>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockCoordinationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of calls made to `method`, e.g. `"delete_if_owner"`
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// Raw value lookup that bypasses the call counters
    pub fn peek(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap()
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .values
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.is_live())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// 清除过期时间，模拟其他持有者占用该键
    pub fn overwrite(&self, key: &str, value: &str) {
        self.values.lock().unwrap().insert(
            key.to_string(),
            MockEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    fn record(&self, method: &'static str) -> DispatchResult<()> {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DispatchError::Network("coordination backend unavailable".into()));
        }
        Ok(())
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let mut values = self.values.lock().unwrap();
        match values.get(key) {
            Some(entry) if entry.is_live() => Some(entry.value.clone()),
            Some(_) => {
                values.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CoordinationBackend for MockCoordinationBackend {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> DispatchResult<bool> {
        self.record("set_if_absent")?;
        if self.live_value(key).is_some() {
            return Ok(false);
        }
        self.values.lock().unwrap().insert(
            key.to_string(),
            MockEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn renew_if_owner(&self, key: &str, owner: &str, ttl: Duration) -> DispatchResult<bool> {
        self.record("renew_if_owner")?;
        if self.live_value(key).as_deref() != Some(owner) {
            return Ok(false);
        }
        if let Some(entry) = self.values.lock().unwrap().get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(true)
    }

    async fn delete_if_owner(&self, key: &str, owner: &str) -> DispatchResult<bool> {
        self.record("delete_if_owner")?;
        if self.live_value(key).as_deref() != Some(owner) {
            return Ok(false);
        }
        self.values.lock().unwrap().remove(key);
        Ok(true)
    }

    async fn get(&self, key: &str) -> DispatchResult<Option<String>> {
        self.record("get")?;
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DispatchResult<()> {
        self.record("set")?;
        self.values.lock().unwrap().insert(
            key.to_string(),
            MockEntry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> DispatchResult<bool> {
        self.record("delete")?;
        let removed_value = self.values.lock().unwrap().remove(key).is_some();
        let removed_set = self.sets.lock().unwrap().remove(key).is_some();
        Ok(removed_value || removed_set)
    }

    async fn set_add(&self, set_key: &str, member: &str) -> DispatchResult<()> {
        self.record("set_add")?;
        self.sets
            .lock()
            .unwrap()
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set_key: &str, member: &str) -> DispatchResult<()> {
        self.record("set_remove")?;
        if let Some(set) = self.sets.lock().unwrap().get_mut(set_key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> DispatchResult<Vec<String>> {
        self.record("set_members")?;
        let mut members: Vec<String> = self
            .sets
            .lock()
            .unwrap()
            .get(set_key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }
}
