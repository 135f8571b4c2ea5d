use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// 消息上下文
///
/// 随消息穿过整个中间件管道的元数据。原始消息与上下文并列传递，不存放在上下文内部。
/// 构建完成后 `message_id` 与 `correlation_id` 均非空，`received_timestamp_utc` 为构建时刻。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContext {
    pub message_id: String,
    pub correlation_id: String,
    pub causation_id: Option<String>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub workflow_id: Option<String>,
    pub partition_key: Option<String>,
    pub source: Option<String>,
    pub message_type: Option<String>,
    pub content_type: Option<String>,
    pub trace_parent: Option<String>,
    pub external_id: Option<String>,
    pub delivery_count: u32,
    pub sent_timestamp_utc: Option<DateTime<Utc>>,
    pub received_timestamp_utc: DateTime<Utc>,
    /// 单次分发范围内的可变键值包
    #[serde(default)]
    pub items: HashMap<String, serde_json::Value>,
}

impl MessageContext {
    pub fn new() -> Self {
        MessageContextBuilder::default().build()
    }

    pub fn builder() -> MessageContextBuilder {
        MessageContextBuilder::default()
    }

    pub fn set_item<K: Into<String>, V: Into<serde_json::Value>>(&mut self, key: K, value: V) {
        self.items.insert(key.into(), value.into());
    }

    pub fn get_item(&self, key: &str) -> Option<&serde_json::Value> {
        self.items.get(key)
    }

    pub fn contains_item(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn remove_item(&mut self, key: &str) -> Option<serde_json::Value> {
        self.items.remove(key)
    }

    /// 派生一个因果关联的子上下文：继承关联ID、租户、用户与追踪信息，
    /// `causation_id` 指向当前消息。
    pub fn create_child(&self) -> MessageContext {
        MessageContext::builder()
            .correlation_id(self.correlation_id.clone())
            .causation_id(self.message_id.clone())
            .maybe_tenant_id(self.tenant_id.clone())
            .maybe_user_id(self.user_id.clone())
            .maybe_session_id(self.session_id.clone())
            .maybe_workflow_id(self.workflow_id.clone())
            .maybe_trace_parent(self.trace_parent.clone())
            .build()
    }
}

impl Default for MessageContext {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MessageContextBuilder {
    message_id: Option<String>,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    tenant_id: Option<String>,
    user_id: Option<String>,
    session_id: Option<String>,
    workflow_id: Option<String>,
    partition_key: Option<String>,
    source: Option<String>,
    message_type: Option<String>,
    content_type: Option<String>,
    trace_parent: Option<String>,
    external_id: Option<String>,
    delivery_count: u32,
    sent_timestamp_utc: Option<DateTime<Utc>>,
}

macro_rules! builder_setters {
    ($($field:ident => $maybe:ident),* $(,)?) => {
        $(
            pub fn $field<S: Into<String>>(mut self, value: S) -> Self {
                self.$field = Some(value.into());
                self
            }

            pub fn $maybe(mut self, value: Option<String>) -> Self {
                self.$field = value;
                self
            }
        )*
    };
}

impl MessageContextBuilder {
    builder_setters! {
        message_id => maybe_message_id,
        correlation_id => maybe_correlation_id,
        causation_id => maybe_causation_id,
        tenant_id => maybe_tenant_id,
        user_id => maybe_user_id,
        session_id => maybe_session_id,
        workflow_id => maybe_workflow_id,
        partition_key => maybe_partition_key,
        source => maybe_source,
        message_type => maybe_message_type,
        content_type => maybe_content_type,
        trace_parent => maybe_trace_parent,
        external_id => maybe_external_id,
    }

    pub fn delivery_count(mut self, delivery_count: u32) -> Self {
        self.delivery_count = delivery_count;
        self
    }

    pub fn sent_at(mut self, sent: DateTime<Utc>) -> Self {
        self.sent_timestamp_utc = Some(sent);
        self
    }

    /// 缺失或空白的 `message_id` 自动生成，`correlation_id` 缺失时沿用 `message_id`
    pub fn build(self) -> MessageContext {
        let message_id = self
            .message_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let correlation_id = self
            .correlation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| message_id.clone());

        MessageContext {
            message_id,
            correlation_id,
            causation_id: self.causation_id,
            tenant_id: self.tenant_id,
            user_id: self.user_id,
            session_id: self.session_id,
            workflow_id: self.workflow_id,
            partition_key: self.partition_key,
            source: self.source,
            message_type: self.message_type,
            content_type: self.content_type,
            trace_parent: self.trace_parent,
            external_id: self.external_id,
            delivery_count: self.delivery_count,
            sent_timestamp_utc: self.sent_timestamp_utc,
            received_timestamp_utc: Utc::now(),
            items: HashMap::new(),
        }
    }
}
