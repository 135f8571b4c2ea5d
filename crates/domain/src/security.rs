//! Security events and their severities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 安全事件类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SecurityEventType {
    ValidationFailure,
    InjectionAttempt,
    AuthorizationFailure,
    SuspiciousActivity,
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityEventType::ValidationFailure => write!(f, "ValidationFailure"),
            SecurityEventType::InjectionAttempt => write!(f, "InjectionAttempt"),
            SecurityEventType::AuthorizationFailure => write!(f, "AuthorizationFailure"),
            SecurityEventType::SuspiciousActivity => write!(f, "SuspiciousActivity"),
        }
    }
}

/// 安全事件严重程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecuritySeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for SecuritySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecuritySeverity::Low => write!(f, "low"),
            SecuritySeverity::Medium => write!(f, "medium"),
            SecuritySeverity::High => write!(f, "high"),
            SecuritySeverity::Critical => write!(f, "critical"),
        }
    }
}

/// 已记录的安全事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityEvent {
    pub event_type: SecurityEventType,
    pub description: String,
    pub severity: SecuritySeverity,
    pub message_id: Option<String>,
    pub correlation_id: Option<String>,
    pub tenant_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}
