use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Saga生命周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SagaState {
    Created,
    Running,
    Completed,
    Compensating,
    CompensatedSuccessfully,
    CompensationFailed,
    Cancelled,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed
                | SagaState::CompensatedSuccessfully
                | SagaState::CompensationFailed
                | SagaState::Cancelled
        )
    }

    /// 合法的状态迁移
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        use SagaState::*;
        match (*self, next) {
            (Created, Running) => true,
            (Running, Completed) | (Running, Compensating) => true,
            (Compensating, CompensatedSuccessfully) | (Compensating, CompensationFailed) => true,
            (Created | Running | Compensating, Cancelled) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SagaState::Created => "Created",
            SagaState::Running => "Running",
            SagaState::Completed => "Completed",
            SagaState::Compensating => "Compensating",
            SagaState::CompensatedSuccessfully => "CompensatedSuccessfully",
            SagaState::CompensationFailed => "CompensationFailed",
            SagaState::Cancelled => "Cancelled",
        };
        write!(f, "{name}")
    }
}

/// 单个步骤的执行结果，只能通过 `success` / `failure` 创建
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    is_success: bool,
    error_message: Option<String>,
    error: Option<String>,
    output_data: Option<serde_json::Value>,
}

impl StepResult {
    pub fn success() -> Self {
        Self {
            is_success: true,
            error_message: None,
            error: None,
            output_data: None,
        }
    }

    pub fn success_with_output(output_data: serde_json::Value) -> Self {
        Self {
            output_data: Some(output_data),
            ..Self::success()
        }
    }

    pub fn failure<S: Into<String>>(error_message: S) -> Self {
        Self {
            is_success: false,
            error_message: Some(error_message.into()),
            error: None,
            output_data: None,
        }
    }

    /// 携带底层错误描述的失败结果
    pub fn failure_with_error<S: Into<String>, E: std::fmt::Display>(
        error_message: S,
        error: &E,
    ) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::failure(error_message)
        }
    }

    pub fn is_success(&self) -> bool {
        self.is_success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn output_data(&self) -> Option<&serde_json::Value> {
        self.output_data.as_ref()
    }
}

/// Saga活动类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SagaActivityKind {
    StepStarted,
    StepCompleted,
    StepFailed,
    StepRetried,
    CompensationStarted,
    CompensationCompleted,
    CompensationFailed,
    StateChanged,
}

/// Saga活动日志条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SagaActivity {
    pub kind: SagaActivityKind,
    pub step_name: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl SagaActivity {
    pub fn new<S: Into<String>>(kind: SagaActivityKind, step_name: Option<&str>, message: S) -> Self {
        Self {
            kind,
            step_name: step_name.map(str::to_string),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Saga执行结果
#[derive(Debug, Clone)]
pub struct SagaResult<D> {
    pub saga_id: String,
    pub saga_type: String,
    pub state: SagaState,
    pub data: D,
    pub activities: Vec<SagaActivity>,
    pub duration: Duration,
    pub error_message: Option<String>,
    /// 补偿失败的步骤名称
    pub failed_compensations: Vec<String>,
}

impl<D> SagaResult<D> {
    /// 仅 `Completed` 视为成功
    pub fn is_success(&self) -> bool {
        self.state == SagaState::Completed
    }

    pub fn was_compensated(&self) -> bool {
        matches!(
            self.state,
            SagaState::CompensatedSuccessfully | SagaState::CompensationFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [SagaState; 7] = [
        SagaState::Created,
        SagaState::Running,
        SagaState::Completed,
        SagaState::Compensating,
        SagaState::CompensatedSuccessfully,
        SagaState::CompensationFailed,
        SagaState::Cancelled,
    ];

    fn result_in(state: SagaState) -> SagaResult<()> {
        SagaResult {
            saga_id: "saga-1".to_string(),
            saga_type: "OrderSaga".to_string(),
            state,
            data: (),
            activities: Vec::new(),
            duration: Duration::ZERO,
            error_message: None,
            failed_compensations: Vec::new(),
        }
    }

    #[test]
    fn test_success_mapping_for_all_states() {
        for state in ALL_STATES {
            assert_eq!(
                result_in(state).is_success(),
                state == SagaState::Completed,
                "state {state}"
            );
        }
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = ALL_STATES.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![
                SagaState::Completed,
                SagaState::CompensatedSuccessfully,
                SagaState::CompensationFailed,
                SagaState::Cancelled
            ]
        );
    }

    #[test]
    fn test_transitions() {
        assert!(SagaState::Created.can_transition_to(SagaState::Running));
        assert!(SagaState::Running.can_transition_to(SagaState::Compensating));
        assert!(SagaState::Compensating.can_transition_to(SagaState::CompensationFailed));
        assert!(SagaState::Running.can_transition_to(SagaState::Cancelled));

        assert!(!SagaState::Created.can_transition_to(SagaState::Completed));
        assert!(!SagaState::Completed.can_transition_to(SagaState::Cancelled));
        assert!(!SagaState::Cancelled.can_transition_to(SagaState::Running));
        assert!(!SagaState::Running.can_transition_to(SagaState::CompensatedSuccessfully));
    }

    #[test]
    fn test_step_result_factories() {
        let ok = StepResult::success_with_output(serde_json::json!({"reserved": 2}));
        assert!(ok.is_success());
        assert_eq!(ok.output_data().unwrap()["reserved"], 2);
        assert!(ok.error_message().is_none());

        let failed = StepResult::failure_with_error("payment declined", &"card expired");
        assert!(!failed.is_success());
        assert_eq!(failed.error_message(), Some("payment declined"));
        assert_eq!(failed.error(), Some("card expired"));
    }
}
