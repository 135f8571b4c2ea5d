use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 重试策略
///
/// `get_delay(attempt) = min(initial_delay * multiplier^(attempt-1), max_delay)`，
/// 启用抖动时在此基础上额外增加 0–20% 的随机时长。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
    pub const MAX_JITTER_FACTOR: f64 = 0.2;

    /// 指数退避
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// 固定间隔：倍数为 1.0 且不加抖动
    pub fn fixed_delay(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            use_jitter: false,
        }
    }

    /// 不重试
    pub fn no_retry() -> Self {
        Self::fixed_delay(1, Duration::ZERO)
    }

    pub fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    pub fn with_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.backoff_multiplier = backoff_multiplier;
        self
    }

    /// 第 `attempt` 次重试前的等待时长（attempt 从 1 开始）
    pub fn get_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = if base.is_finite() {
            base.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };

        let delay = if self.use_jitter {
            capped + capped * Self::MAX_JITTER_FACTOR * rand::random::<f64>()
        } else {
            capped
        };

        Duration::from_secs_f64(delay.max(0.0))
    }

    /// 已执行 `attempt` 次后是否还能再试
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
