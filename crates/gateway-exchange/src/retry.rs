//! 지수 백오프 재시도.
//!
//! 일시적 에러(요청 한도, 서버 에러, 연결/타임아웃 실패)만 재시도하며,
//! 그 외 실패(검증 에러, 증거금 부족 등)는 즉시 전파합니다.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::GatewayResult;

/// 재시도 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 최대 시도 횟수 (최초 시도 포함)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 첫 재시도 전 대기 시간 (밀리초)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// 시도마다 대기 시간에 곱해지는 배수
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// 새 재시도 설정을 생성합니다.
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            multiplier: default_multiplier(),
        }
    }

    /// n번째 시도(0부터 시작) 이후의 대기 시간을 반환합니다.
    ///
    /// 500ms 기본값 기준: 500ms → 1s → 2s → ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.base_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms as u64)
    }
}

/// 재시도 정책으로 비동기 작업을 감쌉니다.
///
/// 재시도 가능한 에러에 한해 `max_attempts`까지 지수 백오프로 재시도하고,
/// 그 외 에러는 즉시 반환합니다. 모든 재시도는 관측 가능하도록 로깅됩니다.
pub async fn with_retry<T, F, Fut>(name: &str, config: &RetryConfig, op: F) -> GatewayResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = GatewayResult<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < config.max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;
                tracing::warn!(
                    operation = name,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::error!(
                        operation = name,
                        attempts = attempt + 1,
                        error = %err,
                        "Retries exhausted"
                    );
                }
                return Err(err);
            }
        }
    }
}
