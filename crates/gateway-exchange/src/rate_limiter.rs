//! 고정 윈도우 요청 한도 제한.
//!
//! 거래소가 부과하는 요청 예산을 호출자가 초과하지 않도록 보호합니다.
//! 기간당 N개의 허가가 주어지고, 윈도우가 소진되면 호출자는 다음
//! 윈도우까지 대기합니다. 대기는 무한정이 아니라 설정된 타임아웃까지만
//! 허용되며, 초과 시 `Throttled` 에러로 실패합니다.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::GatewayError;

/// 요청 한도 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// 기간당 허용 요청 수
    #[serde(default = "default_permits")]
    pub permits_per_period: u32,
    /// 허가 갱신 주기 (밀리초)
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// 허가 대기 타임아웃 (밀리초)
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_permits() -> u32 {
    20
}
fn default_period_ms() -> u64 {
    1000
}
fn default_acquire_timeout_ms() -> u64 {
    5000
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            permits_per_period: default_permits(),
            period_ms: default_period_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

impl RateLimiterConfig {
    /// 새 설정을 생성합니다.
    pub fn new(permits_per_period: u32, period_ms: u64, acquire_timeout_ms: u64) -> Self {
        Self {
            permits_per_period,
            period_ms,
            acquire_timeout_ms,
        }
    }
}

/// 윈도우 상태.
struct WindowState {
    /// 현재 윈도우 시작 시각
    window_start: Instant,
    /// 현재 윈도우에서 소비된 허가 수
    used: u32,
}

/// 고정 윈도우 토큰 버킷.
///
/// 이름이 같은 파이프라인의 모든 호출이 하나의 인스턴스를 공유합니다.
pub struct RateLimiter {
    /// 서비스 이름 (로깅용)
    name: String,
    /// 설정
    config: RateLimiterConfig,
    /// 윈도우 상태 (Mutex로 보호, await 중에는 잡지 않음)
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// 새 RateLimiter를 생성합니다.
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                used: 0,
            }),
        }
    }

    /// 기본 설정으로 생성합니다.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, RateLimiterConfig::default())
    }

    /// 서비스 이름을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 허가를 획득합니다.
    ///
    /// 현재 윈도우에 여유가 있으면 즉시 반환하고, 없으면 윈도우가
    /// 갱신될 때까지 대기합니다. `acquire_timeout_ms`를 넘겨야 하는
    /// 대기는 `Throttled`로 즉시 실패합니다.
    pub async fn acquire(&self) -> Result<(), GatewayError> {
        let period = Duration::from_millis(self.config.period_ms);
        let deadline = Instant::now() + Duration::from_millis(self.config.acquire_timeout_ms);

        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();

                if now.duration_since(state.window_start) >= period {
                    state.window_start = now;
                    state.used = 0;
                }

                if state.used < self.config.permits_per_period {
                    state.used += 1;
                    return Ok(());
                }

                period.saturating_sub(now.duration_since(state.window_start))
            };

            if Instant::now() + wait > deadline {
                tracing::warn!(
                    rate_limiter = %self.name,
                    timeout_ms = self.config.acquire_timeout_ms,
                    "Rate limiter acquire timed out"
                );
                return Err(GatewayError::Throttled(self.name.clone()));
            }

            tracing::debug!(
                rate_limiter = %self.name,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for next window"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// 현재 윈도우에 남은 허가 수를 반환합니다.
    pub fn available_permits(&self) -> u32 {
        let mut state = self.state.lock().unwrap();
        if state.window_start.elapsed() >= Duration::from_millis(self.config.period_ms) {
            state.window_start = Instant::now();
            state.used = 0;
        }
        self.config.permits_per_period.saturating_sub(state.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_permits_within_budget_are_immediate() {
        let limiter = RateLimiter::new("test", RateLimiterConfig::new(5, 1000, 100));

        for _ in 0..5 {
            limiter.acquire().await.unwrap();
        }
        assert_eq!(limiter.available_permits(), 0);
    }

    #[tokio::test]
    async fn test_excess_calls_fail_when_wait_exceeds_timeout() {
        // 윈도우 1초, 대기 한도 50ms: 초과분은 윈도우 갱신을 기다릴 수 없음
        let limiter = RateLimiter::new("test", RateLimiterConfig::new(3, 1000, 50));

        for _ in 0..3 {
            limiter.acquire().await.unwrap();
        }

        let result = limiter.acquire().await;
        assert!(matches!(result, Err(GatewayError::Throttled(_))));
    }

    #[tokio::test]
    async fn test_excess_call_waits_for_next_window() {
        // 짧은 윈도우: 초과 호출이 블록되었다가 갱신 후 성공
        let limiter = RateLimiter::new("test", RateLimiterConfig::new(2, 50, 500));

        limiter.acquire().await.unwrap();
        limiter.acquire().await.unwrap();

        let started = Instant::now();
        limiter.acquire().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_budget_never_exceeded_within_window() {
        let limiter = std::sync::Arc::new(RateLimiter::new(
            "test",
            RateLimiterConfig::new(10, 60_000, 10),
        ));

        // 동시 20개 요청: 정확히 10개만 통과해야 함
        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire().await.is_ok() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
    }
}
