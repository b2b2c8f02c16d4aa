//! 복원력 파이프라인.
//!
//! 외부 호출을 rate limiter → circuit breaker → retry 순서로 감쌉니다.
//! 주문 제출 경로는 세 정책을 모두 적용하고, 읽기 전용 경로는 rate
//! limiting만 적용합니다. 파이프라인 상태(breaker, limiter)는 이름당
//! 하나로 프로세스 전역에서 공유되며, 명시적으로 소유/주입되므로
//! 테스트마다 격리된 인스턴스를 만들 수 있습니다.

use std::future::Future;
use std::sync::Arc;

use gateway_core::ResilienceSettings;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::retry::{with_retry, RetryConfig};
use crate::GatewayResult;

/// 이름 있는 복원력 파이프라인.
pub struct ResiliencePipeline {
    /// 파이프라인 이름 (로깅 및 메트릭용)
    name: String,
    /// 공유 circuit breaker
    breaker: Arc<CircuitBreaker>,
    /// 공유 rate limiter
    limiter: Arc<RateLimiter>,
    /// 재시도 설정
    retry: RetryConfig,
}

impl ResiliencePipeline {
    /// 새 파이프라인을 생성합니다.
    pub fn new(
        name: impl Into<String>,
        breaker_config: CircuitBreakerConfig,
        limiter_config: RateLimiterConfig,
        retry_config: RetryConfig,
    ) -> Self {
        let name = name.into();
        Self {
            breaker: Arc::new(CircuitBreaker::new(name.clone(), breaker_config)),
            limiter: Arc::new(RateLimiter::new(name.clone(), limiter_config)),
            retry: retry_config,
            name,
        }
    }

    /// 게이트웨이 설정에서 파이프라인을 생성합니다.
    pub fn from_settings(name: impl Into<String>, settings: &ResilienceSettings) -> Self {
        Self::new(
            name,
            CircuitBreakerConfig::new(
                settings.breaker_window_size,
                settings.breaker_failure_ratio,
                settings.breaker_open_ms,
            ),
            RateLimiterConfig::new(
                settings.rate_limit_permits,
                settings.rate_limit_period_ms,
                settings.rate_limit_timeout_ms,
            ),
            RetryConfig {
                max_attempts: settings.retry_max_attempts,
                base_delay_ms: settings.retry_base_delay_ms,
                multiplier: settings.retry_multiplier,
            },
        )
    }

    /// 기본 설정으로 생성합니다.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(
            name,
            CircuitBreakerConfig::default(),
            RateLimiterConfig::default(),
            RetryConfig::default(),
        )
    }

    /// 파이프라인 이름을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 공유 circuit breaker를 반환합니다.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// 공유 rate limiter를 반환합니다.
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// 전체 파이프라인으로 작업을 실행합니다 (주문 제출 경로).
    ///
    /// 허가 획득 → breaker 게이트 → 재시도 루프 순서이며, breaker는
    /// 재시도가 모두 끝난 집계 결과 하나를 기록합니다. breaker가 열려
    /// 있으면 네트워크 시도 없이 즉시 실패합니다.
    pub async fn execute<T, F, Fut>(&self, op_name: &str, op: F) -> GatewayResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.limiter.acquire().await?;
        self.breaker.acquire()?;

        let result = with_retry(op_name, &self.retry, op).await;
        self.breaker.record_result(&result);
        result
    }

    /// rate limiting만 적용해 작업을 실행합니다 (읽기 전용 경로).
    pub async fn execute_limited<T, F, Fut>(&self, op: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.limiter.acquire().await?;
        op().await
    }
}
