//! Circuit Breaker pattern implementation.
//!
//! 외부 서비스 장애 시 연쇄 실패를 방지하고 시스템 복원력을 향상시킵니다.
//!
//! # 상태 전이
//!
//! ```text
//! Closed ──[윈도우 내 실패 비율 초과]──> Open
//!    ↑                                    │
//!    │                           [타임아웃 경과]
//!    │                                    ↓
//!    └──[시험 호출 성공]── HalfOpen ──[시험 호출 실패]──> Open
//! ```
//!
//! Closed 상태는 최근 호출 결과를 고정 크기 슬라이딩 윈도우에 기록하고,
//! 윈도우가 가득 찬 뒤 실패 비율이 임계치를 넘으면 Open으로 전이합니다.
//! Open 상태는 네트워크 시도 없이 즉시 거부하며, 냉각 시간이 지나면
//! HalfOpen이 되어 정확히 하나의 시험 호출만 통과시킵니다.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::GatewayError;

/// Circuit Breaker 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// 정상 상태 - 모든 요청 허용
    Closed,
    /// 장애 상태 - 모든 요청 즉시 거부
    Open,
    /// 복구 테스트 상태 - 단일 요청만 허용
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit Breaker 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// 슬라이딩 윈도우 크기 (최근 호출 수)
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Circuit을 여는 실패 비율 (0.0 ~ 1.0)
    #[serde(default = "default_failure_ratio")]
    pub failure_ratio: f64,
    /// Open 상태 유지 시간 (밀리초, 이후 HalfOpen으로 전이)
    #[serde(default = "default_open_duration_ms")]
    pub open_duration_ms: u64,
}

fn default_window_size() -> usize {
    10
}
fn default_failure_ratio() -> f64 {
    0.5
}
fn default_open_duration_ms() -> u64 {
    60_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            failure_ratio: default_failure_ratio(),
            open_duration_ms: default_open_duration_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    /// 새 설정을 생성합니다.
    pub fn new(window_size: usize, failure_ratio: f64, open_duration_ms: u64) -> Self {
        Self {
            window_size,
            failure_ratio,
            open_duration_ms,
        }
    }

    /// Open 상태 유지 시간을 반환합니다.
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

/// Circuit Breaker 내부 상태.
struct CircuitBreakerState {
    state: CircuitState,
    /// 최근 호출 결과 슬라이딩 윈도우 (true = 실패)
    window: VecDeque<bool>,
    /// 마지막 상태 전이 시각
    last_state_change: Instant,
    /// HalfOpen 시험 호출 진행 중 여부
    trial_in_flight: bool,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            last_state_change: Instant::now(),
            trial_in_flight: false,
        }
    }

    fn failure_ratio(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let failures = self.window.iter().filter(|&&failed| failed).count();
        failures as f64 / self.window.len() as f64
    }
}

/// Circuit Breaker.
///
/// 외부 서비스 호출 시 연쇄 실패를 방지합니다. 이름이 같은 파이프라인을
/// 통과하는 모든 호출이 하나의 인스턴스를 공유하며, 테스트는 독립
/// 인스턴스를 생성해 격리할 수 있습니다.
pub struct CircuitBreaker {
    /// 서비스 이름 (로깅 및 메트릭용)
    name: String,
    /// 설정
    config: CircuitBreakerConfig,
    /// 내부 상태 (RwLock으로 보호)
    state: RwLock<CircuitBreakerState>,
    /// 총 성공 횟수 (메트릭용)
    total_successes: AtomicU64,
    /// 총 실패 횟수 (메트릭용)
    total_failures: AtomicU64,
    /// 즉시 거부된 호출 수 (메트릭용)
    total_rejections: AtomicU64,
    /// Circuit Open 횟수 (메트릭용)
    open_count: AtomicU64,
}

impl CircuitBreaker {
    /// 새 Circuit Breaker를 생성합니다.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(CircuitBreakerState::new()),
            total_successes: AtomicU64::new(0),
            total_failures: AtomicU64::new(0),
            total_rejections: AtomicU64::new(0),
            open_count: AtomicU64::new(0),
        }
    }

    /// 기본 설정으로 생성합니다.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// 서비스 이름을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 현재 상태를 반환합니다.
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.write().unwrap();
        self.maybe_transition_from_open(&mut state);
        state.state
    }

    /// 호출 허가를 요청합니다.
    ///
    /// Open 상태에서는 네트워크 시도 없이 즉시 `CircuitOpen`으로
    /// 거부되고, HalfOpen 상태에서는 시험 호출 하나만 통과합니다.
    /// 허가된 호출은 결과를 `record_success`/`record_failure`로
    /// 반드시 보고해야 합니다.
    pub fn acquire(&self) -> Result<(), GatewayError> {
        let mut state = self.state.write().unwrap();
        self.maybe_transition_from_open(&mut state);

        match state.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                self.total_rejections.fetch_add(1, Ordering::Relaxed);
                Err(GatewayError::CircuitOpen(self.name.clone()))
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    self.total_rejections.fetch_add(1, Ordering::Relaxed);
                    Err(GatewayError::CircuitOpen(self.name.clone()))
                } else {
                    state.trial_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// 성공을 기록합니다.
    ///
    /// HalfOpen 상태의 시험 호출이 성공하면 Closed로 전이하고 윈도우를
    /// 초기화합니다.
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().unwrap();
        match state.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut state, self.config.window_size, false);
            }
            CircuitState::HalfOpen => {
                self.transition_to(&mut state, CircuitState::Closed);
                tracing::info!(
                    circuit_breaker = %self.name,
                    "Circuit breaker recovered: HalfOpen -> Closed"
                );
            }
            CircuitState::Open => {
                // Open 상태에서는 허가가 거부되므로 이 케이스는 발생하지 않아야 함
            }
        }
    }

    /// 실패를 기록합니다.
    ///
    /// 윈도우가 가득 찬 상태에서 실패 비율이 임계치 이상이면 Open으로
    /// 전이합니다. HalfOpen 상태의 시험 호출 실패는 즉시 Open으로
    /// 되돌리고 냉각 시간을 다시 시작합니다.
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.write().unwrap();
        match state.state {
            CircuitState::Closed => {
                Self::push_outcome(&mut state, self.config.window_size, true);

                let window_full = state.window.len() >= self.config.window_size;
                if window_full && state.failure_ratio() >= self.config.failure_ratio {
                    let ratio = state.failure_ratio();
                    self.transition_to(&mut state, CircuitState::Open);
                    self.open_count.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        circuit_breaker = %self.name,
                        failure_ratio = ratio,
                        window_size = self.config.window_size,
                        "Circuit breaker tripped: Closed -> Open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to(&mut state, CircuitState::Open);
                self.open_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    circuit_breaker = %self.name,
                    "Circuit breaker recovery failed: HalfOpen -> Open"
                );
            }
            CircuitState::Open => {
                // 이미 Open 상태
            }
        }
    }

    /// 결과를 기록합니다.
    ///
    /// 재시도 불가능한 에러(검증 실패 등)는 의존성 장애가 아니므로
    /// 실패로 집계하지 않습니다.
    pub fn record_result<T>(&self, result: &Result<T, GatewayError>) {
        match result {
            Ok(_) => self.record_success(),
            Err(e) if e.is_retryable() => self.record_failure(),
            Err(_) => self.record_success(),
        }
    }

    /// 수동으로 Circuit을 리셋합니다.
    pub fn reset(&self) {
        let mut state = self.state.write().unwrap();
        self.transition_to(&mut state, CircuitState::Closed);
        tracing::info!(circuit_breaker = %self.name, "Circuit breaker manually reset");
    }

    /// 메트릭을 반환합니다.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.read().unwrap();
        CircuitBreakerMetrics {
            name: self.name.clone(),
            state: state.state,
            window_failure_ratio: state.failure_ratio(),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
            open_count: self.open_count.load(Ordering::Relaxed),
            time_in_current_state: state.last_state_change.elapsed(),
        }
    }

    /// 윈도우에 결과를 추가하고 가장 오래된 항목을 밀어냅니다.
    fn push_outcome(state: &mut CircuitBreakerState, window_size: usize, failed: bool) {
        state.window.push_back(failed);
        while state.window.len() > window_size {
            state.window.pop_front();
        }
    }

    /// Open 상태에서 냉각 시간이 경과했으면 HalfOpen으로 전이합니다.
    fn maybe_transition_from_open(&self, state: &mut CircuitBreakerState) {
        if state.state == CircuitState::Open
            && state.last_state_change.elapsed() >= self.config.open_duration()
        {
            self.transition_to(state, CircuitState::HalfOpen);
            tracing::info!(
                circuit_breaker = %self.name,
                "Circuit breaker timeout: Open -> HalfOpen"
            );
        }
    }

    /// 상태를 전이합니다.
    fn transition_to(&self, state: &mut CircuitBreakerState, new_state: CircuitState) {
        state.state = new_state;
        state.last_state_change = Instant::now();
        state.trial_in_flight = false;

        if new_state == CircuitState::Closed {
            state.window.clear();
        }
    }
}

/// Circuit Breaker 메트릭.
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    /// 서비스 이름
    pub name: String,
    /// 현재 상태
    pub state: CircuitState,
    /// 현재 윈도우의 실패 비율
    pub window_failure_ratio: f64,
    /// 총 성공 횟수
    pub total_successes: u64,
    /// 총 실패 횟수
    pub total_failures: u64,
    /// 즉시 거부된 호출 수
    pub total_rejections: u64,
    /// Circuit Open 횟수
    pub open_count: u64,
    /// 현재 상태 유지 시간
    pub time_in_current_state: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(4, 0.5, 50)
    }

    #[test]
    fn test_initial_state() {
        let cb = CircuitBreaker::with_defaults("test");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.acquire().is_ok());
    }

    #[test]
    fn test_opens_when_window_ratio_exceeded() {
        let cb = CircuitBreaker::new("test", fast_config());

        // 윈도우(4)가 가득 차기 전에는 비율과 무관하게 Closed
        cb.record_failure();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        // 4번째 결과로 윈도우가 가득 차고 실패 비율 100% >= 50%
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(matches!(cb.acquire(), Err(GatewayError::CircuitOpen(_))));
    }

    #[test]
    fn test_mixed_window_below_threshold_stays_closed() {
        let cb = CircuitBreaker::new("test", fast_config());

        // 실패 1/4 = 25% < 50%
        cb.record_success();
        cb.record_success();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        // 오래된 성공이 밀려나며 실패 2/4 = 50% 도달
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_exactly_one_trial() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            cb.record_failure();
        }
        thread::sleep(Duration::from_millis(60));

        assert!(cb.acquire().is_ok());
        // 시험 호출이 진행 중인 동안 두 번째 호출은 거부
        assert!(matches!(cb.acquire(), Err(GatewayError::CircuitOpen(_))));
    }

    #[test]
    fn test_trial_success_closes_circuit() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            cb.record_failure();
        }
        thread::sleep(Duration::from_millis(60));

        cb.acquire().unwrap();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.acquire().is_ok());
    }

    #[test]
    fn test_trial_failure_reopens_and_restarts_cooldown() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            cb.record_failure();
        }
        thread::sleep(Duration::from_millis(60));

        cb.acquire().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // 냉각 시간이 다시 시작되어 즉시 HalfOpen이 되지 않음
        assert!(matches!(cb.acquire(), Err(GatewayError::CircuitOpen(_))));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_non_retryable_errors_not_counted_as_failures() {
        let cb = CircuitBreaker::new("test", fast_config());

        let validation: Result<(), GatewayError> =
            Err(GatewayError::InvalidQuantity("precision".into()));
        for _ in 0..8 {
            cb.record_result(&validation);
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        let transient: Result<(), GatewayError> = Err(GatewayError::Network("reset".into()));
        for _ in 0..4 {
            cb.record_result(&transient);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_metrics() {
        let cb = CircuitBreaker::new("test", fast_config());
        cb.record_success();
        cb.record_success();
        cb.record_failure();

        let metrics = cb.metrics();
        assert_eq!(metrics.name, "test");
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.total_successes, 2);
        assert_eq!(metrics.total_failures, 1);
    }

    #[test]
    fn test_manual_reset() {
        let cb = CircuitBreaker::new("test", fast_config());
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.acquire().is_ok());
    }
}
