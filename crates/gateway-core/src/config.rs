//! 설정 관리.
//!
//! TOML 파일과 `GATEWAY__` 접두사 환경 변수에서 게이트웨이 설정을
//! 로드합니다. 모든 필드에 serde 기본값이 있어 부분 설정 파일로도
//! 동작합니다.

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

/// 게이트웨이 전체 설정.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// 거래소 연결 설정
    #[serde(default)]
    pub exchange: ExchangeSettings,
    /// 거래 설정
    #[serde(default)]
    pub trading: TradingSettings,
    /// 복원력 파이프라인 설정
    #[serde(default)]
    pub resilience: ResilienceSettings,
    /// 스트림 캐시 설정
    #[serde(default)]
    pub stream: StreamSettings,
}

/// 거래소 연결 설정.
///
/// `Debug` 구현은 민감 정보를 마스킹합니다 (`api_secret`은
/// `SecretString`이 자체적으로 가리고, `api_key`는 앞뒤 일부만 노출).
#[derive(Deserialize)]
pub struct ExchangeSettings {
    /// API 키
    #[serde(default)]
    pub api_key: String,
    /// API 시크릿
    #[serde(default = "default_secret")]
    pub api_secret: SecretString,
    /// 테스트넷 사용
    #[serde(default)]
    pub testnet: bool,
    /// 드라이런 모드 (주문을 네트워크에 보내지 않음)
    #[serde(default)]
    pub dry_run: bool,
    /// 연결 타임아웃 (초)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 요청 타임아웃 (초)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 수신 윈도우 (밀리초)
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
}

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_recv_window() -> u64 {
    5000
}

impl Clone for ExchangeSettings {
    fn clone(&self) -> Self {
        Self {
            api_key: self.api_key.clone(),
            // 시크릿 사본은 명시적 재포장으로만 생성
            api_secret: SecretString::from(self.api_secret.expose_secret().to_owned()),
            testnet: self.testnet,
            dry_run: self.dry_run,
            connect_timeout_secs: self.connect_timeout_secs,
            request_timeout_secs: self.request_timeout_secs,
            recv_window_ms: self.recv_window_ms,
        }
    }
}

impl std::fmt::Debug for ExchangeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let masked_key = if self.api_key.len() > 8 {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        } else {
            "***REDACTED***".to_string()
        };

        f.debug_struct("ExchangeSettings")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .field("testnet", &self.testnet)
            .field("dry_run", &self.dry_run)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("recv_window_ms", &self.recv_window_ms)
            .finish()
    }
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: default_secret(),
            testnet: false,
            dry_run: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            recv_window_ms: default_recv_window(),
        }
    }
}

/// 거래 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSettings {
    /// 거래 심볼 목록
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// 레버리지 배수
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// 마진 모드 ("CROSSED" 또는 "ISOLATED")
    #[serde(default = "default_margin_mode")]
    pub margin_mode: String,
    /// 테이커 수수료율 (예: 0.04%의 경우 0.0004)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}
fn default_leverage() -> u32 {
    20
}
fn default_margin_mode() -> String {
    "CROSSED".to_string()
}
fn default_fee_rate() -> Decimal {
    Decimal::new(4, 4) // 0.0004
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            leverage: default_leverage(),
            margin_mode: default_margin_mode(),
            fee_rate: default_fee_rate(),
        }
    }
}

/// 복원력 파이프라인 설정.
///
/// 거래소별 요청 한도에 맞춘 값입니다. 거래소 한도가 분당 2400이므로
/// 초당 20은 절반 수준의 안전 버퍼입니다.
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceSettings {
    /// 최대 시도 횟수 (최초 시도 포함)
    #[serde(default = "default_max_attempts")]
    pub retry_max_attempts: u32,
    /// 재시도 기본 대기 시간 (밀리초)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 재시도 대기 시간 배수
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: f64,
    /// Circuit breaker 슬라이딩 윈도우 크기 (최근 호출 수)
    #[serde(default = "default_breaker_window")]
    pub breaker_window_size: usize,
    /// Circuit을 여는 실패 비율 임계치 (0.0 ~ 1.0)
    #[serde(default = "default_breaker_failure_ratio")]
    pub breaker_failure_ratio: f64,
    /// Open 상태 유지 시간 (밀리초)
    #[serde(default = "default_breaker_open_ms")]
    pub breaker_open_ms: u64,
    /// 기간당 허용 요청 수
    #[serde(default = "default_rate_limit_permits")]
    pub rate_limit_permits: u32,
    /// 요청 한도 갱신 주기 (밀리초)
    #[serde(default = "default_rate_limit_period_ms")]
    pub rate_limit_period_ms: u64,
    /// 허가 대기 타임아웃 (밀리초)
    #[serde(default = "default_rate_limit_timeout_ms")]
    pub rate_limit_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_retry_multiplier() -> f64 {
    2.0
}
fn default_breaker_window() -> usize {
    10
}
fn default_breaker_failure_ratio() -> f64 {
    0.5
}
fn default_breaker_open_ms() -> u64 {
    60_000
}
fn default_rate_limit_permits() -> u32 {
    20
}
fn default_rate_limit_period_ms() -> u64 {
    1000
}
fn default_rate_limit_timeout_ms() -> u64 {
    5000
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            retry_max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_multiplier: default_retry_multiplier(),
            breaker_window_size: default_breaker_window(),
            breaker_failure_ratio: default_breaker_failure_ratio(),
            breaker_open_ms: default_breaker_open_ms(),
            rate_limit_permits: default_rate_limit_permits(),
            rate_limit_period_ms: default_rate_limit_period_ms(),
            rate_limit_timeout_ms: default_rate_limit_timeout_ms(),
        }
    }
}

/// 스트림 캐시 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSettings {
    /// 심볼당 보관할 최대 캔들 수
    #[serde(default = "default_kline_capacity")]
    pub kline_cache_capacity: usize,
    /// listen key 갱신 주기 (초)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    /// 재연결 전 대기 시간 (초)
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_kline_capacity() -> usize {
    100
}
fn default_keepalive_secs() -> u64 {
    30 * 60
}
fn default_reconnect_delay_secs() -> u64 {
    5
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            kline_cache_capacity: default_kline_capacity(),
            keepalive_interval_secs: default_keepalive_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl GatewayConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수는 `GATEWAY__` 접두사와 `__` 구분자를 사용합니다
    /// (예: `GATEWAY__EXCHANGE__API_KEY`).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 환경 변수만으로 설정을 로드합니다 (파일 없이).
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("GATEWAY")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.resilience.retry_max_attempts, 4);
        assert_eq!(config.resilience.rate_limit_permits, 20);
        assert_eq!(config.resilience.breaker_window_size, 10);
        assert_eq!(config.stream.kline_cache_capacity, 100);
        assert_eq!(config.trading.fee_rate, dec!(0.0004));
        assert!(!config.exchange.dry_run);
    }

    #[test]
    fn test_keepalive_default_thirty_minutes() {
        let config = StreamSettings::default();
        assert_eq!(config.keepalive_interval_secs, 1800);
    }
}
