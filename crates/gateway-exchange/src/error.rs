//! 게이트웨이 에러 타입.

use thiserror::Error;

/// 게이트웨이 관련 에러.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 거래소 연결 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 거래소 요청 한도 초과 (429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// WebSocket 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 타임스탬프 동기화 에러
    #[error("Timestamp error: {0}")]
    TimestampError(String),

    /// 거래소 API 에러 코드
    #[error("API error {code}: {message}")]
    ApiError { code: i32, message: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 유효하지 않은 수량
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// 정밀도 반올림 후 수량이 0이 됨
    #[error("Quantity too small after rounding: {0}")]
    QuantityTooSmall(String),

    /// 증거금 부족
    #[error("Insufficient margin: {0}")]
    InsufficientMargin(String),

    /// 주문 거부됨
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// 심볼을 찾을 수 없음
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 가격 데이터 없음 (시뮬레이션 콜드 스타트 포함)
    #[error("No price data for {0}")]
    PriceUnavailable(String),

    /// 캐시/스냅샷 데이터가 아직 준비되지 않음
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// Circuit breaker가 열려 있어 즉시 거부됨 (네트워크 시도 없음)
    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    /// 로컬 요청 한도 초과로 허가 획득 실패
    #[error("Rate limiter '{0}' acquire timed out")]
    Throttled(String),

    /// 알 수 없는 에러
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GatewayError {
    /// 재시도 가능한 에러인지 확인.
    ///
    /// 검증 실패, 증거금 부족 등은 재시도해도 결과가 달라지지 않으므로
    /// 즉시 전파됩니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_)
                | GatewayError::Disconnected(_)
                | GatewayError::RateLimited
                | GatewayError::Timeout(_)
                | GatewayError::WebSocket(_)
                | GatewayError::TimestampError(_)
        )
    }

    /// 재시도하면 안 되는 치명적 에러인지 확인.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::Unauthorized(_)
                | GatewayError::InsufficientMargin(_)
                | GatewayError::InvalidQuantity(_)
                | GatewayError::OrderRejected(_)
        )
    }

    /// 복원력 계층에서 발생한 거부인지 확인 (거래소 에러와 구분).
    pub fn is_resilience_rejection(&self) -> bool {
        matches!(
            self,
            GatewayError::CircuitOpen(_) | GatewayError::Throttled(_)
        )
    }

    /// 거래소 에러 코드를 GatewayError로 매핑.
    pub fn from_exchange_code(code: i32, msg: &str) -> Self {
        match code {
            -1001 => GatewayError::Disconnected(msg.to_string()),
            -1002 | -2015 => GatewayError::Unauthorized(msg.to_string()),
            -1003 => GatewayError::RateLimited,
            -1013 | -4164 => GatewayError::InvalidQuantity(msg.to_string()),
            -1021 => GatewayError::TimestampError(msg.to_string()),
            -2010 | -2019 => GatewayError::InsufficientMargin(msg.to_string()),
            -2011 | -2013 => GatewayError::OrderRejected(msg.to_string()),
            500..=599 => GatewayError::Network(format!("HTTP {}: {}", code, msg)),
            _ => GatewayError::ApiError {
                code,
                message: msg.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_connect() {
            GatewayError::Network(err.to_string())
        } else {
            GatewayError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::Network("reset".into()).is_retryable());
        assert!(GatewayError::RateLimited.is_retryable());
        assert!(GatewayError::Timeout("read".into()).is_retryable());
        assert!(GatewayError::TimestampError("ahead".into()).is_retryable());

        assert!(!GatewayError::InsufficientMargin("need more".into()).is_retryable());
        assert!(!GatewayError::InvalidQuantity("precision".into()).is_retryable());
        assert!(!GatewayError::CircuitOpen("api".into()).is_retryable());
    }

    #[test]
    fn test_resilience_rejection_distinct_from_exchange_errors() {
        assert!(GatewayError::CircuitOpen("api".into()).is_resilience_rejection());
        assert!(GatewayError::Throttled("api".into()).is_resilience_rejection());
        assert!(!GatewayError::RateLimited.is_resilience_rejection());
    }

    #[test]
    fn test_exchange_code_mapping() {
        assert!(matches!(
            GatewayError::from_exchange_code(-1003, "banned"),
            GatewayError::RateLimited
        ));
        assert!(matches!(
            GatewayError::from_exchange_code(-1021, "ts"),
            GatewayError::TimestampError(_)
        ));
        assert!(matches!(
            GatewayError::from_exchange_code(-2019, "margin"),
            GatewayError::InsufficientMargin(_)
        ));
        assert!(matches!(
            GatewayError::from_exchange_code(503, "unavailable"),
            GatewayError::Network(_)
        ));
        assert!(matches!(
            GatewayError::from_exchange_code(-9999, "other"),
            GatewayError::ApiError { code: -9999, .. }
        ));
    }
}
