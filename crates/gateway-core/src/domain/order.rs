//! 주문 타입 및 기록.
//!
//! 이 모듈은 게이트웨이의 주문 관련 타입을 정의합니다:
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderStatus` - 거래소가 보고하는 주문 상태
//! - `OrderFill` - 주문 제출 결과
//! - `OrderRecord` - 추가 전용 주문 로그 항목
//! - `CloseResult` - 포지션 청산 결과

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// 거래소 API 문자열 표현을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 거래소가 보고하는 주문 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// 거래소에 접수됨
    New,
    /// 부분 체결됨
    PartiallyFilled,
    /// 전량 체결됨
    Filled,
    /// 취소됨
    Cancelled,
    /// 거부됨
    Rejected,
    /// 만료됨
    Expired,
}

impl OrderStatus {
    /// 주문이 최종 상태인지 확인합니다.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// 거래소 상태 문자열에서 파싱합니다.
    pub fn from_exchange(s: &str) -> Self {
        match s {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::New,
        }
    }
}

/// 주문 제출 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    /// 거래소 주문 ID (시뮬레이션에서는 게이트웨이 로컬 단조 증가 ID)
    pub order_id: u64,
    /// 거래 심볼
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 체결 수량
    pub quantity: Decimal,
    /// 평균 체결 가격
    pub avg_price: Decimal,
    /// 주문 상태
    pub status: OrderStatus,
    /// 체결 타임스탬프
    pub timestamp: DateTime<Utc>,
}

/// 추가 전용 주문 로그 항목.
///
/// 감사 및 거래 이력 파생에 사용됩니다. 한 번 기록되면 변경되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    /// 주문 ID (단조 증가)
    pub order_id: u64,
    /// 거래 심볼
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 주문 수량
    pub quantity: Decimal,
    /// 체결 가격
    pub price: Decimal,
    /// 타임스탬프
    pub timestamp: DateTime<Utc>,
}

/// 포지션 청산 결과.
///
/// 열린 포지션이 없는 경우는 에러가 아니라 보고 대상입니다.
#[derive(Debug, Clone)]
pub enum CloseResult {
    /// 청산 주문이 제출됨
    Closed(OrderFill),
    /// 청산할 포지션 없음
    NoOpenPosition,
}

impl CloseResult {
    /// 청산 체결 결과를 반환합니다 (포지션이 없으면 None).
    pub fn fill(&self) -> Option<&OrderFill> {
        match self {
            CloseResult::Closed(fill) => Some(fill),
            CloseResult::NoOpenPosition => None,
        }
    }
}
