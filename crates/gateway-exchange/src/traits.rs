//! 선물 거래소 계약 trait.
//!
//! 실거래 REST 게이트웨이와 인메모리 시뮬레이션 게이트웨이가 동일하게
//! 구현하는 단일 행동 계약입니다. 전략 코드는 이 trait에만 의존하며,
//! 백엔드 선택은 구성 시점에 한 번 이루어집니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use gateway_core::{AccountSnapshot, CloseResult, Kline, OrderFill, Position, Side, Timeframe};

use crate::GatewayError;

/// 게이트웨이 작업을 위한 Result 타입.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// 통합 선물 거래소 인터페이스.
///
/// 읽기 작업은 구현체에서 안전한 기본값으로 저하될 수 있지만 (0 스냅샷,
/// 빈 포지션 목록, 0.0 마크 가격), 쓰기 작업(주문)은 실패를 그대로
/// 전파합니다. 호출자는 0 마크 가격을 "알 수 없음"으로 취급해야 하며
/// 실제 가격으로 사용해서는 안 됩니다.
#[async_trait]
pub trait FuturesExchange: Send + Sync {
    /// 게이트웨이 이름을 반환합니다.
    fn name(&self) -> &str;

    // === 계좌 작업 ===

    /// 계좌 스냅샷을 조회합니다.
    async fn account_snapshot(&self) -> GatewayResult<AccountSnapshot>;

    /// 현재 포지션을 조회합니다 (수량이 0이 아닌 것만).
    async fn positions(&self, symbol: Option<&str>) -> GatewayResult<Vec<Position>>;

    // === 시장 데이터 ===

    /// 최근 캔들스틱을 조회합니다.
    async fn klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> GatewayResult<Vec<Kline>>;

    /// 시간 범위를 지정해 캔들스틱을 조회합니다 (과거 데이터 페이징용).
    async fn klines_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<Kline>>;

    /// 심볼의 마크 가격을 조회합니다.
    async fn mark_price(&self, symbol: &str) -> GatewayResult<Decimal>;

    // === 주문 작업 ===

    /// 시장가 주문을 제출합니다.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> GatewayResult<OrderFill>;

    /// 주문을 취소합니다.
    ///
    /// 시장가 주문은 즉시 체결되므로 이미 체결된 주문의 취소는
    /// `OrderRejected`로 실패합니다.
    async fn cancel_order(&self, symbol: &str, order_id: u64) -> GatewayResult<()>;

    /// 심볼의 포지션을 전량 청산합니다.
    ///
    /// 포지션 방향의 반대로 reduce-only 주문을 제출합니다. 열린
    /// 포지션이 없으면 에러가 아니라 `CloseResult::NoOpenPosition`을
    /// 반환합니다.
    async fn close_position(&self, symbol: &str) -> GatewayResult<CloseResult>;

    /// 심볼의 포지션을 부분 청산합니다.
    ///
    /// `fraction >= 1.0`이면 전량 청산과 동일하게 동작합니다. 수량은
    /// 심볼의 수량 정밀도로 내림되며, 내림 후 0이 되면 0 수량 주문을
    /// 보내는 대신 `QuantityTooSmall`로 실패합니다.
    async fn close_position_partial(
        &self,
        symbol: &str,
        fraction: Decimal,
    ) -> GatewayResult<CloseResult>;

    // === 심볼 설정 ===

    /// 심볼의 레버리지를 설정합니다.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> GatewayResult<()>;

    /// 심볼의 마진 모드를 설정합니다 ("CROSSED" 또는 "ISOLATED").
    async fn set_margin_mode(&self, symbol: &str, margin_mode: &str) -> GatewayResult<()>;

    /// 심볼의 수량 정밀도(소수 자릿수)를 반환합니다.
    ///
    /// 알 수 없는 심볼은 보수적인 기본값을 받습니다.
    async fn quantity_precision(&self, symbol: &str) -> u32;
}
