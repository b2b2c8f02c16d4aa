//! 선물 포지션 추적.
//!
//! 포지션은 (심볼, 포지션 모드) 키당 정확히 하나 존재하며, 수량이 0인
//! 포지션은 저장되지 않습니다 (제거되며, 0으로 만들지 않습니다).

use crate::domain::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 헤지 모드 포지션 구분.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    /// 단방향 모드
    Both,
    /// 헤지 모드 롱
    Long,
    /// 헤지 모드 숏
    Short,
}

impl PositionSide {
    /// 거래소 API 문자열 표현을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Both => "BOTH",
            PositionSide::Long => "LONG",
            PositionSide::Short => "SHORT",
        }
    }

    /// 거래소 문자열에서 파싱합니다.
    pub fn from_exchange(s: &str) -> Self {
        match s {
            "LONG" => PositionSide::Long,
            "SHORT" => PositionSide::Short,
            _ => PositionSide::Both,
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 선물 포지션.
///
/// `quantity`는 부호를 가집니다: 양수 = 롱, 음수 = 숏.
/// 진입 가격은 오픈 시점에 고정되며 전량 청산 후 재진입으로만 교체됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 거래 심볼
    pub symbol: String,
    /// 부호 있는 수량 (양수 = 롱, 음수 = 숏)
    pub quantity: Decimal,
    /// 진입 가격
    pub entry_price: Decimal,
    /// 포지션 모드 구분
    pub position_side: PositionSide,
    /// 미실현 손익
    pub unrealized_pnl: Decimal,
    /// 포지션 오픈 타임스탬프
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// 새 포지션을 생성합니다.
    pub fn new(
        symbol: impl Into<String>,
        quantity: Decimal,
        entry_price: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            entry_price,
            position_side: PositionSide::Both,
            unrealized_pnl: Decimal::ZERO,
            opened_at,
        }
    }

    /// 롱 포지션인지 확인합니다.
    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// 숏 포지션인지 확인합니다.
    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    /// 포지션 방향을 반환합니다.
    pub fn side(&self) -> Side {
        if self.is_short() {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    /// 포지션을 완전히 청산하는 주문의 방향을 반환합니다.
    pub fn closing_side(&self) -> Side {
        self.side().opposite()
    }

    /// 수량의 절대값을 반환합니다.
    pub fn abs_quantity(&self) -> Decimal {
        self.quantity.abs()
    }

    /// 진입 시점의 명목 가치를 반환합니다.
    pub fn notional_value(&self) -> Decimal {
        self.entry_price * self.abs_quantity()
    }

    /// 지정한 마크 가격 기준 미실현 손익을 계산합니다.
    pub fn unrealized_pnl_at(&self, mark_price: Decimal) -> Decimal {
        (mark_price - self.entry_price) * self.quantity
    }
}
