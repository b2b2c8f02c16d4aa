//! 완결된 거래 기록.
//!
//! `TradeEntry`는 하나의 (부분) 왕복 거래를 나타냅니다. 청산 또는 부분
//! 청산 시점에만 생성되며, 열린 포지션은 여기에 나타나지 않습니다.

use crate::domain::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 완결된 (부분) 왕복 거래.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEntry {
    /// 거래 심볼
    pub symbol: String,
    /// 진입 방향
    pub side: Side,
    /// 진입 시각
    pub entry_time: DateTime<Utc>,
    /// 진입 가격
    pub entry_price: Decimal,
    /// 청산된 수량
    pub quantity: Decimal,
    /// 청산 시각
    pub exit_time: DateTime<Utc>,
    /// 청산 가격
    pub exit_price: Decimal,
    /// 실현 손익 (청산 수수료 차감 후)
    pub pnl: Decimal,
    /// 수익률(%)
    pub pnl_pct: Decimal,
    /// 청산 수수료
    pub commission: Decimal,
    /// 청산 사유
    pub exit_reason: String,
}

impl TradeEntry {
    /// 수익 거래인지 확인합니다.
    pub fn is_win(&self) -> bool {
        self.pnl > Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_trade_entry_win() {
        let trade = TradeEntry {
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            entry_time: Utc::now(),
            entry_price: dec!(100),
            quantity: dec!(1),
            exit_time: Utc::now(),
            exit_price: dec!(110),
            pnl: dec!(9.89),
            pnl_pct: dec!(9.89),
            commission: dec!(0.11),
            exit_reason: "close".to_string(),
        };
        assert!(trade.is_win());
    }
}
