//! 시장 데이터 타입.

use crate::timeframe::Timeframe;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV 캔들스틱 데이터.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    /// 거래 심볼
    pub symbol: String,
    /// 타임프레임
    pub timeframe: Timeframe,
    /// 캔들 시작 시간
    pub open_time: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량 (기준 자산 단위)
    pub volume: Decimal,
    /// 캔들 종료 시간
    pub close_time: DateTime<Utc>,
    /// 거래대금 (호가 자산 단위)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_volume: Option<Decimal>,
    /// 체결 건수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_trades: Option<u32>,
}

impl Kline {
    /// 캔들 몸통 크기(절대값)를 반환합니다.
    pub fn body_size(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    /// 캔들 범위(고가 - 저가)를 반환합니다.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// 음봉(종가 < 시가)인지 확인합니다.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kline_shape() {
        let now = Utc::now();
        let kline = Kline {
            symbol: "BTCUSDT".to_string(),
            timeframe: Timeframe::M1,
            open_time: now,
            open: dec!(50000),
            high: dec!(51000),
            low: dec!(49500),
            close: dec!(50500),
            volume: dec!(100),
            close_time: now,
            quote_volume: None,
            num_trades: None,
        };

        assert!(kline.is_bullish());
        assert_eq!(kline.body_size(), dec!(500));
        assert_eq!(kline.range(), dec!(1500));
    }
}
