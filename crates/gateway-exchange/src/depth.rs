//! 호가창 심도 모델.
//!
//! 심볼별 양방향 가격 사다리를 유지하며 다음을 계산합니다:
//! - 상위 N 레벨의 물량 불균형 (−1.0 ~ +1.0)
//! - 비정상적 유동성 집중 (벽) 탐지
//! - 가상 시장가 주문의 예상 슬리피지
//!
//! 과거 심도는 보관하지 않고 현재 사다리만 유지합니다. 수량 0 갱신은
//! 해당 가격 레벨을 제거하고, 0이 아닌 수량은 upsert합니다.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, error};

use gateway_core::Side;

/// 벽 탐지 시 표본으로 삼는 상위 레벨 수.
const WALL_SAMPLE_LEVELS: usize = 20;

/// 벽 탐지에 필요한 최소 레벨 수.
const WALL_MIN_LEVELS: usize = 5;

/// 호가가 주문을 흡수하지 못할 때의 슬리피지 센티널 (거래 금지 신호).
const MAX_SLIPPAGE: f64 = 1.0;

/// 단일 심볼의 실시간 호가창.
#[derive(Debug)]
pub struct DepthBook {
    symbol: String,
    /// 매수 호가: 가격 오름차순 저장, 조회 시 역순(최고가 우선)
    bids: BTreeMap<Decimal, Decimal>,
    /// 매도 호가: 가격 오름차순 (최저가 우선)
    asks: BTreeMap<Decimal, Decimal>,
    last_update: DateTime<Utc>,
}

impl DepthBook {
    /// 새 호가창을 생성합니다.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            last_update: Utc::now(),
        }
    }

    /// 심볼을 반환합니다.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// 마지막 갱신 시각을 반환합니다.
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// 매수 호가 레벨을 갱신합니다. 수량 0은 레벨 제거.
    pub fn update_bid(&mut self, price: Decimal, quantity: Decimal) {
        if quantity.is_zero() {
            self.bids.remove(&price);
        } else {
            self.bids.insert(price, quantity);
        }
        self.last_update = Utc::now();
    }

    /// 매도 호가 레벨을 갱신합니다. 수량 0은 레벨 제거.
    pub fn update_ask(&mut self, price: Decimal, quantity: Decimal) {
        if quantity.is_zero() {
            self.asks.remove(&price);
        } else {
            self.asks.insert(price, quantity);
        }
        self.last_update = Utc::now();
    }

    /// 최우선 매수 호가 (최고가).
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.keys().next_back().copied()
    }

    /// 최우선 매도 호가 (최저가).
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.keys().next().copied()
    }

    /// 스프레드 (최우선 매도 − 최우선 매수).
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// 매수 호가 레벨 수.
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// 매도 호가 레벨 수.
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// 모든 레벨을 제거합니다.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// 상위 N 레벨의 총 매수 물량.
    pub fn total_bid_volume(&self, levels: usize) -> Decimal {
        self.bids.values().rev().take(levels).sum()
    }

    /// 상위 N 레벨의 총 매도 물량.
    pub fn total_ask_volume(&self, levels: usize) -> Decimal {
        self.asks.values().take(levels).sum()
    }

    /// 상위 N 레벨의 물량 불균형을 계산합니다.
    ///
    /// `(bidVolume − askVolume) / (bidVolume + askVolume)`이며 항상
    /// [−1.0, 1.0] 범위입니다. 양쪽이 모두 비어 있으면 0.0입니다.
    pub fn imbalance(&self, levels: usize) -> f64 {
        let total_bids = self.total_bid_volume(levels);
        let total_asks = self.total_ask_volume(levels);
        let sum = total_bids + total_asks;

        if sum.is_zero() {
            return 0.0;
        }

        ((total_bids - total_asks) / sum).to_f64().unwrap_or(0.0)
    }

    /// 매수 벽을 탐지합니다.
    ///
    /// 상위 20 레벨 수량의 평균과 모집단 표준편차를 구해, 가격 순서상
    /// 처음으로 `mean + k·σ`를 넘는 레벨의 가격을 반환합니다. 레벨이
    /// 5개 미만이면 None입니다.
    pub fn detect_buy_wall(&self, std_dev_multiplier: f64) -> Option<Decimal> {
        Self::detect_wall(self.bids.iter().rev(), self.bids.len(), std_dev_multiplier)
    }

    /// 매도 벽을 탐지합니다.
    pub fn detect_sell_wall(&self, std_dev_multiplier: f64) -> Option<Decimal> {
        Self::detect_wall(self.asks.iter(), self.asks.len(), std_dev_multiplier)
    }

    fn detect_wall<'a, I>(levels: I, level_count: usize, std_dev_multiplier: f64) -> Option<Decimal>
    where
        I: Iterator<Item = (&'a Decimal, &'a Decimal)> + Clone,
    {
        if level_count < WALL_MIN_LEVELS {
            return None;
        }

        let volumes: Vec<f64> = levels
            .clone()
            .take(WALL_SAMPLE_LEVELS)
            .map(|(_, qty)| qty.to_f64().unwrap_or(0.0))
            .collect();

        let mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
        let variance =
            volumes.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / volumes.len() as f64;
        let threshold = mean + std_dev_multiplier * variance.sqrt();

        levels
            .into_iter()
            .find(|(_, qty)| qty.to_f64().unwrap_or(0.0) > threshold)
            .map(|(price, _)| *price)
    }

    /// 명목 가치 `notional`의 가상 시장가 주문에 대한 슬리피지를
    /// 추정합니다.
    ///
    /// 반대편 호가를 최우선 가격부터 바깥으로 소비하며 평균 체결가를
    /// 구하고 `|avgFill − reference| / reference`를 반환합니다. 호가가
    /// 주문을 흡수하지 못하면 1.0 센티널을 반환합니다 (해당 크기로
    /// 거래 금지 신호).
    pub fn estimate_slippage(
        &self,
        side: Side,
        notional: Decimal,
        reference_price: Decimal,
    ) -> f64 {
        if reference_price <= Decimal::ZERO || notional <= Decimal::ZERO {
            return 0.0;
        }

        let mut remaining = notional;
        let mut total_base_qty = Decimal::ZERO;

        let mut consume = |price: Decimal, qty: Decimal| -> bool {
            let available = qty * price;
            if remaining <= available {
                total_base_qty += remaining / price;
                remaining = Decimal::ZERO;
                true
            } else {
                total_base_qty += qty;
                remaining -= available;
                false
            }
        };

        // 매수는 매도 호가를, 매도는 매수 호가를 소비
        match side {
            Side::Buy => {
                if self.asks.is_empty() {
                    return 0.0;
                }
                for (&price, &qty) in self.asks.iter() {
                    if consume(price, qty) {
                        break;
                    }
                }
            }
            Side::Sell => {
                if self.bids.is_empty() {
                    return 0.0;
                }
                for (&price, &qty) in self.bids.iter().rev() {
                    if consume(price, qty) {
                        break;
                    }
                }
            }
        }

        if remaining > Decimal::ZERO {
            return MAX_SLIPPAGE;
        }

        let avg_price = notional / total_base_qty;
        ((avg_price - reference_price).abs() / reference_price)
            .to_f64()
            .unwrap_or(MAX_SLIPPAGE)
    }
}

// ============================================================================
// 심볼별 호가창 레지스트리
// ============================================================================

/// 결합 심도 스트림 이벤트.
#[derive(Debug, Deserialize)]
struct WsDepthUpdate {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "b", default)]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a", default)]
    asks: Vec<[String; 2]>,
}

/// 심볼별 호가창 레지스트리.
///
/// 스트림 콜백(쓰기)과 전략 태스크(읽기)가 동시에 사용하므로 내부
/// 잠금으로 보호됩니다.
#[derive(Default)]
pub struct DepthTracker {
    books: RwLock<HashMap<String, DepthBook>>,
}

impl DepthTracker {
    /// 새 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 매수 호가 레벨을 갱신합니다.
    pub fn update_bid(&self, symbol: &str, price: Decimal, quantity: Decimal) {
        let mut books = self.books.write().unwrap();
        books
            .entry(symbol.to_string())
            .or_insert_with(|| DepthBook::new(symbol))
            .update_bid(price, quantity);
    }

    /// 매도 호가 레벨을 갱신합니다.
    pub fn update_ask(&self, symbol: &str, price: Decimal, quantity: Decimal) {
        let mut books = self.books.write().unwrap();
        books
            .entry(symbol.to_string())
            .or_insert_with(|| DepthBook::new(symbol))
            .update_ask(price, quantity);
    }

    /// 심볼의 호가창에 읽기 접근합니다.
    pub fn with_book<R>(&self, symbol: &str, f: impl FnOnce(&DepthBook) -> R) -> Option<R> {
        let books = self.books.read().unwrap();
        books.get(symbol).map(f)
    }

    /// 심볼의 물량 불균형을 계산합니다 (호가창이 없으면 0.0).
    pub fn imbalance(&self, symbol: &str, levels: usize) -> f64 {
        self.with_book(symbol, |book| book.imbalance(levels))
            .unwrap_or(0.0)
    }

    /// 심볼의 예상 슬리피지를 계산합니다 (호가창이 없으면 센티널).
    pub fn estimate_slippage(
        &self,
        symbol: &str,
        side: Side,
        notional: Decimal,
        reference_price: Decimal,
    ) -> f64 {
        self.with_book(symbol, |book| {
            book.estimate_slippage(side, notional, reference_price)
        })
        .unwrap_or(MAX_SLIPPAGE)
    }

    /// 심볼의 호가창을 비웁니다.
    pub fn clear(&self, symbol: &str) {
        if let Some(book) = self.books.write().unwrap().get_mut(symbol) {
            book.clear();
        }
    }

    /// 심도 스트림 프레임을 적용합니다 (결합 스트림 래퍼 지원).
    pub fn apply_frame(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "Failed to parse depth frame");
                return;
            }
        };

        let data = value.get("data").cloned().unwrap_or(value);
        if data.get("e").and_then(|e| e.as_str()) != Some("depthUpdate") {
            return;
        }

        match serde_json::from_value::<WsDepthUpdate>(data) {
            Ok(update) => {
                let mut books = self.books.write().unwrap();
                let book = books
                    .entry(update.symbol.clone())
                    .or_insert_with(|| DepthBook::new(&update.symbol));

                for [price, qty] in &update.bids {
                    let price: Decimal = price.parse().unwrap_or(Decimal::ZERO);
                    let qty: Decimal = qty.parse().unwrap_or(Decimal::ZERO);
                    book.update_bid(price, qty);
                }
                for [price, qty] in &update.asks {
                    let price: Decimal = price.parse().unwrap_or(Decimal::ZERO);
                    let qty: Decimal = qty.parse().unwrap_or(Decimal::ZERO);
                    book.update_ask(price, qty);
                }
                debug!(symbol = %update.symbol, "Depth update applied");
            }
            Err(e) => error!(error = %e, "Failed to decode depthUpdate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_zero_quantity_removes_level_and_readd_restores() {
        let mut book = DepthBook::new("BTCUSDT");

        book.update_bid(dec!(100), dec!(5));
        assert_eq!(book.best_bid(), Some(dec!(100)));

        book.update_bid(dec!(100), dec!(0));
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.bid_levels(), 0);

        book.update_bid(dec!(100), dec!(3));
        assert_eq!(book.best_bid(), Some(dec!(100)));
        assert_eq!(book.total_bid_volume(1), dec!(3));
    }

    #[test]
    fn test_best_prices_and_spread() {
        let mut book = DepthBook::new("BTCUSDT");
        book.update_bid(dec!(99), dec!(1));
        book.update_bid(dec!(100), dec!(1));
        book.update_ask(dec!(101), dec!(1));
        book.update_ask(dec!(102), dec!(1));

        assert_eq!(book.best_bid(), Some(dec!(100)));
        assert_eq!(book.best_ask(), Some(dec!(101)));
        assert_eq!(book.spread(), Some(dec!(1)));
    }

    #[test]
    fn test_imbalance_empty_book_is_zero() {
        let book = DepthBook::new("BTCUSDT");
        assert_eq!(book.imbalance(10), 0.0);
    }

    #[test]
    fn test_imbalance_one_sided() {
        let mut book = DepthBook::new("BTCUSDT");
        book.update_bid(dec!(100), dec!(5));
        assert!((book.imbalance(10) - 1.0).abs() < f64::EPSILON);

        book.clear();
        book.update_ask(dec!(101), dec!(5));
        assert!((book.imbalance(10) + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wall_detection_requires_five_levels() {
        let mut book = DepthBook::new("BTCUSDT");
        for i in 0..4 {
            book.update_bid(dec!(100) - Decimal::from(i), dec!(1000));
        }
        assert_eq!(book.detect_buy_wall(2.0), None);
    }

    #[test]
    fn test_wall_detection_finds_outlier_level() {
        let mut book = DepthBook::new("BTCUSDT");
        // 균일한 레벨들 사이에 하나의 거대한 벽
        for i in 0..10 {
            book.update_bid(dec!(100) - Decimal::from(i), dec!(10));
        }
        book.update_bid(dec!(95), dec!(500));

        assert_eq!(book.detect_buy_wall(2.0), Some(dec!(95)));
    }

    #[test]
    fn test_uniform_book_has_no_wall() {
        let mut book = DepthBook::new("BTCUSDT");
        for i in 0..10 {
            book.update_ask(dec!(100) + Decimal::from(i), dec!(10));
        }
        assert_eq!(book.detect_sell_wall(2.0), None);
    }

    #[test]
    fn test_slippage_walks_opposing_book() {
        let mut book = DepthBook::new("BTCUSDT");
        book.update_ask(dec!(100), dec!(1)); // 100 USDT 물량
        book.update_ask(dec!(110), dec!(1)); // 110 USDT 물량

        // 150 USDT 매수: 100에서 1.0, 110에서 0.4545... 체결
        // 평균 체결가 = 150 / 1.4545... = 103.125
        let slippage = book.estimate_slippage(Side::Buy, dec!(150), dec!(100));
        assert!((slippage - 0.03125).abs() < 1e-9);
    }

    #[test]
    fn test_slippage_shallow_book_returns_sentinel() {
        let mut book = DepthBook::new("BTCUSDT");
        book.update_ask(dec!(100), dec!(1));

        let slippage = book.estimate_slippage(Side::Buy, dec!(1_000_000), dec!(100));
        assert_eq!(slippage, 1.0);
    }

    #[test]
    fn test_slippage_sell_side_uses_bids() {
        let mut book = DepthBook::new("BTCUSDT");
        book.update_bid(dec!(100), dec!(10));

        // 최우선 매수가에서 전량 체결되면 슬리피지 0
        let slippage = book.estimate_slippage(Side::Sell, dec!(500), dec!(100));
        assert!(slippage.abs() < 1e-12);
    }

    #[test]
    fn test_tracker_depth_frame_application() {
        let tracker = DepthTracker::new();
        tracker.apply_frame(
            r#"{"stream": "btcusdt@depth@100ms",
                "data": {"e": "depthUpdate", "s": "BTCUSDT",
                         "b": [["100.0", "5.0"], ["99.0", "3.0"]],
                         "a": [["101.0", "4.0"]]}}"#,
        );

        assert_eq!(
            tracker.with_book("BTCUSDT", |b| b.best_bid()).flatten(),
            Some(dec!(100.0))
        );

        // 수량 0 갱신으로 레벨 제거
        tracker.apply_frame(
            r#"{"e": "depthUpdate", "s": "BTCUSDT", "b": [["100.0", "0"]], "a": []}"#,
        );
        assert_eq!(
            tracker.with_book("BTCUSDT", |b| b.best_bid()).flatten(),
            Some(dec!(99.0))
        );
    }

    proptest! {
        /// 임의의 갱신 시퀀스에 대해 불균형은 항상 [-1, 1] 범위.
        #[test]
        fn prop_imbalance_always_bounded(
            updates in prop::collection::vec(
                (0u8..2, 1u32..10_000, 0u32..1_000),
                0..200,
            )
        ) {
            let mut book = DepthBook::new("TEST");
            for (side, price, qty) in updates {
                let price = Decimal::from(price);
                let qty = Decimal::from(qty);
                if side == 0 {
                    book.update_bid(price, qty);
                } else {
                    book.update_ask(price, qty);
                }
            }

            let imbalance = book.imbalance(10);
            prop_assert!((-1.0..=1.0).contains(&imbalance));
        }

        /// 수량 0 갱신 후 해당 레벨은 어느 쪽에도 존재하지 않음.
        #[test]
        fn prop_zero_update_removes_level(price in 1u32..10_000, qty in 1u32..1_000) {
            let mut book = DepthBook::new("TEST");
            let price = Decimal::from(price);

            book.update_bid(price, Decimal::from(qty));
            book.update_bid(price, Decimal::ZERO);
            prop_assert_eq!(book.bid_levels(), 0);

            book.update_ask(price, Decimal::from(qty));
            book.update_ask(price, Decimal::ZERO);
            prop_assert_eq!(book.ask_levels(), 0);
        }
    }
}
