//! 시뮬레이션 선물 거래소.
//!
//! 실거래 게이트웨이와 동일한 계약을 전부 메모리에서 동기적으로
//! 구현합니다. 백테스트 드라이버가 틱마다 현재 시각과 심볼별 현재
//! 가격을 명시적으로 설정하며, 시뮬레이터는 가격 결정에 실제 시계를
//! 절대 읽지 않습니다. 가격 데이터가 없는 작업은 조용히 0을 돌려주는
//! 대신 명시적으로 실패하므로, 백테스트가 잘못된 데이터 위에서
//! 진행되는 일을 감지할 수 있습니다.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use gateway_core::{
    AccountSnapshot, AssetBalance, CloseResult, Kline, OrderFill, OrderRecord, OrderStatus,
    Position, Side, Timeframe, TradeEntry,
};

use crate::traits::{FuturesExchange, GatewayResult};
use crate::GatewayError;

/// 시뮬레이션 기본 수량 정밀도 (심볼별 설정이 없을 때).
const DEFAULT_SIM_PRECISION: u32 = 3;

/// 시뮬레이션 거래소 설정.
#[derive(Debug, Clone)]
pub struct SimulatedConfig {
    /// 초기 가상 잔고 (USDT)
    pub initial_balance: Decimal,
    /// 거래 수수료율 (예: 0.04%의 경우 0.0004)
    pub fee_rate: Decimal,
    /// 시장가 주문 슬리피지율 (체결가를 불리한 방향으로 조정)
    pub slippage_rate: Decimal,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            fee_rate: dec!(0.0004),
            slippage_rate: Decimal::ZERO,
        }
    }
}

impl SimulatedConfig {
    /// 초기 잔고를 설정합니다.
    pub fn with_initial_balance(mut self, balance: Decimal) -> Self {
        self.initial_balance = balance;
        self
    }

    /// 수수료율을 설정합니다.
    pub fn with_fee_rate(mut self, rate: Decimal) -> Self {
        self.fee_rate = rate;
        self
    }

    /// 슬리피지율을 설정합니다.
    pub fn with_slippage_rate(mut self, rate: Decimal) -> Self {
        self.slippage_rate = rate;
        self
    }
}

/// 내부 시뮬레이션 상태.
struct SimState {
    /// 가상 잔고 - 수수료/손익 적용으로만 변경됨
    balance: Decimal,
    /// 심볼별 오픈 포지션 (수량 0인 포지션은 존재하지 않음)
    positions: HashMap<String, Position>,
    /// 드라이버가 설정한 심볼별 현재 가격
    prices: HashMap<String, Decimal>,
    /// 드라이버가 진행시키는 시뮬레이션 시각
    clock: DateTime<Utc>,
    /// 추가 전용 주문 로그
    order_history: Vec<OrderRecord>,
    /// 완결된 거래 기록
    trade_history: Vec<TradeEntry>,
    /// 드라이버가 로드한 심볼별 캔들 이력
    klines: HashMap<String, Vec<Kline>>,
    /// 심볼별 수량 정밀도
    precisions: HashMap<String, u32>,
    /// 설정 호출 기록 (레버리지)
    leverages: HashMap<String, u32>,
    /// 설정 호출 기록 (마진 모드)
    margin_modes: HashMap<String, String>,
    /// 다음 로컬 주문 ID (단조 증가)
    next_order_id: u64,
}

impl SimState {
    fn new(initial_balance: Decimal) -> Self {
        Self {
            balance: initial_balance,
            positions: HashMap::new(),
            prices: HashMap::new(),
            clock: DateTime::UNIX_EPOCH,
            order_history: Vec::new(),
            trade_history: Vec::new(),
            klines: HashMap::new(),
            precisions: HashMap::new(),
            leverages: HashMap::new(),
            margin_modes: HashMap::new(),
            next_order_id: 1,
        }
    }

    fn price(&self, symbol: &str) -> GatewayResult<Decimal> {
        self.prices
            .get(symbol)
            .copied()
            .ok_or_else(|| GatewayError::PriceUnavailable(symbol.to_string()))
    }

    fn next_order_id(&mut self) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }
}

/// 시뮬레이션 선물 거래소.
pub struct SimulatedFuturesExchange {
    config: SimulatedConfig,
    state: RwLock<SimState>,
}

impl SimulatedFuturesExchange {
    /// 새 시뮬레이션 거래소를 생성합니다.
    pub fn new(config: SimulatedConfig) -> Self {
        let state = SimState::new(config.initial_balance);
        Self {
            config,
            state: RwLock::new(state),
        }
    }

    // === 백테스트 드라이버 인터페이스 ===

    /// 심볼의 현재 가격을 설정합니다 (틱마다 호출).
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        let mut state = self.state.write().await;
        state.prices.insert(symbol.to_string(), price);
    }

    /// 시뮬레이션 시각을 설정합니다.
    pub async fn set_time(&self, time: DateTime<Utc>) {
        let mut state = self.state.write().await;
        state.clock = time;
    }

    /// 심볼의 캔들 이력을 로드합니다.
    pub async fn load_klines(&self, symbol: &str, klines: Vec<Kline>) {
        let mut state = self.state.write().await;
        state.klines.insert(symbol.to_string(), klines);
    }

    /// 심볼의 수량 정밀도를 설정합니다.
    pub async fn set_quantity_precision(&self, symbol: &str, precision: u32) {
        let mut state = self.state.write().await;
        state.precisions.insert(symbol.to_string(), precision);
    }

    /// 현재 가상 잔고를 반환합니다.
    pub async fn balance(&self) -> Decimal {
        self.state.read().await.balance
    }

    /// 주문 로그를 반환합니다.
    pub async fn order_history(&self) -> Vec<OrderRecord> {
        self.state.read().await.order_history.clone()
    }

    /// 완결된 거래 기록을 반환합니다.
    pub async fn trade_history(&self) -> Vec<TradeEntry> {
        self.state.read().await.trade_history.clone()
    }

    /// 설정된 레버리지를 반환합니다 (드라이버 검증용).
    pub async fn configured_leverage(&self, symbol: &str) -> Option<u32> {
        self.state.read().await.leverages.get(symbol).copied()
    }

    /// 설정된 마진 모드를 반환합니다 (드라이버 검증용).
    pub async fn configured_margin_mode(&self, symbol: &str) -> Option<String> {
        self.state.read().await.margin_modes.get(symbol).cloned()
    }

    /// 시뮬레이션 상태를 초기화합니다.
    pub async fn reset(&self, initial_balance: Decimal) {
        let mut state = self.state.write().await;
        *state = SimState::new(initial_balance);
        info!(%initial_balance, "Simulated exchange reset");
    }

    // === 내부 헬퍼 ===

    /// 슬리피지를 적용한 체결가를 계산합니다 (항상 불리한 방향).
    fn fill_price(&self, reference: Decimal, side: Side) -> Decimal {
        match side {
            Side::Buy => reference * (Decimal::ONE + self.config.slippage_rate),
            Side::Sell => reference * (Decimal::ONE - self.config.slippage_rate),
        }
    }

    /// 포지션 일부/전부를 청산하고 실현 손익을 잔고에 반영합니다.
    fn settle_close(
        state: &mut SimState,
        config: &SimulatedConfig,
        symbol: &str,
        entry_price: Decimal,
        entry_time: DateTime<Utc>,
        entry_side: Side,
        signed_quantity: Decimal,
        close_quantity: Decimal,
        exit_price: Decimal,
        exit_reason: &str,
    ) -> OrderFill {
        // 부호 있는 수량으로 방향 구분 없이 손익 계산:
        // 롱(+qty)은 가격 상승이 이익, 숏(-qty)은 하락이 이익
        let signed_closed = if signed_quantity > Decimal::ZERO {
            close_quantity
        } else {
            -close_quantity
        };
        let gross_pnl = (exit_price - entry_price) * signed_closed;
        let commission = close_quantity * exit_price * config.fee_rate;
        let pnl = gross_pnl - commission;

        state.balance += pnl;

        let entry_notional = entry_price * close_quantity;
        let pnl_pct = if entry_notional.is_zero() {
            Decimal::ZERO
        } else {
            (pnl / entry_notional) * dec!(100)
        };

        state.trade_history.push(TradeEntry {
            symbol: symbol.to_string(),
            side: entry_side,
            entry_time,
            entry_price,
            quantity: close_quantity,
            exit_time: state.clock,
            exit_price,
            pnl,
            pnl_pct,
            commission,
            exit_reason: exit_reason.to_string(),
        });

        let fill = OrderFill {
            order_id: state.next_order_id(),
            symbol: symbol.to_string(),
            side: entry_side.opposite(),
            quantity: close_quantity,
            avg_price: exit_price,
            status: OrderStatus::Filled,
            timestamp: state.clock,
        };

        debug!(
            symbol,
            %entry_price,
            %exit_price,
            %pnl,
            "Simulated close settled"
        );

        fill
    }
}

#[async_trait]
impl FuturesExchange for SimulatedFuturesExchange {
    fn name(&self) -> &str {
        "simulated-futures"
    }

    async fn account_snapshot(&self) -> GatewayResult<AccountSnapshot> {
        let state = self.state.read().await;

        // 마진 잔고 = 지갑 잔고 + 미실현 손익
        let unrealized: Decimal = state
            .positions
            .values()
            .map(|p| {
                state
                    .prices
                    .get(&p.symbol)
                    .map(|price| p.unrealized_pnl_at(*price))
                    .unwrap_or(Decimal::ZERO)
            })
            .sum();

        Ok(AccountSnapshot {
            wallet_balance: state.balance,
            margin_balance: state.balance + unrealized,
            available_balance: state.balance,
            assets: vec![AssetBalance {
                asset: "USDT".to_string(),
                wallet_balance: state.balance,
                available_balance: state.balance,
            }],
        })
    }

    async fn positions(&self, symbol: Option<&str>) -> GatewayResult<Vec<Position>> {
        let state = self.state.read().await;
        Ok(state
            .positions
            .values()
            .filter(|p| symbol.map_or(true, |s| p.symbol == s))
            .cloned()
            .collect())
    }

    async fn klines(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        limit: u32,
    ) -> GatewayResult<Vec<Kline>> {
        let state = self.state.read().await;
        let klines = state
            .klines
            .get(symbol)
            .ok_or_else(|| GatewayError::DataUnavailable(format!("no klines loaded for {}", symbol)))?;

        let skip = klines.len().saturating_sub(limit as usize);
        Ok(klines[skip..].to_vec())
    }

    async fn klines_range(
        &self,
        symbol: &str,
        _timeframe: Timeframe,
        limit: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<Kline>> {
        let state = self.state.read().await;
        let klines = state
            .klines
            .get(symbol)
            .ok_or_else(|| GatewayError::DataUnavailable(format!("no klines loaded for {}", symbol)))?;

        Ok(klines
            .iter()
            .filter(|k| k.open_time >= start && k.open_time <= end)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_price(&self, symbol: &str) -> GatewayResult<Decimal> {
        let state = self.state.read().await;
        state.price(symbol)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> GatewayResult<OrderFill> {
        if quantity <= Decimal::ZERO {
            return Err(GatewayError::InvalidQuantity(format!(
                "quantity must be positive, got {}",
                quantity
            )));
        }

        let mut state = self.state.write().await;
        let reference = state.price(symbol)?;
        let fill_price = self.fill_price(reference, side);

        // 수수료는 명목 가치 기준으로 잔고에서 차감
        let commission = quantity * fill_price * self.config.fee_rate;
        state.balance -= commission;

        // 첫 체결이 수명주기의 진입가를 정의 - 기존 포지션에는 평균을
        // 다시 내지 않으며 전량 청산 후에만 새로 열림
        if !state.positions.contains_key(symbol) {
            let signed_quantity = match side {
                Side::Buy => quantity,
                Side::Sell => -quantity,
            };
            let clock = state.clock;
            state.positions.insert(
                symbol.to_string(),
                Position::new(symbol, signed_quantity, fill_price, clock),
            );
        } else {
            warn!(
                symbol,
                "Market order into existing position; entry lifecycle unchanged"
            );
        }

        let order_id = state.next_order_id();
        let clock = state.clock;
        state.order_history.push(OrderRecord {
            order_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            price: fill_price,
            timestamp: clock,
        });

        debug!(symbol, %side, %quantity, %fill_price, %commission, "Simulated order filled");

        Ok(OrderFill {
            order_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            avg_price: fill_price,
            status: OrderStatus::Filled,
            timestamp: clock,
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> GatewayResult<()> {
        // 시뮬레이션의 시장가 주문은 즉시 체결되므로 취소할 것이 없음
        Err(GatewayError::OrderRejected(format!(
            "order {} already filled (simulated orders fill immediately)",
            order_id
        )))
    }

    async fn close_position(&self, symbol: &str) -> GatewayResult<CloseResult> {
        let mut state = self.state.write().await;

        if !state.positions.contains_key(symbol) {
            warn!(symbol, "No position to close");
            return Ok(CloseResult::NoOpenPosition);
        }

        // 가격이 없으면 포지션을 건드리지 않고 실패
        let reference = state.price(symbol)?;

        let position = state
            .positions
            .remove(symbol)
            .expect("position checked above");
        let exit_price = self.fill_price(reference, position.closing_side());

        let fill = Self::settle_close(
            &mut state,
            &self.config,
            symbol,
            position.entry_price,
            position.opened_at,
            position.side(),
            position.quantity,
            position.abs_quantity(),
            exit_price,
            "close",
        );

        Ok(CloseResult::Closed(fill))
    }

    async fn close_position_partial(
        &self,
        symbol: &str,
        fraction: Decimal,
    ) -> GatewayResult<CloseResult> {
        // 1.0 이상은 전량 청산과 동일
        if fraction >= Decimal::ONE {
            return self.close_position(symbol).await;
        }

        if fraction <= Decimal::ZERO {
            return Err(GatewayError::InvalidQuantity(format!(
                "close fraction must be positive, got {}",
                fraction
            )));
        }

        let mut state = self.state.write().await;

        if !state.positions.contains_key(symbol) {
            warn!(symbol, "No position to partially close");
            return Ok(CloseResult::NoOpenPosition);
        }

        let reference = state.price(symbol)?;
        let precision = state
            .precisions
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_SIM_PRECISION);

        let position = state.positions.get(symbol).expect("position checked above");
        let close_quantity = (position.abs_quantity() * fraction).trunc_with_scale(precision);

        if close_quantity.is_zero() {
            warn!(symbol, %fraction, precision, "Rounded close quantity is zero");
            return Err(GatewayError::QuantityTooSmall(symbol.to_string()));
        }

        let entry_price = position.entry_price;
        let entry_time = position.opened_at;
        let entry_side = position.side();
        let signed_quantity = position.quantity;
        let exit_price = self.fill_price(reference, position.closing_side());

        let fill = Self::settle_close(
            &mut state,
            &self.config,
            symbol,
            entry_price,
            entry_time,
            entry_side,
            signed_quantity,
            close_quantity,
            exit_price,
            "partial_close",
        );

        // 부분 청산은 수량만 조정 - 진입가와 오픈 시각은 유지
        let position = state.positions.get_mut(symbol).expect("position checked above");
        if position.quantity > Decimal::ZERO {
            position.quantity -= close_quantity;
        } else {
            position.quantity += close_quantity;
        }

        Ok(CloseResult::Closed(fill))
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.leverages.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &str, margin_mode: &str) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state
            .margin_modes
            .insert(symbol.to_string(), margin_mode.to_string());
        Ok(())
    }

    async fn quantity_precision(&self, symbol: &str) -> u32 {
        let state = self.state.read().await;
        state
            .precisions
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_SIM_PRECISION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_exchange() -> SimulatedFuturesExchange {
        SimulatedFuturesExchange::new(
            SimulatedConfig::default()
                .with_initial_balance(dec!(1000))
                .with_fee_rate(dec!(0.001)),
        )
    }

    #[tokio::test]
    async fn test_long_round_trip_pnl_and_balance() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(100)).await;

        // 진입: 수수료 100 * 0.001 = 0.1
        exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();
        assert_eq!(exchange.balance().await, dec!(999.9));

        // 청산 @ 110: pnl = 10 - 0.11 = 9.89
        exchange.set_price("BTCUSDT", dec!(110)).await;
        let result = exchange.close_position("BTCUSDT").await.unwrap();
        assert!(matches!(result, CloseResult::Closed(_)));

        assert_eq!(exchange.balance().await, dec!(1009.79));

        let trades = exchange.trade_history().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].pnl, dec!(9.89));
        assert_eq!(trades[0].commission, dec!(0.11));
        assert!(trades[0].is_win());
    }

    #[tokio::test]
    async fn test_short_round_trip_sign_inverts() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(100)).await;

        exchange
            .place_market_order("BTCUSDT", Side::Sell, dec!(1))
            .await
            .unwrap();

        // 숏은 가격 하락이 이익: pnl = (100-90)*1 - 0.09 = 9.91
        exchange.set_price("BTCUSDT", dec!(90)).await;
        exchange.close_position("BTCUSDT").await.unwrap();

        assert_eq!(exchange.balance().await, dec!(1000) - dec!(0.1) + dec!(9.91));

        // 숏에서 가격 상승은 손실
        exchange.set_price("ETHUSDT", dec!(100)).await;
        exchange
            .place_market_order("ETHUSDT", Side::Sell, dec!(1))
            .await
            .unwrap();
        exchange.set_price("ETHUSDT", dec!(110)).await;
        exchange.close_position("ETHUSDT").await.unwrap();

        let trades = exchange.trade_history().await;
        assert!(trades[1].pnl < Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_missing_price_fails_explicitly() {
        let exchange = scenario_exchange();

        let order = exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await;
        assert!(matches!(order, Err(GatewayError::PriceUnavailable(_))));

        let mark = exchange.mark_price("BTCUSDT").await;
        assert!(matches!(mark, Err(GatewayError::PriceUnavailable(_))));

        let klines = exchange.klines("BTCUSDT", Timeframe::M1, 10).await;
        assert!(matches!(klines, Err(GatewayError::DataUnavailable(_))));
    }

    #[tokio::test]
    async fn test_close_without_position_is_reported_not_error() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(100)).await;

        let result = exchange.close_position("BTCUSDT").await.unwrap();
        assert!(matches!(result, CloseResult::NoOpenPosition));
    }

    #[tokio::test]
    async fn test_reset_restores_initial_state() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(100)).await;
        exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();

        exchange.reset(dec!(5000)).await;

        assert_eq!(exchange.balance().await, dec!(5000));
        assert!(exchange.positions(None).await.unwrap().is_empty());
        assert!(exchange.order_history().await.is_empty());
        assert!(exchange.trade_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_close_adjusts_quantity_only() {
        let exchange = scenario_exchange();
        exchange.set_time(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()).await;
        exchange.set_price("BTCUSDT", dec!(100)).await;
        exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(2))
            .await
            .unwrap();

        exchange.set_price("BTCUSDT", dec!(110)).await;
        exchange
            .close_position_partial("BTCUSDT", dec!(0.5))
            .await
            .unwrap();

        let positions = exchange.positions(Some("BTCUSDT")).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, dec!(1));
        // 진입가와 오픈 시각은 변하지 않음
        assert_eq!(positions[0].entry_price, dec!(100));
        assert_eq!(
            positions[0].opened_at,
            DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
        );

        // 부분 청산 손익: (110-100)*1 - 110*0.001 = 9.89
        let trades = exchange.trade_history().await;
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].pnl, dec!(9.89));
        assert_eq!(trades[0].exit_reason, "partial_close");
    }

    #[tokio::test]
    async fn test_partial_close_fraction_one_or_more_closes_fully() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(100)).await;
        exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();
        exchange.set_price("BTCUSDT", dec!(110)).await;

        let result = exchange
            .close_position_partial("BTCUSDT", dec!(1.5))
            .await
            .unwrap();

        assert!(matches!(result, CloseResult::Closed(_)));
        assert!(exchange.positions(None).await.unwrap().is_empty());
        // 전량 청산과 동일한 잔고
        assert_eq!(exchange.balance().await, dec!(1009.79));
    }

    #[tokio::test]
    async fn test_partial_close_zero_after_rounding_fails() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(50000)).await;
        exchange.set_quantity_precision("BTCUSDT", 1).await;
        exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(0.1))
            .await
            .unwrap();

        // 0.1 * 0.5 = 0.05 → 정밀도 1 내림 → 0.0
        let result = exchange.close_position_partial("BTCUSDT", dec!(0.5)).await;
        assert!(matches!(result, Err(GatewayError::QuantityTooSmall(_))));

        // 포지션은 그대로 남아 있어야 함
        assert_eq!(exchange.positions(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeat_order_keeps_entry_lifecycle() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(100)).await;
        exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();

        // 같은 심볼에 대한 두 번째 주문: 수수료만 부과되고 진입 유지
        exchange.set_price("BTCUSDT", dec!(200)).await;
        exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();

        let positions = exchange.positions(Some("BTCUSDT")).await.unwrap();
        assert_eq!(positions[0].entry_price, dec!(100));
        assert_eq!(positions[0].quantity, dec!(1));

        // 주문 로그에는 둘 다 기록됨
        let orders = exchange.order_history().await;
        assert_eq!(orders.len(), 2);
        assert!(orders[0].order_id < orders[1].order_id);
    }

    #[tokio::test]
    async fn test_slippage_worsens_fill_price() {
        let exchange = SimulatedFuturesExchange::new(
            SimulatedConfig::default()
                .with_initial_balance(dec!(1000))
                .with_fee_rate(Decimal::ZERO)
                .with_slippage_rate(dec!(0.001)),
        );
        exchange.set_price("BTCUSDT", dec!(100)).await;

        let fill = exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();
        assert_eq!(fill.avg_price, dec!(100.1));

        let fill = exchange
            .place_market_order("ETHUSDT", Side::Sell, dec!(1))
            .await;
        assert!(fill.is_err()); // 가격 미설정

        exchange.set_price("ETHUSDT", dec!(100)).await;
        let fill = exchange
            .place_market_order("ETHUSDT", Side::Sell, dec!(1))
            .await
            .unwrap();
        assert_eq!(fill.avg_price, dec!(99.9));
    }

    #[tokio::test]
    async fn test_account_snapshot_includes_unrealized_pnl() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(100)).await;
        exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();

        exchange.set_price("BTCUSDT", dec!(120)).await;
        let snapshot = exchange.account_snapshot().await.unwrap();

        assert_eq!(snapshot.wallet_balance, dec!(999.9));
        assert_eq!(snapshot.margin_balance, dec!(999.9) + dec!(20));
    }

    #[tokio::test]
    async fn test_symbol_settings_are_recorded() {
        let exchange = scenario_exchange();

        exchange.set_leverage("BTCUSDT", 20).await.unwrap();
        exchange.set_margin_mode("BTCUSDT", "CROSSED").await.unwrap();

        assert_eq!(exchange.configured_leverage("BTCUSDT").await, Some(20));
        assert_eq!(
            exchange.configured_margin_mode("BTCUSDT").await,
            Some("CROSSED".to_string())
        );
        assert_eq!(exchange.configured_leverage("ETHUSDT").await, None);
    }

    #[tokio::test]
    async fn test_cancel_rejected_because_orders_fill_instantly() {
        let exchange = scenario_exchange();
        exchange.set_price("BTCUSDT", dec!(100)).await;

        let fill = exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();

        let result = exchange.cancel_order("BTCUSDT", fill.order_id).await;
        assert!(matches!(result, Err(GatewayError::OrderRejected(_))));
    }

    #[tokio::test]
    async fn test_simulated_clock_stamps_fills() {
        let exchange = scenario_exchange();
        let t = DateTime::from_timestamp_millis(1_600_000_000_000).unwrap();
        exchange.set_time(t).await;
        exchange.set_price("BTCUSDT", dec!(100)).await;

        let fill = exchange
            .place_market_order("BTCUSDT", Side::Buy, dec!(1))
            .await
            .unwrap();
        assert_eq!(fill.timestamp, t);
    }
}
