//! 스트림 데이터 캐시.
//!
//! 계좌/포지션 스냅샷, 심볼별 마크 가격, 심볼별 유한 캔들 이력을
//! 유지하여 틱마다 REST 호출을 반복하지 않아도 되게 합니다.
//!
//! 일관성 규칙:
//! - 스냅샷은 쓰기 잠금 아래에서 통째로 교체됩니다. 동시 독자는 항상
//!   이전 값 전체 또는 새 값 전체를 관찰하며, 반쯤 갱신된 상태를 볼
//!   수 없습니다.
//! - 잔고 필드만 담긴 계좌 델타는 기존 포지션 목록을 건드리지 않고,
//!   포지션 배열이 포함된 델타는 목록 전체를 0이 아닌 수량으로 걸러
//!   교체합니다 (전부 0이면 빈 목록이 됩니다).
//! - 캔들은 종료된 것만 보관하며 (진행 중 캔들은 무시), 심볼당 용량을
//!   넘으면 가장 오래된 것부터 밀려납니다.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, error, warn};

use gateway_core::{AccountSnapshot, AssetBalance, Kline, Position, PositionSide, Timeframe};

/// 포지션 목록 교체 시 호출되는 리스너.
pub type PositionListener = Box<dyn Fn(&[Position]) + Send + Sync>;

// ============================================================================
// WebSocket 프레임 타입
// ============================================================================

/// 결합 스트림 프레임 (`/stream?streams=` 엔드포인트).
#[derive(Debug, Deserialize)]
struct CombinedFrame {
    #[allow(dead_code)]
    stream: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WsBalance {
    /// 자산 이름
    #[serde(rename = "a")]
    asset: String,
    /// 지갑 잔고
    #[serde(rename = "wb")]
    wallet_balance: String,
    /// 교차 지갑 잔고
    #[serde(rename = "cw")]
    cross_wallet_balance: String,
    /// 잔고 변화분
    #[serde(rename = "bc", default)]
    balance_change: String,
}

#[derive(Debug, Deserialize)]
struct WsPosition {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "pa")]
    position_amt: String,
    #[serde(rename = "ep")]
    entry_price: String,
    #[serde(rename = "up")]
    unrealized_pnl: String,
    #[serde(rename = "ps", default)]
    position_side: String,
}

#[derive(Debug, Deserialize)]
struct WsAccountData {
    #[serde(rename = "B", default)]
    balances: Vec<WsBalance>,
    /// 포지션 배열이 없는 델타는 기존 목록을 유지해야 하므로 Option
    #[serde(rename = "P")]
    positions: Option<Vec<WsPosition>>,
}

#[derive(Debug, Deserialize)]
struct WsAccountUpdate {
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "a")]
    data: WsAccountData,
}

#[derive(Debug, Deserialize)]
struct WsMarkPrice {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    mark_price: String,
}

#[derive(Debug, Deserialize)]
struct WsKlineEvent {
    #[serde(rename = "k")]
    kline: WsKline,
}

#[derive(Debug, Deserialize)]
struct WsKline {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "i")]
    interval: String,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
    #[serde(rename = "q", default)]
    quote_volume: String,
    #[serde(rename = "n", default)]
    num_trades: u32,
    /// 캔들 종료 여부 - 진행 중 캔들은 캐시되지 않음
    #[serde(rename = "x")]
    is_closed: bool,
}

// ============================================================================
// 캐시
// ============================================================================

/// 스트림 데이터 캐시.
///
/// 스트림 콜백(쓰기)과 전략 태스크(읽기)가 동시에 접근하므로 내부
/// 잠금으로 보호됩니다. 잠금을 잡은 채 await하지 않습니다.
pub struct StreamCache {
    /// 최신 계좌 스냅샷 (시드 전에는 None)
    account: RwLock<Option<AccountSnapshot>>,
    /// 최신 포지션 목록 (시드 전에는 None)
    positions: RwLock<Option<Vec<Position>>>,
    /// 심볼별 최신 마크 가격 (last write wins)
    mark_prices: RwLock<HashMap<String, Decimal>>,
    /// 심볼별 종료 캔들 이력 (FIFO, 용량 초과 시 가장 오래된 것 제거)
    klines: RwLock<HashMap<String, VecDeque<Kline>>>,
    /// 심볼당 캔들 용량
    kline_capacity: usize,
    /// 포지션 교체 리스너
    position_listeners: Mutex<Vec<PositionListener>>,
}

impl StreamCache {
    /// 새 캐시를 생성합니다.
    pub fn new(kline_capacity: usize) -> Self {
        Self {
            account: RwLock::new(None),
            positions: RwLock::new(None),
            mark_prices: RwLock::new(HashMap::new()),
            klines: RwLock::new(HashMap::new()),
            kline_capacity,
            position_listeners: Mutex::new(Vec::new()),
        }
    }

    // === 초기 시드 (스트림이 채우기 전 REST 폴백) ===

    /// 계좌 스냅샷을 시드합니다.
    pub fn seed_account(&self, snapshot: AccountSnapshot) {
        *self.account.write().unwrap() = Some(snapshot);
    }

    /// 포지션 목록을 시드합니다.
    pub fn seed_positions(&self, positions: Vec<Position>) {
        *self.positions.write().unwrap() = Some(positions);
        self.notify_position_listeners();
    }

    /// 심볼의 캔들 이력을 시드합니다 (기존 항목 대체).
    pub fn seed_klines(&self, symbol: &str, klines: Vec<Kline>) {
        let mut cache = self.klines.write().unwrap();
        let deque = cache.entry(symbol.to_string()).or_default();
        deque.clear();
        deque.extend(klines);
        while deque.len() > self.kline_capacity {
            deque.pop_front();
        }
    }

    // === 조회 ===

    /// 최신 계좌 스냅샷을 반환합니다.
    pub fn account(&self) -> Option<AccountSnapshot> {
        self.account.read().unwrap().clone()
    }

    /// 최신 포지션 목록을 반환합니다.
    pub fn positions(&self) -> Vec<Position> {
        self.positions.read().unwrap().clone().unwrap_or_default()
    }

    /// 심볼의 포지션을 반환합니다.
    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.positions
            .read()
            .unwrap()
            .as_ref()
            .and_then(|ps| ps.iter().find(|p| p.symbol == symbol).cloned())
    }

    /// 심볼의 최신 마크 가격을 반환합니다.
    pub fn mark_price(&self, symbol: &str) -> Option<Decimal> {
        self.mark_prices.read().unwrap().get(symbol).copied()
    }

    /// 심볼의 최근 캔들을 최대 `limit`개 반환합니다 (오래된 것부터).
    pub fn klines(&self, symbol: &str, limit: usize) -> Vec<Kline> {
        let cache = self.klines.read().unwrap();
        match cache.get(symbol) {
            Some(deque) => {
                let skip = deque.len().saturating_sub(limit);
                deque.iter().skip(skip).cloned().collect()
            }
            None => {
                warn!(symbol, "No cached klines");
                Vec::new()
            }
        }
    }

    /// 심볼의 캐시된 캔들 개수를 반환합니다.
    pub fn kline_count(&self, symbol: &str) -> usize {
        self.klines
            .read()
            .unwrap()
            .get(symbol)
            .map_or(0, |d| d.len())
    }

    /// 계좌와 포지션 캐시가 모두 준비되었는지 확인합니다.
    pub fn is_ready(&self) -> bool {
        self.account.read().unwrap().is_some() && self.positions.read().unwrap().is_some()
    }

    /// 포지션 교체 리스너를 등록합니다.
    ///
    /// 리스너는 캐시 갱신 직후 동기적으로 호출되며, 항상 일관된 전체
    /// 스냅샷을 전달받습니다.
    pub fn add_position_listener(&self, listener: PositionListener) {
        self.position_listeners.lock().unwrap().push(listener);
    }

    // === 스트림 프레임 적용 ===

    /// 사용자 데이터 스트림 프레임을 적용합니다.
    pub fn apply_user_frame(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "Failed to parse user stream frame");
                return;
            }
        };

        match value.get("e").and_then(|e| e.as_str()) {
            Some("ACCOUNT_UPDATE") => match serde_json::from_value::<WsAccountUpdate>(value) {
                Ok(update) => self.apply_account_update(update),
                Err(e) => error!(error = %e, "Failed to decode ACCOUNT_UPDATE"),
            },
            Some("ORDER_TRADE_UPDATE") => {
                debug!("Order update received");
            }
            Some("listenKeyExpired") => {
                warn!("Listen key expired event received");
            }
            Some(event) => debug!(event, "Ignoring user stream event"),
            None => debug!("User stream frame without event type"),
        }
    }

    /// 공개 시장 스트림 프레임을 적용합니다 (결합 스트림 포함).
    pub fn apply_market_frame(&self, text: &str) {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "Failed to parse market stream frame");
                return;
            }
        };

        // 결합 스트림 래퍼 해제
        let data = match serde_json::from_value::<CombinedFrame>(value.clone()) {
            Ok(frame) => frame.data,
            Err(_) => value,
        };

        match data.get("e").and_then(|e| e.as_str()) {
            Some("markPriceUpdate") => match serde_json::from_value::<WsMarkPrice>(data) {
                Ok(update) => {
                    let price: Decimal = update.mark_price.parse().unwrap_or(Decimal::ZERO);
                    self.mark_prices
                        .write()
                        .unwrap()
                        .insert(update.symbol, price);
                }
                Err(e) => error!(error = %e, "Failed to decode markPriceUpdate"),
            },
            Some("kline") => match serde_json::from_value::<WsKlineEvent>(data) {
                Ok(event) => self.apply_kline(event.kline),
                Err(e) => error!(error = %e, "Failed to decode kline event"),
            },
            Some(event) => debug!(event, "Ignoring market stream event"),
            None => debug!("Market stream frame without event type"),
        }
    }

    /// 계좌 델타 이벤트를 캐시에 병합합니다.
    fn apply_account_update(&self, update: WsAccountUpdate) {
        let event_time =
            DateTime::from_timestamp_millis(update.event_time).unwrap_or_else(Utc::now);

        // 잔고 필드 재구성 (USDT 항목이 스냅샷 합계를 정의)
        if !update.data.balances.is_empty() {
            let mut snapshot = AccountSnapshot::default();

            for balance in &update.data.balances {
                let wallet: Decimal = balance.wallet_balance.parse().unwrap_or(Decimal::ZERO);
                let cross: Decimal =
                    balance.cross_wallet_balance.parse().unwrap_or(Decimal::ZERO);
                let change: Decimal = balance.balance_change.parse().unwrap_or(Decimal::ZERO);

                if balance.asset == "USDT" {
                    snapshot.wallet_balance = wallet;
                    snapshot.margin_balance = cross;
                    snapshot.available_balance = change;
                }

                snapshot.assets.push(AssetBalance {
                    asset: balance.asset.clone(),
                    wallet_balance: wallet,
                    available_balance: change,
                });
            }

            *self.account.write().unwrap() = Some(snapshot);
            debug!("Account snapshot rebuilt from stream delta");
        }

        // 포지션 배열이 있는 델타만 목록을 교체
        if let Some(ws_positions) = update.data.positions {
            let replaced: Vec<Position> = ws_positions
                .into_iter()
                .filter_map(|p| {
                    let quantity: Decimal = p.position_amt.parse().unwrap_or(Decimal::ZERO);
                    if quantity.is_zero() {
                        return None;
                    }
                    Some(Position {
                        symbol: p.symbol,
                        quantity,
                        entry_price: p.entry_price.parse().unwrap_or(Decimal::ZERO),
                        position_side: PositionSide::from_exchange(&p.position_side),
                        unrealized_pnl: p.unrealized_pnl.parse().unwrap_or(Decimal::ZERO),
                        opened_at: event_time,
                    })
                })
                .collect();

            debug!(count = replaced.len(), "Position cache replaced");
            *self.positions.write().unwrap() = Some(replaced);
            self.notify_position_listeners();
        }
    }

    /// 종료된 캔들을 캐시에 추가합니다.
    fn apply_kline(&self, kline: WsKline) {
        if !kline.is_closed {
            // 진행 중 캔들은 종료될 때까지 버림
            return;
        }

        let Some(timeframe) = Timeframe::from_interval(&kline.interval) else {
            warn!(interval = %kline.interval, "Unknown kline interval");
            return;
        };

        let parsed = Kline {
            symbol: kline.symbol.clone(),
            timeframe,
            open_time: DateTime::from_timestamp_millis(kline.open_time).unwrap_or_else(Utc::now),
            open: kline.open.parse().unwrap_or(Decimal::ZERO),
            high: kline.high.parse().unwrap_or(Decimal::ZERO),
            low: kline.low.parse().unwrap_or(Decimal::ZERO),
            close: kline.close.parse().unwrap_or(Decimal::ZERO),
            volume: kline.volume.parse().unwrap_or(Decimal::ZERO),
            close_time: DateTime::from_timestamp_millis(kline.close_time)
                .unwrap_or_else(Utc::now),
            quote_volume: kline.quote_volume.parse().ok(),
            num_trades: Some(kline.num_trades),
        };

        let mut cache = self.klines.write().unwrap();
        let deque = cache.entry(kline.symbol.clone()).or_default();
        deque.push_back(parsed);
        while deque.len() > self.kline_capacity {
            deque.pop_front();
        }
        debug!(symbol = %kline.symbol, count = deque.len(), "Kline cached");
    }

    /// 등록된 리스너에 현재 포지션 목록을 통지합니다.
    fn notify_position_listeners(&self) {
        let positions = self.positions();
        let listeners = self.position_listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener(&positions);
        }
    }
}
