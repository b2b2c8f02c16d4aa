//! Binance USDT-M 선물 REST 게이트웨이.
//!
//! 서명된 계좌/포지션/주문 엔드포인트와 공개 시장 데이터 엔드포인트를
//! 제공합니다. 읽기 작업은 실패 시 안전한 기본값으로 저하되고 (전략
//! 루프는 계속 동작해야 함), 쓰기 작업은 복원력 파이프라인 전체를
//! 거친 뒤 실패를 그대로 전파합니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use gateway_core::{
    AccountSnapshot, AssetBalance, CloseResult, ExchangeSettings, GatewayConfig, Kline, OrderFill,
    OrderStatus, Position, PositionSide, Side, Timeframe,
};

use crate::pipeline::ResiliencePipeline;
use crate::signing::SigningContext;
use crate::traits::{FuturesExchange, GatewayResult};
use crate::GatewayError;

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FapiAsset {
    asset: String,
    wallet_balance: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FapiAccount {
    total_wallet_balance: String,
    total_margin_balance: String,
    available_balance: String,
    assets: Vec<FapiAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FapiPositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
    un_realized_profit: String,
    position_side: String,
    update_time: i64,
}

#[derive(Debug, Deserialize)]
struct FapiKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    #[allow(dead_code)] String, // 9: Taker buy base volume
    #[allow(dead_code)] String, // 10: Taker buy quote volume
    #[allow(dead_code)] String, // 11: Ignore
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FapiPremiumIndex {
    #[allow(dead_code)]
    symbol: String,
    mark_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FapiOrderResponse {
    order_id: u64,
    symbol: String,
    status: String,
    side: String,
    orig_qty: String,
    #[serde(default)]
    executed_qty: String,
    #[serde(default)]
    avg_price: String,
    update_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FapiSymbolInfo {
    symbol: String,
    quantity_precision: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FapiExchangeInfo {
    symbols: Vec<FapiSymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct FapiError {
    code: i32,
    msg: String,
}

// ============================================================================
// Binance 선물 클라이언트
// ============================================================================

const MAINNET_BASE_URL: &str = "https://fapi.binance.com";
const TESTNET_BASE_URL: &str = "https://testnet.binancefuture.com";

/// 알 수 없는 심볼의 보수적 수량 정밀도 기본값.
const DEFAULT_QUANTITY_PRECISION: u32 = 1;

/// Binance USDT-M 선물 게이트웨이.
pub struct BinanceFuturesClient {
    /// API 키 (헤더용)
    api_key: String,
    /// 요청 서명 컨텍스트
    signer: SigningContext,
    /// REST 기본 URL
    base_url: String,
    /// 수신 윈도우 (밀리초)
    recv_window_ms: u64,
    /// 드라이런 모드: 주문을 네트워크에 보내지 않고 합성 성공 반환
    dry_run: bool,
    /// HTTP 클라이언트
    client: Client,
    /// 복원력 파이프라인 (이름당 하나, 모든 호출이 공유)
    pipeline: ResiliencePipeline,
    /// 심볼별 수량 정밀도 규칙 (시작 시 1회 로드)
    precision_rules: RwLock<HashMap<String, u32>>,
    /// 드라이런 합성 주문 ID
    dry_run_order_id: AtomicU64,
}

impl BinanceFuturesClient {
    /// 게이트웨이 설정에서 새 클라이언트를 생성합니다.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        Self::with_pipeline(
            &config.exchange,
            ResiliencePipeline::from_settings("binance-futures", &config.resilience),
        )
    }

    /// 명시적 파이프라인 인스턴스로 클라이언트를 생성합니다.
    pub fn with_pipeline(
        settings: &ExchangeSettings,
        pipeline: ResiliencePipeline,
    ) -> GatewayResult<Self> {
        let signer = SigningContext::new(&settings.api_secret)?;

        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(settings.connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Network(format!("HTTP client build failed: {}", e)))?;

        let base_url = if settings.testnet {
            TESTNET_BASE_URL.to_string()
        } else {
            MAINNET_BASE_URL.to_string()
        };

        if settings.api_key.is_empty() {
            warn!("API key not configured; signed requests will fail unless in dry-run mode");
        }

        Ok(Self {
            api_key: settings.api_key.clone(),
            signer,
            base_url,
            recv_window_ms: settings.recv_window_ms,
            dry_run: settings.dry_run,
            client,
            pipeline,
            precision_rules: RwLock::new(HashMap::new()),
            dry_run_order_id: AtomicU64::new(1),
        })
    }

    /// REST 기본 URL을 교체합니다 (테스트용).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 드라이런 모드 여부를 반환합니다.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// 현재 타임스탬프(밀리초)를 반환합니다.
    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    /// 문자열에서 Decimal을 파싱합니다.
    fn parse_decimal(s: &str) -> Decimal {
        s.parse().unwrap_or(Decimal::ZERO)
    }

    /// 공개 API 요청 (인증 불필요).
    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> GatewayResult<T> {
        let query = SigningContext::build_query(params);
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.base_url, endpoint, query)
        };

        debug!("GET {}", endpoint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(GatewayError::from)?;

        Self::handle_response(response).await
    }

    /// 서명된 GET 요청.
    async fn signed_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> GatewayResult<T> {
        let query = self
            .signer
            .signed_query(params, Self::timestamp_ms(), self.recv_window_ms);
        let url = format!("{}{}?{}", self.base_url, endpoint, query);

        debug!("GET (signed) {}", endpoint);

        let response = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(GatewayError::from)?;

        Self::handle_response(response).await
    }

    /// 서명된 POST 요청.
    async fn signed_post<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> GatewayResult<T> {
        let query = self
            .signer
            .signed_query(params, Self::timestamp_ms(), self.recv_window_ms);
        let url = format!("{}{}?{}", self.base_url, endpoint, query);

        debug!("POST (signed) {}", endpoint);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .send()
            .await
            .map_err(GatewayError::from)?;

        Self::handle_response(response).await
    }

    /// 서명된 DELETE 요청.
    async fn signed_delete<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> GatewayResult<T> {
        let query = self
            .signer
            .signed_query(params, Self::timestamp_ms(), self.recv_window_ms);
        let url = format!("{}{}?{}", self.base_url, endpoint, query);

        debug!("DELETE (signed) {}", endpoint);

        let response = self
            .client
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(GatewayError::from)?;

        Self::handle_response(response).await
    }

    /// API 응답을 처리합니다.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> GatewayResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(GatewayError::from)?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                error!("Failed to parse response: {} - Body: {}", e, body);
                GatewayError::ParseError(e.to_string())
            });
        }

        // HTTP 상태 기반 분류가 본문 파싱보다 우선
        match status.as_u16() {
            418 | 429 => return Err(GatewayError::RateLimited),
            code @ 500..=599 => {
                return Err(GatewayError::Network(format!("HTTP {}: {}", code, body)))
            }
            _ => {}
        }

        if let Ok(err) = serde_json::from_str::<FapiError>(&body) {
            Err(GatewayError::from_exchange_code(err.code, &err.msg))
        } else {
            Err(GatewayError::ApiError {
                code: status.as_u16() as i32,
                message: body,
            })
        }
    }

    /// 원시 positionRisk 응답을 조회합니다 (저하 없음, 청산 경로용).
    async fn fetch_position_risk(&self, symbol: Option<&str>) -> GatewayResult<Vec<FapiPositionRisk>> {
        let params: Vec<(&str, String)> = match symbol {
            Some(s) => vec![("symbol", s.to_string())],
            None => vec![],
        };

        self.pipeline
            .execute_limited(|| async move { self.signed_get("/fapi/v2/positionRisk", &params).await })
            .await
    }

    /// positionRisk 항목을 Position으로 변환합니다.
    fn to_position(entry: &FapiPositionRisk) -> Position {
        Position {
            symbol: entry.symbol.clone(),
            quantity: Self::parse_decimal(&entry.position_amt),
            entry_price: Self::parse_decimal(&entry.entry_price),
            position_side: PositionSide::from_exchange(&entry.position_side),
            unrealized_pnl: Self::parse_decimal(&entry.un_realized_profit),
            opened_at: DateTime::from_timestamp_millis(entry.update_time).unwrap_or_else(Utc::now),
        }
    }

    /// 주문 응답을 OrderFill로 변환합니다.
    fn to_order_fill(resp: FapiOrderResponse) -> OrderFill {
        let executed = Self::parse_decimal(&resp.executed_qty);
        let quantity = if executed > Decimal::ZERO {
            executed
        } else {
            Self::parse_decimal(&resp.orig_qty)
        };

        OrderFill {
            order_id: resp.order_id,
            symbol: resp.symbol,
            side: if resp.side == "SELL" { Side::Sell } else { Side::Buy },
            quantity,
            avg_price: Self::parse_decimal(&resp.avg_price),
            status: OrderStatus::from_exchange(&resp.status),
            timestamp: resp
                .update_time
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now),
        }
    }

    /// 드라이런 합성 체결을 생성합니다.
    fn dry_run_fill(&self, symbol: &str, side: Side, quantity: Decimal) -> OrderFill {
        let order_id = self.dry_run_order_id.fetch_add(1, Ordering::Relaxed);
        info!(
            symbol,
            %side,
            %quantity,
            order_id,
            "[DRY RUN] Market order filled synthetically"
        );
        OrderFill {
            order_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            avg_price: Decimal::ZERO,
            status: OrderStatus::Filled,
            timestamp: Utc::now(),
        }
    }

    /// reduce-only 시장가 주문을 제출합니다 (청산 경로).
    async fn place_reduce_only(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        position_side: PositionSide,
    ) -> GatewayResult<OrderFill> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.normalize().to_string()),
            ("reduceOnly", "true".to_string()),
        ];

        // 헤지 모드 지원: BOTH가 아닌 경우에만 positionSide 전달
        if position_side != PositionSide::Both {
            params.push(("positionSide", position_side.as_str().to_string()));
        }

        let resp: FapiOrderResponse = self
            .pipeline
            .execute("close_position", || {
                let params = params.clone();
                async move { self.signed_post("/fapi/v1/order", &params).await }
            })
            .await?;

        Ok(Self::to_order_fill(resp))
    }

    /// 거래소 규칙 테이블을 로드합니다 (시작 시 1회).
    ///
    /// 심볼별 수량 정밀도를 캐시합니다. 실패해도 게이트웨이는 보수적
    /// 기본값으로 계속 동작합니다.
    pub async fn load_exchange_rules(&self) -> GatewayResult<usize> {
        let info: FapiExchangeInfo = self
            .pipeline
            .execute_limited(|| async move { self.public_get("/fapi/v1/exchangeInfo", &[]).await })
            .await?;

        let mut rules = self.precision_rules.write().unwrap();
        for sym in info.symbols {
            rules.insert(sym.symbol, sym.quantity_precision);
        }
        info!("Loaded precision rules for {} symbols", rules.len());
        Ok(rules.len())
    }

    /// 전 심볼의 레버리지/마진 모드를 동시에 초기화합니다.
    ///
    /// 심볼마다 독립 태스크를 띄우는 fire-and-forget 호출로, 트레이딩
    /// 준비를 블록하지 않습니다. "이미 설정됨" 실패는 로그만 남깁니다.
    pub fn initialize_symbol_settings(
        self: &Arc<Self>,
        symbols: &[String],
        leverage: u32,
        margin_mode: &str,
    ) {
        info!("Initializing trading settings for {} symbols", symbols.len());

        for symbol in symbols {
            let client = Arc::clone(self);
            let symbol = symbol.clone();
            let margin_mode = margin_mode.to_string();

            tokio::spawn(async move {
                if let Err(e) = client.set_margin_mode(&symbol, &margin_mode).await {
                    debug!(symbol, error = %e, "Margin mode might already be set");
                }

                match client.set_leverage(&symbol, leverage).await {
                    Ok(()) => info!(symbol, leverage, "Leverage configured"),
                    Err(e) => error!(symbol, error = %e, "Failed to set leverage"),
                }
            });
        }
    }
}

#[async_trait]
impl FuturesExchange for BinanceFuturesClient {
    fn name(&self) -> &str {
        "binance-futures"
    }

    async fn account_snapshot(&self) -> GatewayResult<AccountSnapshot> {
        let result: GatewayResult<FapiAccount> = self
            .pipeline
            .execute_limited(|| async move { self.signed_get("/fapi/v2/account", &[]).await })
            .await;

        match result {
            Ok(account) => Ok(AccountSnapshot {
                wallet_balance: Self::parse_decimal(&account.total_wallet_balance),
                margin_balance: Self::parse_decimal(&account.total_margin_balance),
                available_balance: Self::parse_decimal(&account.available_balance),
                assets: account
                    .assets
                    .into_iter()
                    .map(|a| AssetBalance {
                        asset: a.asset,
                        wallet_balance: Self::parse_decimal(&a.wallet_balance),
                        available_balance: Self::parse_decimal(&a.available_balance),
                    })
                    .collect(),
            }),
            Err(e) => {
                // 읽기 저하: 호출자는 빈 스냅샷을 "준비되지 않음"으로 처리
                error!(error = %e, "Failed to get account snapshot, returning empty default");
                Ok(AccountSnapshot::default())
            }
        }
    }

    async fn positions(&self, symbol: Option<&str>) -> GatewayResult<Vec<Position>> {
        match self.fetch_position_risk(symbol).await {
            Ok(entries) => Ok(entries
                .iter()
                .map(Self::to_position)
                .filter(|p| !p.quantity.is_zero())
                .collect()),
            Err(e) => {
                error!(error = %e, "Failed to get positions, returning empty list");
                Ok(Vec::new())
            }
        }
    }

    async fn klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> GatewayResult<Vec<Kline>> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("interval", timeframe.interval().to_string()),
            ("limit", limit.to_string()),
        ];

        let resp: Vec<FapiKline> = self
            .pipeline
            .execute_limited(|| async move { self.public_get("/fapi/v1/klines", &params).await })
            .await?;

        Ok(resp
            .into_iter()
            .map(|k| Kline {
                symbol: symbol.to_string(),
                timeframe,
                open_time: DateTime::from_timestamp_millis(k.0).unwrap_or_else(Utc::now),
                open: Self::parse_decimal(&k.1),
                high: Self::parse_decimal(&k.2),
                low: Self::parse_decimal(&k.3),
                close: Self::parse_decimal(&k.4),
                volume: Self::parse_decimal(&k.5),
                close_time: DateTime::from_timestamp_millis(k.6).unwrap_or_else(Utc::now),
                quote_volume: Some(Self::parse_decimal(&k.7)),
                num_trades: Some(k.8 as u32),
            })
            .collect())
    }

    async fn klines_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> GatewayResult<Vec<Kline>> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("interval", timeframe.interval().to_string()),
            ("limit", limit.to_string()),
            ("startTime", start.timestamp_millis().to_string()),
            ("endTime", end.timestamp_millis().to_string()),
        ];

        let resp: Vec<FapiKline> = self
            .pipeline
            .execute_limited(|| async move { self.public_get("/fapi/v1/klines", &params).await })
            .await?;

        Ok(resp
            .into_iter()
            .map(|k| Kline {
                symbol: symbol.to_string(),
                timeframe,
                open_time: DateTime::from_timestamp_millis(k.0).unwrap_or_else(Utc::now),
                open: Self::parse_decimal(&k.1),
                high: Self::parse_decimal(&k.2),
                low: Self::parse_decimal(&k.3),
                close: Self::parse_decimal(&k.4),
                volume: Self::parse_decimal(&k.5),
                close_time: DateTime::from_timestamp_millis(k.6).unwrap_or_else(Utc::now),
                quote_volume: Some(Self::parse_decimal(&k.7)),
                num_trades: Some(k.8 as u32),
            })
            .collect())
    }

    async fn mark_price(&self, symbol: &str) -> GatewayResult<Decimal> {
        let params = vec![("symbol", symbol.to_string())];

        let result: GatewayResult<FapiPremiumIndex> = self
            .pipeline
            .execute_limited(|| async move { self.public_get("/fapi/v1/premiumIndex", &params).await })
            .await;

        match result {
            Ok(index) => Ok(Self::parse_decimal(&index.mark_price)),
            Err(e) => {
                // 0은 "알 수 없음"이며 절대 실제 가격이 아님
                error!(symbol, error = %e, "Failed to get mark price, returning 0");
                Ok(Decimal::ZERO)
            }
        }
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
    ) -> GatewayResult<OrderFill> {
        if self.dry_run {
            return Ok(self.dry_run_fill(symbol, side, quantity));
        }

        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", quantity.normalize().to_string()),
        ];

        info!(symbol, %side, %quantity, "Placing MARKET order");

        let resp: FapiOrderResponse = self
            .pipeline
            .execute("place_market_order", || {
                let params = params.clone();
                async move { self.signed_post("/fapi/v1/order", &params).await }
            })
            .await?;

        info!(order_id = resp.order_id, "Order placed successfully");
        Ok(Self::to_order_fill(resp))
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> GatewayResult<()> {
        if self.dry_run {
            info!(symbol, order_id, "[DRY RUN] Order cancelled");
            return Ok(());
        }

        let params = vec![
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];

        let _: FapiOrderResponse = self
            .pipeline
            .execute_limited(|| async move { self.signed_delete("/fapi/v1/order", &params).await })
            .await?;

        info!(symbol, order_id, "Order cancelled");
        Ok(())
    }

    async fn close_position(&self, symbol: &str) -> GatewayResult<CloseResult> {
        if self.dry_run {
            info!(symbol, "[DRY RUN] Position closed");
            return Ok(CloseResult::Closed(self.dry_run_fill(
                symbol,
                Side::Sell,
                Decimal::ZERO,
            )));
        }

        let entries = self.fetch_position_risk(Some(symbol)).await?;

        // 활성 포지션 탐색 (포지션 모드 항목이 여럿이면 첫 번째 nonzero)
        let active = entries
            .iter()
            .find(|p| !Self::parse_decimal(&p.position_amt).is_zero());

        let Some(position) = active else {
            info!(symbol, "No open position to close");
            return Ok(CloseResult::NoOpenPosition);
        };

        let amount = Self::parse_decimal(&position.position_amt);
        let side = if amount > Decimal::ZERO { Side::Sell } else { Side::Buy };
        let quantity = amount.abs();
        let position_side = PositionSide::from_exchange(&position.position_side);

        info!(symbol, %side, %quantity, "Closing position with reduce-only order");

        let fill = self
            .place_reduce_only(symbol, side, quantity, position_side)
            .await?;
        Ok(CloseResult::Closed(fill))
    }

    async fn close_position_partial(
        &self,
        symbol: &str,
        fraction: Decimal,
    ) -> GatewayResult<CloseResult> {
        if fraction >= Decimal::ONE {
            return self.close_position(symbol).await;
        }

        if self.dry_run {
            info!(symbol, %fraction, "[DRY RUN] Partial position close");
            return Ok(CloseResult::Closed(self.dry_run_fill(
                symbol,
                Side::Sell,
                Decimal::ZERO,
            )));
        }

        let entries = self.fetch_position_risk(Some(symbol)).await?;
        let active = entries
            .iter()
            .find(|p| !Self::parse_decimal(&p.position_amt).is_zero());

        let Some(position) = active else {
            info!(symbol, "No open position to partially close");
            return Ok(CloseResult::NoOpenPosition);
        };

        let amount = Self::parse_decimal(&position.position_amt);
        let precision = self.quantity_precision(symbol).await;
        let quantity = (amount.abs() * fraction).trunc_with_scale(precision);

        if quantity.is_zero() {
            warn!(
                symbol,
                %fraction,
                precision,
                "Rounded quantity is zero, skipping partial close"
            );
            return Err(GatewayError::QuantityTooSmall(symbol.to_string()));
        }

        let side = if amount > Decimal::ZERO { Side::Sell } else { Side::Buy };
        let position_side = PositionSide::from_exchange(&position.position_side);

        info!(
            symbol,
            %side,
            %quantity,
            %fraction,
            "Partial close with reduce-only order"
        );

        let fill = self
            .place_reduce_only(symbol, side, quantity, position_side)
            .await?;
        Ok(CloseResult::Closed(fill))
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> GatewayResult<()> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];

        let _: serde_json::Value = self
            .pipeline
            .execute_limited(|| async move { self.signed_post("/fapi/v1/leverage", &params).await })
            .await?;
        Ok(())
    }

    async fn set_margin_mode(&self, symbol: &str, margin_mode: &str) -> GatewayResult<()> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("marginType", margin_mode.to_string()),
        ];

        let result: GatewayResult<serde_json::Value> = self
            .pipeline
            .execute_limited(|| async move { self.signed_post("/fapi/v1/marginType", &params).await })
            .await;

        match result {
            Ok(_) => Ok(()),
            // -4046: "No need to change margin type" - 이미 원하는 모드
            Err(GatewayError::ApiError { code: -4046, .. }) => {
                debug!(symbol, margin_mode, "Margin mode already set");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn quantity_precision(&self, symbol: &str) -> u32 {
        self.precision_rules
            .read()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(DEFAULT_QUANTITY_PRECISION)
    }
}
