//! 선물 WebSocket 스트림 클라이언트.
//!
//! 세 가지 논리 채널을 관리합니다:
//! - 사용자 데이터 스트림 (계좌/포지션/주문): REST로 발급받은 listen
//!   key가 필요하며, 고정 주기로 keep-alive 갱신을 보냅니다. 갱신
//!   실패는 스트림을 끊지 않고 로그 후 다음 주기에 재시도합니다.
//! - 마크 가격 결합 스트림 (심볼별 1초 주기)
//! - 캔들 결합 스트림 (종료 캔들만 캐시에 반영)
//!
//! 사용자 스트림이 예기치 않게 종료되면 고정 지연 후 재연결을 한 번
//! 시도합니다. 재연결을 루프로 반복하지는 않습니다.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use serde::Deserialize;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use gateway_core::{StreamSettings, Timeframe};

use crate::stream::cache::StreamCache;
use crate::traits::GatewayResult;
use crate::GatewayError;

const MAINNET_REST_URL: &str = "https://fapi.binance.com";
const MAINNET_WS_URL: &str = "wss://fstream.binance.com";
const TESTNET_REST_URL: &str = "https://testnet.binancefuture.com";
const TESTNET_WS_URL: &str = "wss://stream.binancefuture.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenKeyResponse {
    listen_key: String,
}

/// 선물 WebSocket 스트림 클라이언트.
pub struct FuturesStreamClient {
    /// API 키 (listen key 발급/갱신용)
    api_key: String,
    /// REST 기본 URL
    rest_base_url: String,
    /// WebSocket 기본 URL
    ws_base_url: String,
    /// HTTP 클라이언트 (listen key 관리 전용)
    http: reqwest::Client,
    /// 공유 스트림 캐시
    cache: Arc<StreamCache>,
    /// 스트림 설정
    settings: StreamSettings,
}

impl FuturesStreamClient {
    /// 새 스트림 클라이언트를 생성합니다.
    pub fn new(
        api_key: impl Into<String>,
        testnet: bool,
        cache: Arc<StreamCache>,
        settings: StreamSettings,
    ) -> Self {
        let (rest_base_url, ws_base_url) = if testnet {
            (TESTNET_REST_URL.to_string(), TESTNET_WS_URL.to_string())
        } else {
            (MAINNET_REST_URL.to_string(), MAINNET_WS_URL.to_string())
        };

        Self {
            api_key: api_key.into(),
            rest_base_url,
            ws_base_url,
            http: reqwest::Client::new(),
            cache,
            settings,
        }
    }

    /// 공유 캐시를 반환합니다.
    pub fn cache(&self) -> &Arc<StreamCache> {
        &self.cache
    }

    /// 사용자 데이터 스트림을 시작합니다.
    ///
    /// listen key를 발급받아 연결하고, keep-alive 태스크와 수신 태스크를
    /// 띄웁니다.
    pub async fn start_user_stream(self: &Arc<Self>) -> GatewayResult<()> {
        Arc::clone(self).connect_user_stream(false).await
    }

    /// 마크 가격 결합 스트림을 시작합니다.
    pub async fn start_mark_price_stream(self: &Arc<Self>, symbols: &[String]) -> GatewayResult<()> {
        let streams: Vec<String> = symbols.iter().map(|s| Self::mark_price_stream(s)).collect();
        self.connect_combined_stream(streams, "mark price").await
    }

    /// 캔들 결합 스트림을 시작합니다.
    pub async fn start_kline_stream(
        self: &Arc<Self>,
        symbols: &[String],
        timeframe: Timeframe,
    ) -> GatewayResult<()> {
        let streams: Vec<String> = symbols
            .iter()
            .map(|s| Self::kline_stream(s, timeframe))
            .collect();
        self.connect_combined_stream(streams, "kline").await
    }

    /// 마크 가격 스트림 이름을 반환합니다.
    fn mark_price_stream(symbol: &str) -> String {
        format!("{}@markPrice@1s", symbol.to_lowercase())
    }

    /// 캔들 스트림 이름을 반환합니다.
    fn kline_stream(symbol: &str, timeframe: Timeframe) -> String {
        format!("{}@kline_{}", symbol.to_lowercase(), timeframe.interval())
    }

    /// 결합 스트림 URL을 생성합니다.
    fn combined_url(&self, streams: &[String]) -> String {
        format!("{}/stream?streams={}", self.ws_base_url, streams.join("/"))
    }

    /// listen key를 발급받습니다.
    async fn obtain_listen_key(&self) -> GatewayResult<String> {
        let url = format!("{}/fapi/v1/listenKey", self.rest_base_url);
        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(GatewayError::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Unauthorized(format!(
                "listen key request failed: {} - {}",
                status, body
            )));
        }

        let key: ListenKeyResponse = response.json().await.map_err(GatewayError::from)?;
        Ok(key.listen_key)
    }

    /// listen key를 갱신합니다.
    async fn keepalive_listen_key(&self) -> GatewayResult<()> {
        let url = format!("{}/fapi/v1/listenKey", self.rest_base_url);
        let response = self
            .http
            .put(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(GatewayError::from)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized(format!(
                "listen key keepalive failed: {}",
                response.status()
            )))
        }
    }

    /// 사용자 스트림에 연결하고 수신/keep-alive 태스크를 띄웁니다.
    ///
    /// `is_reconnect`가 true인 연결이 다시 종료되면 더 이상 시도하지
    /// 않습니다.
    fn connect_user_stream(
        self: Arc<Self>,
        is_reconnect: bool,
    ) -> BoxFuture<'static, GatewayResult<()>> {
        Box::pin(async move {
            let listen_key = self.obtain_listen_key().await?;
            let url = format!("{}/ws/{}", self.ws_base_url, listen_key);

            info!("Connecting user data stream");
            let (ws, _) = connect_async(url.as_str())
                .await
                .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
            info!("User data stream connected");

            let (_write, mut read) = ws.split();

            // keep-alive 태스크: 갱신 실패는 로그만 남기고 다음 주기에 재시도
            let keepalive_client = Arc::clone(&self);
            tokio::spawn(async move {
                let interval =
                    Duration::from_secs(keepalive_client.settings.keepalive_interval_secs);
                loop {
                    tokio::time::sleep(interval).await;
                    match keepalive_client.keepalive_listen_key().await {
                        Ok(()) => debug!("Listen key kept alive"),
                        Err(e) => warn!(error = %e, "Failed to keep listen key alive"),
                    }
                }
            });

            // 수신 태스크
            let client = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(message) = read.next().await {
                    match message {
                        Ok(Message::Text(text)) => client.cache.apply_user_frame(&text),
                        Ok(Message::Ping(_)) => debug!("Received ping"),
                        Ok(Message::Close(frame)) => {
                            warn!(?frame, "User data stream closed by server");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "User data stream error");
                            break;
                        }
                        _ => {}
                    }
                }

                if is_reconnect {
                    error!("Reconnected user stream terminated again; giving up");
                    return;
                }

                let delay = Duration::from_secs(client.settings.reconnect_delay_secs);
                info!(delay_secs = delay.as_secs(), "Scheduling user stream reconnect");
                tokio::time::sleep(delay).await;

                if let Err(e) = Arc::clone(&client).connect_user_stream(true).await {
                    error!(error = %e, "User stream reconnect failed");
                }
            });

            Ok(())
        })
    }

    /// 결합 스트림에 연결하고 수신 태스크를 띄웁니다.
    async fn connect_combined_stream(
        self: &Arc<Self>,
        streams: Vec<String>,
        label: &'static str,
    ) -> GatewayResult<()> {
        let url = self.combined_url(&streams);

        info!(count = streams.len(), "Connecting {} stream", label);
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| GatewayError::WebSocket(e.to_string()))?;
        info!("{} stream connected", label);

        let (_write, mut read) = ws.split();
        let client = Arc::clone(self);

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => client.cache.apply_market_frame(&text),
                    Ok(Message::Ping(_)) => debug!("Received ping"),
                    Ok(Message::Close(_)) => {
                        warn!("{} stream closed by server", label);
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "{} stream error", label);
                        break;
                    }
                    _ => {}
                }
            }
        });

        Ok(())
    }
}
