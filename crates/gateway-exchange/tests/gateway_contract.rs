//! 게이트웨이 계약 통합 테스트.
//!
//! 전략 코드가 `FuturesExchange` trait에만 의존한 채 시뮬레이션
//! 백엔드를 구동하는 흐름을 검증합니다.

use std::sync::Arc;

use chrono::DateTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use gateway_core::{CloseResult, Side};
use gateway_exchange::{FuturesExchange, SimulatedConfig, SimulatedFuturesExchange};

/// trait 객체만으로 동작하는 전략 헬퍼: 모든 포지션을 청산한다.
async fn flatten_all(gateway: Arc<dyn FuturesExchange>) -> Vec<CloseResult> {
    let positions = gateway.positions(None).await.unwrap_or_default();
    let mut results = Vec::new();
    for position in positions {
        if let Ok(result) = gateway.close_position(&position.symbol).await {
            results.push(result);
        }
    }
    results
}

#[tokio::test]
async fn test_strategy_depends_only_on_the_contract() {
    let exchange = Arc::new(SimulatedFuturesExchange::new(
        SimulatedConfig::default()
            .with_initial_balance(dec!(10000))
            .with_fee_rate(dec!(0.0004)),
    ));

    exchange.set_price("BTCUSDT", dec!(50000)).await;
    exchange.set_price("ETHUSDT", dec!(3000)).await;
    exchange
        .place_market_order("BTCUSDT", Side::Buy, dec!(0.1))
        .await
        .unwrap();
    exchange
        .place_market_order("ETHUSDT", Side::Sell, dec!(1))
        .await
        .unwrap();

    // 전략은 trait 객체만 봄
    let gateway: Arc<dyn FuturesExchange> = exchange.clone();
    assert_eq!(gateway.name(), "simulated-futures");

    let results = flatten_all(gateway).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.fill().is_some()));

    assert!(exchange.positions(None).await.unwrap().is_empty());
    assert_eq!(exchange.trade_history().await.len(), 2);
}

#[tokio::test]
async fn test_backtest_drive_cycle() {
    let exchange = SimulatedFuturesExchange::new(
        SimulatedConfig::default()
            .with_initial_balance(dec!(1000))
            .with_fee_rate(dec!(0.001)),
    );

    // 백테스트 드라이버 루프: 틱마다 시각과 가격을 설정하고 계약을 호출
    let ticks = [
        (1_700_000_000_000i64, dec!(100)),
        (1_700_000_060_000, dec!(104)),
        (1_700_000_120_000, dec!(110)),
    ];

    for (i, (ts, price)) in ticks.iter().enumerate() {
        exchange
            .set_time(DateTime::from_timestamp_millis(*ts).unwrap())
            .await;
        exchange.set_price("BTCUSDT", *price).await;

        match i {
            0 => {
                exchange
                    .place_market_order("BTCUSDT", Side::Buy, dec!(1))
                    .await
                    .unwrap();
            }
            2 => {
                let result = exchange.close_position("BTCUSDT").await.unwrap();
                let fill = result.fill().expect("청산 체결");
                assert_eq!(
                    fill.timestamp,
                    DateTime::from_timestamp_millis(*ts).unwrap()
                );
            }
            _ => {}
        }
    }

    // 진입 수수료 0.1, 실현 손익 (110-100) - 0.11 = 9.89
    assert_eq!(exchange.balance().await, dec!(1009.79));

    let trades = exchange.trade_history().await;
    assert_eq!(trades.len(), 1);
    assert_eq!(
        trades[0].entry_time,
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    );
    assert_eq!(
        trades[0].exit_time,
        DateTime::from_timestamp_millis(1_700_000_120_000).unwrap()
    );
}

#[tokio::test]
async fn test_partial_then_full_close_accounting() {
    let exchange = SimulatedFuturesExchange::new(
        SimulatedConfig::default()
            .with_initial_balance(dec!(1000))
            .with_fee_rate(Decimal::ZERO),
    );

    exchange.set_price("BTCUSDT", dec!(100)).await;
    exchange
        .place_market_order("BTCUSDT", Side::Buy, dec!(4))
        .await
        .unwrap();

    exchange.set_price("BTCUSDT", dec!(110)).await;

    // 절반 청산: (110-100) * 2 = 20
    exchange
        .close_position_partial("BTCUSDT", dec!(0.5))
        .await
        .unwrap();
    assert_eq!(exchange.balance().await, dec!(1020));

    // 남은 절반 전량 청산: 추가 20
    let result = exchange.close_position("BTCUSDT").await.unwrap();
    assert!(matches!(result, CloseResult::Closed(_)));
    assert_eq!(exchange.balance().await, dec!(1040));

    let trades = exchange.trade_history().await;
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].quantity, dec!(2));
    assert_eq!(trades[1].quantity, dec!(2));
}
