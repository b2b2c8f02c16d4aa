//! 백테스팅 및 모의투자를 위한 시뮬레이션 게이트웨이.

pub mod exchange;

pub use exchange::{SimulatedConfig, SimulatedFuturesExchange};
