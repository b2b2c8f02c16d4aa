//! 실시간 시장/계좌 데이터 스트림 및 캐시.

pub mod cache;
pub mod client;

pub use cache::StreamCache;
pub use client::FuturesStreamClient;
