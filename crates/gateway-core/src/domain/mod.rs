//! 선물 게이트웨이의 도메인 모델.

pub mod account;
pub mod market_data;
pub mod order;
pub mod position;
pub mod trade;

pub use account::{AccountSnapshot, AssetBalance};
pub use market_data::Kline;
pub use order::{CloseResult, OrderFill, OrderRecord, OrderStatus, Side};
pub use position::{Position, PositionSide};
pub use trade::TradeEntry;
