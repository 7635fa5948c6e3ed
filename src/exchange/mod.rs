//! 거래소 연동 계층

pub mod binance_spot;
pub mod mocks;
pub mod traits;

pub use binance_spot::BinanceSpotExchange;
pub use mocks::{LimitFill, MockExchange};
pub use traits::{Exchange, SharedExchange};
