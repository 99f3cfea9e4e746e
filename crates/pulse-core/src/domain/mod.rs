//! 도메인 타입 모듈.

pub mod candle;
pub mod interval;
pub mod provider;

pub use candle::Candle;
pub use interval::KlineInterval;
pub use provider::{CandleProvider, MarketError};
