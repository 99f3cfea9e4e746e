//! 거래소 중립 시장 데이터 코어.
//!
//! 캔들(OHLCV) 값 타입, 인터벌 토큰, 데이터 제공자 추상화를 제공합니다.
//! 거래소별 REST 클라이언트는 `pulse-exchange`, 폴링 루프는
//! `pulse-collector`에 있습니다.

pub mod domain;

pub use domain::candle::Candle;
pub use domain::interval::KlineInterval;
pub use domain::provider::{CandleProvider, MarketError};
