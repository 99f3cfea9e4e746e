//! kline 폴링 수집기.
//!
//! `CandleProvider`에서 주기적으로 캔들을 조회하고, 종료 시간
//! high-water mark로 신규 데이터를 판별하여 콜백에 전달합니다.

pub mod config;
pub mod error;
pub mod poller;

pub use config::CollectorConfig;
pub use error::{CollectorError, Result};
pub use poller::{handler_fn, CandleHandler, KlinePoller, PollerConfig};
