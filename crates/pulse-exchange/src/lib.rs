//! 거래소 REST 커넥터.
//!
//! 시장 데이터 엔드포인트 호출을 재시도/백오프/Rate limit 처리와 함께
//! 수행하고, 검증된 `Candle` 시퀀스로 디코딩합니다.
//!
//! # 구조
//!
//! - [`connector::mexc::MexcClient`]: MEXC kline REST 클라이언트
//! - [`retry`]: 재시도 정책과 재시도 가능 코드 판별

pub mod connector;
pub mod retry;

pub use connector::mexc::{MexcClient, MexcConfig, RateLimitStatus};
pub use retry::{is_retryable_code, RetryPolicy};
