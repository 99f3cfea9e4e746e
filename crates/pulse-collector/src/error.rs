//! 에러 타입 정의.

use thiserror::Error;

use pulse_core::MarketError;

/// Collector 에러 타입.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// 설정 에러
    #[error("설정 오류: {0}")]
    Config(String),

    /// 거래소/시장 데이터 에러
    #[error("거래소 오류: {0}")]
    Exchange(#[from] MarketError),

    /// I/O 에러 (신호 처리 등)
    #[error("I/O 오류: {0}")]
    Io(#[from] std::io::Error),
}

/// Result 타입 별칭.
pub type Result<T> = std::result::Result<T, CollectorError>;
