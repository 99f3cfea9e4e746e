//! 시장 데이터 제공자 추상화.
//!
//! 캔들 데이터를 공급하는 쪽(REST 클라이언트)과 소비하는 쪽(폴러, 전략)을
//! 분리하기 위한 거래소 중립 인터페이스입니다. 폴러는 구체 클라이언트가
//! 아니라 이 trait에 의존합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use super::candle::Candle;
use super::interval::KlineInterval;

// =============================================================================
// 에러 타입
// =============================================================================

/// 시장 데이터 조회 에러.
///
/// 각 논리 호출은 재시도 예산을 모두 소진한 뒤 아래 변형 중 정확히
/// 하나로 실패합니다. 부분 결과는 반환하지 않습니다.
#[derive(Debug, Error)]
pub enum MarketError {
    /// 네트워크 수준 실패로 재시도 예산 소진
    #[error("네트워크 에러로 재시도 {attempts}회 소진: {last}")]
    TransportExhausted { attempts: u32, last: String },

    /// 구조화된 상위 API 에러 (재시도 불가 또는 재시도 소진)
    #[error("API 에러 {code}: {message}")]
    Api { code: i64, message: String },

    /// Rate limit 상태로 재시도 예산 소진
    #[error("Rate limit으로 재시도 {attempts}회 소진")]
    RateLimitExhausted { attempts: u32 },

    /// 비어 있지 않아야 하는 결과가 비어 있음
    #[error("데이터 없음: {0}")]
    NoData(String),

    /// 응답 형태가 문서화된 계약과 다름 (재시도하지 않음)
    #[error("응답 형식 오류: {0}")]
    Format(String),

    /// 잘못된 설정 (구성 시점의 치명적 에러)
    #[error("설정 오류: {0}")]
    Config(String),
}

// =============================================================================
// CandleProvider Trait
// =============================================================================

/// 캔들 데이터 제공자 trait.
///
/// 재시도/백오프는 구현체 내부에서 처리되며, 호출자는 완전히 검증된
/// 캔들 시퀀스 또는 단일 에러만 받습니다.
#[async_trait]
pub trait CandleProvider: Send + Sync {
    /// 캔들 시퀀스 조회.
    ///
    /// `limit`은 1000으로 클램프됩니다. 반환 순서는 서버가 내려주는
    /// `open_time` 오름차순을 그대로 따릅니다 (클라이언트 재정렬 없음).
    async fn get_candles(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: u32,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Vec<Candle>, MarketError>;

    /// 최신 종가 조회.
    ///
    /// 결과가 비어 있으면 `MarketError::NoData`를 반환합니다.
    async fn get_latest_price(
        &self,
        symbol: &str,
        interval: KlineInterval,
    ) -> Result<Decimal, MarketError>;

    /// 제공자 이름 (로그 용도).
    fn provider_name(&self) -> &str;
}
