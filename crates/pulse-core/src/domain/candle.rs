//! 캔들(OHLCV) 값 타입.
//!
//! 거래소 kline API의 위치 기반 배열 응답을 불변 `Candle` 값으로 변환합니다.
//! 가격/거래량은 모두 `Decimal`이며, 생성 이후 수정되지 않습니다.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::provider::MarketError;

/// 필수 필드 개수 (open_time ~ quote_volume, 인덱스 0~7).
const REQUIRED_FIELDS: usize = 8;

// =============================================================================
// Candle
// =============================================================================

/// 하나의 시간 구간에 대한 불변 OHLCV 캔들.
///
/// kline API 응답 배열의 위치 스키마를 따릅니다:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
/// trade_count, taker_buy_base_volume, taker_buy_quote_volume, (무시)]`
///
/// 인덱스 8 이후 필드는 응답에 없으면 0으로 채워집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 시작 시간 (Unix 밀리초)
    pub open_time: i64,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량 (기초 자산)
    pub volume: Decimal,
    /// 종료 시간 (Unix 밀리초)
    pub close_time: i64,
    /// 거래대금 (견적 자산)
    pub quote_volume: Decimal,
    /// 거래 횟수
    pub trade_count: u64,
    /// 테이커 매수 거래량 (기초 자산)
    pub taker_buy_base_volume: Decimal,
    /// 테이커 매수 거래대금 (견적 자산)
    pub taker_buy_quote_volume: Decimal,
}

impl Candle {
    /// API 응답의 위치 기반 배열 한 건을 `Candle`로 변환.
    ///
    /// 인덱스 0~7은 필수이며, 부족하면 `MarketError::Format`을 반환합니다.
    /// `open_time < close_time` 불변식도 이 시점에 검증합니다.
    pub fn from_row(row: &[Value]) -> Result<Self, MarketError> {
        if row.len() < REQUIRED_FIELDS {
            return Err(MarketError::Format(format!(
                "캔들 배열 길이 부족: {} (최소 {})",
                row.len(),
                REQUIRED_FIELDS
            )));
        }

        let open_time = int_at(row, 0)?;
        let close_time = int_at(row, 6)?;

        if open_time >= close_time {
            return Err(MarketError::Format(format!(
                "캔들 시간 역전: open_time={} >= close_time={}",
                open_time, close_time
            )));
        }

        Ok(Self {
            open_time,
            open: decimal_at(row, 1)?,
            high: decimal_at(row, 2)?,
            low: decimal_at(row, 3)?,
            close: decimal_at(row, 4)?,
            volume: decimal_at(row, 5)?,
            close_time,
            quote_volume: decimal_at(row, 7)?,
            trade_count: uint_or_zero(row, 8)?,
            taker_buy_base_volume: decimal_or_zero(row, 9)?,
            taker_buy_quote_volume: decimal_or_zero(row, 10)?,
        })
    }

    /// 시작 시간을 `DateTime<Utc>`로 반환.
    pub fn open_time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.open_time)
    }

    /// 종료 시간을 `DateTime<Utc>`로 반환.
    pub fn close_time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.close_time)
    }
}

// =============================================================================
// 필드 파싱 헬퍼
// =============================================================================

fn invalid_field(index: usize, value: &Value) -> MarketError {
    MarketError::Format(format!("캔들 필드 파싱 실패 (index {}): {}", index, value))
}

/// 정수 필드 파싱 (JSON number 또는 문자열 허용).
fn int_at(row: &[Value], index: usize) -> Result<i64, MarketError> {
    let value = &row[index];
    match value {
        Value::Number(n) => n.as_i64().ok_or_else(|| invalid_field(index, value)),
        Value::String(s) => s.parse().map_err(|_| invalid_field(index, value)),
        _ => Err(invalid_field(index, value)),
    }
}

/// 선택 부호 없는 정수 필드 파싱 (없으면 0, 형식이 틀리면 에러).
fn uint_or_zero(row: &[Value], index: usize) -> Result<u64, MarketError> {
    let Some(value) = row.get(index) else {
        return Ok(0);
    };
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid_field(index, value)),
        Value::String(s) => s.parse().map_err(|_| invalid_field(index, value)),
        _ => Err(invalid_field(index, value)),
    }
}

/// Decimal 필드 파싱 (거래소는 대부분 문자열로 내려줌).
fn decimal_at(row: &[Value], index: usize) -> Result<Decimal, MarketError> {
    let value = &row[index];
    match value {
        Value::String(s) => Decimal::from_str(s).map_err(|_| invalid_field(index, value)),
        Value::Number(n) => {
            Decimal::from_str(&n.to_string()).map_err(|_| invalid_field(index, value))
        }
        _ => Err(invalid_field(index, value)),
    }
}

/// 선택 Decimal 필드 파싱 (없으면 0).
fn decimal_or_zero(row: &[Value], index: usize) -> Result<Decimal, MarketError> {
    if index < row.len() {
        decimal_at(row, index)
    } else {
        Ok(Decimal::ZERO)
    }
}

// =============================================================================
// 테스트
// =============================================================================
