//! kline 인터벌 토큰.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::provider::MarketError;

/// kline API가 허용하는 인터벌 토큰.
///
/// 쿼리 파라미터로 그대로 직렬화됩니다 (`1m`, `60m`, `1M` 등).
/// `1h` 같은 비표준 토큰은 여기서 걸러집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "60m")]
    SixtyMinutes,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl KlineInterval {
    /// API 쿼리 파라미터용 토큰 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::SixtyMinutes => "60m",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1M",
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KlineInterval {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Self::OneMinute),
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "60m" => Ok(Self::SixtyMinutes),
            "4h" => Ok(Self::FourHours),
            "1d" => Ok(Self::OneDay),
            "1w" => Ok(Self::OneWeek),
            "1M" => Ok(Self::OneMonth),
            other => Err(MarketError::Config(format!(
                "지원하지 않는 인터벌: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_tokens() {
        for token in ["1m", "5m", "15m", "30m", "60m", "4h", "1d", "1w", "1M"] {
            let interval: KlineInterval = token.parse().unwrap();
            assert_eq!(interval.as_str(), token);
        }
    }

    #[test]
    fn test_rejects_unknown_token() {
        assert!("1h".parse::<KlineInterval>().is_err());
        assert!("".parse::<KlineInterval>().is_err());
    }

    #[test]
    fn test_serde_rename() {
        let json = serde_json::to_string(&KlineInterval::OneMonth).unwrap();
        assert_eq!(json, "\"1M\"");
        let parsed: KlineInterval = serde_json::from_str("\"60m\"").unwrap();
        assert_eq!(parsed, KlineInterval::SixtyMinutes);
    }
}
