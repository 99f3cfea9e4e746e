//! 환경변수 기반 설정 모듈.

use std::time::Duration;

use pulse_core::KlineInterval;
use pulse_exchange::{MexcConfig, RetryPolicy};

use crate::error::{CollectorError, Result};
use crate::poller::PollerConfig;

/// Collector 전체 설정.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// MEXC 클라이언트 설정
    pub mexc: MexcSettings,
    /// 폴러 설정
    pub poller: PollerSettings,
}

/// MEXC 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct MexcSettings {
    /// API 베이스 URL
    pub base_url: String,
    /// 최대 재시도 횟수 (초기 시도 제외)
    pub max_retries: u32,
    /// 재시도 기본 대기 시간 (초)
    pub retry_delay_secs: u64,
    /// 요청당 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// Rate limit reset 시각을 모를 때의 대기 시간 (초)
    pub rate_limit_fallback_secs: u64,
}

/// 폴러 설정.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// 대상 심볼
    pub symbol: String,
    /// kline 인터벌
    pub interval: KlineInterval,
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 폴링당 조회 kline 개수
    pub kline_limit: u32,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드 (`.env` 파일이 있으면 먼저 읽음).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let interval_token = env_var_string("INTERVAL", "60m");
        let interval: KlineInterval = interval_token
            .parse()
            .map_err(|_| CollectorError::Config(format!("잘못된 INTERVAL: {}", interval_token)))?;

        Ok(Self {
            mexc: MexcSettings {
                base_url: env_var_string("MEXC_BASE_URL", "https://api.mexc.com"),
                max_retries: env_var_parse("MAX_RETRIES", 3),
                retry_delay_secs: env_var_parse("RETRY_DELAY", 5),
                request_timeout_secs: env_var_parse("REQUEST_TIMEOUT", 30),
                rate_limit_fallback_secs: env_var_parse("RATE_LIMIT_FALLBACK", 60),
            },
            poller: PollerSettings {
                symbol: env_var_string("DEFAULT_SYMBOL", "BTCUSDT"),
                interval,
                poll_interval_secs: env_var_parse("POLL_INTERVAL", 60),
                kline_limit: env_var_parse("KLINE_LIMIT", 100),
            },
        })
    }
}

impl MexcSettings {
    /// 클라이언트 구성으로 변환.
    pub fn client_config(&self) -> MexcConfig {
        MexcConfig {
            base_url: self.base_url.clone(),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: Duration::from_secs(self.retry_delay_secs),
                rate_limit_fallback: Duration::from_secs(self.rate_limit_fallback_secs),
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

impl PollerSettings {
    /// 폴러 구성으로 변환.
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            symbol: self.symbol.clone(),
            interval: self.interval,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            kline_limit: self.kline_limit,
        }
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용).
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 문자열 로드 (없으면 기본값).
fn env_var_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
