//! MEXC kline REST 클라이언트.
//!
//! `/api/v3/klines` 호출을 재시도/백오프/Rate limit 처리와 함께 수행하고,
//! 위치 기반 배열 응답을 `Candle` 시퀀스로 디코딩합니다.
//!
//! # 재시도 규칙
//!
//! 하나의 논리 호출 안에서 네트워크 오류, 429, 재시도 가능 API 코드는
//! 공유 예산(`RetryPolicy::max_retries`)을 소비합니다. 계약 위반
//! (응답 형식 오류)과 재시도 불가 API 코드는 즉시 실패합니다.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Response, StatusCode, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pulse_core::{Candle, CandleProvider, KlineInterval, MarketError};

use crate::retry::{is_retryable_code, RetryPolicy};

/// kline 조회 엔드포인트.
const KLINE_ENDPOINT: &str = "/api/v3/klines";

/// 서버가 허용하는 최대 kline 개수. 초과 요청은 거부하지 않고 클램프.
const KLINE_LIMIT_MAX: u32 = 1000;

/// 1분 롤링 윈도우의 요청 가중치 한도.
pub const REQUEST_WEIGHT_CAPACITY: u32 = 1200;

/// 사용 가중치를 보고하는 응답 헤더.
const USED_WEIGHT_HEADER: &str = "x-mbx-used-weight-1m";

// =============================================================================
// 설정
// =============================================================================

/// MEXC 클라이언트 설정.
#[derive(Debug, Clone)]
pub struct MexcConfig {
    /// API 베이스 URL
    pub base_url: String,
    /// 재시도 정책
    pub retry: RetryPolicy,
    /// 요청당 타임아웃
    pub request_timeout: Duration,
}

impl Default for MexcConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mexc.com".to_string(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Rate limit 상태
// =============================================================================

/// 현재 Rate limit 상태 스냅샷 (권고 수준, 백오프 판단에만 사용).
#[derive(Debug, Clone, Copy)]
pub struct RateLimitStatus {
    /// 롤링 윈도우 내 남은 요청 가중치
    pub remaining: u32,
    /// Rate limit 해제 예상 시각 (429의 Retry-After에서 기록)
    pub reset_at: Option<Instant>,
}

#[derive(Debug)]
struct RateLimitState {
    remaining: u32,
    reset_at: Option<Instant>,
}

// =============================================================================
// 요청 1회 결과
// =============================================================================

/// 단일 HTTP 시도의 분류 결과. 재시도 정책은 상위 루프가 적용합니다.
enum Outcome {
    Ok(Value),
    Transport(String),
    RateLimited,
    Api { code: i64, message: String },
    Format(String),
}

// =============================================================================
// 클라이언트
// =============================================================================

/// MEXC REST API 클라이언트.
///
/// 내부 전송 핸들은 첫 요청 시 생성되어 호출 간 재사용되며,
/// [`close`](Self::close)로 해제한 뒤에도 다음 요청에서 다시 열립니다.
/// 요청끼리 독립적이므로 하나의 인스턴스를 여러 폴러가 공유해도 됩니다.
#[derive(Debug)]
pub struct MexcClient {
    config: MexcConfig,
    base_url: String,
    http: Mutex<Option<reqwest::Client>>,
    rate_limit: Mutex<RateLimitState>,
}

impl MexcClient {
    /// 새 클라이언트 생성.
    ///
    /// `base_url`이 올바른 URL이 아니면 `MarketError::Config`로 실패합니다.
    /// 잘못된 설정은 여기서만 치명적이며, 이후 운영 중 에러는 모두
    /// 호출 단위로 반환됩니다.
    pub fn new(config: MexcConfig) -> Result<Self, MarketError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| MarketError::Config(format!("잘못된 base_url '{}': {}", base_url, e)))?;

        Ok(Self {
            config,
            base_url,
            http: Mutex::new(None),
            rate_limit: Mutex::new(RateLimitState {
                remaining: REQUEST_WEIGHT_CAPACITY,
                reset_at: None,
            }),
        })
    }

    /// 기본 설정으로 생성.
    pub fn with_defaults() -> Result<Self, MarketError> {
        Self::new(MexcConfig::default())
    }

    /// 전송 핸들 해제.
    ///
    /// 보유한 커넥션 풀을 모두 닫습니다. 여러 번 호출해도 안전하며,
    /// 이후 요청은 새 핸들을 투명하게 다시 엽니다.
    pub async fn close(&self) {
        let mut http = self.http.lock().await;
        if http.take().is_some() {
            debug!("MEXC 전송 핸들 해제");
        }
    }

    /// Rate limit 상태 스냅샷.
    pub async fn rate_limit(&self) -> RateLimitStatus {
        let state = self.rate_limit.lock().await;
        RateLimitStatus {
            remaining: state.remaining,
            reset_at: state.reset_at,
        }
    }

    /// 전송 핸들 확보 (없으면 생성).
    async fn ensure_http(&self) -> Result<reqwest::Client, MarketError> {
        let mut http = self.http.lock().await;
        if let Some(client) = http.as_ref() {
            return Ok(client.clone());
        }

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .user_agent("pulse-collector/0.3")
            .build()
            .map_err(|e| MarketError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        *http = Some(client.clone());
        Ok(client)
    }

    /// 응답 메타데이터에서 Rate limit 상태 갱신 (기회적, 권고 수준).
    async fn update_rate_limit(&self, response: &Response) {
        let mut state = self.rate_limit.lock().await;

        if let Some(used) = response
            .headers()
            .get(USED_WEIGHT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
        {
            state.remaining = REQUEST_WEIGHT_CAPACITY.saturating_sub(used);
            debug!(remaining = state.remaining, "요청 가중치 잔량 갱신");
        }

        if let Some(secs) = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
        {
            state.reset_at = Some(Instant::now() + Duration::from_secs(secs));
        }
    }

    /// Rate limit 해제까지의 대기 시간.
    ///
    /// reset 시각이 기록되어 있고 미래면 그때까지 + 1초, 아니면 고정
    /// 폴백을 사용합니다.
    async fn rate_limit_wait(&self) -> Duration {
        let state = self.rate_limit.lock().await;
        match state.reset_at {
            Some(reset_at) if reset_at > Instant::now() => {
                reset_at.saturating_duration_since(Instant::now()) + Duration::from_secs(1)
            }
            _ => self.config.retry.rate_limit_fallback,
        }
    }

    /// 단일 HTTP 시도 수행 및 결과 분류.
    async fn attempt_once(
        &self,
        http: &reqwest::Client,
        url: &str,
        params: &[(&str, String)],
    ) -> Outcome {
        let response = match http.get(url).query(params).send().await {
            Ok(r) => r,
            Err(e) => return Outcome::Transport(e.to_string()),
        };

        self.update_rate_limit(&response).await;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Outcome::RateLimited;
        }

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = parse_error_payload(status.as_u16(), &body);
            return Outcome::Api { code, message };
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        let body = match response.text().await {
            Ok(b) => b,
            // 본문 수신 중 끊김도 네트워크 수준 실패로 취급
            Err(e) => return Outcome::Transport(e.to_string()),
        };

        if !is_json {
            return Outcome::Format("JSON이 아닌 성공 응답".to_string());
        }

        match serde_json::from_str(&body) {
            Ok(value) => Outcome::Ok(value),
            Err(e) => Outcome::Format(format!("응답 본문 파싱 실패: {}", e)),
        }
    }

    /// 재시도 루프가 포함된 논리 요청 실행.
    ///
    /// 완전히 검증된 JSON 값 또는 단일 에러만 반환합니다. 재시도는
    /// 호출자에게 투명합니다.
    async fn request_json(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, MarketError> {
        let http = self.ensure_http().await?;
        let url = format!("{}{}", self.base_url, endpoint);
        let retry = &self.config.retry;
        let mut attempt: u32 = 0;

        loop {
            debug!(endpoint, attempt, "시장 데이터 요청");

            let delay = match self.attempt_once(&http, &url, params).await {
                Outcome::Ok(value) => return Ok(value),
                // 계약 위반은 일시 장애가 아니므로 재시도하지 않음
                Outcome::Format(msg) => return Err(MarketError::Format(msg)),
                Outcome::Transport(last) => {
                    if attempt >= retry.max_retries {
                        return Err(MarketError::TransportExhausted {
                            attempts: attempt,
                            last,
                        });
                    }
                    let delay = retry.backoff_delay(attempt);
                    warn!(
                        error = %last,
                        attempt = attempt + 1,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "네트워크 오류, 백오프 후 재시도"
                    );
                    delay
                }
                Outcome::RateLimited => {
                    if attempt >= retry.max_retries {
                        return Err(MarketError::RateLimitExhausted { attempts: attempt });
                    }
                    let delay = self.rate_limit_wait().await;
                    warn!(
                        attempt = attempt + 1,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limit 도달, 해제 대기"
                    );
                    delay
                }
                Outcome::Api { code, message } => {
                    if !is_retryable_code(code) || attempt >= retry.max_retries {
                        return Err(MarketError::Api { code, message });
                    }
                    let delay = retry.backoff_delay(attempt);
                    warn!(
                        code,
                        message = %message,
                        attempt = attempt + 1,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "일시적 API 오류, 백오프 후 재시도"
                    );
                    delay
                }
            };

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// 캔들 시퀀스 조회.
    ///
    /// `limit`은 1000으로 클램프됩니다. 반환 순서는 서버가 내려주는
    /// `open_time` 오름차순을 그대로 신뢰합니다.
    pub async fn get_candles(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: u32,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Vec<Candle>, MarketError> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.as_str().to_string()),
            ("limit", limit.min(KLINE_LIMIT_MAX).to_string()),
        ];
        if let Some(start) = start_time {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_time {
            params.push(("endTime", end.to_string()));
        }

        info!(symbol, %interval, limit, "kline 조회");

        let value = self.request_json(KLINE_ENDPOINT, &params).await?;

        let Value::Array(rows) = value else {
            return Err(MarketError::Format(
                "응답 최상위가 배열이 아님".to_string(),
            ));
        };

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            let row = row
                .as_array()
                .ok_or_else(|| MarketError::Format("캔들 항목이 배열이 아님".to_string()))?;
            candles.push(Candle::from_row(row)?);
        }

        if let Some(last) = candles.last() {
            debug!(
                symbol,
                count = candles.len(),
                close_time = last.close_time,
                close = %last.close,
                "kline 조회 완료"
            );
        }

        Ok(candles)
    }

    /// 최신 종가 조회 (`limit=1` kline의 close).
    pub async fn get_latest_price(
        &self,
        symbol: &str,
        interval: KlineInterval,
    ) -> Result<Decimal, MarketError> {
        let candles = self.get_candles(symbol, interval, 1, None, None).await?;

        candles
            .first()
            .map(|c| c.close)
            .ok_or_else(|| MarketError::NoData(format!("{}에 대한 kline 없음", symbol)))
    }
}

// =============================================================================
// CandleProvider 구현
// =============================================================================

#[async_trait]
impl CandleProvider for MexcClient {
    async fn get_candles(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: u32,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Vec<Candle>, MarketError> {
        MexcClient::get_candles(self, symbol, interval, limit, start_time, end_time).await
    }

    async fn get_latest_price(
        &self,
        symbol: &str,
        interval: KlineInterval,
    ) -> Result<Decimal, MarketError> {
        MexcClient::get_latest_price(self, symbol, interval).await
    }

    fn provider_name(&self) -> &str {
        "mexc"
    }
}

// =============================================================================
// 에러 페이로드 파싱
// =============================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorPayload {
    code: Option<i64>,
    msg: Option<String>,
}

/// 에러 응답 본문에서 `{code, msg}` 추출.
///
/// 구조화된 페이로드가 아니면 HTTP 상태 코드와 원문을 그대로 사용합니다.
fn parse_error_payload(status: u16, body: &str) -> (i64, String) {
    if let Ok(payload) = serde_json::from_str::<ApiErrorPayload>(body) {
        let code = payload.code.unwrap_or(status as i64);
        let message = payload.msg.unwrap_or_else(|| body.to_string());
        return (code, message);
    }
    (status as i64, body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_payload_structured() {
        let (code, message) = parse_error_payload(400, r#"{"code":-1121,"msg":"Invalid symbol"}"#);
        assert_eq!(code, -1121);
        assert_eq!(message, "Invalid symbol");
    }

    #[test]
    fn test_parse_error_payload_missing_fields() {
        let (code, message) = parse_error_payload(503, "{}");
        assert_eq!(code, 503);
        assert_eq!(message, "{}");
    }

    #[test]
    fn test_parse_error_payload_raw_body() {
        let (code, message) = parse_error_payload(502, "Bad Gateway");
        assert_eq!(code, 502);
        assert_eq!(message, "Bad Gateway");
    }

    #[test]
    fn test_new_rejects_invalid_base_url() {
        let config = MexcConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        let err = MexcClient::new(config).unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = MexcConfig {
            base_url: "https://api.mexc.com/".to_string(),
            ..Default::default()
        };
        let client = MexcClient::new(config).unwrap();
        assert_eq!(client.base_url, "https://api.mexc.com");
    }
}
