//! 재시도 정책.
//!
//! 네트워크 오류, Rate limit, 일시적 서버 오류에 대한 재시도 횟수와
//! 대기 시간을 정의합니다. 네트워크/Rate limit/API 재시도는 하나의
//! 공유 예산(`max_retries`)을 소비합니다.

use std::time::Duration;

/// 재시도 가능한 API 에러 코드 판별.
///
/// 서버 측 5xx와 거래소의 일시적 코드(타임스탬프/논스 오류)만
/// 재시도 대상입니다. I/O와 분리된 순수 함수로, 단독 테스트가 가능합니다.
pub fn is_retryable_code(code: i64) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | -1001 | -1021)
}

/// 재시도 설정.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 최대 재시도 횟수 (초기 시도 제외).
    pub max_retries: u32,
    /// 기본 대기 시간 (지수 백오프의 밑).
    pub base_delay: Duration,
    /// Rate limit 시 reset 시각을 모를 때의 고정 대기 시간.
    pub rate_limit_fallback: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            rate_limit_fallback: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// 빠른 재시도 설정 (테스트/저지연 환경용).
    pub fn fast() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(10),
            rate_limit_fallback: Duration::from_millis(50),
        }
    }

    /// 재시도 없음 (단일 시도).
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// `attempt`번째 실패 후의 지수 백오프 대기 시간 (`base * 2^attempt`).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_codes() {
        for code in [500, 502, 503, 504, -1001, -1021] {
            assert!(is_retryable_code(code), "code {} should retry", code);
        }
    }

    #[test]
    fn test_non_retryable_codes() {
        for code in [400, 401, 403, 404, 418, -1121, -2010, 0] {
            assert!(!is_retryable_code(code), "code {} should not retry", code);
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(5),
            ..Default::default()
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(5));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(20));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(40));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy::default();
        // 시프트 오버플로에도 패닉 없이 포화
        let delay = policy.backoff_delay(40);
        assert!(delay >= policy.backoff_delay(3));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryPolicy::no_retry().max_retries, 0);
        assert!(RetryPolicy::fast().base_delay < Duration::from_secs(1));
    }
}
