//! MexcClient 통합 테스트.
//!
//! 단발성 응답은 mockito로, 실패 후 성공 같은 순서 있는 시나리오는
//! 스크립트 기반 TCP 응답기로 검증합니다.

use std::time::Duration;

use mockito::Matcher;
use rust_decimal_macros::dec;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use pulse_core::{KlineInterval, MarketError};
use pulse_exchange::{MexcClient, MexcConfig, RetryPolicy};

// =============================================================================
// 공용 픽스처
// =============================================================================

fn kline_rows() -> serde_json::Value {
    serde_json::json!([
        [
            1609459200000i64, "29000.00", "29500.00", "28800.00", "29200.00",
            "150.5", 1609462800000i64, "4380000.00", 1250, "75.25", "2190000.00", "0"
        ],
        [
            1609462800000i64, "29200.00", "29600.00", "29100.00", "29400.00",
            "200.0", 1609466400000i64, "5880000.00", 1500, "100.0", "2940000.00", "0"
        ]
    ])
}

fn fast_client(base_url: &str) -> MexcClient {
    MexcClient::new(MexcConfig {
        base_url: base_url.to_string(),
        retry: RetryPolicy::fast(),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

fn client_with_retries(base_url: &str, max_retries: u32) -> MexcClient {
    MexcClient::new(MexcConfig {
        base_url: base_url.to_string(),
        retry: RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(10),
            rate_limit_fallback: Duration::from_millis(50),
        },
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

// =============================================================================
// 스크립트 기반 TCP 응답기
// =============================================================================

/// 접속 순서대로 소비되는 응답 시나리오.
enum Scripted {
    /// 요청을 읽지 않고 즉시 연결을 끊음 (네트워크 수준 실패 유발)
    Hangup,
    /// 지정한 상태/본문으로 응답 후 연결 종료
    Respond {
        status: u16,
        body: String,
        retry_after: Option<u64>,
    },
}

impl Scripted {
    fn ok_klines() -> Self {
        Self::Respond {
            status: 200,
            body: kline_rows().to_string(),
            retry_after: None,
        }
    }

    fn rate_limited() -> Self {
        Self::Respond {
            status: 429,
            body: String::new(),
            retry_after: None,
        }
    }
}

/// 스크립트의 각 항목을 연결 1건씩 소비하는 미니 HTTP 서버 실행.
async fn scripted_server(script: Vec<Scripted>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for step in script {
            let (mut sock, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            match step {
                Scripted::Hangup => drop(sock),
                Scripted::Respond {
                    status,
                    body,
                    retry_after,
                } => {
                    // 요청 헤더 끝까지 읽은 뒤 응답
                    let mut buf = [0u8; 4096];
                    let mut seen: Vec<u8> = Vec::new();
                    loop {
                        match sock.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                seen.extend_from_slice(&buf[..n]);
                                if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                                    break;
                                }
                            }
                        }
                    }

                    let extra = retry_after
                        .map(|secs| format!("retry-after: {}\r\n", secs))
                        .unwrap_or_default();
                    let response = format!(
                        "HTTP/1.1 {} Scripted\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n{}\r\n{}",
                        status,
                        body.len(),
                        extra,
                        body
                    );
                    let _ = sock.write_all(response.as_bytes()).await;
                    let _ = sock.shutdown().await;
                }
            }
        }
    });

    format!("http://{}", addr)
}

// =============================================================================
// mockito: 성공 경로 및 재시도 불가 에러
// =============================================================================

#[tokio::test]
async fn get_candles_builds_query_and_decodes() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
            Matcher::UrlEncoded("interval".into(), "60m".into()),
            Matcher::UrlEncoded("limit".into(), "1000".into()),
            Matcher::UrlEncoded("startTime".into(), "1609459200000".into()),
            Matcher::UrlEncoded("endTime".into(), "1609466400000".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(kline_rows().to_string())
        .create_async()
        .await;

    let client = fast_client(&server.url());
    let candles = client
        .get_candles(
            "BTCUSDT",
            KlineInterval::SixtyMinutes,
            // 1000 초과 요청은 거부가 아니라 클램프
            5000,
            Some(1609459200000),
            Some(1609466400000),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(candles.len(), 2);
    assert_eq!(candles[0].close, dec!(29200.00));
    assert_eq!(candles[1].close, dec!(29400.00));
    assert!(candles[0].open_time < candles[1].open_time);
}

#[tokio::test]
async fn non_retryable_api_error_fails_after_single_request() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":-1121,"msg":"Invalid symbol"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = fast_client(&server.url());
    let err = client
        .get_candles("INVALID", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap_err();

    mock.assert_async().await;
    match err {
        MarketError::Api { code, message } => {
            assert_eq!(code, -1121);
            assert_eq!(message, "Invalid symbol");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn retryable_server_error_consumes_full_budget() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("Internal Server Error")
        // 초기 1회 + 재시도 2회
        .expect(3)
        .create_async()
        .await;

    let client = client_with_retries(&server.url(), 2);
    let err = client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, MarketError::Api { code: 500, .. }));
}

#[tokio::test]
async fn non_array_body_is_format_error_without_retry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"unexpected":"object"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = fast_client(&server.url());
    let err = client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, MarketError::Format(_)));
}

#[tokio::test]
async fn weight_header_updates_rate_limit_snapshot() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("x-mbx-used-weight-1m", "350")
        .with_body(kline_rows().to_string())
        .create_async()
        .await;

    let client = fast_client(&server.url());
    client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap();

    let status = client.rate_limit().await;
    assert_eq!(status.remaining, 850);
}

#[tokio::test]
async fn get_latest_price_returns_close_of_single_candle() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::AllOf(vec![Matcher::UrlEncoded(
            "limit".into(),
            "1".into(),
        )]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!([[
                1609459200000i64, "29000.00", "29500.00", "28800.00", "29200.00",
                "150.5", 1609462800000i64, "4380000.00", 1250, "75.25", "2190000.00", "0"
            ]])
            .to_string(),
        )
        .create_async()
        .await;

    let client = fast_client(&server.url());
    let price = client
        .get_latest_price("BTCUSDT", KlineInterval::SixtyMinutes)
        .await
        .unwrap();

    assert_eq!(price, dec!(29200.00));
}

#[tokio::test]
async fn get_latest_price_empty_result_is_no_data() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let client = fast_client(&server.url());
    let err = client
        .get_latest_price("BTCUSDT", KlineInterval::OneDay)
        .await
        .unwrap_err();

    assert!(matches!(err, MarketError::NoData(_)));
}

#[tokio::test]
async fn close_is_idempotent_and_reopens_on_next_request() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/api/v3/klines")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(kline_rows().to_string())
        .create_async()
        .await;

    let client = fast_client(&server.url());
    client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap();

    client.close().await;
    client.close().await;

    // close 이후에도 다음 요청은 투명하게 새 핸들을 연다
    let candles = client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap();
    assert_eq!(candles.len(), 2);
}

// =============================================================================
// 스크립트 응답기: 순서 있는 시나리오
// =============================================================================

#[tokio::test]
async fn transport_failures_then_success_within_budget() {
    let base_url = scripted_server(vec![
        Scripted::Hangup,
        Scripted::Hangup,
        Scripted::Hangup,
        Scripted::ok_klines(),
    ])
    .await;

    let client = client_with_retries(&base_url, 3);
    let candles = client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap();

    assert_eq!(candles.len(), 2);
}

#[tokio::test]
async fn transport_failures_beyond_budget_exhaust() {
    let base_url = scripted_server(vec![
        Scripted::Hangup,
        Scripted::Hangup,
        Scripted::Hangup,
        Scripted::Hangup,
    ])
    .await;

    let client = client_with_retries(&base_url, 3);
    let err = client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap_err();

    match err {
        MarketError::TransportExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn single_rate_limit_then_success() {
    let base_url = scripted_server(vec![Scripted::rate_limited(), Scripted::ok_klines()]).await;

    let client = client_with_retries(&base_url, 3);
    let candles = client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap();

    assert_eq!(candles.len(), 2);
}

#[tokio::test]
async fn persistent_rate_limit_exhausts_budget() {
    let base_url = scripted_server(vec![
        Scripted::rate_limited(),
        Scripted::rate_limited(),
        Scripted::rate_limited(),
    ])
    .await;

    let client = client_with_retries(&base_url, 2);
    let err = client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap_err();

    match err {
        MarketError::RateLimitExhausted { attempts } => assert_eq!(attempts, 2),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn retry_after_header_records_reset_time() {
    let base_url = scripted_server(vec![Scripted::Respond {
        status: 429,
        body: String::new(),
        retry_after: Some(30),
    }])
    .await;

    // 재시도 없이 즉시 소진시켜 스냅샷만 확인
    let client = client_with_retries(&base_url, 0);
    let err = client
        .get_candles("BTCUSDT", KlineInterval::OneMinute, 10, None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, MarketError::RateLimitExhausted { .. }));
    let status = client.rate_limit().await;
    assert!(status.reset_at.is_some());
}
