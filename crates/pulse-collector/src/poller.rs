//! kline 폴링 루프.
//!
//! 주기적으로 캔들을 조회하고, 마지막 캔들의 `close_time`을 high-water
//! mark로 비교하여 신규 데이터가 있을 때만 콜백을 호출합니다. 전달
//! 단위는 해당 사이클에서 조회한 배치 전체이며, 개별 캔들 단위의 갭
//! 복원은 하지 않습니다.
//!
//! # 동시성 모델
//!
//! 폴러 인스턴스 하나당 백그라운드 태스크 하나만 존재합니다. 콜백
//! 호출은 순차적이며 겹치지 않고, high-water mark는 루프 자신만
//! 읽고 쓰므로 잠금이 필요 없습니다. 취소는 협조적으로 동작합니다:
//! `stop()`은 취소를 요청한 뒤 루프가 다음 확인 지점(루프 머리 또는
//! 대기 중)에서 종료될 때까지 기다립니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pulse_core::{Candle, CandleProvider, KlineInterval};

// =============================================================================
// 콜백 추상화
// =============================================================================

/// 신규 캔들 배치를 수신하는 콜백.
///
/// 동기/비동기 콜백 구분은 이 trait 뒤로 숨겨집니다. 폴러는 항상
/// 완료를 기다린 뒤 다음 대기로 넘어가므로 호출이 겹치지 않습니다.
/// 반환된 에러는 로그로 남고 루프는 계속됩니다.
#[async_trait]
pub trait CandleHandler: Send + Sync {
    /// 해당 사이클에서 관찰된 캔들 배치 처리.
    async fn on_candles(&self, candles: &[Candle]) -> anyhow::Result<()>;
}

/// 일반 함수를 `CandleHandler`로 감싸는 어댑터.
struct FnHandler<F>(F);

#[async_trait]
impl<F> CandleHandler for FnHandler<F>
where
    F: Fn(&[Candle]) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_candles(&self, candles: &[Candle]) -> anyhow::Result<()> {
        (self.0)(candles)
    }
}

/// 일반 함수형 콜백을 핸들러로 변환.
pub fn handler_fn<F>(f: F) -> Arc<dyn CandleHandler>
where
    F: Fn(&[Candle]) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

// =============================================================================
// 설정
// =============================================================================

/// 폴러 구성.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// 대상 심볼
    pub symbol: String,
    /// kline 인터벌
    pub interval: KlineInterval,
    /// 폴링 주기
    pub poll_interval: Duration,
    /// 폴링당 조회 kline 개수
    pub kline_limit: u32,
}

// =============================================================================
// KlinePoller
// =============================================================================

/// 취소 가능한 kline 폴링 루프의 소유자.
///
/// 제공자는 소유하지 않고 공유합니다. 하나의 `CandleProvider`를 여러
/// 폴러가 함께 사용해도 요청이 서로 독립적이므로 안전합니다.
pub struct KlinePoller {
    provider: Arc<dyn CandleProvider>,
    config: PollerConfig,
    handler: Arc<dyn CandleHandler>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl KlinePoller {
    /// 새 폴러 생성 (아직 시작하지 않음).
    pub fn new(
        provider: Arc<dyn CandleProvider>,
        config: PollerConfig,
        handler: Arc<dyn CandleHandler>,
    ) -> Self {
        Self {
            provider,
            config,
            handler,
            cancel: None,
            task: None,
        }
    }

    /// 폴링 루프 실행 여부.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// 백그라운드 폴링 루프 시작.
    ///
    /// 이미 실행 중이면 경고 로그만 남기고 아무것도 하지 않습니다.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!(symbol = %self.config.symbol, "폴러가 이미 실행 중");
            return;
        }

        info!(
            symbol = %self.config.symbol,
            interval = %self.config.interval,
            poll_interval_s = self.config.poll_interval.as_secs(),
            "kline 폴러 시작"
        );

        let cancel = CancellationToken::new();
        let poll_loop = PollLoop {
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
            handler: Arc::clone(&self.handler),
            cancel: cancel.clone(),
        };

        self.task = Some(tokio::spawn(poll_loop.run()));
        self.cancel = Some(cancel);
    }

    /// 폴링 루프 정지.
    ///
    /// 취소를 요청하고 루프가 실제로 종료될 때까지 기다립니다. 반환
    /// 이후에는 어떤 콜백도 호출되지 않습니다. 이미 정지 상태면
    /// 아무것도 하지 않습니다.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        info!(symbol = %self.config.symbol, "kline 폴러 정지 요청");
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        if let Err(e) = task.await {
            error!(error = %e, "폴링 태스크 join 실패");
        }
        info!(symbol = %self.config.symbol, "kline 폴러 정지 완료");
    }
}

// =============================================================================
// 폴링 루프 본체
// =============================================================================

/// 백그라운드 태스크로 이동되는 루프 상태.
struct PollLoop {
    provider: Arc<dyn CandleProvider>,
    config: PollerConfig,
    handler: Arc<dyn CandleHandler>,
    cancel: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        // high-water mark: 이 루프만 읽고 쓴다
        let mut last_close_time: Option<i64> = None;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self
                .provider
                .get_candles(
                    &self.config.symbol,
                    self.config.interval,
                    self.config.kline_limit,
                    None,
                    None,
                )
                .await
            {
                Ok(candles) => {
                    if let Some(latest) = candles.last() {
                        if last_close_time.map_or(true, |t| latest.close_time > t) {
                            debug!(
                                close_time = latest.close_time,
                                close = %latest.close,
                                count = candles.len(),
                                "신규 캔들 감지"
                            );
                            last_close_time = Some(latest.close_time);

                            if let Err(e) = self.handler.on_candles(&candles).await {
                                error!(error = %e, "캔들 핸들러 실패, 루프 계속");
                            }
                        } else {
                            debug!("신규 캔들 없음");
                        }
                    } else {
                        debug!(symbol = %self.config.symbol, "빈 kline 응답");
                    }
                }
                // 재시도는 클라이언트 내부에서 이미 수행됨
                Err(e) => {
                    error!(symbol = %self.config.symbol, error = %e, "kline 조회 실패")
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!(symbol = %self.config.symbol, "폴링 루프 종료");
    }
}

// =============================================================================
// 테스트
// =============================================================================
