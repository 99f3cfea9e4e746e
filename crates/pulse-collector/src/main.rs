//! Standalone kline 수집기 CLI.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pulse_collector::poller::{CandleHandler, KlinePoller};
use pulse_collector::{CollectorConfig, CollectorError};
use pulse_core::Candle;
use pulse_exchange::MexcClient;

#[derive(Parser)]
#[command(name = "pulse-collector", about = "kline 폴링 수집기", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 폴링 데몬 실행 (ctrl-c로 종료)
    Run,
    /// 최신 종가 1회 조회
    Price {
        /// 대상 심볼 (생략 시 설정값 사용)
        symbol: Option<String>,
    },
}

/// 수신한 배치의 마지막 캔들을 로그로 남기는 기본 핸들러.
///
/// 전략/지표 소비자는 이 자리에 자신의 `CandleHandler`를 연결합니다.
struct LatestCandleLogger;

#[async_trait::async_trait]
impl CandleHandler for LatestCandleLogger {
    async fn on_candles(&self, candles: &[Candle]) -> anyhow::Result<()> {
        if let Some(last) = candles.last() {
            tracing::info!(
                count = candles.len(),
                close_time = last.close_time,
                close = %last.close,
                "신규 캔들 수신"
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), CollectorError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = CollectorConfig::from_env()?;

    // 클라이언트는 여기서 한 번 구성해 참조로 전달한다 (전역 싱글턴 없음)
    let client = Arc::new(MexcClient::new(config.mexc.client_config())?);

    match cli.command {
        Commands::Run => run_daemon(client, &config).await,
        Commands::Price { symbol } => {
            let symbol = symbol.unwrap_or_else(|| config.poller.symbol.clone());
            let price = client
                .get_latest_price(&symbol, config.poller.interval)
                .await?;
            println!("{} ({}) 종가: {}", symbol, config.poller.interval, price);
            client.close().await;
            Ok(())
        }
    }
}

async fn run_daemon(
    client: Arc<MexcClient>,
    config: &CollectorConfig,
) -> Result<(), CollectorError> {
    let mut poller = KlinePoller::new(
        client.clone(),
        config.poller.poller_config(),
        Arc::new(LatestCandleLogger),
    );

    poller.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("종료 신호 수신");

    poller.stop().await;
    client.close().await;
    Ok(())
}
