//! ETP 시세 이력 수집기 CLI.

use clap::{Parser, Subcommand};
use harvest_collector::{CollectorConfig, CollectorError, Harvester, HttpFetcher, JsonLinesSink};
use harvest_core::logging::{init_logging, LogConfig};
use harvest_core::AppConfig;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "harvest-collector")]
#[command(about = "Boerse Frankfurt ETP quote-history harvester", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error). 생략 시 설정 파일 값 사용
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 시드 목록을 한 번 수집
    Crawl {
        /// 시드 상세 페이지 URL (쉼표로 구분). 생략 시 설정 파일의 seeds 사용
        #[arg(long, value_delimiter = ',')]
        seeds: Option<Vec<String>>,
    },

    /// 데몬 모드: 주기적으로 전체 시드 수집
    Daemon,
}

#[tokio::main]
async fn main() -> harvest_collector::Result<()> {
    let cli = Cli::parse();

    // 설정 로드
    let config = CollectorConfig::from_env()?;
    let app = AppConfig::load(&config.config_path)?;

    // 로깅 초기화
    let mut log_config = LogConfig::from_settings(&app.logging);
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    init_logging(log_config).map_err(|e| CollectorError::Config(e.to_string()))?;

    tracing::info!("ETP Harvest Collector 시작");
    tracing::debug!(
        config_path = %config.config_path.display(),
        feed_uri = %config.output.feed_uri.display(),
        max_concurrent = config.fetch.max_concurrent,
        "설정 로드 완료"
    );

    let site = Arc::new(app.site.compile()?);
    let fetcher = Arc::new(HttpFetcher::new(config.fetch.clone())?);
    let sink = Arc::new(JsonLinesSink::open(&config.output.feed_uri).await?);
    let harvester = Harvester::new(site, fetcher, sink);

    match cli.command {
        Commands::Crawl { seeds } => {
            let seeds = seeds.unwrap_or_else(|| app.seeds.clone());
            if seeds.is_empty() {
                tracing::warn!("수집할 시드가 없습니다");
                return Ok(());
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("종료 신호 수신, 진행 중인 종목은 버립니다");
                }
                report = harvester.run(&seeds) => {
                    report.stats.log_summary("ETP 수집");
                }
            }
        }
        Commands::Daemon => {
            tracing::info!(
                "=== 데몬 모드 시작 (주기: {}분) ===",
                config.daemon.interval_minutes
            );

            let mut interval = tokio::time::interval(config.daemon.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("종료 신호 수신, 데몬 종료 중...");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                tracing::info!("=== 수집 실행 시작 ===");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("종료 신호 수신, 진행 중인 종목은 버립니다");
                        break;
                    }
                    report = harvester.run(&app.seeds) => {
                        report.stats.log_summary("ETP 수집");
                    }
                }

                tracing::info!(
                    "=== 수집 완료, 다음 실행: {}분 후 ===",
                    config.daemon.interval_minutes
                );
            }
        }
    }

    tracing::info!("ETP Harvest Collector 종료");
    Ok(())
}
