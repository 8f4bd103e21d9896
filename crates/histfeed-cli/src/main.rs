//! Standalone historical data feed CLI.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use histfeed_core::{
    AppConfig, DataRequest, EnvCredentialProvider, SeriesKind, Symbol, Timeframe,
};
use histfeed_data::{DataError, DataStore, FeedManager, SeriesData};
use histfeed_source::{
    BinanceConfig, BinanceSource, DataSource, DukascopyConfig, DukascopySource, RetryPolicy,
};

#[derive(Parser)]
#[command(name = "histfeed")]
#[command(about = "Historical market data downloader and local cache", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 설정 파일 경로 (생략 시 환경 변수만 사용)
    #[arg(long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// 데이터 조회 (캐시 우선, 갭만 다운로드)
    Fetch {
        /// 심볼 (예: "EURUSD", "BTCUSDT")
        #[arg(short, long)]
        symbol: String,

        /// 시작 날짜 (YYYY-MM-DD 또는 RFC3339)
        #[arg(short = 'f', long)]
        start: String,

        /// 종료 날짜 (배타, YYYY-MM-DD 또는 RFC3339)
        #[arg(short = 't', long)]
        end: String,

        /// 타임프레임 (1m, 5m, 1h, 1d, ...)
        #[arg(short = 'i', long, default_value = "1d")]
        timeframe: String,

        /// 캔들 대신 틱 데이터 조회
        #[arg(long)]
        ticks: bool,
    },

    /// 저장된 데이터 요약 출력
    Info,

    /// 저장된 데이터 삭제
    Delete {
        /// 심볼
        #[arg(short, long)]
        symbol: String,

        /// 타임프레임
        #[arg(short = 'i', long, default_value = "1d")]
        timeframe: String,

        /// 캔들 대신 틱 데이터 삭제
        #[arg(long)]
        ticks: bool,
    },

    /// 요청 처리 가능 여부 확인
    Validate {
        /// 심볼
        #[arg(short, long)]
        symbol: String,

        /// 타임프레임
        #[arg(short = 'i', long, default_value = "1d")]
        timeframe: String,

        /// 틱 데이터 요청으로 검증
        #[arg(long)]
        ticks: bool,
    },
}

/// 날짜 인자를 UTC 시각으로 파싱 (YYYY-MM-DD는 자정으로 해석).
fn parse_instant(input: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("날짜 파싱 실패: {}", input))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow!("invalid date: {}", input))
}

fn parse_timeframe(input: &str) -> anyhow::Result<Timeframe> {
    input
        .parse()
        .map_err(|e: String| anyhow!("{} (지원: 1m,3m,5m,15m,30m,1h,2h,4h,6h,8h,12h,1d,3d,1w,1M)", e))
}

/// 설정에서 우선순위 순서의 소스 목록을 구성합니다.
fn build_sources(config: &AppConfig) -> anyhow::Result<Vec<Arc<dyn DataSource>>> {
    let retry = RetryPolicy::new(config.fetch.retries, config.fetch.retry_base_delay());
    let credentials = Arc::new(EnvCredentialProvider::new());

    let mut sources: Vec<Arc<dyn DataSource>> = Vec::new();

    // Dukascopy 우선, Binance 폴백
    let dukascopy_config = DukascopyConfig {
        timeout_secs: config.fetch.timeout_secs,
        ..DukascopyConfig::default()
    }
    .with_retry(retry.clone());
    sources.push(Arc::new(DukascopySource::new(dukascopy_config)?));

    if config.binance.enabled {
        let binance_config = BinanceConfig {
            base_url: config.binance.base_url.clone(),
            timeout_secs: config.fetch.timeout_secs,
            retry,
        };
        sources.push(Arc::new(BinanceSource::new(binance_config, credentials)?));
    }

    Ok(sources)
}

fn print_series(data: &SeriesData) {
    match data {
        SeriesData::Bars(bars) => {
            println!("{:<25} {:>12} {:>12} {:>12} {:>12} {:>14}", "open_time", "open", "high", "low", "close", "volume");
            for bar in bars {
                println!(
                    "{:<25} {:>12} {:>12} {:>12} {:>12} {:>14}",
                    bar.open_time.to_rfc3339(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                );
            }
            println!("\n{} bars", bars.len());
        }
        SeriesData::Ticks(ticks) => {
            println!("{:<25} {:>12} {:>12} {:>10} {:>10}", "timestamp", "bid", "ask", "bid_vol", "ask_vol");
            for tick in ticks {
                println!(
                    "{:<25} {:>12} {:>12} {:>10} {:>10}",
                    tick.timestamp.to_rfc3339(),
                    tick.bid,
                    tick.ask,
                    tick.bid_volume,
                    tick.ask_volume
                );
            }
            println!("\n{} ticks", ticks.len());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // 로깅 초기화
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "histfeed_cli={level},histfeed_core={level},histfeed_source={level},histfeed_data={level}",
                    level = cli.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("HistFeed CLI 시작");

    // 설정 로드
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env().unwrap_or_default(),
    };
    tracing::debug!(database = %config.storage.database_path().display(), "설정 로드 완료");

    // 저장소 열기 (마이그레이션 포함)
    let store = Arc::new(DataStore::open(&config.storage).await?);
    let sources = build_sources(&config)?;
    let manager = FeedManager::new(store, sources, &config.fetch);

    match cli.command {
        Commands::Fetch {
            symbol,
            start,
            end,
            timeframe,
            ticks,
        } => {
            let start = parse_instant(&start)?;
            let end = parse_instant(&end)?;
            let request = if ticks {
                DataRequest::ticks(symbol.as_str(), start, end)
            } else {
                DataRequest::bars(symbol.as_str(), start, end, parse_timeframe(&timeframe)?)
            };

            match manager.fetch_data(&request).await {
                Ok(data) => print_series(&data),
                Err(DataError::Partial(partial)) => {
                    print_series(&partial.data);
                    eprintln!("\nWARNING: {} range(s) could not be resolved:", partial.unresolved.len());
                    for range in &partial.unresolved {
                        eprintln!("  {}", range);
                    }
                    std::process::exit(2);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Commands::Info => {
            let info = manager.get_stored_info().await?;
            if info.is_empty() {
                println!("No data stored");
                return Ok(());
            }

            println!("{:<16} {:>5} {:>6} {:>10}  coverage", "symbol", "tf", "kind", "records");
            for series in &info {
                let ranges: Vec<String> = series.ranges.iter().map(|r| r.to_string()).collect();
                println!(
                    "{:<16} {:>5} {:>6} {:>10}  {}",
                    series.symbol.to_string(),
                    series.timeframe.to_string(),
                    series.kind.to_string(),
                    series.record_count,
                    ranges.join(", ")
                );
            }
        }
        Commands::Delete {
            symbol,
            timeframe,
            ticks,
        } => {
            let kind = if ticks { SeriesKind::Ticks } else { SeriesKind::Bars };
            let deleted = manager
                .delete_data(
                    &Symbol::new(symbol.as_str()),
                    parse_timeframe(&timeframe)?,
                    kind,
                )
                .await?;
            println!("Deleted {} records", deleted);
        }
        Commands::Validate {
            symbol,
            timeframe,
            ticks,
        } => {
            let now = Utc::now();
            let request = if ticks {
                DataRequest::ticks(symbol.as_str(), now - chrono::Duration::days(1), now)
            } else {
                DataRequest::bars(
                    symbol.as_str(),
                    now - chrono::Duration::days(1),
                    now,
                    parse_timeframe(&timeframe)?,
                )
            };

            if manager.validate_request(&request) {
                println!("OK: request can be served");
            } else {
                println!("UNSUPPORTED: no configured source supports this request");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
