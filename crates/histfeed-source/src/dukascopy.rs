//! Dukascopy 데이터 소스.
//!
//! Dukascopy의 과거 데이터 피드에서 틱 데이터를 조회합니다.
//! 피드는 심볼/시간 단위의 LZMA 압축 `.bi5` 파일로 제공됩니다:
//!
//! ```text
//! {base_url}/{SYMBOL}/{YYYY}/{MM}/{DD}/{HH}h_ticks.bi5   (MM은 0부터 시작)
//! ```
//!
//! 각 파일은 고정 폭 20바이트 레코드의 나열입니다 (big-endian):
//! 시간 내 밀리초 오프셋(u32), 매도 호가(f32), 매수 호가(f32),
//! 매도 물량(f32), 매수 물량(f32).
//!
//! 캔들은 네이티브로 제공하지 않으며, 틱을 리샘플링해 만드는 것은
//! 데이터 매니저의 몫입니다.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

use histfeed_core::{Bar, InstrumentClass, Symbol, Tick, TimeRange, Timeframe};

use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{DataSource, FetchResult};
use crate::SourceError;

/// 레코드 크기 (바이트).
const RECORD_SIZE: usize = 20;

// ============================================================================
// 상품 카탈로그
// ============================================================================

/// 외환 페어.
const FOREX_PAIRS: &[&str] = &[
    "EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD", "EURGBP", "EURJPY",
    "EURCHF", "EURAUD", "EURCAD", "EURNZD", "GBPJPY", "GBPCHF", "GBPAUD", "GBPCAD", "GBPNZD",
    "AUDJPY", "AUDCHF", "AUDCAD", "AUDNZD", "CADJPY", "CADCHF", "NZDJPY", "NZDCHF", "NZDCAD",
    "CHFJPY", "USDCNH", "USDSEK", "USDNOK", "USDDKK", "USDPLN",
];

/// 귀금속.
const METALS: &[&str] = &["XAUUSD", "XAGUSD", "XPTUSD", "XPDUSD"];

/// 원자재.
const COMMODITIES: &[&str] = &[
    "BRENT.CMD/USD",
    "WTI.CMD/USD",
    "COFFEE.CMD/USD",
    "CORN.CMD/USD",
    "SUGAR.CMD/USD",
    "WHEAT.CMD/USD",
    "NATGAS.CMD/USD",
];

/// 주가지수.
const INDICES: &[&str] = &[
    "USA500.IDX/USD",
    "USA30.IDX/USD",
    "USA100.IDX/USD",
    "DEU.IDX/EUR",
    "GBR.IDX/GBP",
    "FRA.IDX/EUR",
    "JPN.IDX/JPY",
];

/// 암호화폐.
const CRYPTO: &[&str] = &[
    "BTCUSD", "ETHUSD", "LTCUSD", "XRPUSD", "BCHUSD", "ADAUSD", "DOTUSD", "LINKUSD", "XLMUSD",
    "EOSUSD", "XMRUSD", "DASHUSD", "ZECUSD", "ETCUSD", "TRXUSD", "VETUSD", "QTMUSD", "OMGUSD",
];

/// 개별 주식 CFD (일부).
const STOCKS: &[&str] = &[
    "AAPL.US", "MSFT.US", "GOOGL.US", "AMZN.US", "TSLA.US", "META.US", "NVDA.US", "JPM.US",
    "JNJ.US", "PG.US", "V.US", "UNH.US", "BMW.DE", "SAP.DE", "SIE.DE", "ALV.DE", "BAS.DE",
    "BAYER.DE",
];

/// 카탈로그에서 심볼의 상품 분류를 조회합니다.
pub fn classify(symbol: &Symbol) -> Option<InstrumentClass> {
    let code = symbol.as_str();
    if FOREX_PAIRS.contains(&code) {
        Some(InstrumentClass::Forex)
    } else if METALS.contains(&code) {
        Some(InstrumentClass::Metal)
    } else if COMMODITIES.contains(&code) {
        Some(InstrumentClass::Commodity)
    } else if INDICES.contains(&code) {
        Some(InstrumentClass::Index)
    } else if CRYPTO.contains(&code) {
        Some(InstrumentClass::Crypto)
    } else if STOCKS.contains(&code) {
        Some(InstrumentClass::StockCfd)
    } else {
        None
    }
}

// ============================================================================
// 설정
// ============================================================================

/// Dukascopy 소스 설정.
#[derive(Debug, Clone)]
pub struct DukascopyConfig {
    /// 데이터 피드 기본 URL
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 시간 파일 다운로드 동시 실행 수 (HTTP 403 방지를 위해 보수적으로)
    pub hour_concurrency: usize,
    /// 재시도 정책
    pub retry: RetryPolicy,
}

impl Default for DukascopyConfig {
    fn default() -> Self {
        Self {
            base_url: "https://datafeed.dukascopy.com/datafeed".to_string(),
            timeout_secs: 30,
            hour_concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl DukascopyConfig {
    /// 기본 URL을 설정합니다.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 재시도 정책을 설정합니다.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

// ============================================================================
// Dukascopy 소스
// ============================================================================

/// Dukascopy 틱 데이터 소스.
pub struct DukascopySource {
    config: DukascopyConfig,
    client: Client,
}

impl DukascopySource {
    /// 새 Dukascopy 소스를 생성합니다.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `SourceError::Network`를 반환합니다.
    pub fn new(config: DukascopyConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Network(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self { config, client })
    }

    /// 시간 파일의 URL을 생성합니다. 월은 0부터 시작합니다.
    fn hour_url(&self, symbol: &Symbol, hour_start: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{:04}/{:02}/{:02}/{:02}h_ticks.bi5",
            self.config.base_url,
            symbol.as_str().replace('/', ""),
            hour_start.year(),
            hour_start.month0(),
            hour_start.day(),
            hour_start.hour()
        )
    }

    /// 단일 시간 파일을 다운로드하고 틱으로 디코드합니다.
    ///
    /// 주말/휴장 시간은 피드에 파일이 없으므로 404와 빈 본문은
    /// 빈 시간으로 취급합니다.
    async fn fetch_hour(&self, symbol: &Symbol, hour_start: DateTime<Utc>) -> FetchResult<Vec<Tick>> {
        let url = self.hour_url(symbol, hour_start);

        let payload = with_retry(&self.config.retry, self.name(), "hour_ticks", || {
            let url = url.clone();
            async move {
                let response = self.client.get(&url).send().await?;
                let status = response.status();

                if status.as_u16() == 404 {
                    return Ok(None);
                }
                if status.as_u16() == 429 {
                    return Err(SourceError::RateLimited);
                }
                if !status.is_success() {
                    return Err(SourceError::Api {
                        code: status.as_u16() as i32,
                        message: format!("GET {} failed", url),
                    });
                }

                let bytes = response.bytes().await?;
                Ok(Some(bytes.to_vec()))
            }
        })
        .await?;

        let payload = match payload {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                debug!(symbol = %symbol, hour = %hour_start, "빈 시간 파일 (휴장)");
                return Ok(Vec::new());
            }
        };

        let ticks = decode_bi5(symbol, hour_start, &payload)?;
        debug!(symbol = %symbol, hour = %hour_start, count = ticks.len(), "시간 파일 디코드 완료");
        Ok(ticks)
    }

    /// 요청 범위와 겹치는 시간 파일의 시작 시각 목록을 반환합니다.
    fn hour_starts(range: &TimeRange) -> Vec<DateTime<Utc>> {
        let mut hours = Vec::new();
        let mut cursor = Timeframe::H1.bucket_start(range.start);
        while cursor < range.end {
            hours.push(cursor);
            cursor += Duration::hours(1);
        }
        hours
    }
}

#[async_trait]
impl DataSource for DukascopySource {
    fn name(&self) -> &str {
        "dukascopy"
    }

    fn supports(&self, symbol: &Symbol, _timeframe: Timeframe) -> bool {
        // 카탈로그에 있는 심볼은 틱에서 어떤 타임프레임으로든
        // 리샘플링할 수 있다.
        classify(symbol).is_some()
    }

    fn supports_ticks(&self, symbol: &Symbol) -> bool {
        classify(symbol).is_some()
    }

    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        _range: &TimeRange,
        timeframe: Timeframe,
    ) -> FetchResult<Vec<Bar>> {
        // 피드는 틱만 제공한다. 캔들이 필요하면 매니저가
        // fetch_ticks + 리샘플링 경로를 사용한다.
        Err(SourceError::NotSupported(format!(
            "Dukascopy has no native {} bars for {}; resample from ticks",
            timeframe, symbol
        )))
    }

    #[instrument(skip(self), fields(source = "dukascopy"))]
    async fn fetch_ticks(&self, symbol: &Symbol, range: &TimeRange) -> FetchResult<Vec<Tick>> {
        if !self.supports_ticks(symbol) {
            return Err(SourceError::UnsupportedSymbol(symbol.to_string()));
        }

        let hours = Self::hour_starts(range);
        debug!(
            symbol = %symbol,
            hours = hours.len(),
            concurrency = self.config.hour_concurrency,
            "틱 다운로드 시작"
        );

        // 시간 파일을 제한된 동시성으로 다운로드 (순서 유지)
        let per_hour: Vec<Vec<Tick>> = stream::iter(
            hours
                .into_iter()
                .map(|hour| self.fetch_hour(symbol, hour)),
        )
        .buffered(self.config.hour_concurrency.max(1))
        .try_collect()
        .await?;

        let mut ticks: Vec<Tick> = per_hour
            .into_iter()
            .flatten()
            .filter(|t| t.timestamp >= range.start && t.timestamp < range.end)
            .collect();

        // 파일 내 오프셋은 비감소이지만 정렬을 한 번 더 보장
        ticks.sort_by_key(|t| t.timestamp);

        // 배치 불변 조건 검증 (가격 > 0, 타임스탬프 비감소)
        histfeed_core::validate_tick_batch(&ticks)
            .map_err(|e| SourceError::Decode(e.to_string()))?;

        if ticks.is_empty() {
            warn!(symbol = %symbol, range = %range, "범위 내 틱 없음");
        }

        Ok(ticks)
    }
}

/// LZMA 압축된 `.bi5` 본문을 틱으로 디코드합니다.
fn decode_bi5(
    symbol: &Symbol,
    hour_start: DateTime<Utc>,
    payload: &[u8],
) -> Result<Vec<Tick>, SourceError> {
    let mut raw = Vec::new();
    lzma_rs::lzma_decompress(&mut std::io::Cursor::new(payload), &mut raw)
        .map_err(|e| SourceError::Decode(format!("LZMA 해제 실패: {:?}", e)))?;

    if raw.len() % RECORD_SIZE != 0 {
        return Err(SourceError::Decode(format!(
            "truncated bi5 payload: {} bytes",
            raw.len()
        )));
    }

    let base_ms = hour_start.timestamp_millis();
    let mut ticks = Vec::with_capacity(raw.len() / RECORD_SIZE);

    for record in raw.chunks_exact(RECORD_SIZE) {
        let offset_ms = u32::from_be_bytes(record[0..4].try_into().expect("4-byte slice"));
        let ask = f32::from_be_bytes(record[4..8].try_into().expect("4-byte slice"));
        let bid = f32::from_be_bytes(record[8..12].try_into().expect("4-byte slice"));
        let ask_volume = f32::from_be_bytes(record[12..16].try_into().expect("4-byte slice"));
        let bid_volume = f32::from_be_bytes(record[16..20].try_into().expect("4-byte slice"));

        let timestamp = DateTime::from_timestamp_millis(base_ms + offset_ms as i64)
            .ok_or_else(|| SourceError::Decode(format!("invalid tick offset {}", offset_ms)))?;

        ticks.push(Tick {
            symbol: symbol.clone(),
            timestamp,
            bid: to_decimal(bid, "bid")?,
            ask: to_decimal(ask, "ask")?,
            bid_volume: to_decimal(bid_volume, "bid_volume")?,
            ask_volume: to_decimal(ask_volume, "ask_volume")?,
        });
    }

    Ok(ticks)
}

/// f32 필드를 Decimal로 변환합니다.
fn to_decimal(value: f32, field: &str) -> Result<Decimal, SourceError> {
    Decimal::from_f32(value)
        .ok_or_else(|| SourceError::Decode(format!("non-finite {} value: {}", field, value)))
}
