//! 바이낸스 데이터 소스.
//!
//! 바이낸스 Spot 공개 REST API에서 과거 OHLCV 캔들을 조회합니다.
//! 캔들 엔드포인트는 인증 없이 사용할 수 있으며, API 키가 주입된
//! 경우 요청 한도 상향을 위해 헤더로 전달합니다.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, instrument};

use histfeed_core::{Bar, CredentialProvider, Symbol, Tick, TimeRange, Timeframe};

use crate::retry::{with_retry, RetryPolicy};
use crate::traits::{DataSource, FetchResult};
use crate::SourceError;

/// 요청당 최대 캔들 수 (바이낸스 API 한도).
const MAX_KLINES_PER_REQUEST: u32 = 1000;

// ============================================================================
// 설정
// ============================================================================

/// 바이낸스 소스 설정.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// REST API 기본 URL
    pub base_url: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 재시도 정책
    pub retry: RetryPolicy,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            timeout_secs: 30,
            retry: RetryPolicy::default(),
        }
    }
}

impl BinanceConfig {
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
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct BinanceKline(
    i64,    // 0: Open time
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    String, // 9: Taker buy base asset volume
    String, // 10: Taker buy quote asset volume
    String, // 11: Ignore
);

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i32,
    msg: String,
}

// ============================================================================
// 바이낸스 소스
// ============================================================================

/// 바이낸스 과거 데이터 소스.
pub struct BinanceSource {
    config: BinanceConfig,
    client: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl BinanceSource {
    /// 새 바이낸스 소스를 생성합니다.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `SourceError::Network`를 반환합니다.
    pub fn new(
        config: BinanceConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::Network(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            credentials,
        })
    }

    /// 캔들 페이지 하나를 조회합니다.
    async fn fetch_page(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<BinanceKline>, SourceError> {
        let url = format!("{}/api/v3/klines", self.config.base_url);

        debug!(symbol = symbol, interval = interval, start_ms, end_ms, "GET /api/v3/klines");

        let mut request = self.client.get(&url).query(&[
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("startTime", start_ms.to_string()),
            // endTime은 포함 경계이므로 반개구간에 맞춰 1ms 당김
            ("endTime", (end_ms - 1).to_string()),
            ("limit", MAX_KLINES_PER_REQUEST.to_string()),
        ]);

        if let Some(key) = self.credentials.api_key(self.name()) {
            request = request.header("X-MBX-APIKEY", key.expose_secret());
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// API 응답 처리.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, SourceError> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                SourceError::Parse(format!("응답 파싱 실패: {} - Body: {}", e, body))
            });
        }

        // 429/418은 요청 한도 관련 상태 코드
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(SourceError::RateLimited);
        }

        // 서버측 오류는 본문 코드와 무관하게 일시적 오류로 취급
        if status.is_server_error() {
            return Err(SourceError::Api {
                code: status.as_u16() as i32,
                message: body,
            });
        }

        // 에러 응답 파싱 시도
        if let Ok(error) = serde_json::from_str::<BinanceError>(&body) {
            Err(Self::map_error_code(error.code, &error.msg))
        } else {
            Err(SourceError::Api {
                code: status.as_u16() as i32,
                message: body,
            })
        }
    }

    /// 바이낸스 에러 코드를 SourceError로 매핑.
    fn map_error_code(code: i32, msg: &str) -> SourceError {
        match code {
            -1003 => SourceError::RateLimited,
            -1121 => SourceError::UnsupportedSymbol(msg.to_string()),
            _ => SourceError::Api {
                code,
                message: msg.to_string(),
            },
        }
    }

    /// 캔들 응답 행을 Bar로 변환.
    fn to_bar(
        symbol: &Symbol,
        timeframe: Timeframe,
        kline: &BinanceKline,
    ) -> Result<Bar, SourceError> {
        let open_time = DateTime::from_timestamp_millis(kline.0)
            .ok_or_else(|| SourceError::Parse(format!("invalid open time: {}", kline.0)))?;

        Ok(Bar {
            symbol: symbol.clone(),
            timeframe,
            open_time,
            open: Self::parse_decimal(&kline.1)?,
            high: Self::parse_decimal(&kline.2)?,
            low: Self::parse_decimal(&kline.3)?,
            close: Self::parse_decimal(&kline.4)?,
            volume: Self::parse_decimal(&kline.5)?,
        })
    }

    /// 문자열에서 Decimal 파싱.
    fn parse_decimal(s: &str) -> Result<Decimal, SourceError> {
        s.parse()
            .map_err(|e| SourceError::Parse(format!("invalid decimal '{}': {}", s, e)))
    }
}

#[async_trait]
impl DataSource for BinanceSource {
    fn name(&self) -> &str {
        "binance"
    }

    fn supports(&self, symbol: &Symbol, _timeframe: Timeframe) -> bool {
        // 바이낸스는 모든 표준 타임프레임을 네이티브로 지원하며,
        // 심볼 지원 여부는 요청 시점에 API가 판정한다 (폴백 소스 역할).
        !symbol.as_str().is_empty()
    }

    fn supports_ticks(&self, _symbol: &Symbol) -> bool {
        // 공개 API는 과거 틱 데이터를 제공하지 않음
        false
    }

    #[instrument(skip(self), fields(source = "binance"))]
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: &TimeRange,
        timeframe: Timeframe,
    ) -> FetchResult<Vec<Bar>> {
        let binance_symbol = symbol.to_binance();
        let interval = timeframe.to_interval();
        let end_ms = range.end.timestamp_millis();

        let mut bars: Vec<Bar> = Vec::new();
        let mut cursor = range.start.timestamp_millis();

        // 페이지 단위로 순회하며 마지막 open time 다음부터 이어서 조회
        while cursor < end_ms {
            let page = with_retry(&self.config.retry, self.name(), "klines", || {
                self.fetch_page(&binance_symbol, interval, cursor, end_ms)
            })
            .await?;

            if page.is_empty() {
                break;
            }

            let page_len = page.len();
            let last_open = page.last().map(|k| k.0).unwrap_or(end_ms);

            for kline in &page {
                if kline.0 >= end_ms {
                    break;
                }
                bars.push(Self::to_bar(symbol, timeframe, kline)?);
            }

            if (page_len as u32) < MAX_KLINES_PER_REQUEST {
                break;
            }
            cursor = last_open + 1;
        }

        debug!(
            symbol = %symbol,
            timeframe = %timeframe,
            count = bars.len(),
            "바이낸스 캔들 조회 완료"
        );

        Ok(bars)
    }

    async fn fetch_ticks(&self, symbol: &Symbol, _range: &TimeRange) -> FetchResult<Vec<Tick>> {
        Err(SourceError::NotSupported(format!(
            "Binance public API does not provide historical ticks for {}",
            symbol
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use histfeed_core::StaticCredentials;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn source_for(server: &mockito::ServerGuard) -> BinanceSource {
        let config = BinanceConfig::default()
            .with_base_url(server.url())
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1)));
        BinanceSource::new(config, Arc::new(StaticCredentials::anonymous()))
            .expect("source creation")
    }

    fn kline_row(open_ms: i64, open: &str, high: &str, low: &str, close: &str, vol: &str) -> String {
        format!(
            r#"[{open_ms},"{open}","{high}","{low}","{close}","{vol}",{},"1000.0",42,"5.0","500.0","0"]"#,
            open_ms + 59_999
        )
    }

    #[tokio::test]
    async fn test_fetch_bars_parses_klines() {
        let mut server = mockito::Server::new_async().await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 2, 0).unwrap();

        let body = format!(
            "[{},{}]",
            kline_row(start.timestamp_millis(), "42000.1", "42100.5", "41900.0", "42050.2", "12.5"),
            kline_row(start.timestamp_millis() + 60_000, "42050.2", "42200.0", "42000.0", "42150.0", "8.25"),
        );
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let source = source_for(&server);
        let range = TimeRange::new(start, end).unwrap();
        let bars = source
            .fetch_bars(&Symbol::new("BTCUSDT"), &range, Timeframe::M1)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].open, dec!(42000.1));
        assert_eq!(bars[0].high, dec!(42100.5));
        assert_eq!(bars[1].close, dec!(42150.0));
        assert_eq!(bars[1].open_time, start + chrono::Duration::minutes(1));
        assert!(bars[0].validate().is_ok());
    }

    #[tokio::test]
    async fn test_fetch_bars_excludes_end_boundary() {
        let mut server = mockito::Server::new_async().await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 0).unwrap();

        // 두 번째 행은 요청 범위 밖 (open_time == end)
        let body = format!(
            "[{},{}]",
            kline_row(start.timestamp_millis(), "1.0", "2.0", "0.5", "1.5", "10"),
            kline_row(end.timestamp_millis(), "1.5", "2.5", "1.0", "2.0", "20"),
        );
        server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let source = source_for(&server);
        let range = TimeRange::new(start, end).unwrap();
        let bars = source
            .fetch_bars(&Symbol::new("ETHUSDT"), &range, Timeframe::M1)
            .await
            .unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].open_time, start);
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("{\"code\":-1000,\"msg\":\"internal\"}")
            .expect(3) // 최초 시도 + 재시도 2회
            .create_async()
            .await;

        let source = source_for(&server);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, end).unwrap();

        let result = source
            .fetch_bars(&Symbol::new("BTCUSDT"), &range, Timeframe::H1)
            .await;

        mock.assert_async().await;
        assert!(matches!(
            result.unwrap_err(),
            SourceError::Unavailable { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_symbol_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body("{\"code\":-1121,\"msg\":\"Invalid symbol.\"}")
            .expect(1)
            .create_async()
            .await;

        let source = source_for(&server);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, end).unwrap();

        let result = source
            .fetch_bars(&Symbol::new("NOPE"), &range, Timeframe::H1)
            .await;

        mock.assert_async().await;
        assert!(matches!(
            result.unwrap_err(),
            SourceError::UnsupportedSymbol(_)
        ));
    }

    #[test]
    fn test_symbol_conversion() {
        assert_eq!(Symbol::new("BTC/USDT").to_binance(), "BTCUSDT");
    }

    #[test]
    fn test_capabilities() {
        let config = BinanceConfig::default();
        let source =
            BinanceSource::new(config, Arc::new(StaticCredentials::anonymous())).unwrap();

        assert!(source.supports(&Symbol::new("BTCUSDT"), Timeframe::MN1));
        assert!(!source.supports_ticks(&Symbol::new("BTCUSDT")));
    }
}
