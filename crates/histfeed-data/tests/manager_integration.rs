//! Integration tests for the FeedManager gap-filling flow with a mock source.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use histfeed_core::{
    Bar, DataRequest, FetchConfig, SeriesKind, Symbol, Tick, TimeRange, Timeframe,
};
use histfeed_data::{DataError, DataStore, FeedManager, SeriesData};
use histfeed_source::{DataSource, SourceError};

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

fn range(start: u32, end: u32) -> TimeRange {
    TimeRange::new(day(start), day(end)).unwrap()
}

fn daily_bar(symbol: &Symbol, open_time: DateTime<Utc>) -> Bar {
    Bar {
        symbol: symbol.clone(),
        timeframe: Timeframe::D1,
        open_time,
        open: dec!(100),
        high: dec!(110),
        low: dec!(95),
        close: dec!(105),
        volume: dec!(1000),
    }
}

/// Generates one daily bar per day within the range.
fn bars_for_range(symbol: &Symbol, range: &TimeRange) -> Vec<Bar> {
    let mut bars = Vec::new();
    let mut cursor = Timeframe::D1.bucket_start(range.start);
    while cursor < range.end {
        if cursor >= range.start {
            bars.push(daily_bar(symbol, cursor));
        }
        cursor += Duration::days(1);
    }
    bars
}

/// Mock source recording fetch calls; optionally failing specific ranges.
struct MockSource {
    bar_calls: Mutex<Vec<TimeRange>>,
    tick_calls: Mutex<Vec<TimeRange>>,
    fail_from: Option<DateTime<Utc>>,
    native_bars: bool,
}

impl MockSource {
    fn new() -> Self {
        Self {
            bar_calls: Mutex::new(Vec::new()),
            tick_calls: Mutex::new(Vec::new()),
            fail_from: None,
            native_bars: true,
        }
    }

    /// Fails any gap whose start is at or after the given instant.
    fn failing_from(ts: DateTime<Utc>) -> Self {
        Self {
            fail_from: Some(ts),
            ..Self::new()
        }
    }

    /// Provides ticks only, like the Dukascopy feed.
    fn ticks_only() -> Self {
        Self {
            native_bars: false,
            ..Self::new()
        }
    }

    fn bar_calls(&self) -> Vec<TimeRange> {
        self.bar_calls.lock().unwrap().clone()
    }

    fn tick_calls(&self) -> Vec<TimeRange> {
        self.tick_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DataSource for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports(&self, _symbol: &Symbol, _timeframe: Timeframe) -> bool {
        true
    }

    fn supports_ticks(&self, _symbol: &Symbol) -> bool {
        true
    }

    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: &TimeRange,
        _timeframe: Timeframe,
    ) -> Result<Vec<Bar>, SourceError> {
        if !self.native_bars {
            return Err(SourceError::NotSupported("ticks only".to_string()));
        }
        self.bar_calls.lock().unwrap().push(*range);

        if let Some(fail_from) = self.fail_from {
            if range.start >= fail_from {
                return Err(SourceError::Unavailable {
                    provider: "mock".to_string(),
                    attempts: 3,
                    last_error: "connection refused".to_string(),
                });
            }
        }

        Ok(bars_for_range(symbol, range))
    }

    async fn fetch_ticks(
        &self,
        symbol: &Symbol,
        range: &TimeRange,
    ) -> Result<Vec<Tick>, SourceError> {
        self.tick_calls.lock().unwrap().push(*range);

        // Two ticks per day at 00:00:00 and 00:00:01.
        let mut ticks = Vec::new();
        let mut cursor = Timeframe::D1.bucket_start(range.start);
        while cursor < range.end {
            if cursor >= range.start {
                for (offset, bid) in [(0, dec!(1.0950)), (1, dec!(1.0960))] {
                    ticks.push(Tick {
                        symbol: symbol.clone(),
                        timestamp: cursor + Duration::seconds(offset),
                        bid,
                        ask: bid + dec!(0.0002),
                        bid_volume: dec!(1),
                        ask_volume: dec!(1),
                    });
                }
            }
            cursor += Duration::days(1);
        }
        Ok(ticks)
    }
}

async fn manager_with(source: Arc<MockSource>) -> (FeedManager, Arc<DataStore>) {
    let store = Arc::new(DataStore::open_in_memory().await.unwrap());
    let manager = FeedManager::new(
        store.clone(),
        vec![source as Arc<dyn DataSource>],
        &FetchConfig::default(),
    );
    (manager, store)
}

#[tokio::test]
async fn test_gap_filling_fetches_only_missing_range() {
    let source = Arc::new(MockSource::new());
    let (manager, store) = manager_with(source.clone()).await;
    let symbol = Symbol::new("EURUSD");

    // Pre-populate the store with coverage for [Jan 1, Jan 5).
    let cached = range(1, 5);
    store
        .write_bars(
            &symbol,
            Timeframe::D1,
            &bars_for_range(&symbol, &cached),
            &cached,
        )
        .await
        .unwrap();

    // Request [Jan 1, Jan 10): only [Jan 5, Jan 10) should be fetched.
    let request = DataRequest::bars("EURUSD", day(1), day(10), Timeframe::D1);
    let data = manager.fetch_data(&request).await.unwrap();

    assert_eq!(source.bar_calls(), vec![range(5, 10)]);

    let bars = match data {
        SeriesData::Bars(bars) => bars,
        other => panic!("expected bars, got {:?}", other),
    };

    // Merged result spans the full requested range in order, no duplicates.
    assert_eq!(bars.len(), 9);
    for window in bars.windows(2) {
        assert!(window[0].open_time < window[1].open_time);
    }
    assert_eq!(bars.first().unwrap().open_time, day(1));
    assert_eq!(bars.last().unwrap().open_time, day(9));
}

#[tokio::test]
async fn test_fully_cached_request_makes_no_fetch() {
    let source = Arc::new(MockSource::new());
    let (manager, _store) = manager_with(source.clone()).await;

    let request = DataRequest::bars("EURUSD", day(1), day(4), Timeframe::D1);

    // First call downloads, second call is served from cache.
    manager.fetch_data(&request).await.unwrap();
    let data = manager.fetch_data(&request).await.unwrap();

    assert_eq!(source.bar_calls().len(), 1);
    assert_eq!(data.len(), 3);
}

#[tokio::test]
async fn test_partial_failure_reports_exact_unresolved_range() {
    // Coverage in the middle splits the request into two gaps; the
    // second gap fails.
    let source = Arc::new(MockSource::failing_from(day(5)));
    let (manager, store) = manager_with(source.clone()).await;
    let symbol = Symbol::new("EURUSD");

    let cached = range(3, 5);
    store
        .write_bars(
            &symbol,
            Timeframe::D1,
            &bars_for_range(&symbol, &cached),
            &cached,
        )
        .await
        .unwrap();

    let request = DataRequest::bars("EURUSD", day(1), day(10), Timeframe::D1);
    let err = manager.fetch_data(&request).await.unwrap_err();

    let partial = match err {
        DataError::Partial(partial) => partial,
        other => panic!("expected partial result, got {other}"),
    };

    // Exactly the failed sub-range is reported.
    assert_eq!(partial.unresolved, vec![range(5, 10)]);

    // Data from the cache and the successful gap is still returned.
    let bars = match partial.data {
        SeriesData::Bars(bars) => bars,
        other => panic!("expected bars, got {:?}", other),
    };
    assert_eq!(bars.len(), 4); // Jan 1-4
    assert_eq!(bars.first().unwrap().open_time, day(1));
    assert_eq!(bars.last().unwrap().open_time, day(4));
}

#[tokio::test]
async fn test_cancelled_request_is_not_persisted() {
    let source = Arc::new(MockSource::new());
    let (manager, store) = manager_with(source.clone()).await;
    let symbol = Symbol::new("EURUSD");

    let cancel = CancellationToken::new();
    cancel.cancel();

    let request = DataRequest::bars("EURUSD", day(1), day(10), Timeframe::D1);
    let err = manager
        .fetch_data_with_cancel(&request, cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, DataError::Cancelled));

    // Nothing was persisted, so coverage stays empty.
    let coverage = store
        .get_coverage(&symbol, Timeframe::D1, SeriesKind::Bars)
        .await
        .unwrap();
    assert!(coverage.is_empty());
}

#[tokio::test]
async fn test_bars_resampled_from_ticks_when_not_native() {
    let source = Arc::new(MockSource::ticks_only());
    let (manager, _store) = manager_with(source.clone()).await;

    let request = DataRequest::bars("EURUSD", day(1), day(3), Timeframe::D1);
    let data = manager.fetch_data(&request).await.unwrap();

    // The bar path fell back to the tick feed.
    assert_eq!(source.tick_calls(), vec![range(1, 3)]);

    let bars = match data {
        SeriesData::Bars(bars) => bars,
        other => panic!("expected bars, got {:?}", other),
    };
    assert_eq!(bars.len(), 2);
    // OHLC from bid prices, volume summed across both ticks.
    assert_eq!(bars[0].open, dec!(1.0950));
    assert_eq!(bars[0].close, dec!(1.0960));
    assert_eq!(bars[0].volume, dec!(4));
    assert!(bars[0].validate().is_ok());
}

#[tokio::test]
async fn test_tick_request_roundtrip() {
    let source = Arc::new(MockSource::new());
    let (manager, _store) = manager_with(source.clone()).await;

    let request = DataRequest::ticks("EURUSD", day(1), day(2));
    let data = manager.fetch_data(&request).await.unwrap();

    assert_eq!(source.tick_calls(), vec![range(1, 2)]);
    let ticks = match data {
        SeriesData::Ticks(ticks) => ticks,
        other => panic!("expected ticks, got {:?}", other),
    };
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[0].bid, dec!(1.0950));

    // Served from cache on the second call.
    manager.fetch_data(&request).await.unwrap();
    assert_eq!(source.tick_calls().len(), 1);
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    let source = Arc::new(MockSource::new());
    let (manager, _store) = manager_with(source.clone()).await;

    let request = DataRequest::bars("EURUSD", day(10), day(1), Timeframe::D1);
    let err = manager.fetch_data(&request).await.unwrap_err();

    assert!(matches!(err, DataError::InvalidRequest(_)));
    assert!(!manager.validate_request(&request));
    assert!(source.bar_calls().is_empty());
}

#[tokio::test]
async fn test_delete_data_then_refetch() {
    let source = Arc::new(MockSource::new());
    let (manager, _store) = manager_with(source.clone()).await;
    let symbol = Symbol::new("EURUSD");

    let request = DataRequest::bars("EURUSD", day(1), day(4), Timeframe::D1);
    manager.fetch_data(&request).await.unwrap();

    let deleted = manager
        .delete_data(&symbol, Timeframe::D1, SeriesKind::Bars)
        .await
        .unwrap();
    assert_eq!(deleted, 3);

    // Deleting again is a silent no-op.
    let deleted = manager
        .delete_data(&symbol, Timeframe::D1, SeriesKind::Bars)
        .await
        .unwrap();
    assert_eq!(deleted, 0);

    // The next fetch downloads again.
    manager.fetch_data(&request).await.unwrap();
    assert_eq!(source.bar_calls().len(), 2);
}

#[tokio::test]
async fn test_stored_info_after_fetch() {
    let source = Arc::new(MockSource::new());
    let (manager, _store) = manager_with(source.clone()).await;

    let request = DataRequest::bars("EURUSD", day(1), day(4), Timeframe::D1);
    manager.fetch_data(&request).await.unwrap();

    let info = manager.get_stored_info().await.unwrap();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].symbol, Symbol::new("EURUSD"));
    assert_eq!(info[0].timeframe, Timeframe::D1);
    assert_eq!(info[0].kind, SeriesKind::Bars);
    assert_eq!(info[0].record_count, 3);
    assert_eq!(info[0].ranges, vec![range(1, 4)]);
}
