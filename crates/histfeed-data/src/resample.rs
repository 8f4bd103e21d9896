//! 시간 버킷 기반 리샘플링.
//!
//! 틱 또는 세밀한 캔들을 더 굵은 OHLCV 캔들로 집계합니다.
//! 모든 함수는 입력과 타임프레임만의 순수 함수이며, 동일 입력은
//! 항상 동일한 출력을 냅니다 (벽시계 의존성 없음).
//!
//! 버킷은 UTC 기준 타임프레임 경계에 정렬된 좌폐우개 구간
//! `[start, start + duration)`입니다. 틱이 없는 버킷은 생략되며
//! 합성/전방 채움 캔들은 만들지 않습니다.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use histfeed_core::{Bar, Tick, Timeframe};

use crate::error::{DataError, Result};

/// 버킷 집계 중간 상태.
struct BucketAccum {
    first_ts: DateTime<Utc>,
    last_ts: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
}

/// 틱을 OHLCV 캔들로 리샘플링합니다.
///
/// OHLC는 매수 호가(bid)를 일관되게 사용하며, 거래량은 버킷 내
/// 틱 물량(bid + ask)의 합입니다.
pub fn ticks_to_bars(ticks: &[Tick], timeframe: Timeframe) -> Vec<Bar> {
    let mut buckets: BTreeMap<i64, BucketAccum> = BTreeMap::new();

    for tick in ticks {
        let bucket_start = timeframe.bucket_start(tick.timestamp);
        let key = bucket_start.timestamp_millis();
        let price = tick.bid;

        match buckets.entry(key) {
            Entry::Occupied(mut entry) => {
                let accum = entry.get_mut();
                if tick.timestamp < accum.first_ts {
                    accum.first_ts = tick.timestamp;
                    accum.open = price;
                }
                // 동일 타임스탬프는 나중 틱이 종가를 가짐
                if tick.timestamp >= accum.last_ts {
                    accum.last_ts = tick.timestamp;
                    accum.close = price;
                }
                accum.high = accum.high.max(price);
                accum.low = accum.low.min(price);
                accum.volume += tick.total_volume();
            }
            Entry::Vacant(entry) => {
                entry.insert(BucketAccum {
                    first_ts: tick.timestamp,
                    last_ts: tick.timestamp,
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: tick.total_volume(),
                });
            }
        }
    }

    let symbol = match ticks.first() {
        Some(tick) => tick.symbol.clone(),
        None => return Vec::new(),
    };

    buckets
        .into_iter()
        .map(|(key, accum)| Bar {
            symbol: symbol.clone(),
            timeframe,
            open_time: DateTime::from_timestamp_millis(key).expect("aligned bucket key"),
            open: accum.open,
            high: accum.high,
            low: accum.low,
            close: accum.close,
            volume: accum.volume,
        })
        .collect()
}

/// 캔들을 더 굵은 타임프레임으로 집계합니다.
///
/// 시가는 버킷 첫 캔들의 시가, 종가는 마지막 캔들의 종가,
/// 고가/저가는 버킷 극값, 거래량은 합계입니다.
///
/// # Errors
/// 대상 타임프레임이 원본의 정수배가 아니면
/// `DataError::IncompatibleTimeframe`을 반환합니다.
pub fn bars_to_bars(bars: &[Bar], target: Timeframe) -> Result<Vec<Bar>> {
    let first = match bars.first() {
        Some(bar) => bar,
        None => return Ok(Vec::new()),
    };
    let source = first.timeframe;

    if !target.is_multiple_of(source) {
        return Err(DataError::IncompatibleTimeframe {
            source_tf: source,
            target,
        });
    }

    let symbol = first.symbol.clone();
    let mut buckets: BTreeMap<i64, BucketAccum> = BTreeMap::new();

    for bar in bars {
        let bucket_start = target.bucket_start(bar.open_time);
        let key = bucket_start.timestamp_millis();

        match buckets.entry(key) {
            Entry::Occupied(mut entry) => {
                let accum = entry.get_mut();
                if bar.open_time < accum.first_ts {
                    accum.first_ts = bar.open_time;
                    accum.open = bar.open;
                }
                if bar.open_time >= accum.last_ts {
                    accum.last_ts = bar.open_time;
                    accum.close = bar.close;
                }
                accum.high = accum.high.max(bar.high);
                accum.low = accum.low.min(bar.low);
                accum.volume += bar.volume;
            }
            Entry::Vacant(entry) => {
                entry.insert(BucketAccum {
                    first_ts: bar.open_time,
                    last_ts: bar.open_time,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                });
            }
        }
    }

    Ok(buckets
        .into_iter()
        .map(|(key, accum)| Bar {
            symbol: symbol.clone(),
            timeframe: target,
            open_time: DateTime::from_timestamp_millis(key).expect("aligned bucket key"),
            open: accum.open,
            high: accum.high,
            low: accum.low,
            close: accum.close,
            volume: accum.volume,
        })
        .collect())
}
