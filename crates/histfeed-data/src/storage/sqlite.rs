//! SQLite 스토리지 구현.
//!
//! 단일 로컬 데이터베이스 파일에 캔들/틱과 커버리지 메타데이터를
//! 저장하는 repository 패턴 구현을 제공합니다.
//!
//! # 동시성
//!
//! 같은 (심볼, 타임프레임, 종류) 키에 대한 쓰기는 키별 비동기 Lock으로
//! 직렬화되어 커버리지 병합의 일관성을 보장합니다. 읽기는 Lock 없이
//! 스냅샷을 조회합니다.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use histfeed_core::{
    Bar, CoverageSet, SeriesKind, StorageConfig, Symbol, Tick, TimeRange, Timeframe,
};

use crate::error::{DataError, Result};

/// 배치 삽입 청크 크기. SQLite 바인드 변수 한도 내에서 유지.
const INSERT_CHUNK: usize = 100;

/// 키별 쓰기 Lock 맵.
type WriteLockMap = Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>;

// =============================================================================
// Database
// =============================================================================

/// 데이터베이스 연결 풀 래퍼.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// 설정된 경로의 데이터베이스 파일에 연결합니다.
    ///
    /// 저장 디렉토리와 파일이 없으면 생성합니다.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.path)
            .map_err(|e| DataError::ConnectionError(format!("storage dir: {}", e)))?;

        let db_path = config.database_path();
        info!(path = %db_path.display(), "Connecting to database...");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!("Database connection established");
        Ok(Self { pool })
    }

    /// 인메모리 데이터베이스에 연결합니다 (테스트용).
    ///
    /// 인메모리 SQLite는 연결마다 별도 데이터베이스를 가지므로
    /// 풀을 단일 연결로 고정합니다.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        Ok(Self { pool })
    }

    /// 내부 연결 풀을 반환합니다.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 데이터베이스 마이그레이션을 실행합니다.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");

        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DataError::MigrationError(e.to_string()))?;

        info!("Migrations completed successfully");
        Ok(())
    }

    /// 데이터베이스 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::QueryError(e.to_string()))?;
        Ok(true)
    }
}

// =============================================================================
// 레코드 타입
// =============================================================================

/// 캔들 데이터베이스 레코드.
///
/// 가격은 TEXT(십진 문자열), 시각은 epoch 밀리초로 저장됩니다.
#[derive(Debug, Clone, FromRow)]
pub struct BarRecord {
    pub symbol: String,
    pub timeframe: String,
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

impl BarRecord {
    /// 도메인 Bar로 변환합니다.
    pub fn to_bar(&self) -> Result<Bar> {
        Ok(Bar {
            symbol: Symbol::new(&self.symbol),
            timeframe: parse_timeframe(&self.timeframe)?,
            open_time: parse_timestamp(self.open_time)?,
            open: parse_decimal(&self.open)?,
            high: parse_decimal(&self.high)?,
            low: parse_decimal(&self.low)?,
            close: parse_decimal(&self.close)?,
            volume: parse_decimal(&self.volume)?,
        })
    }
}

/// 틱 데이터베이스 레코드.
#[derive(Debug, Clone, FromRow)]
pub struct TickRecord {
    pub symbol: String,
    pub timestamp: i64,
    pub bid: String,
    pub ask: String,
    pub bid_volume: String,
    pub ask_volume: String,
}

impl TickRecord {
    /// 도메인 Tick으로 변환합니다.
    pub fn to_tick(&self) -> Result<Tick> {
        Ok(Tick {
            symbol: Symbol::new(&self.symbol),
            timestamp: parse_timestamp(self.timestamp)?,
            bid: parse_decimal(&self.bid)?,
            ask: parse_decimal(&self.ask)?,
            bid_volume: parse_decimal(&self.bid_volume)?,
            ask_volume: parse_decimal(&self.ask_volume)?,
        })
    }
}

/// 저장된 시리즈 요약 정보.
#[derive(Debug, Clone)]
pub struct StoredSeriesInfo {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 타임프레임 (틱 시리즈는 의사 타임프레임)
    pub timeframe: Timeframe,
    /// 데이터 종류
    pub kind: SeriesKind,
    /// 저장된 레코드 수
    pub record_count: i64,
    /// 커버된 시간 구간 (병합된 최소 형태)
    pub ranges: Vec<TimeRange>,
    /// 마지막 갱신 시각
    pub last_updated: DateTime<Utc>,
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    s.parse()
        .map_err(|e| DataError::InvalidData(format!("invalid decimal '{}': {}", s, e)))
}

fn parse_timeframe(s: &str) -> Result<Timeframe> {
    s.parse()
        .map_err(|e: String| DataError::InvalidData(e))
}

fn parse_timestamp(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DataError::InvalidData(format!("invalid timestamp: {}", ms)))
}

fn parse_kind(s: &str) -> Result<SeriesKind> {
    match s {
        "bars" => Ok(SeriesKind::Bars),
        "ticks" => Ok(SeriesKind::Ticks),
        other => Err(DataError::InvalidData(format!("invalid series kind: {}", other))),
    }
}

// =============================================================================
// DataStore
// =============================================================================

/// 캔들/틱과 커버리지를 소유하는 로컬 데이터 저장소.
///
/// 모든 변경은 반환 전에 동기적으로 영속화되며, 쓰기는 기록된 범위를
/// 커버리지에 병합합니다 (인접/중첩 구간은 자동 결합).
pub struct DataStore {
    db: Database,
    write_locks: WriteLockMap,
}

impl DataStore {
    /// 데이터베이스에 연결하고 마이그레이션을 실행합니다.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let db = Database::connect(config).await?;
        db.migrate().await?;
        Ok(Self {
            db,
            write_locks: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// 인메모리 저장소를 생성합니다 (테스트용).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::connect_in_memory().await?;
        db.migrate().await?;
        Ok(Self {
            db,
            write_locks: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// 데이터베이스 연결을 가져옵니다.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// 쓰기 직렬화를 위한 키별 Lock 획득 또는 생성.
    async fn write_lock(&self, symbol: &Symbol, timeframe: Timeframe, kind: SeriesKind) -> Arc<Mutex<()>> {
        let key = format!("{}:{}:{}", symbol, timeframe, kind);

        {
            let locks = self.write_locks.read().await;
            if let Some(lock) = locks.get(&key) {
                return lock.clone();
            }
        }

        let mut locks = self.write_locks.write().await;
        locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // =========================================================================
    // 커버리지
    // =========================================================================

    /// (심볼, 타임프레임, 종류)의 커버리지 집합을 조회합니다.
    ///
    /// 반환되는 집합은 병합·정렬된 최소 형태입니다.
    pub async fn get_coverage(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        kind: SeriesKind,
    ) -> Result<CoverageSet> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            SELECT start_time, end_time FROM coverage
            WHERE symbol = ? AND timeframe = ? AND kind = ?
            ORDER BY start_time ASC
            "#,
        )
        .bind(symbol.as_str())
        .bind(timeframe.to_interval())
        .bind(kind.as_str())
        .fetch_all(self.db.pool())
        .await?;

        let mut set = CoverageSet::new();
        for (start, end) in rows {
            set.insert(TimeRange {
                start: parse_timestamp(start)?,
                end: parse_timestamp(end)?,
            });
        }
        Ok(set)
    }

    /// 커버리지 집합을 통째로 교체합니다.
    async fn replace_coverage(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        kind: SeriesKind,
        coverage: &CoverageSet,
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM coverage WHERE symbol = ? AND timeframe = ? AND kind = ?")
            .bind(symbol.as_str())
            .bind(timeframe.to_interval())
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;

        for range in coverage.ranges() {
            sqlx::query(
                r#"
                INSERT INTO coverage (symbol, timeframe, kind, start_time, end_time, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(symbol.as_str())
            .bind(timeframe.to_interval())
            .bind(kind.as_str())
            .bind(range.start.timestamp_millis())
            .bind(range.end.timestamp_millis())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // =========================================================================
    // 캔들 작업
    // =========================================================================

    /// 캔들을 멱등 upsert로 저장하고 커버리지를 확장합니다.
    ///
    /// `covered`는 이번 쓰기로 완전해진 시간 범위입니다. 희소한 시리즈
    /// (주말, 휴장)에서도 가져온 범위 전체가 커버된 것으로 기록되어야
    /// 하므로 레코드의 최소/최대 시각이 아니라 명시적 범위를 받습니다.
    #[instrument(skip(self, bars), fields(count = bars.len()))]
    pub async fn write_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        bars: &[Bar],
        covered: &TimeRange,
    ) -> Result<usize> {
        let lock = self.write_lock(symbol, timeframe, SeriesKind::Bars).await;
        let _guard = lock.lock().await;

        let mut written = 0;
        for chunk in bars.chunks(INSERT_CHUNK) {
            let mut query_builder = String::from(
                "INSERT INTO bars (symbol, timeframe, open_time, open, high, low, close, volume) VALUES ",
            );
            let tuples: Vec<&str> = chunk.iter().map(|_| "(?, ?, ?, ?, ?, ?, ?, ?)").collect();
            query_builder.push_str(&tuples.join(", "));
            // 동일 타임스탬프 충돌 시 새로 가져온 데이터가 이김
            query_builder.push_str(
                r#"
                ON CONFLICT (symbol, timeframe, open_time) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume
                "#,
            );

            let mut query = sqlx::query(&query_builder);
            for bar in chunk {
                query = query
                    .bind(symbol.as_str())
                    .bind(timeframe.to_interval())
                    .bind(bar.open_time.timestamp_millis())
                    .bind(bar.open.to_string())
                    .bind(bar.high.to_string())
                    .bind(bar.low.to_string())
                    .bind(bar.close.to_string())
                    .bind(bar.volume.to_string());
            }

            let result = query.execute(self.db.pool()).await?;
            written += result.rows_affected() as usize;
        }

        let mut coverage = self.get_coverage(symbol, timeframe, SeriesKind::Bars).await?;
        coverage.insert(*covered);
        self.replace_coverage(symbol, timeframe, SeriesKind::Bars, &coverage)
            .await?;

        debug!(symbol = %symbol, timeframe = %timeframe, written, "캔들 저장 완료");
        Ok(written)
    }

    /// 시간 범위 내의 캔들을 시간순으로 조회합니다.
    ///
    /// # Errors
    /// 범위와 겹치는 커버리지가 없으면 `DataError::NotFound`를 반환합니다.
    /// 호출자는 먼저 커버리지를 확인해야 합니다.
    #[instrument(skip(self))]
    pub async fn query_bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        range: &TimeRange,
    ) -> Result<Vec<Bar>> {
        let coverage = self.get_coverage(symbol, timeframe, SeriesKind::Bars).await?;
        if !coverage.overlaps(range) {
            return Err(DataError::NotFound(format!(
                "no coverage for {} {} in {}",
                symbol, timeframe, range
            )));
        }

        let records: Vec<BarRecord> = sqlx::query_as(
            r#"
            SELECT symbol, timeframe, open_time, open, high, low, close, volume FROM bars
            WHERE symbol = ? AND timeframe = ? AND open_time >= ? AND open_time < ?
            ORDER BY open_time ASC
            "#,
        )
        .bind(symbol.as_str())
        .bind(timeframe.to_interval())
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis())
        .fetch_all(self.db.pool())
        .await?;

        records.iter().map(|r| r.to_bar()).collect()
    }

    // =========================================================================
    // 틱 작업
    // =========================================================================

    /// 틱을 멱등 upsert로 저장하고 커버리지를 확장합니다.
    ///
    /// 틱 시리즈의 커버리지 키는 의사 타임프레임(`1m`)을 사용합니다.
    #[instrument(skip(self, ticks), fields(count = ticks.len()))]
    pub async fn write_ticks(
        &self,
        symbol: &Symbol,
        ticks: &[Tick],
        covered: &TimeRange,
    ) -> Result<usize> {
        let timeframe = Timeframe::M1;
        let lock = self.write_lock(symbol, timeframe, SeriesKind::Ticks).await;
        let _guard = lock.lock().await;

        let mut written = 0;
        for chunk in ticks.chunks(INSERT_CHUNK) {
            let mut query_builder = String::from(
                "INSERT INTO ticks (symbol, timestamp, bid, ask, bid_volume, ask_volume) VALUES ",
            );
            let tuples: Vec<&str> = chunk.iter().map(|_| "(?, ?, ?, ?, ?, ?)").collect();
            query_builder.push_str(&tuples.join(", "));
            query_builder.push_str(
                r#"
                ON CONFLICT (symbol, timestamp) DO UPDATE SET
                    bid = excluded.bid,
                    ask = excluded.ask,
                    bid_volume = excluded.bid_volume,
                    ask_volume = excluded.ask_volume
                "#,
            );

            let mut query = sqlx::query(&query_builder);
            for tick in chunk {
                query = query
                    .bind(symbol.as_str())
                    .bind(tick.timestamp.timestamp_millis())
                    .bind(tick.bid.to_string())
                    .bind(tick.ask.to_string())
                    .bind(tick.bid_volume.to_string())
                    .bind(tick.ask_volume.to_string());
            }

            let result = query.execute(self.db.pool()).await?;
            written += result.rows_affected() as usize;
        }

        let mut coverage = self.get_coverage(symbol, timeframe, SeriesKind::Ticks).await?;
        coverage.insert(*covered);
        self.replace_coverage(symbol, timeframe, SeriesKind::Ticks, &coverage)
            .await?;

        debug!(symbol = %symbol, written, "틱 저장 완료");
        Ok(written)
    }

    /// 시간 범위 내의 틱을 시간순으로 조회합니다.
    ///
    /// # Errors
    /// 범위와 겹치는 커버리지가 없으면 `DataError::NotFound`를 반환합니다.
    #[instrument(skip(self))]
    pub async fn query_ticks(&self, symbol: &Symbol, range: &TimeRange) -> Result<Vec<Tick>> {
        let coverage = self
            .get_coverage(symbol, Timeframe::M1, SeriesKind::Ticks)
            .await?;
        if !coverage.overlaps(range) {
            return Err(DataError::NotFound(format!(
                "no tick coverage for {} in {}",
                symbol, range
            )));
        }

        let records: Vec<TickRecord> = sqlx::query_as(
            r#"
            SELECT symbol, timestamp, bid, ask, bid_volume, ask_volume FROM ticks
            WHERE symbol = ? AND timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(symbol.as_str())
        .bind(range.start.timestamp_millis())
        .bind(range.end.timestamp_millis())
        .fetch_all(self.db.pool())
        .await?;

        records.iter().map(|r| r.to_tick()).collect()
    }

    // =========================================================================
    // 삭제 및 요약
    // =========================================================================

    /// (심볼, 타임프레임, 종류)의 모든 레코드와 커버리지를 삭제합니다.
    ///
    /// 키가 없으면 아무 것도 하지 않습니다 (no-op).
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        kind: SeriesKind,
    ) -> Result<u64> {
        let lock = self.write_lock(symbol, timeframe, kind).await;
        let _guard = lock.lock().await;

        let deleted = match kind {
            SeriesKind::Bars => {
                sqlx::query("DELETE FROM bars WHERE symbol = ? AND timeframe = ?")
                    .bind(symbol.as_str())
                    .bind(timeframe.to_interval())
                    .execute(self.db.pool())
                    .await?
                    .rows_affected()
            }
            SeriesKind::Ticks => {
                sqlx::query("DELETE FROM ticks WHERE symbol = ?")
                    .bind(symbol.as_str())
                    .execute(self.db.pool())
                    .await?
                    .rows_affected()
            }
        };

        sqlx::query("DELETE FROM coverage WHERE symbol = ? AND timeframe = ? AND kind = ?")
            .bind(symbol.as_str())
            .bind(timeframe.to_interval())
            .bind(kind.as_str())
            .execute(self.db.pool())
            .await?;

        debug!(symbol = %symbol, timeframe = %timeframe, kind = %kind, deleted, "시리즈 삭제");
        Ok(deleted)
    }

    /// 저장된 모든 시리즈의 요약 정보를 반환합니다.
    pub async fn stored_info(&self) -> Result<Vec<StoredSeriesInfo>> {
        let rows: Vec<(String, String, String, i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT symbol, timeframe, kind, start_time, end_time, updated_at FROM coverage
            ORDER BY symbol, timeframe, kind, start_time ASC
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        // (심볼, 타임프레임, 종류)별로 구간 그룹화
        let mut grouped: Vec<StoredSeriesInfo> = Vec::new();
        for (symbol, timeframe, kind, start, end, updated_at) in rows {
            let range = TimeRange {
                start: parse_timestamp(start)?,
                end: parse_timestamp(end)?,
            };
            let updated = parse_timestamp(updated_at)?;
            let kind = parse_kind(&kind)?;
            let timeframe = parse_timeframe(&timeframe)?;
            let symbol = Symbol::new(&symbol);

            let same_series = grouped.last().is_some_and(|info| {
                info.symbol == symbol && info.timeframe == timeframe && info.kind == kind
            });

            if same_series {
                if let Some(info) = grouped.last_mut() {
                    info.ranges.push(range);
                    info.last_updated = info.last_updated.max(updated);
                }
            } else {
                grouped.push(StoredSeriesInfo {
                    symbol,
                    timeframe,
                    kind,
                    record_count: 0,
                    ranges: vec![range],
                    last_updated: updated,
                });
            }
        }

        // 레코드 수 채우기
        for info in &mut grouped {
            info.record_count = match info.kind {
                SeriesKind::Bars => {
                    let (count,): (i64,) = sqlx::query_as(
                        "SELECT COUNT(*) FROM bars WHERE symbol = ? AND timeframe = ?",
                    )
                    .bind(info.symbol.as_str())
                    .bind(info.timeframe.to_interval())
                    .fetch_one(self.db.pool())
                    .await?;
                    count
                }
                SeriesKind::Ticks => {
                    let (count,): (i64,) =
                        sqlx::query_as("SELECT COUNT(*) FROM ticks WHERE symbol = ?")
                            .bind(info.symbol.as_str())
                            .fetch_one(self.db.pool())
                            .await?;
                    count
                }
            };
        }

        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn bar(day: u32, hour: u32, close: Decimal) -> Bar {
        Bar {
            symbol: Symbol::new("EURUSD"),
            timeframe: Timeframe::H1,
            open_time: ts(day, hour),
            open: dec!(1.0950),
            high: dec!(1.0990),
            low: dec!(1.0940),
            close,
            volume: dec!(100),
        }
    }

    fn tick(day: u32, hour: u32) -> Tick {
        Tick {
            symbol: Symbol::new("EURUSD"),
            timestamp: ts(day, hour),
            bid: dec!(1.0950),
            ask: dec!(1.0952),
            bid_volume: dec!(1.5),
            ask_volume: dec!(0.5),
        }
    }

    #[tokio::test]
    async fn test_write_and_query_roundtrip() {
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");
        let bars = vec![bar(2, 10, dec!(1.0960)), bar(2, 11, dec!(1.0970))];
        let covered = TimeRange::new(ts(2, 10), ts(2, 12)).unwrap();

        store
            .write_bars(&symbol, Timeframe::H1, &bars, &covered)
            .await
            .unwrap();

        let loaded = store
            .query_bars(&symbol, Timeframe::H1, &covered)
            .await
            .unwrap();

        assert_eq!(loaded, bars);
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");
        let bars = vec![bar(2, 10, dec!(1.0960)), bar(2, 11, dec!(1.0970))];
        let covered = TimeRange::new(ts(2, 10), ts(2, 12)).unwrap();

        store
            .write_bars(&symbol, Timeframe::H1, &bars, &covered)
            .await
            .unwrap();
        store
            .write_bars(&symbol, Timeframe::H1, &bars, &covered)
            .await
            .unwrap();

        let loaded = store
            .query_bars(&symbol, Timeframe::H1, &covered)
            .await
            .unwrap();
        let coverage = store
            .get_coverage(&symbol, Timeframe::H1, SeriesKind::Bars)
            .await
            .unwrap();

        assert_eq!(loaded, bars);
        assert_eq!(coverage.ranges(), &[covered]);
    }

    #[tokio::test]
    async fn test_rewrite_replaces_conflicting_rows() {
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");
        let covered = TimeRange::new(ts(2, 10), ts(2, 11)).unwrap();

        store
            .write_bars(&symbol, Timeframe::H1, &[bar(2, 10, dec!(1.0960))], &covered)
            .await
            .unwrap();
        // 제공자 정정분: 같은 타임스탬프, 새 종가 → 새 데이터가 이김
        store
            .write_bars(&symbol, Timeframe::H1, &[bar(2, 10, dec!(1.0999))], &covered)
            .await
            .unwrap();

        let loaded = store
            .query_bars(&symbol, Timeframe::H1, &covered)
            .await
            .unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].close, dec!(1.0999));
    }

    #[tokio::test]
    async fn test_coverage_merges_adjacent_writes() {
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");

        let first = TimeRange::new(ts(1, 0), ts(5, 0)).unwrap();
        let second = TimeRange::new(ts(5, 0), ts(10, 0)).unwrap();
        store
            .write_bars(&symbol, Timeframe::H1, &[bar(2, 10, dec!(1.0960))], &first)
            .await
            .unwrap();
        store
            .write_bars(&symbol, Timeframe::H1, &[bar(6, 10, dec!(1.0970))], &second)
            .await
            .unwrap();

        let coverage = store
            .get_coverage(&symbol, Timeframe::H1, SeriesKind::Bars)
            .await
            .unwrap();

        assert_eq!(coverage.len(), 1);
        assert_eq!(
            coverage.ranges()[0],
            TimeRange::new(ts(1, 0), ts(10, 0)).unwrap()
        );
    }

    #[tokio::test]
    async fn test_query_uncovered_range_is_not_found() {
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");
        let range = TimeRange::new(ts(1, 0), ts(2, 0)).unwrap();

        let result = store.query_bars(&symbol, Timeframe::H1, &range).await;
        assert!(matches!(result.unwrap_err(), DataError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_noop_for_missing_key() {
        let store = DataStore::open_in_memory().await.unwrap();
        let deleted = store
            .delete(&Symbol::new("EURUSD"), Timeframe::H1, SeriesKind::Bars)
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn test_delete_removes_rows_and_coverage() {
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");
        let covered = TimeRange::new(ts(2, 10), ts(2, 12)).unwrap();

        store
            .write_bars(
                &symbol,
                Timeframe::H1,
                &[bar(2, 10, dec!(1.0960)), bar(2, 11, dec!(1.0970))],
                &covered,
            )
            .await
            .unwrap();

        let deleted = store
            .delete(&symbol, Timeframe::H1, SeriesKind::Bars)
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        let coverage = store
            .get_coverage(&symbol, Timeframe::H1, SeriesKind::Bars)
            .await
            .unwrap();
        assert!(coverage.is_empty());
    }

    #[tokio::test]
    async fn test_tick_roundtrip_and_coverage() {
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");
        let ticks = vec![tick(2, 10), tick(2, 11)];
        let covered = TimeRange::new(ts(2, 10), ts(2, 12)).unwrap();

        store.write_ticks(&symbol, &ticks, &covered).await.unwrap();

        let loaded = store.query_ticks(&symbol, &covered).await.unwrap();
        assert_eq!(loaded, ticks);

        let coverage = store
            .get_coverage(&symbol, Timeframe::M1, SeriesKind::Ticks)
            .await
            .unwrap();
        assert_eq!(coverage.ranges(), &[covered]);
    }

    #[tokio::test]
    async fn test_stored_info_summary() {
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");

        store
            .write_bars(
                &symbol,
                Timeframe::H1,
                &[bar(2, 10, dec!(1.0960)), bar(2, 11, dec!(1.0970))],
                &TimeRange::new(ts(2, 10), ts(2, 12)).unwrap(),
            )
            .await
            .unwrap();
        store
            .write_ticks(
                &symbol,
                &[tick(3, 10)],
                &TimeRange::new(ts(3, 10), ts(3, 11)).unwrap(),
            )
            .await
            .unwrap();

        let info = store.stored_info().await.unwrap();

        assert_eq!(info.len(), 2);
        let bars_info = info.iter().find(|i| i.kind == SeriesKind::Bars).unwrap();
        assert_eq!(bars_info.record_count, 2);
        assert_eq!(bars_info.ranges.len(), 1);
        let ticks_info = info.iter().find(|i| i.kind == SeriesKind::Ticks).unwrap();
        assert_eq!(ticks_info.record_count, 1);
    }

    #[tokio::test]
    async fn test_empty_write_still_extends_coverage() {
        // 주말 구간처럼 레코드가 없어도 가져온 범위는 커버된 것으로 기록
        let store = DataStore::open_in_memory().await.unwrap();
        let symbol = Symbol::new("EURUSD");
        let covered = TimeRange::new(ts(6, 0), ts(8, 0)).unwrap();

        store
            .write_bars(&symbol, Timeframe::H1, &[], &covered)
            .await
            .unwrap();

        let coverage = store
            .get_coverage(&symbol, Timeframe::H1, SeriesKind::Bars)
            .await
            .unwrap();
        assert_eq!(coverage.ranges(), &[covered]);

        // 커버리지는 있으므로 조회는 빈 목록을 반환
        let loaded = store.query_bars(&symbol, Timeframe::H1, &covered).await.unwrap();
        assert!(loaded.is_empty());
    }
}
