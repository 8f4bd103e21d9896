//! 피드 매니저 구현.
//!
//! 저장소(SQLite)와 원격 데이터 소스 사이를 조정하여 read-through
//! 캐싱을 제공합니다.
//!
//! # 요청 처리 흐름
//!
//! ```text
//! 요청 (symbol, [start, end), timeframe, kind)
//!         │
//!         ▼
//! ┌──────────────────┐
//! │ 1. 요청 검증       │ ← 잘못된 범위/지원 불가 조합은 즉시 거부
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │ 2. 커버리지 확인   │ ← 요청 − 커버리지 = 갭 목록
//! └────────┬─────────┘
//!          │ 갭 있음
//! ┌────────▼─────────┐
//! │ 3. 갭 페치        │ ← 제한된 동시성, 전부 완료 후 다음 단계 (join)
//! │    (+ 리샘플링)   │ ← 네이티브 캔들이 없으면 틱을 받아 집계
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │ 4. 영속화         │ ← 취소된 요청의 결과는 폐기 (부분 적용 방지)
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │ 5. 병합 후 반환    │ ← 캐시 ∪ 신규, 시간순, 타임스탬프 중복 제거
//! └──────────────────┘
//! ```
//!
//! 갭 하나의 실패는 이미 해결된 부분을 무효화하지 않습니다. 해결된
//! 데이터와 미해결 구간 목록을 담은 `DataError::Partial`로 보고되어
//! 호출자가 부분 데이터 수용 여부를 결정합니다.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use histfeed_core::{DataRequest, FetchConfig, SeriesKind, Symbol, TimeRange, Timeframe};
use histfeed_source::{DataSource, SourceError};

use crate::error::{DataError, PartialResult, Result, SeriesData};
use crate::resample;
use crate::storage::sqlite::{DataStore, StoredSeriesInfo};

/// 저장소와 데이터 소스를 조정하는 중앙 피드 매니저.
///
/// 소스 목록은 우선순위 순서입니다 (앞선 소스가 지원하면 먼저 선택).
pub struct FeedManager {
    store: Arc<DataStore>,
    sources: Vec<Arc<dyn DataSource>>,
    concurrency: usize,
}

impl FeedManager {
    /// 새 피드 매니저를 생성합니다.
    pub fn new(
        store: Arc<DataStore>,
        sources: Vec<Arc<dyn DataSource>>,
        config: &FetchConfig,
    ) -> Self {
        info!(
            sources = sources.len(),
            concurrency = config.concurrency,
            "Initializing FeedManager"
        );
        Self {
            store,
            sources,
            concurrency: config.concurrency.max(1),
        }
    }

    /// 요청을 처리할 수 있는지 확인합니다.
    pub fn validate_request(&self, request: &DataRequest) -> bool {
        request.validate().is_ok() && self.select_source(request).is_ok()
    }

    /// 우선순위 순서로 요청을 지원하는 소스를 선택합니다.
    fn select_source(&self, request: &DataRequest) -> Result<Arc<dyn DataSource>> {
        let found = match request.kind {
            SeriesKind::Bars => self
                .sources
                .iter()
                .find(|s| s.supports(&request.symbol, request.timeframe)),
            SeriesKind::Ticks => self
                .sources
                .iter()
                .find(|s| s.supports_ticks(&request.symbol)),
        };

        found.cloned().ok_or_else(|| {
            DataError::InvalidRequest(format!(
                "no source supports {} {} for {}",
                request.symbol, request.timeframe, request.kind
            ))
        })
    }

    /// 시계열 데이터를 조회합니다 (캐시 우선, 갭만 원격 조회).
    pub async fn fetch_data(&self, request: &DataRequest) -> Result<SeriesData> {
        self.fetch_data_with_cancel(request, CancellationToken::new())
            .await
    }

    /// 취소 토큰과 함께 시계열 데이터를 조회합니다.
    ///
    /// 취소는 갭 페치 사이에 확인됩니다. 진행 중인 페치는 완료를
    /// 허용하되 결과는 영속화하지 않고 폐기하여 부분 적용된 커버리지를
    /// 방지합니다.
    #[instrument(skip(self, cancel), fields(request = %request))]
    pub async fn fetch_data_with_cancel(
        &self,
        request: &DataRequest,
        cancel: CancellationToken,
    ) -> Result<SeriesData> {
        // 1. 검증
        request.validate()?;
        let source = self.select_source(request)?;
        let range = request.range()?;

        if cancel.is_cancelled() {
            return Err(DataError::Cancelled);
        }

        // 2. 커버리지 확인: 요청 − 커버리지 = 갭
        let coverage = self
            .store
            .get_coverage(&request.symbol, request.timeframe, request.kind)
            .await?;
        let gaps = coverage.gaps(&range);

        debug!(
            covered = coverage.len(),
            gaps = gaps.len(),
            source = source.name(),
            "커버리지 확인 완료"
        );

        // 3. 갭 페치: 제한된 동시성으로 전부 완료될 때까지 대기 (join)
        let outcomes: Vec<(TimeRange, std::result::Result<SeriesData, SourceError>)> =
            stream::iter(gaps.into_iter().map(|gap| {
                let source = source.clone();
                let request = request.clone();
                async move {
                    let result = Self::fetch_gap(source, &request, &gap).await;
                    (gap, result)
                }
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // 4. 영속화: 취소된 요청의 결과는 버린다
        if cancel.is_cancelled() {
            info!("요청 취소됨, 페치 결과 폐기");
            return Err(DataError::Cancelled);
        }

        let mut unresolved: Vec<TimeRange> = Vec::new();
        for (gap, outcome) in outcomes {
            match outcome {
                Ok(data) => {
                    self.persist_gap(request, &gap, &data).await?;
                }
                Err(err) => {
                    warn!(gap = %gap, error = %err, "갭 페치 실패");
                    unresolved.push(gap);
                }
            }
        }
        unresolved.sort_by_key(|r| r.start);

        // 5. 병합: 저장소에서 전체 범위를 다시 읽으면 캐시와 신규 데이터가
        //    시간순·중복 제거된 형태로 합쳐진다 (충돌 시 신규가 이미 반영됨)
        let data = self.load_merged(request, &range).await?;

        if !unresolved.is_empty() {
            return Err(DataError::Partial(Box::new(PartialResult {
                data,
                unresolved,
            })));
        }

        info!(records = data.len(), "요청 처리 완료");
        Ok(data)
    }

    /// 단일 갭을 소스에서 가져옵니다.
    ///
    /// 요청한 타임프레임의 캔들이 네이티브로 제공되지 않고 틱이
    /// 제공되는 경우, 틱을 받아 리샘플러로 집계합니다.
    async fn fetch_gap(
        source: Arc<dyn DataSource>,
        request: &DataRequest,
        gap: &TimeRange,
    ) -> std::result::Result<SeriesData, SourceError> {
        match request.kind {
            SeriesKind::Ticks => {
                let ticks = source.fetch_ticks(&request.symbol, gap).await?;
                Ok(SeriesData::Ticks(ticks))
            }
            SeriesKind::Bars => {
                match source.fetch_bars(&request.symbol, gap, request.timeframe).await {
                    Ok(bars) => Ok(SeriesData::Bars(bars)),
                    Err(SourceError::NotSupported(_))
                        if source.supports_ticks(&request.symbol) =>
                    {
                        debug!(
                            symbol = %request.symbol,
                            timeframe = %request.timeframe,
                            gap = %gap,
                            "네이티브 캔들 없음, 틱 리샘플링 경로 사용"
                        );
                        let ticks = source.fetch_ticks(&request.symbol, gap).await?;
                        Ok(SeriesData::Bars(resample::ticks_to_bars(
                            &ticks,
                            request.timeframe,
                        )))
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// 해결된 갭 데이터를 저장소에 기록하고 커버리지를 확장합니다.
    async fn persist_gap(
        &self,
        request: &DataRequest,
        gap: &TimeRange,
        data: &SeriesData,
    ) -> Result<()> {
        match data {
            SeriesData::Bars(bars) => {
                self.store
                    .write_bars(&request.symbol, request.timeframe, bars, gap)
                    .await?;
            }
            SeriesData::Ticks(ticks) => {
                self.store.write_ticks(&request.symbol, ticks, gap).await?;
            }
        }
        Ok(())
    }

    /// 저장소에서 요청 범위 전체를 읽어 병합된 결과를 만듭니다.
    async fn load_merged(&self, request: &DataRequest, range: &TimeRange) -> Result<SeriesData> {
        // 모든 갭이 실패해 커버리지가 전혀 없을 수 있으므로 먼저 확인
        let coverage = self
            .store
            .get_coverage(&request.symbol, request.timeframe, request.kind)
            .await?;
        if !coverage.overlaps(range) {
            return Ok(match request.kind {
                SeriesKind::Bars => SeriesData::Bars(Vec::new()),
                SeriesKind::Ticks => SeriesData::Ticks(Vec::new()),
            });
        }

        match request.kind {
            SeriesKind::Bars => {
                let bars = self
                    .store
                    .query_bars(&request.symbol, request.timeframe, range)
                    .await?;
                Ok(SeriesData::Bars(bars))
            }
            SeriesKind::Ticks => {
                let ticks = self.store.query_ticks(&request.symbol, range).await?;
                Ok(SeriesData::Ticks(ticks))
            }
        }
    }

    /// 저장된 모든 시리즈의 요약 정보를 반환합니다.
    pub async fn get_stored_info(&self) -> Result<Vec<StoredSeriesInfo>> {
        self.store.stored_info().await
    }

    /// (심볼, 타임프레임, 종류)의 저장 데이터를 삭제합니다.
    ///
    /// 키가 없으면 아무 것도 하지 않습니다.
    pub async fn delete_data(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        kind: SeriesKind,
    ) -> Result<u64> {
        self.store.delete(symbol, timeframe, kind).await
    }

    /// 저장소 핸들을 반환합니다.
    pub fn store(&self) -> &Arc<DataStore> {
        &self.store
    }
}
