//! 데이터 소스 trait 정의.

use async_trait::async_trait;
use histfeed_core::{Bar, Symbol, Tick, TimeRange, Timeframe};

use crate::SourceError;

/// 소스 작업을 위한 Result 타입.
pub type FetchResult<T> = Result<T, SourceError>;

/// 통합 데이터 소스 인터페이스.
///
/// 어댑터는 원격 제공자에서 데이터를 가져오는 것만 담당합니다.
/// 재시도는 각 어댑터가 `with_retry`로 내부 처리하며, 캐싱/저장은
/// 데이터 매니저와 저장소의 몫입니다.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// 소스 이름 반환.
    fn name(&self) -> &str;

    /// 심볼/타임프레임 조합의 캔들 데이터 지원 여부 확인.
    ///
    /// 매니저가 제공자를 선택하고 요청을 사전 검증할 때 사용합니다.
    fn supports(&self, symbol: &Symbol, timeframe: Timeframe) -> bool;

    /// 심볼의 틱 데이터 지원 여부 확인.
    fn supports_ticks(&self, symbol: &Symbol) -> bool;

    /// 시간 범위의 OHLCV 캔들 조회.
    ///
    /// 결과는 `open_time` 오름차순으로 정렬되며 요청 범위
    /// `[start, end)` 내의 캔들만 포함합니다.
    async fn fetch_bars(
        &self,
        symbol: &Symbol,
        range: &TimeRange,
        timeframe: Timeframe,
    ) -> FetchResult<Vec<Bar>>;

    /// 시간 범위의 틱 조회.
    ///
    /// 결과는 타임스탬프 오름차순으로 정렬됩니다.
    async fn fetch_ticks(&self, symbol: &Symbol, range: &TimeRange) -> FetchResult<Vec<Tick>>;
}
