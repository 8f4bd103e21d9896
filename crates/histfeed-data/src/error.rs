//! 데이터 모듈 오류 타입.

use histfeed_core::{Bar, FeedError, Tick, TimeRange, Timeframe};
use histfeed_source::SourceError;
use thiserror::Error;

/// 요청 종류에 따른 시계열 데이터.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeriesData {
    /// OHLCV 캔들
    Bars(Vec<Bar>),
    /// 호가 틱
    Ticks(Vec<Tick>),
}

impl SeriesData {
    /// 레코드 수를 반환합니다.
    pub fn len(&self) -> usize {
        match self {
            SeriesData::Bars(bars) => bars.len(),
            SeriesData::Ticks(ticks) => ticks.len(),
        }
    }

    /// 데이터가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 부분 실패 결과.
///
/// 해결된 데이터와 해결하지 못한 갭 목록을 함께 담습니다.
/// 호출자는 부분 데이터 수용 여부를 직접 결정합니다.
#[derive(Debug, Clone)]
pub struct PartialResult {
    /// 성공적으로 해결된 데이터 (캐시 + 새로 가져온 데이터의 합집합)
    pub data: SeriesData,
    /// 해결하지 못한 시간 구간
    pub unresolved: Vec<TimeRange>,
}

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 데이터베이스 연결 오류
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// 쿼리 실행 오류
    #[error("Query error: {0}")]
    QueryError(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// 연결 풀 소진
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// 중복 레코드
    #[error("Duplicate record: {0}")]
    DuplicateError(String),

    /// 커버리지 없는 범위에 대한 조회
    #[error("Not found: {0}")]
    NotFound(String),

    /// 잘못된 요청 (재시도 없이 즉시 반환)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 불변 조건을 위반한 데이터
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 원본 타임프레임에서 파생할 수 없는 집계 요청
    #[error("Incompatible timeframe: {target} is not an integer multiple of {source_tf}")]
    IncompatibleTimeframe {
        source_tf: Timeframe,
        target: Timeframe,
    },

    /// 데이터 소스 오류 (어댑터에서 그대로 전파)
    #[error(transparent)]
    Source(#[from] SourceError),

    /// 일부 갭을 해결하지 못한 부분 결과
    #[error("Partial result: {} unresolved ranges", .0.unresolved.len())]
    Partial(Box<PartialResult>),

    /// 요청이 취소됨 (진행 중 결과는 폐기)
    #[error("Request cancelled")]
    Cancelled,
}

/// 데이터 작업을 위한 Result 타입.
pub type Result<T> = std::result::Result<T, DataError>;

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataError::NotFound("Row not found".to_string()),
            sqlx::Error::PoolTimedOut => DataError::PoolExhausted,
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                // SQLite 고유 제약 조건 위반 (1555: PK, 2067: UNIQUE)
                if code == "1555" || code == "2067" {
                    DataError::DuplicateError(db_err.message().to_string())
                } else {
                    DataError::QueryError(db_err.message().to_string())
                }
            }
            _ => DataError::QueryError(err.to_string()),
        }
    }
}

impl From<FeedError> for DataError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::InvalidRequest(msg) => DataError::InvalidRequest(msg),
            FeedError::InvalidData(msg) => DataError::InvalidData(msg),
            other => DataError::InvalidData(other.to_string()),
        }
    }
}
