//! 데이터 요청 객체.
//!
//! 호출자가 원하는 시계열을 명시적인 요청/응답 객체로 표현합니다.
//! 요청은 호출마다 생성되어 검증된 뒤 매니저가 소비합니다.

use crate::domain::range::TimeRange;
use crate::error::FeedError;
use crate::types::{Symbol, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 시계열 데이터 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    /// OHLCV 캔들
    Bars,
    /// 호가 틱
    Ticks,
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKind::Bars => write!(f, "bars"),
            SeriesKind::Ticks => write!(f, "ticks"),
        }
    }
}

impl SeriesKind {
    /// 저장소 키로 사용되는 문자열을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Bars => "bars",
            SeriesKind::Ticks => "ticks",
        }
    }
}

/// 시계열 데이터 요청.
///
/// 틱 요청의 경우에도 저장소 키 구성을 위해 타임프레임이 필요하므로
/// `M1`을 틱 시리즈의 의사 타임프레임으로 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 요청 시작 시각 (포함)
    pub start: DateTime<Utc>,
    /// 요청 종료 시각 (배타)
    pub end: DateTime<Utc>,
    /// 타임프레임
    pub timeframe: Timeframe,
    /// 데이터 종류
    pub kind: SeriesKind,
}

impl DataRequest {
    /// 캔들 데이터 요청을 생성합니다.
    pub fn bars(
        symbol: impl Into<Symbol>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeframe: Timeframe,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
            timeframe,
            kind: SeriesKind::Bars,
        }
    }

    /// 틱 데이터 요청을 생성합니다.
    pub fn ticks(symbol: impl Into<Symbol>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
            timeframe: Timeframe::M1,
            kind: SeriesKind::Ticks,
        }
    }

    /// 요청의 형식적 유효성을 검증합니다.
    ///
    /// # Errors
    /// `start >= end`이거나 심볼이 비어 있으면 `FeedError::InvalidRequest`를
    /// 반환합니다.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.symbol.as_str().is_empty() {
            return Err(FeedError::InvalidRequest("empty symbol".to_string()));
        }
        if self.start >= self.end {
            return Err(FeedError::InvalidRequest(format!(
                "start {} must be before end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// 요청의 시간 범위를 반환합니다.
    ///
    /// 검증을 통과한 요청에서만 호출해야 합니다.
    pub fn range(&self) -> Result<TimeRange, FeedError> {
        TimeRange::new(self.start, self.end)
    }
}

impl fmt::Display for DataRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}, {})",
            self.symbol, self.timeframe, self.kind, self.start, self.end
        )
    }
}
