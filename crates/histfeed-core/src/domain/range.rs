//! 시간 구간 및 커버리지 집합.
//!
//! 이 모듈은 캐시된 데이터 범위 추적의 핵심 연산을 정의합니다:
//! - `TimeRange` - 반개구간 `[start, end)` 시간 범위
//! - `CoverageSet` - 정렬된 비중첩·비인접 구간 집합
//!
//! 커버리지 집합은 항상 최소 형태를 유지합니다. 서로 겹치거나 맞닿은
//! 구간은 삽입 시점에 병합되므로, 두 구간을 더 합칠 수 있는 상태는
//! 존재하지 않습니다.

use crate::error::FeedError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 반개구간 `[start, end)` 시간 범위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// 시작 시각 (포함)
    pub start: DateTime<Utc>,
    /// 종료 시각 (배타)
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// 새 시간 범위를 생성합니다.
    ///
    /// # Errors
    /// `start >= end`이면 `FeedError::InvalidData`를 반환합니다.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, FeedError> {
        if start >= end {
            return Err(FeedError::InvalidData(format!(
                "invalid time range: start {} >= end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// 범위의 길이를 반환합니다.
    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// 다른 범위와 겹치는지 확인합니다 (경계만 맞닿은 경우는 제외).
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// 다른 범위와 겹치거나 맞닿아 있는지 확인합니다.
    ///
    /// 맞닿은 구간은 커버리지 집합에서 하나로 병합됩니다.
    pub fn touches(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// 다른 범위를 완전히 포함하는지 확인합니다.
    pub fn contains_range(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// 시각이 범위에 속하는지 확인합니다.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// 정렬된 비중첩·비인접 시간 구간 집합.
///
/// (심볼, 타임프레임) 단위로 저장소에 완전히 존재하는 범위를 추적합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSet {
    ranges: Vec<TimeRange>,
}

impl CoverageSet {
    /// 빈 집합을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 구간 목록에서 집합을 생성합니다. 겹치거나 맞닿은 구간은 병합됩니다.
    pub fn from_ranges(ranges: impl IntoIterator<Item = TimeRange>) -> Self {
        let mut set = Self::new();
        for range in ranges {
            set.insert(range);
        }
        set
    }

    /// 집합이 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// 구간 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// 정렬된 구간 슬라이스를 반환합니다.
    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    /// 구간을 삽입하고 겹치거나 맞닿은 기존 구간과 병합합니다.
    pub fn insert(&mut self, range: TimeRange) {
        let mut merged = range;
        let mut result: Vec<TimeRange> = Vec::with_capacity(self.ranges.len() + 1);

        for existing in self.ranges.drain(..) {
            if existing.touches(&merged) {
                merged = TimeRange {
                    start: merged.start.min(existing.start),
                    end: merged.end.max(existing.end),
                };
            } else {
                result.push(existing);
            }
        }

        result.push(merged);
        result.sort_by_key(|r| r.start);
        self.ranges = result;
    }

    /// 요청 범위가 완전히 커버되는지 확인합니다.
    pub fn covers(&self, range: &TimeRange) -> bool {
        self.ranges.iter().any(|r| r.contains_range(range))
    }

    /// 요청 범위와 겹치는 커버리지가 존재하는지 확인합니다.
    pub fn overlaps(&self, range: &TimeRange) -> bool {
        self.ranges.iter().any(|r| r.intersects(range))
    }

    /// 요청 범위에서 커버되지 않은 부분 구간(갭)을 계산합니다.
    ///
    /// 결과는 시간순으로 정렬된 비중첩 구간 목록입니다. 요청이 완전히
    /// 커버된 경우 빈 목록을 반환합니다.
    pub fn gaps(&self, request: &TimeRange) -> Vec<TimeRange> {
        let mut gaps = Vec::new();
        let mut cursor = request.start;

        for covered in &self.ranges {
            if covered.end <= cursor {
                continue;
            }
            if covered.start >= request.end {
                break;
            }
            if covered.start > cursor {
                gaps.push(TimeRange {
                    start: cursor,
                    end: covered.start.min(request.end),
                });
            }
            cursor = cursor.max(covered.end);
            if cursor >= request.end {
                return gaps;
            }
        }

        if cursor < request.end {
            gaps.push(TimeRange {
                start: cursor,
                end: request.end,
            });
        }
        gaps
    }
}

impl IntoIterator for CoverageSet {
    type Item = TimeRange;
    type IntoIter = std::vec::IntoIter<TimeRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.into_iter()
    }
}
