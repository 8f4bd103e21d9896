//! 캔들스틱 데이터를 위한 타임프레임 정의.
//!
//! 이 모듈은 다양한 시간 간격을 나타내는 타임프레임 타입과
//! 리샘플링에 필요한 버킷 정렬 연산을 정의합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 캔들스틱 타임프레임.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// 1분봉
    M1,
    /// 3분봉
    M3,
    /// 5분봉
    M5,
    /// 15분봉
    M15,
    /// 30분봉
    M30,
    /// 1시간봉
    H1,
    /// 2시간봉
    H2,
    /// 4시간봉
    H4,
    /// 6시간봉
    H6,
    /// 8시간봉
    H8,
    /// 12시간봉
    H12,
    /// 일봉
    D1,
    /// 3일봉
    D3,
    /// 주봉
    W1,
    /// 월봉 (30일 고정)
    MN1,
}

impl Timeframe {
    /// 이 타임프레임의 기간을 반환합니다.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::from_secs(60),
            Timeframe::M3 => Duration::from_secs(3 * 60),
            Timeframe::M5 => Duration::from_secs(5 * 60),
            Timeframe::M15 => Duration::from_secs(15 * 60),
            Timeframe::M30 => Duration::from_secs(30 * 60),
            Timeframe::H1 => Duration::from_secs(60 * 60),
            Timeframe::H2 => Duration::from_secs(2 * 60 * 60),
            Timeframe::H4 => Duration::from_secs(4 * 60 * 60),
            Timeframe::H6 => Duration::from_secs(6 * 60 * 60),
            Timeframe::H8 => Duration::from_secs(8 * 60 * 60),
            Timeframe::H12 => Duration::from_secs(12 * 60 * 60),
            Timeframe::D1 => Duration::from_secs(24 * 60 * 60),
            Timeframe::D3 => Duration::from_secs(3 * 24 * 60 * 60),
            Timeframe::W1 => Duration::from_secs(7 * 24 * 60 * 60),
            Timeframe::MN1 => Duration::from_secs(30 * 24 * 60 * 60), // 근사값
        }
    }

    /// 이 타임프레임의 초 단위 값을 반환합니다.
    pub fn as_secs(&self) -> u64 {
        self.duration().as_secs()
    }

    /// 이 타임프레임의 밀리초 단위 값을 반환합니다.
    pub fn as_millis(&self) -> i64 {
        (self.as_secs() * 1000) as i64
    }

    /// 모든 타임프레임을 반환합니다.
    pub fn all() -> [Timeframe; 15] {
        [
            Timeframe::M1,
            Timeframe::M3,
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::M30,
            Timeframe::H1,
            Timeframe::H2,
            Timeframe::H4,
            Timeframe::H6,
            Timeframe::H8,
            Timeframe::H12,
            Timeframe::D1,
            Timeframe::D3,
            Timeframe::W1,
            Timeframe::MN1,
        ]
    }

    /// 타임스탬프가 속한 버킷의 시작 시각을 반환합니다.
    ///
    /// 버킷은 Unix epoch 기준으로 타임프레임 기간의 정수배에 정렬되며,
    /// 좌측 폐구간-우측 개구간 `[start, start + duration)`을 이룹니다.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let millis = ts.timestamp_millis();
        let aligned = millis - millis.rem_euclid(self.as_millis());
        DateTime::from_timestamp_millis(aligned).expect("aligned timestamp in range")
    }

    /// 타임스탬프가 버킷 경계에 정렬되어 있는지 확인합니다.
    pub fn is_aligned(&self, ts: DateTime<Utc>) -> bool {
        ts.timestamp_millis().rem_euclid(self.as_millis()) == 0
    }

    /// 이 타임프레임이 다른 타임프레임의 정수배인지 확인합니다.
    ///
    /// 집계 리샘플링(`bars_to_bars`)은 대상 타임프레임이 원본의
    /// 정수배일 때만 유효합니다.
    pub fn is_multiple_of(&self, source: Timeframe) -> bool {
        let target = self.as_millis();
        let source = source.as_millis();
        target >= source && target % source == 0
    }

    /// 바이낸스 간격 문자열로 변환합니다.
    pub fn to_interval(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
            Timeframe::MN1 => "1M",
        }
    }

    /// 간격 문자열에서 파싱합니다.
    pub fn from_interval(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Timeframe::M1),
            "3m" => Some(Timeframe::M3),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "30m" => Some(Timeframe::M30),
            "1h" => Some(Timeframe::H1),
            "2h" => Some(Timeframe::H2),
            "4h" => Some(Timeframe::H4),
            "6h" => Some(Timeframe::H6),
            "8h" => Some(Timeframe::H8),
            "12h" => Some(Timeframe::H12),
            "1d" => Some(Timeframe::D1),
            "3d" => Some(Timeframe::D3),
            "1w" => Some(Timeframe::W1),
            "1M" => Some(Timeframe::MN1),
            _ => None,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_interval())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_interval(s).ok_or_else(|| format!("Invalid timeframe: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timeframe_duration() {
        assert_eq!(Timeframe::M1.as_secs(), 60);
        assert_eq!(Timeframe::H1.as_secs(), 3600);
        assert_eq!(Timeframe::D1.as_secs(), 86400);
        assert_eq!(Timeframe::M5.as_millis(), 300_000);
    }

    #[test]
    fn test_timeframe_interval_roundtrip() {
        for tf in Timeframe::all() {
            assert_eq!(Timeframe::from_interval(tf.to_interval()), Some(tf));
        }
        assert_eq!(Timeframe::from_interval("7m"), None);
    }

    #[test]
    fn test_bucket_start_alignment() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 10, 37, 42).unwrap();

        let m1 = Timeframe::M1.bucket_start(ts);
        assert_eq!(m1, Utc.with_ymd_and_hms(2024, 3, 15, 10, 37, 0).unwrap());

        let h1 = Timeframe::H1.bucket_start(ts);
        assert_eq!(h1, Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap());

        let d1 = Timeframe::D1.bucket_start(ts);
        assert_eq!(d1, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());

        assert!(Timeframe::H1.is_aligned(h1));
        assert!(!Timeframe::H1.is_aligned(ts));
    }

    #[test]
    fn test_bucket_start_is_idempotent() {
        let ts = Utc.with_ymd_and_hms(2021, 7, 4, 23, 59, 59).unwrap();
        for tf in Timeframe::all() {
            let start = tf.bucket_start(ts);
            assert_eq!(tf.bucket_start(start), start);
            assert!(tf.is_aligned(start));
        }
    }

    #[test]
    fn test_is_multiple_of() {
        assert!(Timeframe::H1.is_multiple_of(Timeframe::M1));
        assert!(Timeframe::H1.is_multiple_of(Timeframe::M15));
        assert!(Timeframe::D1.is_multiple_of(Timeframe::H4));
        assert!(Timeframe::MN1.is_multiple_of(Timeframe::D1));

        // 4시간은 30분의 정수배이지만 역은 성립하지 않음
        assert!(Timeframe::H4.is_multiple_of(Timeframe::M30));
        assert!(!Timeframe::M30.is_multiple_of(Timeframe::H4));

        // 1시간은 8시간의 배수가 아님
        assert!(!Timeframe::H1.is_multiple_of(Timeframe::H8));
        // 1일은 8시간의 정수배
        assert!(Timeframe::D1.is_multiple_of(Timeframe::H8));
    }
}
