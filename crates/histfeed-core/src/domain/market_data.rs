//! 시장 데이터 타입 및 구조체.
//!
//! 이 모듈은 시장 데이터 관련 타입을 정의합니다:
//! - `Bar` - OHLCV 캔들스틱 데이터
//! - `Tick` - 호가 틱 데이터 (bid/ask)

use crate::error::FeedError;
use crate::types::{Symbol, Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OHLCV 캔들스틱 데이터.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 타임프레임
    pub timeframe: Timeframe,
    /// 캔들 시작 시간 (버킷 경계에 정렬)
    pub open_time: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량
    pub volume: Decimal,
}

impl Bar {
    /// 새 캔들을 생성합니다.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        timeframe: Timeframe,
        open_time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 캔들의 불변 조건을 검증합니다.
    ///
    /// - `open_time`은 타임프레임 버킷 경계에 정렬되어야 함
    /// - `high >= max(open, close)`, `low <= min(open, close)`
    /// - 모든 가격은 양수
    pub fn validate(&self) -> Result<(), FeedError> {
        if !self.timeframe.is_aligned(self.open_time) {
            return Err(FeedError::InvalidData(format!(
                "bar open_time {} is not aligned to {} bucket",
                self.open_time, self.timeframe
            )));
        }
        if self.open <= Decimal::ZERO || self.close <= Decimal::ZERO {
            return Err(FeedError::InvalidData(format!(
                "bar for {} has non-positive price",
                self.symbol
            )));
        }
        if self.high < self.open.max(self.close) {
            return Err(FeedError::InvalidData(format!(
                "bar high {} below body for {}",
                self.high, self.symbol
            )));
        }
        if self.low > self.open.min(self.close) {
            return Err(FeedError::InvalidData(format!(
                "bar low {} above body for {}",
                self.low, self.symbol
            )));
        }
        Ok(())
    }

    /// 캔들 종료 시간 (배타적)을 반환합니다.
    pub fn close_time(&self) -> DateTime<Utc> {
        self.open_time + chrono::Duration::milliseconds(self.timeframe.as_millis())
    }

    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// 호가 틱 데이터.
///
/// 단일 시점의 bid/ask 호가와 각 호가의 물량을 담습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// 거래 심볼
    pub symbol: Symbol,
    /// 타임스탬프 (UTC, 밀리초 정밀도)
    pub timestamp: DateTime<Utc>,
    /// 매수 호가
    pub bid: Decimal,
    /// 매도 호가
    pub ask: Decimal,
    /// 매수 호가 물량
    pub bid_volume: Decimal,
    /// 매도 호가 물량
    pub ask_volume: Decimal,
}

impl Tick {
    /// 틱의 불변 조건을 검증합니다 (가격 > 0).
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.bid <= Decimal::ZERO || self.ask <= Decimal::ZERO {
            return Err(FeedError::InvalidData(format!(
                "tick for {} at {} has non-positive price",
                self.symbol, self.timestamp
            )));
        }
        Ok(())
    }

    /// 중간 가격을 반환합니다.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }

    /// 틱의 총 물량 (bid + ask)을 반환합니다.
    pub fn total_volume(&self) -> Decimal {
        self.bid_volume + self.ask_volume
    }
}

/// 틱 배치의 불변 조건을 검증합니다.
///
/// 배치 내 타임스탬프는 단조 비감소여야 하며, 개별 틱은 가격 검증을
/// 통과해야 합니다.
pub fn validate_tick_batch(ticks: &[Tick]) -> Result<(), FeedError> {
    for pair in ticks.windows(2) {
        if pair[1].timestamp < pair[0].timestamp {
            return Err(FeedError::InvalidData(format!(
                "tick timestamps decrease at {}",
                pair[1].timestamp
            )));
        }
    }
    for tick in ticks {
        tick.validate()?;
    }
    Ok(())
}
