//! 심볼 및 상품 분류 정의.
//!
//! 이 모듈은 거래 상품 식별자 관련 타입을 정의합니다:
//! - `InstrumentClass` - 상품 분류 (외환, 귀금속, 암호화폐 등)
//! - `Symbol` - 정규화된 상품 식별자

use serde::{Deserialize, Serialize};
use std::fmt;

/// 상품 분류.
///
/// 데이터 소스 선택과 지원 여부 판단에 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentClass {
    /// 외환 (EURUSD, GBPJPY 등)
    Forex,
    /// 귀금속 (XAUUSD 등)
    Metal,
    /// 원자재 (BRENT.CMD/USD 등)
    Commodity,
    /// 주가지수 (USA500.IDX/USD 등)
    Index,
    /// 암호화폐 (BTCUSD, BTCUSDT 등)
    Crypto,
    /// 개별 주식 CFD (AAPL.US 등)
    StockCfd,
}

impl fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentClass::Forex => write!(f, "forex"),
            InstrumentClass::Metal => write!(f, "metal"),
            InstrumentClass::Commodity => write!(f, "commodity"),
            InstrumentClass::Index => write!(f, "index"),
            InstrumentClass::Crypto => write!(f, "crypto"),
            InstrumentClass::StockCfd => write!(f, "stock_cfd"),
        }
    }
}

/// 정규화된 거래 상품 식별자.
///
/// 심볼 코드는 대문자로 정규화되어 저장됩니다. 데이터 소스별 형식 변환
/// (예: 바이낸스의 구분자 제거)은 각 소스 어댑터가 담당합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// 새 심볼을 생성합니다. 코드는 대문자로 정규화됩니다.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// 심볼 코드를 반환합니다.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 바이낸스 형식 심볼을 반환합니다 ("BTC/USDT" -> "BTCUSDT").
    pub fn to_binance(&self) -> String {
        self.0.replace(['/', '-', '_'], "")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
