//! # HistFeed Source
//!
//! 원격 데이터 제공자 어댑터를 제공합니다.
//!
//! - `DataSource` trait: 제공자 중립적 가져오기 인터페이스
//! - `DukascopySource`: 시간 단위 `.bi5` 틱 아카이브 (LZMA 압축)
//! - `BinanceSource`: OHLCV 캔들 REST API
//! - `with_retry`: 일시적 오류에 대한 지수 백오프 재시도
//!
//! 어댑터는 네트워크 I/O만 수행하며 로컬 저장은 저장소 계층의 몫입니다.

pub mod binance;
pub mod dukascopy;
pub mod error;
pub mod retry;
pub mod traits;

pub use binance::{BinanceConfig, BinanceSource};
pub use dukascopy::{DukascopyConfig, DukascopySource};
pub use error::{SourceError, SourceResult};
pub use retry::{with_retry, RetryPolicy};
pub use traits::DataSource;
