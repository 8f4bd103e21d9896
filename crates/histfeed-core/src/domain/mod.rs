//! 도메인 모델.

pub mod market_data;
pub mod range;
pub mod request;

pub use market_data::{validate_tick_batch, Bar, Tick};
pub use range::{CoverageSet, TimeRange};
pub use request::{DataRequest, SeriesKind};
