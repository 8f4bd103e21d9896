//! 로컬 저장소.

pub mod sqlite;

pub use sqlite::{BarRecord, DataStore, Database, StoredSeriesInfo, TickRecord};
