//! 공통 에러 타입.
//!
//! 이 모듈은 도메인 계층 전반에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

/// 핵심 도메인 에러.
#[derive(Debug, Error)]
pub enum FeedError {
    /// 잘못된 요청 (재시도하지 않고 즉시 반환)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 불변 조건을 위반한 데이터
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// 설정 에러
    #[error("configuration error: {0}")]
    Config(String),

    /// 직렬화 에러
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// 도메인 작업을 위한 Result 타입.
pub type FeedResult<T> = Result<T, FeedError>;

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for FeedError {
    fn from(err: config::ConfigError) -> Self {
        FeedError::Config(err.to_string())
    }
}
