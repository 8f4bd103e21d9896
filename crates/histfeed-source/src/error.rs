//! 데이터 소스 에러 타입.

use thiserror::Error;

/// 데이터 소스 관련 에러.
#[derive(Debug, Error)]
pub enum SourceError {
    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded")]
    RateLimited,

    /// 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 제공자 API 에러 코드
    #[error("API error {code}: {message}")]
    Api { code: i32, message: String },

    /// 파싱/역직렬화 에러
    #[error("Parse error: {0}")]
    Parse(String),

    /// 압축 해제/바이너리 디코드 에러
    #[error("Decode error: {0}")]
    Decode(String),

    /// 지원되지 않는 심볼
    #[error("Symbol not supported: {0}")]
    UnsupportedSymbol(String),

    /// 지원되지 않는 타임프레임
    #[error("Timeframe not supported: {0}")]
    UnsupportedTimeframe(String),

    /// 지원되지 않는 작업
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// 재시도 소진 후 제공자 사용 불가
    #[error("Source '{provider}' unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        provider: String,
        attempts: u32,
        last_error: String,
    },
}

/// 소스 작업을 위한 Result 타입.
pub type SourceResult<T> = Result<T, SourceError>;

impl SourceError {
    /// 재시도 가능한 에러인지 확인.
    ///
    /// 일시적 네트워크 장애, 타임아웃, 요청 한도 초과, 서버측(5xx)
    /// 에러만 재시도 대상입니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Network(_) | SourceError::RateLimited | SourceError::Timeout(_) => true,
            SourceError::Api { code, .. } => (500..600).contains(code),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout(err.to_string())
        } else if err.is_connect() {
            SourceError::Network(err.to_string())
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(SourceError::Network("reset".to_string()).is_retryable());
        assert!(SourceError::RateLimited.is_retryable());
        assert!(SourceError::Timeout("30s".to_string()).is_retryable());
        assert!(SourceError::Api {
            code: 503,
            message: "maintenance".to_string()
        }
        .is_retryable());

        assert!(!SourceError::Parse("bad json".to_string()).is_retryable());
        assert!(!SourceError::UnsupportedSymbol("FOO".to_string()).is_retryable());
        assert!(!SourceError::Api {
            code: 400,
            message: "bad request".to_string()
        }
        .is_retryable());
    }
}
