//! 지수 백오프 재시도.
//!
//! 일시적 네트워크/제공자 오류는 어댑터 내부에서 재시도합니다.
//! 재시도 한도를 소진하면 `SourceError::Unavailable`로 승격되어
//! 호출자에게 전파됩니다.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::SourceError;

/// 재시도 정책.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 최대 재시도 횟수 (최초 시도 제외)
    pub max_retries: u32,
    /// 기본 지연 (시도마다 2배씩 증가)
    pub base_delay: Duration,
    /// 지연 상한
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 새 재시도 정책을 생성합니다.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    /// 지연 상한을 설정합니다.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// n번째 재시도 전 대기 시간을 계산합니다 (0부터 시작).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// 일시적 오류에 대해 지수 백오프로 작업을 재시도합니다.
///
/// 재시도 불가능한 오류는 즉시 반환됩니다. 재시도 한도를 소진하면
/// 마지막 오류를 담은 `SourceError::Unavailable`을 반환합니다.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    source: &str,
    operation: &str,
    mut f: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0u32;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= policy.max_retries => {
                warn!(
                    source = source,
                    operation = operation,
                    attempts = attempt + 1,
                    error = %err,
                    "재시도 한도 소진"
                );
                return Err(SourceError::Unavailable {
                    provider: source.to_string(),
                    attempts: attempt + 1,
                    last_error: err.to_string(),
                });
            }
            Err(err) => {
                let delay = policy.delay_for(attempt);
                debug!(
                    source = source,
                    operation = operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "일시적 오류, 재시도 대기"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
