//! 설정 관리.
//!
//! 이 모듈은 애플리케이션 설정을 정의하고 관리합니다.
//! 설정은 TOML 파일과 `HISTFEED__` 접두사 환경 변수에서 로드됩니다.

use crate::error::FeedError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 저장소 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 원격 데이터 가져오기 설정
    #[serde(default)]
    pub fetch: FetchConfig,
    /// 바이낸스 소스 설정
    #[serde(default)]
    pub binance: BinanceSourceConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 저장소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// 데이터베이스 파일이 위치할 디렉토리
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
    /// 데이터베이스 파일 이름
    #[serde(default = "default_db_filename")]
    pub filename: String,
    /// 풀의 최대 연결 수
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./data")
}
fn default_db_filename() -> String {
    "histfeed.db".to_string()
}
fn default_max_connections() -> u32 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            filename: default_db_filename(),
            max_connections: default_max_connections(),
        }
    }
}

impl StorageConfig {
    /// 데이터베이스 파일의 전체 경로를 반환합니다.
    pub fn database_path(&self) -> PathBuf {
        self.path.join(&self.filename)
    }
}

/// 원격 데이터 가져오기 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// HTTP 호출당 타임아웃 (초)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 일시적 오류에 대한 최대 재시도 횟수
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// 재시도 기본 지연 (밀리초, 지수적으로 증가)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 갭 페치 동시 실행 한도 (제공자 요청 한도 보호)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_concurrency() -> usize {
    8
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            concurrency: default_concurrency(),
        }
    }
}

impl FetchConfig {
    /// HTTP 호출 타임아웃을 Duration으로 반환합니다.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 재시도 기본 지연을 Duration으로 반환합니다.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// 바이낸스 소스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BinanceSourceConfig {
    /// 이 소스 활성화 여부
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// REST API 기본 URL
    #[serde(default = "default_binance_base_url")]
    pub base_url: String,
}

fn default_enabled() -> bool {
    true
}
fn default_binance_base_url() -> String {
    "https://api.binance.com".to_string()
}

impl Default for BinanceSourceConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            base_url: default_binance_base_url(),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FeedError> {
        let builder = config::Config::builder()
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("HISTFEED")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// 환경 변수에서만 설정을 로드합니다 (파일 없이 기본값 + 오버라이드).
    pub fn from_env() -> Result<Self, FeedError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("HISTFEED")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}
