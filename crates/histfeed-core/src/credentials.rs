//! 자격증명 주입.
//!
//! API 키/시크릿은 호스팅 환경(쉘, 노트북 시크릿 저장소 등)에 따라
//! 다른 방식으로 공급됩니다. 소스 어댑터는 `CredentialProvider`를
//! 생성 시점에 주입받으며, 핵심 로직은 환경에 따라 분기하지 않습니다.

use secrecy::SecretString;

/// 소스 어댑터에 주입되는 자격증명 제공자.
pub trait CredentialProvider: Send + Sync {
    /// 지정한 소스의 API 키를 반환합니다.
    fn api_key(&self, source: &str) -> Option<SecretString>;

    /// 지정한 소스의 API 시크릿을 반환합니다.
    fn api_secret(&self, source: &str) -> Option<SecretString>;
}

/// 환경 변수 기반 자격증명 제공자.
///
/// `{SOURCE}_API_KEY` / `{SOURCE}_API_SECRET` 형식의 환경 변수를
/// 조회합니다 (소스 이름은 대문자로 변환).
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    /// 새 제공자를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    fn lookup(source: &str, suffix: &str) -> Option<SecretString> {
        let var = format!("{}_{}", source.to_uppercase(), suffix);
        std::env::var(var).ok().map(SecretString::from)
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn api_key(&self, source: &str) -> Option<SecretString> {
        Self::lookup(source, "API_KEY")
    }

    fn api_secret(&self, source: &str) -> Option<SecretString> {
        Self::lookup(source, "API_SECRET")
    }
}

/// 고정 자격증명 제공자.
///
/// 테스트와 노트북 환경에서 자격증명을 직접 전달할 때 사용합니다.
#[derive(Clone, Default)]
pub struct StaticCredentials {
    api_key: Option<SecretString>,
    api_secret: Option<SecretString>,
}

impl StaticCredentials {
    /// 키/시크릿 쌍으로 생성합니다.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(api_key.into())),
            api_secret: Some(SecretString::from(api_secret.into())),
        }
    }

    /// 자격증명이 없는 제공자를 생성합니다 (공개 엔드포인트 전용).
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self, _source: &str) -> Option<SecretString> {
        self.api_key.clone()
    }

    fn api_secret(&self, _source: &str) -> Option<SecretString> {
        self.api_secret.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_static_credentials() {
        let creds = StaticCredentials::new("key", "secret");
        assert_eq!(creds.api_key("binance").unwrap().expose_secret(), "key");
        assert_eq!(
            creds.api_secret("binance").unwrap().expose_secret(),
            "secret"
        );
    }

    #[test]
    fn test_anonymous_credentials() {
        let creds = StaticCredentials::anonymous();
        assert!(creds.api_key("binance").is_none());
        assert!(creds.api_secret("binance").is_none());
    }

    #[test]
    fn test_env_provider_missing_vars() {
        let provider = EnvCredentialProvider::new();
        assert!(provider.api_key("nonexistent_source_xyz").is_none());
    }
}
