use domain::AuthMode;
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// ドキュメントストアの実装選択
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    DynamoDb,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "dynamodb" => Ok(StoreBackend::DynamoDb),
            other => Err(format!("unknown store backend: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub aws_region: String,
    pub store_backend: StoreBackend,
    pub dynamodb_table: String,
    pub dynamodb_endpoint: Option<String>,
    pub dynamodb_index_name: String,
    pub retry_max_attempts: u32,
    pub auth_mode: AuthMode,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub api_audience: String,
    pub session_audience: String,
    pub token_ttl_secs: u64,
    pub bind_addr: String,
    pub page_bind_addr: String,
    pub todo_api_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意のキー参照関数から設定を組み立てる（テスト用に環境変数を差し替え可能）
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        Ok(Config {
            environment: or_default("ENVIRONMENT", "dev"),
            aws_region: or_default("AWS_REGION", "ap-northeast-1"),
            store_backend: parse_var(&lookup, "STORE_BACKEND", StoreBackend::Memory)?,
            dynamodb_table: or_default("DYNAMODB_TABLE", "todo-dev"),
            dynamodb_endpoint: lookup("DYNAMODB_ENDPOINT").filter(|s| !s.is_empty()),
            dynamodb_index_name: or_default("DYNAMODB_INDEX_NAME", "GSI1"),
            retry_max_attempts: parse_var(&lookup, "RETRY_MAX_ATTEMPTS", 3)?,
            auth_mode: parse_var(&lookup, "TODO_AUTH_MODE", AuthMode::Scoped)?,
            jwt_secret,
            jwt_issuer: or_default("JWT_ISSUER", "todo-auth"),
            api_audience: or_default("API_AUDIENCE", "todo-api"),
            session_audience: or_default("SESSION_AUDIENCE", "todo-web"),
            token_ttl_secs: parse_var(&lookup, "TOKEN_TTL_SECS", 60)?,
            bind_addr: or_default("BIND_ADDR", "127.0.0.1:3000"),
            page_bind_addr: or_default("PAGE_BIND_ADDR", "127.0.0.1:3001"),
            todo_api_url: or_default("TODO_API_URL", "http://127.0.0.1:3000"),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "prod" || self.environment == "production"
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.environment, "dev");
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.auth_mode, AuthMode::Scoped);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.api_audience, "todo-api");
        assert!(config.dynamodb_endpoint.is_none());
        assert_eq!(config.page_bind_addr, "127.0.0.1:3001");
        assert!(!config.is_production());
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[]));
        assert!(matches!(result, Err(ConfigError::Missing("JWT_SECRET"))));
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let config = Config::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("STORE_BACKEND", "dynamodb"),
            ("TODO_AUTH_MODE", "open"),
            ("DYNAMODB_ENDPOINT", "http://localhost:8000"),
            ("ENVIRONMENT", "production"),
        ]))
        .unwrap();

        assert_eq!(config.store_backend, StoreBackend::DynamoDb);
        assert_eq!(config.auth_mode, AuthMode::Open);
        assert_eq!(
            config.dynamodb_endpoint.as_deref(),
            Some("http://localhost:8000")
        );
        assert!(config.is_production());

        let invalid = Config::from_lookup(lookup_from(&[
            ("JWT_SECRET", "s3cret"),
            ("RETRY_MAX_ATTEMPTS", "many"),
        ]));
        assert!(matches!(
            invalid,
            Err(ConfigError::Invalid {
                name: "RETRY_MAX_ATTEMPTS",
                ..
            })
        ));
    }
}
