use async_trait::async_trait;
use domain::TodoError;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// JWT のクレーム
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

/// 認証済みの呼び出し元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
}

/// トークン発行時のオプション。`template` は発行先のオーディエンス
#[derive(Debug, Clone)]
pub struct TokenOptions {
    pub template: String,
}

impl TokenOptions {
    pub fn for_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    #[error("identity provider failure: {0}")]
    Provider(String),
}

impl From<IdentityError> for TodoError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Provider(msg) => TodoError::IdentityProvider(msg),
        }
    }
}

/// 呼び出し元のリクエストコンテキスト
///
/// 各操作に明示的に渡す。グローバルな「現在のリクエスト」は持たない。
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    token: Option<String>,
}

impl RequestContext {
    pub fn new(token: Option<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self::new(Some(token.into()))
    }

    /// `Authorization` ヘッダー値からコンテキストを作成
    pub fn from_authorization_header(value: Option<&str>) -> Self {
        Self::new(value.and_then(bearer_token).map(str::to_string))
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// `Bearer ` プレフィックスを除去
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// ID プロバイダ
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// コンテキストから認証済みの呼び出し元を解決する。未認証なら `Ok(None)`
    async fn resolve_identity(&self, ctx: &RequestContext)
        -> Result<Option<Identity>, IdentityError>;

    /// 呼び出し元の資格情報として下流へ提示するトークンを取得する
    async fn acquire_token(
        &self,
        ctx: &RequestContext,
        options: &TokenOptions,
    ) -> Result<Option<String>, IdentityError>;
}

/// HS256 共有鍵による JWT ID プロバイダ
#[derive(Clone)]
pub struct JwtIdentityProvider {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    token_ttl_secs: i64,
}

impl JwtIdentityProvider {
    /// `audience` は受け入れるトークンのオーディエンス
    pub fn new(secret: &str, issuer: &str, audience: &str, token_ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
            token_ttl_secs: i64::try_from(token_ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// subject 向けにトークンを発行
    pub fn issue_token(&self, subject: &str, audience: &str) -> Result<String, IdentityError> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            aud: audience.to_string(),
            email: None,
            exp: now.saturating_add(self.token_ttl_secs),
            iat: now,
        };
        self.encode_claims(&claims)
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String, IdentityError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            error!("JWT エンコードに失敗: {}", e);
            IdentityError::Provider(e.to_string())
        })
    }

    fn validate(&self, token: &str) -> Result<Option<Claims>, IdentityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Ok(Some(data.claims)),
            Err(e) => match e.kind() {
                ErrorKind::InvalidKeyFormat
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::MissingAlgorithm
                | ErrorKind::Crypto(_) => {
                    error!("JWT 検証基盤のエラー: {}", e);
                    Err(IdentityError::Provider(e.to_string()))
                }
                _ => {
                    debug!("トークンを拒否: {}", e);
                    Ok(None)
                }
            },
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve_identity(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<Identity>, IdentityError> {
        let Some(token) = ctx.token() else {
            return Ok(None);
        };

        Ok(self.validate(token)?.map(|claims| Identity {
            subject: claims.sub,
            email: claims.email,
        }))
    }

    async fn acquire_token(
        &self,
        ctx: &RequestContext,
        options: &TokenOptions,
    ) -> Result<Option<String>, IdentityError> {
        match self.resolve_identity(ctx).await? {
            Some(identity) => self
                .issue_token(&identity.subject, &options.template)
                .map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> JwtIdentityProvider {
        JwtIdentityProvider::new("test-secret", "todo-auth", "todo-web", 60)
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
    }

    #[test]
    fn test_request_context_from_header() {
        let ctx = RequestContext::from_authorization_header(Some("Bearer tok"));
        assert_eq!(ctx.token(), Some("tok"));
        assert!(!ctx.request_id().is_empty());

        let anon = RequestContext::from_authorization_header(None);
        assert!(anon.token().is_none());
    }

    #[tokio::test]
    async fn test_resolves_subject_from_valid_token() {
        let provider = provider();
        let token = provider.issue_token("u1", "todo-web").unwrap();

        let identity = provider
            .resolve_identity(&RequestContext::with_token(token))
            .await
            .unwrap();
        assert_eq!(identity.map(|i| i.subject), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_tokens_mean_no_identity() {
        let provider = provider();

        // 別オーディエンス
        let foreign = provider.issue_token("u1", "todo-api").unwrap();
        // 期限切れ
        let now = chrono::Utc::now().timestamp();
        let expired = provider
            .encode_claims(&Claims {
                sub: "u1".to_string(),
                iss: "todo-auth".to_string(),
                aud: "todo-web".to_string(),
                email: None,
                exp: now - 3600,
                iat: now - 7200,
            })
            .unwrap();
        // 別の鍵
        let other_key = JwtIdentityProvider::new("other-secret", "todo-auth", "todo-web", 60)
            .issue_token("u1", "todo-web")
            .unwrap();

        for token in [foreign, expired, other_key, "garbage".to_string()] {
            let identity = provider
                .resolve_identity(&RequestContext::with_token(token))
                .await
                .unwrap();
            assert!(identity.is_none());
        }

        let anonymous = provider
            .resolve_identity(&RequestContext::anonymous())
            .await
            .unwrap();
        assert!(anonymous.is_none());
    }

    #[tokio::test]
    async fn test_acquire_token_targets_template_audience() {
        let session = provider();
        let api = JwtIdentityProvider::new("test-secret", "todo-auth", "todo-api", 60);

        let session_token = session.issue_token("u1", "todo-web").unwrap();
        let ctx = RequestContext::with_token(session_token);

        let api_token = session
            .acquire_token(&ctx, &TokenOptions::for_template("todo-api"))
            .await
            .unwrap()
            .expect("token for authenticated caller");

        let identity = api
            .resolve_identity(&RequestContext::with_token(api_token))
            .await
            .unwrap();
        assert_eq!(identity.map(|i| i.subject), Some("u1".to_string()));

        let none = session
            .acquire_token(
                &RequestContext::anonymous(),
                &TokenOptions::for_template("todo-api"),
            )
            .await
            .unwrap();
        assert!(none.is_none());
    }
}
