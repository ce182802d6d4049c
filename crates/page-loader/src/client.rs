use async_trait::async_trait;
use domain::Todo;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("todo api returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

/// ToDo API のクライアント
#[async_trait]
pub trait TodoClient: Send + Sync {
    /// `token` を資格情報として呼び出し元の ToDo 一覧を取得する
    async fn list_todos(&self, token: &str) -> Result<Vec<Todo>, ClientError>;
}

/// HTTP 経由で todo-api を呼ぶクライアント
#[derive(Clone)]
pub struct HttpTodoClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTodoClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TodoClient for HttpTodoClient {
    async fn list_todos(&self, token: &str) -> Result<Vec<Todo>, ClientError> {
        let url = format!("{}/todos", self.base_url);
        debug!(%url, "ToDo一覧を要求");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        resp.json::<Vec<Todo>>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = HttpTodoClient::new("http://127.0.0.1:3000/");
        assert_eq!(client.base_url(), "http://127.0.0.1:3000");
    }

    #[tokio::test]
    async fn test_unreachable_api_is_a_transport_error() {
        // ポート 9 (discard) には通常何も待ち受けていない
        let client = HttpTodoClient::new("http://127.0.0.1:9");
        let result = client.list_todos("token").await;
        assert!(matches!(result, Err(ClientError::Transport(_))));
    }
}
