use crate::client::TodoClient;
use domain::Todo;
use serde::{Deserialize, Serialize};
use shared::{IdentityProvider, RequestContext, TokenOptions};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// ページ描画用のデータ
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
    pub todos: Vec<Todo>,
}

impl PageData {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// サーバー側でページ初期表示の ToDo を取得する
///
/// 失敗はすべてログに残して空の一覧にする。エラーは返さない。
#[derive(Clone)]
pub struct PageLoader {
    identity: Arc<dyn IdentityProvider>,
    client: Arc<dyn TodoClient>,
    token_template: String,
}

impl PageLoader {
    /// `token_template` は下流 API 向けトークンのテンプレート（オーディエンス）
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        client: Arc<dyn TodoClient>,
        token_template: &str,
    ) -> Self {
        Self {
            identity,
            client,
            token_template: token_template.to_string(),
        }
    }

    #[instrument(skip_all, fields(request_id = ctx.request_id()))]
    pub async fn load(&self, ctx: &RequestContext) -> PageData {
        match self.identity.resolve_identity(ctx).await {
            Ok(Some(identity)) => debug!(subject = %identity.subject, "呼び出し元を解決"),
            Ok(None) => {
                debug!("未認証のため空の一覧を返す");
                return PageData::empty();
            }
            Err(e) => {
                warn!("ID プロバイダの障害のため空の一覧を返す: {}", e);
                return PageData::empty();
            }
        }

        let options = TokenOptions::for_template(self.token_template.as_str());
        let token = match self.identity.acquire_token(ctx, &options).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!("API トークンを取得できませんでした");
                return PageData::empty();
            }
            Err(e) => {
                error!("API トークンの取得に失敗: {}", e);
                return PageData::empty();
            }
        };

        match self.client.list_todos(&token).await {
            Ok(todos) => {
                info!("ToDo一覧読み込み完了: {} 件", todos.len());
                PageData { todos }
            }
            Err(e) => {
                error!("ToDo一覧の読み込みに失敗: {}", e);
                PageData::empty()
            }
        }
    }
}
