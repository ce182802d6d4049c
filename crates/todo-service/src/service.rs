use crate::schema::{
    document_id, indexes, single_field, todo_from_document, TodoFields, BY_OWNER,
    FIELD_COMPLETED, TODOS,
};
use chrono::Utc;
use domain::{AuthMode, Todo, TodoError, TodoId};
use infrastructure::{DocumentStore, IndexDefinition, PatchOutcome, SortOrder};
use serde_json::Value;
use shared::{Identity, IdentityProvider, RequestContext};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const DEFAULT_MAX_TOGGLE_ATTEMPTS: u32 = 3;

/// ToDo サービス
///
/// 4 つの操作（list / add / toggle / delete）を提供する。
/// `AuthMode::Scoped` では呼び出し元の認証と所有者の一致を強制し、
/// `AuthMode::Open` ではどちらも行わない。
#[derive(Clone)]
pub struct TodoService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    mode: AuthMode,
    max_toggle_attempts: u32,
}

impl TodoService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        mode: AuthMode,
    ) -> Self {
        Self {
            store,
            identity,
            mode,
            max_toggle_attempts: DEFAULT_MAX_TOGGLE_ATTEMPTS,
        }
    }

    /// toggle の比較交換が競合したときに読み直す上限
    pub fn with_max_toggle_attempts(mut self, attempts: u32) -> Self {
        self.max_toggle_attempts = attempts.max(1);
        self
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    /// ストアに登録すべきインデックス
    pub fn indexes() -> Vec<IndexDefinition> {
        indexes()
    }

    async fn require_identity(&self, ctx: &RequestContext) -> Result<Identity, TodoError> {
        match self.identity.resolve_identity(ctx).await? {
            Some(identity) => Ok(identity),
            None => {
                debug!(request_id = ctx.request_id(), "未認証の呼び出し");
                Err(TodoError::Unauthenticated)
            }
        }
    }

    /// 呼び出し元の ToDo 一覧
    #[instrument(skip_all, fields(request_id = ctx.request_id(), mode = %self.mode))]
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<Todo>, TodoError> {
        let docs = match self.mode {
            AuthMode::Scoped => {
                let identity = self.require_identity(ctx).await?;
                self.store
                    .indexed_query(TODOS, BY_OWNER, &Value::String(identity.subject))
                    .await?
            }
            AuthMode::Open => {
                self.store
                    .natural_order_query(TODOS, SortOrder::Descending)
                    .await?
            }
        };

        let todos = docs
            .into_iter()
            .map(todo_from_document)
            .collect::<Result<Vec<_>, _>>()?;

        info!("ToDo一覧取得完了: {} 件", todos.len());
        Ok(todos)
    }

    /// ToDo を追加して新しい ID を返す。テキストは検証しない
    #[instrument(skip_all, fields(request_id = ctx.request_id(), mode = %self.mode))]
    pub async fn add(&self, ctx: &RequestContext, text: &str) -> Result<TodoId, TodoError> {
        let fields = match self.mode {
            AuthMode::Scoped => {
                let identity = self.require_identity(ctx).await?;
                TodoFields {
                    text: text.to_string(),
                    completed: false,
                    owner_id: Some(identity.subject),
                    created_at: Some(Utc::now()),
                }
            }
            AuthMode::Open => TodoFields {
                text: text.to_string(),
                completed: false,
                owner_id: None,
                created_at: None,
            },
        };

        let id = self.store.insert(TODOS, fields.into_fields()?).await?;
        let todo_id = TodoId::from_string(id.into_inner());

        info!(todo_id = %todo_id, "ToDo作成完了");
        Ok(todo_id)
    }

    /// 完了状態を切り替え、書き込んだ値を返す
    ///
    /// Scoped では現在値を反転する（`completed` 引数は使わない）。
    /// Open では `completed` が必須で、存在確認なしにそのまま書き込む。
    #[instrument(skip_all, fields(request_id = ctx.request_id(), mode = %self.mode, todo_id = %id))]
    pub async fn toggle(
        &self,
        ctx: &RequestContext,
        id: &TodoId,
        completed: Option<bool>,
    ) -> Result<bool, TodoError> {
        match self.mode {
            AuthMode::Scoped => {
                if completed.is_some() {
                    debug!("Scoped モードでは completed 引数を無視");
                }
                let identity = self.require_identity(ctx).await?;
                self.toggle_owned(&identity, id).await
            }
            AuthMode::Open => {
                let completed = completed.ok_or_else(|| {
                    TodoError::Validation("completed is required".to_string())
                })?;
                let outcome = self
                    .store
                    .patch(
                        TODOS,
                        &document_id(id),
                        single_field(FIELD_COMPLETED, Value::Bool(completed)),
                    )
                    .await?;
                if outcome == PatchOutcome::Missing {
                    debug!("存在しない ToDo への更新は無視");
                }
                Ok(completed)
            }
        }
    }

    /// 読み出し → 所有者確認 → 現在値を条件とした書き込み
    async fn toggle_owned(&self, identity: &Identity, id: &TodoId) -> Result<bool, TodoError> {
        for attempt in 1..=self.max_toggle_attempts {
            let todo = self.load_owned(identity, id).await?;
            let next = !todo.completed;

            let outcome = self
                .store
                .patch_if(
                    TODOS,
                    &document_id(id),
                    &single_field(FIELD_COMPLETED, Value::Bool(todo.completed)),
                    single_field(FIELD_COMPLETED, Value::Bool(next)),
                )
                .await?;

            match outcome {
                PatchOutcome::Applied => {
                    info!(completed = next, "ToDo完了状態更新");
                    return Ok(next);
                }
                PatchOutcome::Missing => {
                    return Err(TodoError::NotFound(id.to_string()));
                }
                PatchOutcome::Conflict => {
                    warn!(
                        "同時更新を検出 (attempt {}/{}): todo_id={}",
                        attempt, self.max_toggle_attempts, id
                    );
                }
            }
        }

        Err(TodoError::ConcurrentModification)
    }

    /// ToDo を削除する
    #[instrument(skip_all, fields(request_id = ctx.request_id(), mode = %self.mode, todo_id = %id))]
    pub async fn delete(&self, ctx: &RequestContext, id: &TodoId) -> Result<(), TodoError> {
        if self.mode.enforces_ownership() {
            let identity = self.require_identity(ctx).await?;
            self.load_owned(&identity, id).await?;
        }

        self.store.delete(TODOS, &document_id(id)).await?;
        info!("ToDo削除完了");
        Ok(())
    }

    async fn load_owned(&self, identity: &Identity, id: &TodoId) -> Result<Todo, TodoError> {
        let doc = self
            .store
            .get(TODOS, &document_id(id))
            .await?
            .ok_or_else(|| TodoError::NotFound(id.to_string()))?;
        let todo = todo_from_document(doc)?;

        if !todo.is_owned_by(&identity.subject) {
            warn!(
                owner = todo.owner_id.as_deref().unwrap_or(""),
                caller = %identity.subject,
                "所有者以外からの操作を拒否"
            );
            return Err(TodoError::Forbidden(format!("not your todo: {id}")));
        }

        Ok(todo)
    }
}
