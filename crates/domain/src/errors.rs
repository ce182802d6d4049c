use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Invalid TodoId: {0}")]
    InvalidTodoId(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// ToDo サービスが呼び出し元に返すエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TodoError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Todo not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Concurrent modification detected")]
    ConcurrentModification,

    /// 「未認証」とは区別される、ID プロバイダ自身の障害
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<DomainError> for TodoError {
    fn from(e: DomainError) -> Self {
        TodoError::Validation(e.to_string())
    }
}
