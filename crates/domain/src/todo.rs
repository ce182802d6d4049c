use crate::errors::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ToDo の識別子（ULID 文字列）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(String);

impl TodoId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// ストアが払い出した ID をそのまま包む
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// 外部入力を検証して TodoId に変換
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        ulid::Ulid::from_string(raw)
            .map(|_| Self(raw.to_string()))
            .map_err(|e| DomainError::InvalidTodoId(format!("{raw}: {e}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 永続化された ToDo 1 件
///
/// `text` と `owner_id`、`created_at` は作成後に変化しない。
/// 変更可能なのは `completed` のみ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    pub text: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Todo {
    /// 指定した subject がこの ToDo の所有者か
    pub fn is_owned_by(&self, subject: &str) -> bool {
        self.owner_id.as_deref() == Some(subject)
    }
}
