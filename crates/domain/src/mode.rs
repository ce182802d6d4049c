use crate::errors::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ToDo サービスの認可モード
///
/// - `Scoped`: 所有者の一致を強制する（既定）
/// - `Open`: 認証も所有者チェックも行わない旧来の構成
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Scoped,
    Open,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Scoped => "scoped",
            AuthMode::Open => "open",
        }
    }

    pub fn enforces_ownership(&self) -> bool {
        matches!(self, AuthMode::Scoped)
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scoped" => Ok(AuthMode::Scoped),
            "open" => Ok(AuthMode::Open),
            other => Err(DomainError::Validation(format!("unknown auth mode: {other}"))),
        }
    }
}
