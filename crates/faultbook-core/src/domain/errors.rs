//! Errors - エラー型と分類
//!
//! `record_failure` が失敗したら「失敗が記録されなかった」という意味であって、
//! 「元のオペレーションが成功した」という意味ではありません。

use thiserror::Error;

use crate::ports::StoreError;

/// ErrorKind は運用上の分類
///
/// - Permanent: 呼び出し側の誤り（リトライ無意味）
/// - Transient: 競合など一時的なもの（呼び出し側で再送してよい）
/// - Infrastructure: ストア障害
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permanent,
    Transient,
    Infrastructure,
}

/// LedgerError は公開 API が返すエラー
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid failure report: `{field}` is missing or empty")]
    InvalidReport { field: &'static str },

    #[error("failure store unavailable after {attempts} attempt(s): {reason}")]
    StoreUnavailable { attempts: u32, reason: String },

    #[error("create race for key {key} not resolved after {attempts} attempt(s)")]
    ConflictExhausted { key: String, attempts: u32 },

    #[error("no failure record for key {key}")]
    RecordNotFound { key: String },

    #[error("failure store error: {0}")]
    Store(#[source] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidReport { .. } | LedgerError::RecordNotFound { .. } => {
                ErrorKind::Permanent
            }
            LedgerError::ConflictExhausted { .. } => ErrorKind::Transient,
            LedgerError::StoreUnavailable { .. } | LedgerError::Store(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}
