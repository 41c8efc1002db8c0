//! FailureStore port - FailureRecord の正本（source of truth）
//!
//! ドキュメントストア（MongoDB など）が実装する想定の最小インターフェースです。
//!
//! # 契約
//! - `find_and_update` はキー一致 → 更新（→ なければ upsert）を 1 回のアトミック操作で行う
//! - `insert` はキー重複時に必ず `StoreError::DuplicateKey` を返す
//! - キー `(operation_id, parent_id, durable_name)` に一致するレコードは高々 1 件

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{FailureKey, FailureRecord, NewFailureRecord, RecordUpdate};
use crate::observability::LedgerCounts;

/// StoreError はストア実装が返すエラー
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// 接続できない・タイムアウトなど（リトライ対象）
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// 一意制約違反（作成競合に負けた）
    #[error("duplicate key: {0}")]
    DuplicateKey(FailureKey),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// `find_and_update` が返すドキュメント
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    Before,
    #[default]
    After,
}

/// `find_and_update` のオプション
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Some なら、一致するレコードがないときにこの内容で作成する
    pub upsert: Option<NewFailureRecord>,
    pub return_document: ReturnDocument,
}

impl UpdateOptions {
    pub fn upsert(seed: NewFailureRecord) -> Self {
        Self {
            upsert: Some(seed),
            return_document: ReturnDocument::After,
        }
    }
}

#[async_trait]
pub trait FailureStore: Send + Sync {
    /// キー一致するレコードに `update` を適用する
    ///
    /// - 一致なし・upsert なし: `Ok(None)`
    /// - 一致なし・upsert あり: 作成し、`After` なら作成結果、`Before` なら `None`
    async fn find_and_update(
        &self,
        key: &FailureKey,
        update: &RecordUpdate,
        options: UpdateOptions,
    ) -> Result<Option<FailureRecord>, StoreError>;

    /// 新規作成。`id` / `created_at` / `updated_at` はストアが設定する
    async fn insert(&self, record: NewFailureRecord) -> Result<FailureRecord, StoreError>;

    async fn find(&self, key: &FailureKey) -> Result<Option<FailureRecord>, StoreError>;

    async fn counts(&self) -> Result<LedgerCounts, StoreError>;
}
