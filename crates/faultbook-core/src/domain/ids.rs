//! Domain identifiers (strongly-typed IDs).
//!
//! # 二種類の ID
//! - **`Id<T>`**: システムが払い出す ULID（FailureRecord の `id`）
//! - **`KeyPart<T>`**: 外部から渡される不透明な文字列（operation / parent / durable name）
//!
//! どちらも Phantom type パターンでマーカー型を持たせ、
//! `OperationId` と `ParentId` を取り違えるとコンパイルエラーになるようにしています。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

use super::errors::LedgerError;

/// IdMarker は ULID ベースの ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "failure-"）
    fn prefix() -> &'static str;
}

/// システムが払い出す ID
///
/// 一度作られたら変更されない（FailureRecord の `id` はイミュータブル）。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// KeyPartMarker は集約キーを構成する外部 ID のマーカー trait
pub trait KeyPartMarker: Send + Sync + 'static {
    /// 欠落時に `InvalidReport` で報告するフィールド名
    const FIELD: &'static str;
}

/// 集約キーの構成要素（外部が払い出す不透明な文字列）
///
/// 値はそのまま（trim もせず）一致判定に使います。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPart<T: KeyPartMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: KeyPartMarker> KeyPart<T> {
    /// 空文字（空白のみを含む）は `InvalidReport` として拒否する
    pub fn parse(value: impl Into<String>) -> Result<Self, LedgerError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(LedgerError::InvalidReport { field: T::FIELD });
        }
        Ok(Self {
            value,
            _marker: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: KeyPartMarker> fmt::Display for KeyPart<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// FailureRecord のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Failure {}

impl IdMarker for Failure {
    fn prefix() -> &'static str {
        "failure-"
    }
}

/// 元になった業務オペレーション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {}

impl KeyPartMarker for Operation {
    const FIELD: &'static str = "operation_id";
}

/// パイプライン上の親イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parent {}

impl KeyPartMarker for Parent {
    const FIELD: &'static str = "parent_id";
}

/// 失敗した handler / subscription の durable 名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Durable {}

impl KeyPartMarker for Durable {
    const FIELD: &'static str = "durable_name";
}

// ========================================
// Type Alias
// ========================================

/// Identifier of a FailureRecord (assigned by the store).
pub type RecordId = Id<Failure>;

/// Identifier of the originating business operation.
pub type OperationId = KeyPart<Operation>;

/// Identifier of the parent event in the pipeline.
pub type ParentId = KeyPart<Parent>;

/// Stable name of the handler/subscription that failed.
pub type DurableName = KeyPart<Durable>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_displays_with_prefix() {
        let ulid = Ulid::new();
        let id = RecordId::from_ulid(ulid);

        assert_eq!(id.as_ulid(), ulid);
        assert_eq!(id.to_string(), format!("failure-{ulid}"));
    }

    #[test]
    fn record_id_can_be_serialized() {
        let id = RecordId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: RecordId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(id, deserialized);
    }

    #[test]
    fn key_part_is_kept_verbatim() {
        let op = OperationId::parse(" op-1 ").unwrap();
        assert_eq!(op.as_str(), " op-1 ");
        assert_eq!(op.to_string(), " op-1 ");
    }

    #[test]
    fn blank_key_part_names_its_field() {
        let err = ParentId::parse("   ").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidReport { field: "parent_id" }));

        let err = DurableName::parse("").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidReport { field: "durable_name" }));
    }

    #[test]
    fn key_part_serializes_as_plain_string() {
        let name = DurableName::parse("billing.charge").unwrap();
        let s = serde_json::to_string(&name).unwrap();
        assert_eq!(s, "\"billing.charge\"");
    }
}
