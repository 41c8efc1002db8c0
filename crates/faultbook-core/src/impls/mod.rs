//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryFailureStore**: プロセス内のストア
//!
//! 本番用のドキュメントストア実装はホスト側が `FailureStore` を実装して注入します。

pub mod inmem_store;

pub use self::inmem_store::InMemoryFailureStore;
