//! faultbook-core
//!
//! イベント処理パイプラインの失敗台帳（fault-tracking ledger）。
//!
//! 同じ `(operation_id, parent_id, durable_name)` の失敗は 1 件の
//! FailureRecord に集約され、occurrence が追記されていきます。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, report, key, record, errors）
//! - **ports**: 抽象化レイヤー（FailureStore, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（FailureAggregator, RetryPolicy）
//! - **impls**: 実装（InMemoryFailureStore）
//! - **config**: 環境変数からの設定読み込み
//! - **observability**: tracing の初期化とカウント

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use self::app::{FailureAggregator, RetryPolicy};
pub use self::config::{ConfigError, LedgerConfig, WriteStrategy};
pub use self::domain::{
    ErrorDetail, ErrorKind, FailureKey, FailureRecord, FailureReport, LedgerError, Occurrence,
};
pub use self::impls::InMemoryFailureStore;
pub use self::observability::{LedgerCounts, init_tracing};
pub use self::ports::{FailureStore, StoreError};
