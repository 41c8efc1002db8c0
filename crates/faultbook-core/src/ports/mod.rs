//! Ports - 抽象化レイヤー
//!
//! 外部システム（ドキュメントストア、時計、ID 生成）へのインターフェースです。
//! 集約ロジック（app::aggregator）はこれらの trait にだけ依存し、
//! テストでは InMemory 実装や FixedClock に差し替えます。

pub mod clock;
pub mod failure_store;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::failure_store::{FailureStore, ReturnDocument, StoreError, UpdateOptions};
pub use self::id_generator::{IdGenerator, UlidGenerator};
