//! App - アプリケーション層
//!
//! ports を組み合わせて集約ロジックを実装します。
//!
//! # 主要コンポーネント
//! - **FailureAggregator**: record_failure / mark_resolved の公開面
//! - **RetryPolicy**: ストア不達時のバックオフ

pub mod aggregator;
pub mod retry;

pub use self::aggregator::FailureAggregator;
pub use self::retry::RetryPolicy;
