use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use faultbook_core::{
    ErrorDetail, FailureAggregator, FailureKey, FailureReport, InMemoryFailureStore, LedgerConfig,
    init_tracing,
};

/// パイプラインを流れるイベント（デモ用）
#[derive(Debug, Clone, Deserialize)]
struct PipelineEvent {
    operation_id: String,
    event_id: String,
    subject: String,
    payload: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
enum HandlerError {
    #[error("payload rejected by {handler}")]
    Rejected {
        handler: &'static str,
        #[source]
        cause: UpstreamError,
    },
}

#[derive(Debug, thiserror::Error)]
#[error("upstream timed out (left={0})")]
struct UpstreamError(u32);

#[async_trait]
trait EventHandler: Send + Sync {
    fn durable_name(&self) -> &'static str;
    fn client_group(&self) -> &'static str;
    fn order(&self) -> i32;
    async fn handle(&self, event: &PipelineEvent) -> Result<(), HandlerError>;
}

/// 最初の n 回だけ失敗する handler
struct FlakyHandler {
    remaining_failures: AtomicU32,
}

impl FlakyHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl EventHandler for FlakyHandler {
    fn durable_name(&self) -> &'static str {
        "billing.charge"
    }

    fn client_group(&self) -> &'static str {
        "billing"
    }

    fn order(&self) -> i32 {
        1
    }

    async fn handle(&self, _event: &PipelineEvent) -> Result<(), HandlerError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(HandlerError::Rejected {
                handler: self.durable_name(),
                cause: UpstreamError(left),
            });
        }
        Ok(())
    }
}

/// handler を実行し、失敗したら台帳に記録する
async fn dispatch(
    aggregator: &FailureAggregator,
    handler: &dyn EventHandler,
    event: &PipelineEvent,
) {
    let Err(err) = handler.handle(event).await else {
        tracing::info!(event_id = %event.event_id, "handled");
        return;
    };

    let report = FailureReport::new(&event.operation_id, &event.event_id, handler.durable_name())
        .with_context(handler.client_group(), &event.subject, handler.order())
        .with_error(ErrorDetail::from_error(&err));

    // 記録に失敗しても元の失敗が消えるわけではない
    match aggregator.record_failure(&report).await {
        Ok(record) => tracing::warn!(
            record_id = %record.id,
            occurrence_count = record.occurrence_count,
            "handler failure recorded"
        ),
        Err(e) => tracing::warn!(kind = ?e.kind(), event_id = %event.event_id, "handler failure not recorded: {e}"),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    // (A) 設定とストアを用意
    let config = match LedgerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    let store = InMemoryFailureStore::new();
    let aggregator = FailureAggregator::new(Arc::new(store.clone()), config);
    let handler: Arc<dyn EventHandler> = Arc::new(FlakyHandler::new(5));

    let events: Vec<PipelineEvent> = match serde_json::from_value(serde_json::json!([
        {
            "operation_id": "op-7f3a",
            "event_id": "evt-0192",
            "subject": "orders.created",
            "payload": { "order": 42 },
        },
        {
            "operation_id": "op-7f3a",
            "event_id": "evt-0193",
            "subject": "orders.created",
            "payload": { "order": 43 },
        },
    ])) {
        Ok(events) => events,
        Err(e) => {
            tracing::error!("bad demo events: {e}");
            std::process::exit(1);
        }
    };
    let [redelivered, other] = events.as_slice() else {
        tracing::error!(count = events.len(), "expected two demo events");
        std::process::exit(1);
    };

    // (B) 1 つ目のイベントを並行に再配送して失敗させる（同一キーに集約される）
    let joins: Vec<_> = (0..3)
        .map(|_| {
            let aggregator = aggregator.clone();
            let handler = Arc::clone(&handler);
            let event = redelivered.clone();
            tokio::spawn(async move { dispatch(&aggregator, handler.as_ref(), &event).await })
        })
        .collect();
    for join in joins {
        if let Err(e) = join.await {
            tracing::error!("dispatch task failed: {e}");
        }
    }

    // 別イベントの失敗は別レコードになる
    tracing::debug!(payload = %other.payload, "dispatching");
    dispatch(&aggregator, handler.as_ref(), other).await;

    // (C) 1 つ目を解決済みにしてから、もう一度失敗させる（resolved は false に戻る）
    if let Err(e) = aggregator
        .mark_resolved(
            &redelivered.operation_id,
            &redelivered.event_id,
            handler.durable_name(),
        )
        .await
    {
        tracing::warn!(event_id = %redelivered.event_id, "not resolved: {e}");
    }
    dispatch(&aggregator, handler.as_ref(), redelivered).await;
    dispatch(&aggregator, handler.as_ref(), redelivered).await;

    // (D) 結果を表示
    for event in &events {
        let key = match FailureKey::from_parts(
            event.operation_id.as_str(),
            event.event_id.as_str(),
            handler.durable_name(),
        ) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!("bad key: {e}");
                continue;
            }
        };
        match aggregator.find(&key).await {
            Ok(Some(record)) => match serde_json::to_string_pretty(&record) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!("render failed: {e}"),
            },
            Ok(None) => println!("no failure recorded for {key}"),
            Err(e) => tracing::error!("lookup failed: {e}"),
        }
    }
    match aggregator.counts().await {
        Ok(counts) => println!("counts: {counts:?}"),
        Err(e) => tracing::error!("counts failed: {e}"),
    }
}
