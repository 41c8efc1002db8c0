//! FailureAggregator - 失敗レポートの集約（dedup write path）
//!
//! # 流れ
//! 1. `FailureKey::resolve` でキーを決める
//! 2. キー一致するレコードに occurrence を追加（count +1, resolved = false）
//! 3. 一致なしなら新規作成
//!
//! 2 と 3 の間の競合はストアのアトミック操作で解決します。
//! このプロセス内ではロックを持たず、呼び出し間の状態も持ちません。

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::config::{LedgerConfig, WriteStrategy};
use crate::domain::{
    FailureKey, FailureRecord, FailureReport, LedgerError, NewFailureRecord, Occurrence,
    RecordUpdate,
};
use crate::observability::LedgerCounts;
use crate::ports::{Clock, FailureStore, StoreError, SystemClock, UpdateOptions};

/// FailureAggregator は FailureRecord への冪等な upsert を行う
///
/// ストアはコンストラクタで注入します（グローバルな接続は持たない）。
#[derive(Clone)]
pub struct FailureAggregator {
    store: Arc<dyn FailureStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl FailureAggregator {
    pub fn new(store: Arc<dyn FailureStore>, config: LedgerConfig) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// occurrence のタイムスタンプに使う時計を差し替える
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// 失敗を 1 件記録し、書き込み後のレコードを返す
    #[instrument(
        skip(self, report),
        fields(
            operation_id = %report.operation_id,
            parent_id = %report.parent_id,
            durable_name = %report.durable_name,
        )
    )]
    pub async fn record_failure(&self, report: &FailureReport) -> Result<FailureRecord, LedgerError> {
        let record = self.write(report).await.inspect_err(|e| {
            error!(kind = ?e.kind(), "failure went unrecorded: {e}");
        })?;

        debug!(
            record_id = %record.id,
            occurrence_count = record.occurrence_count,
            "failure recorded"
        );
        Ok(record)
    }

    async fn write(&self, report: &FailureReport) -> Result<FailureRecord, LedgerError> {
        let key = FailureKey::resolve(report)?;
        let occurrence = Occurrence::from_detail(&report.error, self.clock.now());

        match self.config.write_strategy {
            WriteStrategy::InsertThenUpdate => self.fold_or_insert(&key, report, occurrence).await,
            WriteStrategy::NativeUpsert => self.upsert(&key, report, occurrence).await,
        }
    }

    /// レコードを解決済みにする
    ///
    /// 次に同じキーで `record_failure` されると resolved は false に戻る。
    #[instrument(skip(self))]
    pub async fn mark_resolved(
        &self,
        operation_id: &str,
        parent_id: &str,
        durable_name: &str,
    ) -> Result<FailureRecord, LedgerError> {
        let result = self.resolve(operation_id, parent_id, durable_name).await;
        match &result {
            Ok(record) => info!(record_id = %record.id, "failure marked resolved"),
            Err(e) => error!(kind = ?e.kind(), "resolve failed: {e}"),
        }
        result
    }

    async fn resolve(
        &self,
        operation_id: &str,
        parent_id: &str,
        durable_name: &str,
    ) -> Result<FailureRecord, LedgerError> {
        let key = FailureKey::from_parts(operation_id, parent_id, durable_name)?;
        let update = RecordUpdate::Resolve;

        self.with_store_retry("find_and_update", || {
            self.store
                .find_and_update(&key, &update, UpdateOptions::default())
        })
        .await
        .map_err(|e| self.surface(e))?
        .ok_or_else(|| LedgerError::RecordNotFound {
            key: key.to_string(),
        })
    }

    pub async fn find(&self, key: &FailureKey) -> Result<Option<FailureRecord>, LedgerError> {
        self.with_store_retry("find", || self.store.find(key))
            .await
            .map_err(|e| self.surface(e))
    }

    pub async fn counts(&self) -> Result<LedgerCounts, LedgerError> {
        self.with_store_retry("counts", || self.store.counts())
            .await
            .map_err(|e| self.surface(e))
    }

    /// update → なければ insert → 重複なら update からやり直す
    async fn fold_or_insert(
        &self,
        key: &FailureKey,
        report: &FailureReport,
        occurrence: Occurrence,
    ) -> Result<FailureRecord, LedgerError> {
        let update = RecordUpdate::Fold(occurrence.clone());
        let attempts = self.config.max_conflict_retries.saturating_add(1);

        for attempt in 1..=attempts {
            debug!(attempt, attempts, "folding occurrence");
            let folded = self
                .with_store_retry("find_and_update", || {
                    self.store
                        .find_and_update(key, &update, UpdateOptions::default())
                })
                .await
                .map_err(|e| self.surface(e))?;
            if let Some(record) = folded {
                return Ok(record);
            }

            let seed = NewFailureRecord::from_report(key, report, occurrence.clone())?;
            match self
                .with_store_retry("insert", || self.store.insert(seed.clone()))
                .await
            {
                Ok(record) => {
                    info!(record_id = %record.id, "failure record created");
                    return Ok(record);
                }
                Err(StoreError::DuplicateKey(_)) => {
                    warn!(attempt, attempts, "lost create race, retrying as update");
                }
                Err(e) => return Err(self.surface(e)),
            }
        }

        Err(LedgerError::ConflictExhausted {
            key: key.to_string(),
            attempts,
        })
    }

    /// upsert 付きの find_and_update 1 回
    ///
    /// 作成用フィールドが不正なら upsert なしで更新だけ試し、
    /// 一致なしのときに InvalidReport を返す。
    async fn upsert(
        &self,
        key: &FailureKey,
        report: &FailureReport,
        occurrence: Occurrence,
    ) -> Result<FailureRecord, LedgerError> {
        let update = RecordUpdate::Fold(occurrence.clone());
        let seed = match NewFailureRecord::from_report(key, report, occurrence) {
            Ok(seed) => Some(seed),
            Err(invalid) => {
                let folded = self
                    .with_store_retry("find_and_update", || {
                        self.store
                            .find_and_update(key, &update, UpdateOptions::default())
                    })
                    .await
                    .map_err(|e| self.surface(e))?;
                return folded.ok_or(invalid);
            }
        };

        let attempts = self.config.max_conflict_retries.saturating_add(1);
        for attempt in 1..=attempts {
            debug!(attempt, attempts, "upserting occurrence");
            let options = UpdateOptions {
                upsert: seed.clone(),
                ..UpdateOptions::default()
            };
            let result = self
                .with_store_retry("find_and_update", || {
                    self.store.find_and_update(key, &update, options.clone())
                })
                .await;

            match result {
                Ok(Some(record)) => {
                    if record.occurrence_count == 1 {
                        info!(record_id = %record.id, "failure record created");
                    }
                    return Ok(record);
                }
                Ok(None) => {
                    return Err(LedgerError::Store(StoreError::Backend(
                        "upsert returned no document".to_string(),
                    )));
                }
                // 同時 upsert が一意インデックスで衝突した
                Err(StoreError::DuplicateKey(_)) => {
                    warn!(attempt, attempts, "concurrent upsert collided, retrying");
                }
                Err(e) => return Err(self.surface(e)),
            }
        }

        Err(LedgerError::ConflictExhausted {
            key: key.to_string(),
            attempts,
        })
    }

    /// `Unavailable` だけを RetryPolicy に従ってリトライする
    async fn with_store_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let policy = &self.config.store_retry;
        let mut attempt = 1;
        loop {
            match call().await {
                Err(StoreError::Unavailable(reason)) if attempt < policy.attempts() => {
                    let delay = policy.next_delay(attempt);
                    warn!(op, attempt, ?delay, %reason, "store unavailable, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn surface(&self, err: StoreError) -> LedgerError {
        match err {
            StoreError::Unavailable(reason) => LedgerError::StoreUnavailable {
                attempts: self.config.store_retry.attempts(),
                reason,
            },
            other => LedgerError::Store(other),
        }
    }
}
