//! InMemoryFailureStore - 開発用・テスト用のストア
//!
//! # 実装詳細
//! - `records` が正本、`by_key` はキー → id の一意インデックス
//! - すべての操作は 1 回のロック区間で完結する（= アトミック）
//! - ロックを保持したまま await しない

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{FailureKey, FailureRecord, NewFailureRecord, RecordId, RecordUpdate};
use crate::observability::LedgerCounts;
use crate::ports::{
    Clock, FailureStore, IdGenerator, ReturnDocument, StoreError, SystemClock, UlidGenerator,
    UpdateOptions,
};

#[derive(Default)]
struct InMemoryStoreState {
    records: HashMap<RecordId, FailureRecord>,
    by_key: HashMap<FailureKey, RecordId>,
}

impl InMemoryStoreState {
    fn create(
        &mut self,
        seed: NewFailureRecord,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> Result<FailureRecord, StoreError> {
        if self.by_key.contains_key(&seed.key) {
            return Err(StoreError::DuplicateKey(seed.key));
        }
        let record = FailureRecord::create(ids.generate_record_id(), seed, clock.now());
        self.by_key.insert(record.key.clone(), record.id);
        self.records.insert(record.id, record.clone());
        Ok(record)
    }

    fn get(&self, key: &FailureKey) -> Option<&FailureRecord> {
        self.by_key.get(key).and_then(|id| self.records.get(id))
    }

    fn get_mut(&mut self, key: &FailureKey) -> Option<&mut FailureRecord> {
        let id = self.by_key.get(key)?;
        self.records.get_mut(id)
    }

    fn counts(&self) -> LedgerCounts {
        let mut counts = LedgerCounts::default();
        for record in self.records.values() {
            counts.records += 1;
            counts.occurrences += record.occurrence_count;
            if record.resolved {
                counts.resolved += 1;
            } else {
                counts.open += 1;
            }
        }
        counts
    }
}

/// InMemoryFailureStore はプロセス内のストア
///
/// Clone したハンドルは同じ状態を共有します。
#[derive(Clone)]
pub struct InMemoryFailureStore {
    state: Arc<Mutex<InMemoryStoreState>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryFailureStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// タイムスタンプと ID の timestamp 部分に `clock` を使う
    pub fn with_clock<C: Clock + Clone + 'static>(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryStoreState::default())),
            ids: Arc::new(UlidGenerator::new(clock.clone())),
            clock: Arc::new(clock),
        }
    }

    /// 全レコード（テスト・デバッグ用）
    pub async fn all(&self) -> Vec<FailureRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<FailureRecord> = state.records.values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }
}

impl Default for InMemoryFailureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FailureStore for InMemoryFailureStore {
    async fn find_and_update(
        &self,
        key: &FailureKey,
        update: &RecordUpdate,
        options: UpdateOptions,
    ) -> Result<Option<FailureRecord>, StoreError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if let Some(record) = state.get_mut(key) {
            let before = record.clone();
            record.apply(update, now);
            return Ok(Some(match options.return_document {
                ReturnDocument::Before => before,
                ReturnDocument::After => record.clone(),
            }));
        }

        let Some(seed) = options.upsert else {
            return Ok(None);
        };
        let created = state.create(seed, self.clock.as_ref(), self.ids.as_ref())?;
        Ok(match options.return_document {
            ReturnDocument::Before => None,
            ReturnDocument::After => Some(created),
        })
    }

    async fn insert(&self, record: NewFailureRecord) -> Result<FailureRecord, StoreError> {
        let mut state = self.state.lock().await;
        state.create(record, self.clock.as_ref(), self.ids.as_ref())
    }

    async fn find(&self, key: &FailureKey) -> Result<Option<FailureRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.get(key).cloned())
    }

    async fn counts(&self) -> Result<LedgerCounts, StoreError> {
        let state = self.state.lock().await;
        Ok(state.counts())
    }
}
