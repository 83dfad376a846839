//! InMemoryGateway - テスト・開発用のオブジェクトストア
//!
//! # 学習ポイント
//! - Mutex で守った HashMap（await を跨いでロックを持たない）
//! - fault injection で一時障害・消失・権限エラーを再現
//! - `publish_after_lists` で「ワーカーが後から出力を書く」状況を再現
//!
//! listing の順序は HashMap の順序のまま返します（順序保証なし）。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ports::{Clock, GatewayError, ObjectInfo, StorageGateway, StorageOp, SystemClock};

/// Failure to inject into the next call of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Transient,
    NotFound,
    Denied,
}

/// Operation counters, for test assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    pub puts: u64,
    pub gets: u64,
    pub lists: u64,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingObject {
    after_lists: u64,
    key: String,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct InMemoryState {
    objects: HashMap<String, StoredObject>,
    pending: Vec<PendingObject>,
    faults: HashMap<StorageOp, VecDeque<Fault>>,
    counts: OpCounts,
    omit_timestamps: bool,
}

impl InMemoryState {
    fn take_fault(&mut self, op: StorageOp, key: &str) -> Result<(), GatewayError> {
        let Some(fault) = self.faults.get_mut(&op).and_then(VecDeque::pop_front) else {
            return Ok(());
        };
        Err(match fault {
            Fault::Transient => GatewayError::transient(op, format!("injected failure for {key}")),
            Fault::NotFound => GatewayError::not_found(key),
            Fault::Denied => GatewayError::denied(op, format!("injected denial for {key}")),
        })
    }

    fn publish_due(&mut self, now: DateTime<Utc>) {
        let lists = self.counts.lists;
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|p| lists > p.after_lists);
        self.pending = waiting;
        for p in due {
            self.objects.insert(
                p.key,
                StoredObject {
                    data: p.data,
                    last_modified: now,
                },
            );
        }
    }
}

/// In-memory object store.
///
/// Clones share the same objects, so a test can keep one handle while the
/// coordinator owns another.
#[derive(Clone)]
pub struct InMemoryGateway {
    state: Arc<Mutex<InMemoryState>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` for `last_modified` stamps.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState::default())),
            clock,
        }
    }

    /// Listings report no `last_modified`, like stores without that metadata.
    pub fn without_timestamps(self) -> Self {
        self.lock().omit_timestamps = true;
        self
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object without going through `put` (not counted).
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        let now = self.clock.now();
        self.lock().objects.insert(
            key.into(),
            StoredObject {
                data: data.into(),
                last_modified: now,
            },
        );
    }

    /// Make an object appear once `lists` listing calls have happened,
    /// i.e. it is first visible to listing number `lists + 1`.
    pub fn publish_after_lists(&self, lists: u64, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.lock().pending.push(PendingObject {
            after_lists: lists,
            key: key.into(),
            data: data.into(),
        });
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().objects.remove(key).is_some()
    }

    /// Fail the next `times` calls of `op` with `fault`.
    pub fn fail_next(&self, op: StorageOp, fault: Fault, times: usize) {
        let mut state = self.lock();
        let queue = state.faults.entry(op).or_default();
        queue.extend(std::iter::repeat_n(fault, times));
    }

    pub fn counts(&self) -> OpCounts {
        self.lock().counts
    }

    /// All stored keys, sorted (for debugging and assertions).
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().objects.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageGateway for InMemoryGateway {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), GatewayError> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.counts.puts += 1;
        state.take_fault(StorageOp::Put, key)?;
        state.objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                last_modified: now,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, GatewayError> {
        let mut state = self.lock();
        state.counts.gets += 1;
        state.take_fault(StorageOp::Get, key)?;
        state
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| GatewayError::not_found(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, GatewayError> {
        let now = self.clock.now();
        let mut state = self.lock();
        state.counts.lists += 1;
        state.publish_due(now);
        state.take_fault(StorageOp::List, prefix)?;

        let omit_timestamps = state.omit_timestamps;
        Ok(state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, o)| ObjectInfo {
                key: key.clone(),
                size: o.data.len() as u64,
                last_modified: (!omit_timestamps).then_some(o.last_modified),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = InMemoryGateway::new();
        store.put("input1/a.txt", b"hello").await.unwrap();
        assert_eq!(store.get("input1/a.txt").await.unwrap(), b"hello");
        assert_eq!(store.counts().puts, 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = InMemoryGateway::new();
        let err = store.get("input1/missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = InMemoryGateway::new();
        store.insert("input1/a.txt", "a");
        store.insert("output/b.txt", "b");

        let keys: Vec<String> = store
            .list("input1/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["input1/a.txt"]);
    }

    #[tokio::test]
    async fn published_objects_appear_after_n_lists() {
        let store = InMemoryGateway::new();
        store.publish_after_lists(2, "input1/out.json", "{}");

        assert!(store.list("input1/").await.unwrap().is_empty());
        assert!(store.list("input1/").await.unwrap().is_empty());
        assert_eq!(store.list("input1/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let store = InMemoryGateway::new();
        store.fail_next(StorageOp::List, Fault::Transient, 1);
        store.fail_next(StorageOp::List, Fault::Denied, 1);

        assert!(store.list("input1/").await.unwrap_err().is_transient());
        assert!(matches!(
            store.list("input1/").await.unwrap_err(),
            GatewayError::Denied { .. }
        ));
        assert!(store.list("input1/").await.is_ok());
        assert_eq!(store.counts().lists, 3);
    }

    #[tokio::test]
    async fn timestamps_can_be_omitted() {
        let store = InMemoryGateway::new().without_timestamps();
        store.insert("input1/a.txt", "a");
        let listing = store.list("input1/").await.unwrap();
        assert_eq!(listing[0].last_modified, None);
    }
}
