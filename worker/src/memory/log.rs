//! In-memory operation log with a live merged view.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use packsync_engine::{LogPayload, MergedLogEntry, OperationTag, OwnerKey};
use tokio::sync::watch;

use crate::error::StoreResult;
use crate::store::{LogSubscription, OperationLog};

type EntryKey = (OwnerKey, OperationTag, i32);

/// A stored log entry. `payload` is `None` once claimed.
#[derive(Debug, Clone)]
struct StoredEntry {
    merged_index: i32,
    payload: Option<LogPayload>,
}

#[derive(Debug)]
struct LogInner {
    entries: DashMap<EntryKey, StoredEntry>,
    /// Next local index per owner queue. Also serializes enqueues per queue.
    queues: DashMap<(OwnerKey, OperationTag), i32>,
    next_merged_index: AtomicI32,
    /// Bumped on every mutation; subscribers rebuild their view on change.
    generation: watch::Sender<u64>,
}

impl LogInner {
    fn notify(&self) {
        self.generation.send_modify(|generation| *generation += 1);
    }

    fn view(&self, tag: OperationTag, limit: usize) -> Vec<MergedLogEntry> {
        let mut entries: Vec<MergedLogEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.key().1 == tag)
            .map(|entry| {
                let (owner, tag, tag_local_index) = *entry.key();
                MergedLogEntry {
                    owner,
                    tag,
                    tag_local_index,
                    merged_index: entry.value().merged_index,
                }
            })
            .collect();
        entries.sort_by_key(|entry| entry.merged_index);
        entries.truncate(limit);
        entries
    }
}

/// Operation log held in memory.
///
/// Cloning yields another handle to the same log.
#[derive(Debug, Clone)]
pub struct MemoryOperationLog {
    inner: Arc<LogInner>,
}

impl MemoryOperationLog {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(LogInner {
                entries: DashMap::new(),
                queues: DashMap::new(),
                next_merged_index: AtomicI32::new(1),
                generation,
            }),
        }
    }

    /// Snapshot of the merged view.
    pub fn entries(&self, tag: OperationTag) -> Vec<MergedLogEntry> {
        self.inner.view(tag, usize::MAX)
    }

    /// Number of entries for a tag, claimed or not.
    pub fn len(&self, tag: OperationTag) -> usize {
        self.inner
            .entries
            .iter()
            .filter(|entry| entry.key().1 == tag)
            .count()
    }

    pub fn is_empty(&self, tag: OperationTag) -> bool {
        self.len(tag) == 0
    }

    /// Append an entry without coalescing. Lets tests stage arbitrary
    /// payloads and several entries per owner.
    pub fn push(&self, owner: OwnerKey, tag: OperationTag, payload: LogPayload) -> MergedLogEntry {
        let mut queue = self.inner.queues.entry((owner, tag)).or_insert(0);
        let entry = self.insert_locked(owner, tag, &mut *queue, payload);
        drop(queue);
        self.inner.notify();
        entry
    }

    fn insert_locked(
        &self,
        owner: OwnerKey,
        tag: OperationTag,
        next_local_index: &mut i32,
        payload: LogPayload,
    ) -> MergedLogEntry {
        let tag_local_index = *next_local_index;
        *next_local_index += 1;
        let merged_index = self.inner.next_merged_index.fetch_add(1, Ordering::SeqCst);

        self.inner.entries.insert(
            (owner, tag, tag_local_index),
            StoredEntry {
                merged_index,
                payload: Some(payload),
            },
        );

        MergedLogEntry {
            owner,
            tag,
            tag_local_index,
            merged_index,
        }
    }
}

impl Default for MemoryOperationLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OperationLog for MemoryOperationLog {
    fn observe_merged(&self, tag: OperationTag, limit: usize) -> LogSubscription {
        let inner = self.inner.clone();
        let changes = inner.generation.subscribe();

        futures::stream::unfold(
            (inner, changes, true),
            move |(inner, mut changes, first)| async move {
                if first {
                    changes.borrow_and_update();
                } else if changes.changed().await.is_err() {
                    return None;
                }
                let view = inner.view(tag, limit);
                Some((view, (inner, changes, false)))
            },
        )
        .boxed()
    }

    async fn claim(
        &self,
        owner: OwnerKey,
        tag: OperationTag,
        tag_local_index: i32,
    ) -> StoreResult<Option<LogPayload>> {
        let payload = self
            .inner
            .entries
            .get_mut(&(owner, tag, tag_local_index))
            .and_then(|mut entry| entry.payload.take());
        Ok(payload)
    }

    async fn remove(
        &self,
        owner: OwnerKey,
        tag: OperationTag,
        tag_local_index: i32,
    ) -> StoreResult<bool> {
        let removed = self
            .inner
            .entries
            .remove(&(owner, tag, tag_local_index))
            .is_some();
        if removed {
            self.inner.notify();
        }
        Ok(removed)
    }

    async fn enqueue(
        &self,
        owner: OwnerKey,
        tag: OperationTag,
        payload: LogPayload,
    ) -> StoreResult<MergedLogEntry> {
        let mut queue = self.inner.queues.entry((owner, tag)).or_insert(0);

        let pending = self
            .inner
            .entries
            .iter()
            .filter(|entry| {
                let (entry_owner, entry_tag, _) = *entry.key();
                entry_owner == owner && entry_tag == tag && entry.value().payload.is_some()
            })
            .map(|entry| MergedLogEntry {
                owner,
                tag,
                tag_local_index: entry.key().2,
                merged_index: entry.value().merged_index,
            })
            .min_by_key(|entry| entry.merged_index);

        if let Some(existing) = pending {
            return Ok(existing);
        }

        let entry = self.insert_locked(owner, tag, &mut *queue, payload);
        drop(queue);
        self.inner.notify();
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packsync_engine::PendingOperation;

    const TAG: OperationTag = OperationTag::SynchronizeInstalledStickers;

    fn payload() -> LogPayload {
        PendingOperation::new(Vec::new()).into()
    }

    #[tokio::test]
    async fn claim_takes_payload_once() {
        let log = MemoryOperationLog::new();
        let entry = log.push(OwnerKey(1), TAG, payload());

        let first = log.claim(entry.owner, TAG, entry.tag_local_index).await.unwrap();
        assert_eq!(first, Some(payload()));

        let second = log.claim(entry.owner, TAG, entry.tag_local_index).await.unwrap();
        assert_eq!(second, None);

        // Claimed entries stay visible until removed.
        assert_eq!(log.entries(TAG), vec![entry]);
        assert!(log.remove(entry.owner, TAG, entry.tag_local_index).await.unwrap());
        assert!(log.is_empty(TAG));
        assert!(!log.remove(entry.owner, TAG, entry.tag_local_index).await.unwrap());
    }

    #[tokio::test]
    async fn enqueue_coalesces_unclaimed_entries() {
        let log = MemoryOperationLog::new();
        let owner = OwnerKey(7);

        let first = log.enqueue(owner, TAG, payload()).await.unwrap();
        let second = log.enqueue(owner, TAG, payload()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(log.len(TAG), 1);

        log.claim(owner, TAG, first.tag_local_index).await.unwrap();
        let third = log.enqueue(owner, TAG, payload()).await.unwrap();
        assert_ne!(third, first);
        assert!(third.merged_index > first.merged_index);
        assert_eq!(third.tag_local_index, first.tag_local_index + 1);
        assert_eq!(log.len(TAG), 2);
    }

    #[tokio::test]
    async fn tags_are_separate_queues() {
        let log = MemoryOperationLog::new();
        log.push(OwnerKey(1), TAG, payload());
        log.push(OwnerKey(1), OperationTag::SynchronizeInstalledMasks, payload());

        assert_eq!(log.len(TAG), 1);
        assert_eq!(log.len(OperationTag::SynchronizeInstalledMasks), 1);
    }

    #[tokio::test]
    async fn subscription_follows_mutations() {
        let log = MemoryOperationLog::new();
        let first = log.push(OwnerKey(1), TAG, payload());
        let mut view = log.observe_merged(TAG, 10);

        assert_eq!(view.next().await, Some(vec![first]));

        let second = log.push(OwnerKey(2), TAG, payload());
        assert_eq!(view.next().await, Some(vec![first, second]));

        log.remove(first.owner, TAG, first.tag_local_index).await.unwrap();
        assert_eq!(view.next().await, Some(vec![second]));
    }

    #[tokio::test]
    async fn view_is_limited_to_oldest_groups() {
        let log = MemoryOperationLog::new();
        let entries: Vec<_> = (0..5).map(|i| log.push(OwnerKey(i), TAG, payload())).collect();

        let mut view = log.observe_merged(TAG, 3);
        assert_eq!(view.next().await, Some(entries[..3].to_vec()));
    }
}
