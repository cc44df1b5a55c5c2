//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use packsync_engine::{CollectionId, CollectionInfo, CollectionItem, Namespace};
use packsync_worker::memory::{MemoryLocalStore, MemoryOperationLog, MemoryRemote};
use packsync_worker::{
    LocalStore, LocalTransaction, RemoteAdapter, StoreError, StoreResult, SyncConfig, SyncTask,
};
use serde_json::json;

pub const NS: Namespace = Namespace::Stickers;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once. Filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "packsync_worker=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Config without waits.
pub fn fast_config() -> SyncConfig {
    SyncConfig::new()
        .with_delete_delay(Duration::ZERO)
        .with_restart_delay(Duration::ZERO)
}

pub fn id(n: i64) -> CollectionId {
    CollectionId::new(NS, n)
}

pub fn info(n: i64, hash: i32) -> CollectionInfo {
    CollectionInfo::new(id(n), n * 1000, hash).with_title(format!("Pack {}", n))
}

pub fn items(n: i64, version: i32) -> Vec<CollectionItem> {
    (0..3)
        .map(|i| CollectionItem::new(i, n * 100 + i64::from(i), json!({"v": version})))
        .collect()
}

/// Publish a collection on the server with items matching its hash.
pub fn publish(remote: &MemoryRemote, n: i64, hash: i32) -> CollectionInfo {
    let info = info(n, hash);
    remote.publish(info.clone(), items(n, hash));
    info
}

/// Seed the local store as if a previous sync had stored these collections.
pub fn seed_local(store: &MemoryLocalStore, infos: &[CollectionInfo]) {
    let infos = infos.to_vec();
    store.update(move |tx| {
        for info in &infos {
            tx.replace_collection_items(info.id, items(info.id.id, info.hash));
        }
        tx.replace_collection_infos(NS, infos);
    });
}

/// All collaborators for one namespace.
pub struct Harness {
    pub store: Arc<MemoryLocalStore>,
    pub log: MemoryOperationLog,
    pub remote: MemoryRemote,
    pub config: SyncConfig,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            store: MemoryLocalStore::new_shared(),
            log: MemoryOperationLog::new(),
            remote: MemoryRemote::new(),
            config: fast_config(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn task(&self) -> SyncTask<MemoryLocalStore> {
        self.task_with_store(self.store.clone())
    }

    pub fn task_with_store<S: LocalStore>(&self, store: Arc<S>) -> SyncTask<S> {
        SyncTask::new(
            NS,
            Arc::new(self.log.clone()),
            store,
            RemoteAdapter::new(Arc::new(self.remote.clone())),
            Arc::new(self.config.clone()),
        )
    }
}

/// A store whose next transactions fail.
pub struct FlakyStore {
    inner: Arc<MemoryLocalStore>,
    failures: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryLocalStore>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }

    pub fn remaining_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStore for FlakyStore {
    async fn transaction<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut dyn LocalTransaction) -> R + Send + 'static,
        R: Send + 'static,
    {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        self.inner.transaction(f).await
    }
}
