//! In-memory local collection state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use packsync_engine::{CollectionId, CollectionInfo, CollectionItem, Namespace};

use crate::error::StoreResult;
use crate::store::{LocalStore, LocalTransaction};

#[derive(Debug, Default, Clone)]
struct LocalState {
    infos: HashMap<Namespace, Vec<CollectionInfo>>,
    items: HashMap<CollectionId, Vec<CollectionItem>>,
}

/// Transaction handle over [`LocalState`] that notes whether it wrote.
struct MemoryTransaction<'a> {
    state: &'a mut LocalState,
    wrote: bool,
}

impl LocalTransaction for MemoryTransaction<'_> {
    fn collection_infos(&self, namespace: Namespace) -> Vec<CollectionInfo> {
        self.state.infos.get(&namespace).cloned().unwrap_or_default()
    }

    fn collection_items(&self, id: CollectionId) -> Vec<CollectionItem> {
        self.state.items.get(&id).cloned().unwrap_or_default()
    }

    fn replace_collection_infos(&mut self, namespace: Namespace, infos: Vec<CollectionInfo>) {
        self.wrote = true;
        self.state.infos.insert(namespace, infos);
    }

    fn replace_collection_items(&mut self, id: CollectionId, items: Vec<CollectionItem>) {
        self.wrote = true;
        if items.is_empty() {
            self.state.items.remove(&id);
        } else {
            self.state.items.insert(id, items);
        }
    }
}

/// Local collection state held in memory.
///
/// Transactions run under one lock; a transaction whose closure panics
/// leaves the state untouched because it works on a copy.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    state: Mutex<LocalState>,
    writes: AtomicUsize,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Run a transaction synchronously.
    pub fn update<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut dyn LocalTransaction) -> R,
    {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut working = guard.clone();
        let mut tx = MemoryTransaction {
            state: &mut working,
            wrote: false,
        };
        let result = f(&mut tx);
        if tx.wrote {
            *guard = working;
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    /// Installed infos of a namespace.
    pub fn infos(&self, namespace: Namespace) -> Vec<CollectionInfo> {
        self.update(|tx| tx.collection_infos(namespace))
    }

    /// Installed order of a namespace.
    pub fn order(&self, namespace: Namespace) -> Vec<CollectionId> {
        self.update(|tx| tx.collection_order(namespace))
    }

    /// Stored items of a collection.
    pub fn items(&self, id: CollectionId) -> Vec<CollectionItem> {
        self.update(|tx| tx.collection_items(id))
    }

    /// Number of committed transactions that wrote anything.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn transaction<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut dyn LocalTransaction) -> R + Send + 'static,
        R: Send + 'static,
    {
        Ok(self.update(f))
    }
}
