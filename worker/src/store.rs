//! Contracts for the storage collaborators.
//!
//! The worker does not own any storage. It reads and writes collection state
//! through [`LocalStore`] and consumes its queue through [`OperationLog`].
//! In-memory implementations live in [`crate::memory`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use packsync_engine::{
    collection_order, CollectionId, CollectionInfo, CollectionItem, LogPayload, MergedLogEntry,
    Namespace, OperationTag, OwnerKey, PendingOperation,
};

use crate::error::StoreResult;

/// View of the local collection state inside one transaction.
pub trait LocalTransaction {
    /// Installed collections of a namespace, in display order.
    fn collection_infos(&self, namespace: Namespace) -> Vec<CollectionInfo>;

    /// Items of one collection. Empty if none are stored.
    fn collection_items(&self, id: CollectionId) -> Vec<CollectionItem>;

    /// Replace the whole info list of a namespace.
    fn replace_collection_infos(&mut self, namespace: Namespace, infos: Vec<CollectionInfo>);

    /// Replace the whole item list of a collection.
    fn replace_collection_items(&mut self, id: CollectionId, items: Vec<CollectionItem>);

    /// Order of installed collections of a namespace.
    fn collection_order(&self, namespace: Namespace) -> Vec<CollectionId> {
        collection_order(&self.collection_infos(namespace))
    }
}

/// Transactional access to local collection state.
#[async_trait]
pub trait LocalStore: Send + Sync + 'static {
    /// Run `f` atomically. Either all of its writes become visible or none.
    async fn transaction<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut dyn LocalTransaction) -> R + Send + 'static,
        R: Send + 'static;
}

/// Live view of the merged operation log.
///
/// The first item is the view at subscription time; later items follow log
/// mutations. Intermediate views may be skipped, the latest never is.
pub type LogSubscription = BoxStream<'static, Vec<MergedLogEntry>>;

/// The durable queue of pending operations.
///
/// Entries are addressed by owner, tag and a per-owner local index. Each
/// entry also has a `merged_index` that orders it among all owners; the
/// merged view lists entries by ascending merged index.
#[async_trait]
pub trait OperationLog: Send + Sync + 'static {
    /// Subscribe to the first `limit` entries of the merged view for `tag`.
    fn observe_merged(&self, tag: OperationTag, limit: usize) -> LogSubscription;

    /// Atomically take an entry's payload.
    ///
    /// The entry stays in the merged view until removed. Returns `None` if the
    /// entry is gone or was already claimed.
    async fn claim(
        &self,
        owner: OwnerKey,
        tag: OperationTag,
        tag_local_index: i32,
    ) -> StoreResult<Option<LogPayload>>;

    /// Delete an entry. Returns whether it existed.
    async fn remove(
        &self,
        owner: OwnerKey,
        tag: OperationTag,
        tag_local_index: i32,
    ) -> StoreResult<bool>;

    /// Queue a payload for `owner`.
    ///
    /// If the owner already has an unclaimed entry for `tag`, that entry is
    /// kept and returned instead: its snapshot predates the new edit, so it
    /// already covers it.
    async fn enqueue(
        &self,
        owner: OwnerKey,
        tag: OperationTag,
        payload: LogPayload,
    ) -> StoreResult<MergedLogEntry>;
}

/// Apply a local edit to the installed collections and queue its sync.
///
/// `edit` runs inside a local transaction; the order it saw before editing is
/// stored as the operation's base snapshot.
pub async fn apply_local_change<S, L, F>(
    store: &S,
    log: &L,
    owner: OwnerKey,
    namespace: Namespace,
    edit: F,
) -> StoreResult<MergedLogEntry>
where
    S: LocalStore + ?Sized,
    L: OperationLog + ?Sized,
    F: FnOnce(&mut dyn LocalTransaction) + Send + 'static,
{
    let previous_order = store
        .transaction(move |tx| {
            let before = tx.collection_order(namespace);
            edit(tx);
            before
        })
        .await?;

    let entry = log
        .enqueue(
            owner,
            OperationTag::for_namespace(namespace),
            PendingOperation::new(previous_order).into(),
        )
        .await?;

    tracing::debug!(
        owner = %owner,
        namespace = %namespace,
        merged_index = entry.merged_index,
        "Queued collection sync"
    );

    Ok(entry)
}
