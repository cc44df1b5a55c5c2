//! The commit/retry loop run for each claimed operation.
//!
//! A [`SyncTask`] claims a log entry, runs sync attempts until one commits,
//! waits out the delete delay and removes the entry. An attempt reads the
//! local infos, asks the server for its list, plans the merge, executes the
//! remote side and commits the write set only if the local order is still
//! the one it started from. Anything else is a [`PassOutcome::Restart`].

use std::sync::Arc;

use packsync_engine::{
    collection_order, combined_hash, CollectionId, LogPayload, MergedLogEntry, Namespace,
    OperationTag, PendingOperation, Reconciler, Reconciliation, WriteSet,
};
use tracing::Instrument;

use crate::config::SyncConfig;
use crate::remote::RemoteAdapter;
use crate::store::{LocalStore, LocalTransaction, OperationLog};

/// Result of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Local state committed, or already matching the server
    Done,
    /// Local state moved underneath the attempt, or a required call failed
    Restart,
}

/// Runs sync operations for one namespace.
pub struct SyncTask<S> {
    namespace: Namespace,
    tag: OperationTag,
    log: Arc<dyn OperationLog>,
    store: Arc<S>,
    remote: RemoteAdapter,
    config: Arc<SyncConfig>,
    reconciler: Reconciler,
}

impl<S> Clone for SyncTask<S> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace,
            tag: self.tag,
            log: self.log.clone(),
            store: self.store.clone(),
            remote: self.remote.clone(),
            config: self.config.clone(),
            reconciler: self.reconciler,
        }
    }
}

impl<S: LocalStore> SyncTask<S> {
    pub fn new(
        namespace: Namespace,
        log: Arc<dyn OperationLog>,
        store: Arc<S>,
        remote: RemoteAdapter,
        config: Arc<SyncConfig>,
    ) -> Self {
        Self {
            namespace,
            tag: OperationTag::for_namespace(namespace),
            log,
            store,
            remote,
            config,
            reconciler: Reconciler::new(namespace),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// The log tag this task consumes.
    pub fn tag(&self) -> OperationTag {
        self.tag
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<dyn OperationLog> {
        &self.log
    }

    /// Process one log entry to completion.
    ///
    /// Never fails: errors are logged and retried until the operation
    /// converges or the future is dropped.
    pub async fn run(&self, entry: MergedLogEntry) {
        let span = tracing::info_span!(
            "sync_operation",
            namespace = %self.namespace,
            owner = %entry.owner,
            merged_index = entry.merged_index,
        );
        self.run_entry(entry).instrument(span).await
    }

    async fn run_entry(&self, entry: MergedLogEntry) {
        match self.claim(&entry).await {
            None => tracing::debug!("Entry has no payload left to claim"),
            Some(payload) => {
                debug_assert!(
                    payload.as_pending().is_some(),
                    "unexpected payload in the {} queue: {:?}",
                    self.tag,
                    payload
                );
                match payload.as_pending() {
                    Some(op) => self.converge(op).await,
                    None => tracing::error!(?payload, "Claimed entry is not a sync operation"),
                }
            }
        }

        tokio::time::sleep(self.config.delete_delay).await;
        self.remove(&entry).await;
    }

    /// Run attempts until one is [`PassOutcome::Done`].
    pub async fn converge(&self, op: &PendingOperation) {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.attempt(op).await {
                PassOutcome::Done => {
                    tracing::info!(attempts, "Installed collections converged");
                    return;
                }
                PassOutcome::Restart => {
                    tracing::debug!(attempts, "Restarting sync attempt");
                    tokio::time::sleep(self.config.restart_delay).await;
                }
            }
        }
    }

    /// One pass of read, fetch, merge, execute and commit.
    pub async fn attempt(&self, op: &PendingOperation) -> PassOutcome {
        let namespace = self.namespace;

        let local_infos = match self
            .store
            .transaction(move |tx| tx.collection_infos(namespace))
            .await
        {
            Ok(infos) => infos,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read local collections");
                return PassOutcome::Restart;
            }
        };

        let remote = match self
            .remote
            .collections(namespace, combined_hash(&local_infos))
            .await
        {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch installed collections");
                return PassOutcome::Restart;
            }
        };

        let seen = local_infos.clone();
        match self
            .store
            .transaction(move |tx| tx.collection_infos(namespace) == seen)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Local collections changed during fetch");
                return PassOutcome::Restart;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to re-read local collections");
                return PassOutcome::Restart;
            }
        }

        let plan = match self
            .reconciler
            .plan(op.previous_order(), &local_infos, remote)
        {
            Ok(Reconciliation::UpToDate) => {
                tracing::debug!("Local collections already match the server");
                return PassOutcome::Done;
            }
            Ok(Reconciliation::Apply(plan)) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to plan sync");
                return PassOutcome::Restart;
            }
        };

        tracing::debug!(
            path = ?plan.path,
            install = plan.install_remote.len(),
            archive = plan.archive_remote.len(),
            refresh = plan.refresh.len(),
            dropped = plan.dropped.len(),
            "Planned sync"
        );

        let outcome = self.remote.execute(&plan).await;
        let writes = plan.into_write_set(outcome);
        let expected_order = collection_order(&local_infos);

        match self
            .store
            .transaction(move |tx| commit(tx, &expected_order, writes))
            .await
        {
            Ok(true) => PassOutcome::Done,
            Ok(false) => {
                tracing::debug!("Local order changed before commit");
                PassOutcome::Restart
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to commit sync result");
                PassOutcome::Restart
            }
        }
    }

    async fn claim(&self, entry: &MergedLogEntry) -> Option<LogPayload> {
        loop {
            match self
                .log
                .claim(entry.owner, entry.tag, entry.tag_local_index)
                .await
            {
                Ok(payload) => return payload,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to claim log entry");
                    tokio::time::sleep(self.config.restart_delay).await;
                }
            }
        }
    }

    async fn remove(&self, entry: &MergedLogEntry) {
        loop {
            match self
                .log
                .remove(entry.owner, entry.tag, entry.tag_local_index)
                .await
            {
                Ok(_) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to remove log entry");
                    tokio::time::sleep(self.config.restart_delay).await;
                }
            }
        }
    }
}

/// Apply `writes` if the local order is still `expected_order`.
fn commit(
    tx: &mut dyn LocalTransaction,
    expected_order: &[CollectionId],
    writes: WriteSet,
) -> bool {
    if tx.collection_order(writes.namespace) != expected_order {
        return false;
    }

    tx.replace_collection_infos(writes.namespace, writes.infos);
    for (id, items) in writes.items {
        tx.replace_collection_items(id, items);
    }
    for id in writes.cleared {
        tx.replace_collection_items(id, Vec::new());
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryLocalStore, MemoryOperationLog, MemoryRemote};
    use packsync_engine::{CollectionInfo, CollectionItem, OwnerKey};
    use serde_json::json;
    use std::time::Duration;

    const NS: Namespace = Namespace::Stickers;

    struct Fixture {
        store: Arc<MemoryLocalStore>,
        log: MemoryOperationLog,
        remote: MemoryRemote,
        task: SyncTask<MemoryLocalStore>,
    }

    fn fixture() -> Fixture {
        let store = MemoryLocalStore::new_shared();
        let log = MemoryOperationLog::new();
        let remote = MemoryRemote::new();
        let config = SyncConfig::new()
            .with_delete_delay(Duration::ZERO)
            .with_restart_delay(Duration::ZERO);
        let task = SyncTask::new(
            NS,
            Arc::new(log.clone()),
            store.clone(),
            RemoteAdapter::new(Arc::new(remote.clone())),
            Arc::new(config),
        );
        Fixture {
            store,
            log,
            remote,
            task,
        }
    }

    fn info(n: i64) -> CollectionInfo {
        CollectionInfo::new(CollectionId::new(NS, n), n, n as i32 + 100)
    }

    fn publish(remote: &MemoryRemote, n: i64) -> CollectionInfo {
        let info = info(n);
        remote.publish(
            info.clone(),
            vec![CollectionItem::new(0, n * 10, json!({"n": n}))],
        );
        info
    }

    #[tokio::test]
    async fn up_to_date_attempt_writes_nothing() {
        let f = fixture();
        let a = publish(&f.remote, 1);
        f.remote.install_elsewhere(a.id);
        f.store.update(|tx| tx.replace_collection_infos(NS, vec![a.clone()]));
        let writes = f.store.write_count();

        let outcome = f.task.attempt(&PendingOperation::new(vec![a.id])).await;
        assert_eq!(outcome, PassOutcome::Done);
        assert_eq!(f.store.write_count(), writes);
    }

    #[tokio::test]
    async fn commit_rejects_moved_order() {
        let f = fixture();
        let a = publish(&f.remote, 1);
        let b = publish(&f.remote, 2);
        f.remote.install_elsewhere(a.id);

        // Reorder locally while the remote call is in flight.
        let store = f.store.clone();
        let b_info = b.clone();
        let mut fired = false;
        f.remote.set_hook(move |call| {
            if !fired && call.is_mutation() {
                fired = true;
                store.update(|tx| {
                    let mut infos = tx.collection_infos(NS);
                    infos.push(b_info.clone());
                    tx.replace_collection_infos(NS, infos);
                });
            }
        });

        f.store.update(|tx| tx.replace_collection_infos(NS, vec![a.clone()]));
        let outcome = f.task.attempt(&PendingOperation::new(Vec::new())).await;
        assert_eq!(outcome, PassOutcome::Restart);
        assert_eq!(f.store.order(NS), vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn remote_list_failure_restarts() {
        let f = fixture();
        f.remote.fail(crate::memory::CallKind::GetAll, 1);

        let op = PendingOperation::new(Vec::new());
        assert_eq!(f.task.attempt(&op).await, PassOutcome::Restart);
        assert_eq!(f.task.attempt(&op).await, PassOutcome::Done);
    }

    #[tokio::test]
    async fn run_removes_entry_after_converging() {
        let f = fixture();
        let a = publish(&f.remote, 1);
        f.remote.install_elsewhere(a.id);

        let entry = f.log.push(
            OwnerKey(1),
            f.task.tag(),
            PendingOperation::new(Vec::new()).into(),
        );
        f.task.run(entry).await;

        assert!(f.log.is_empty(f.task.tag()));
        assert_eq!(f.store.order(NS), vec![a.id]);
        assert_eq!(f.store.items(a.id), f.remote.items(a.id));
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "unexpected payload")]
    async fn foreign_payload_is_a_logic_error() {
        let f = fixture();
        let entry = f.log.push(
            OwnerKey(1),
            f.task.tag(),
            LogPayload::Unknown {
                kind: "consumeReaction".into(),
            },
        );
        f.task.run(entry).await;
    }
}
