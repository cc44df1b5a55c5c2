//! One dispatcher per namespace, started and stopped together.

use std::sync::Arc;

use futures::future::join_all;
use packsync_engine::Namespace;

use crate::config::SyncConfig;
use crate::dispatcher::{Dispatcher, DispatcherHandle};
use crate::remote::{CollectionRemote, RemoteAdapter};
use crate::store::{LocalStore, OperationLog};
use crate::sync::SyncTask;

/// Keeps installed collections of every namespace in sync.
#[derive(Debug)]
pub struct SyncService {
    dispatchers: Vec<DispatcherHandle>,
}

impl SyncService {
    /// Spawn a dispatcher for each namespace.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<S: LocalStore>(
        config: SyncConfig,
        log: Arc<dyn OperationLog>,
        store: Arc<S>,
        remote: Arc<dyn CollectionRemote>,
    ) -> Self {
        let config = Arc::new(config);
        let remote = RemoteAdapter::new(remote);

        let dispatchers = Namespace::ALL
            .into_iter()
            .map(|namespace| {
                Dispatcher::spawn(SyncTask::new(
                    namespace,
                    log.clone(),
                    store.clone(),
                    remote.clone(),
                    config.clone(),
                ))
            })
            .collect();

        tracing::info!(
            log_view_limit = config.log_view_limit,
            delete_delay_ms = config.delete_delay.as_millis() as u64,
            "Sync service started"
        );

        Self { dispatchers }
    }

    pub fn dispatcher(&self, namespace: Namespace) -> Option<&DispatcherHandle> {
        self.dispatchers
            .iter()
            .find(|dispatcher| dispatcher.namespace() == namespace)
    }

    /// Sync loops tracked across all namespaces.
    pub fn running(&self) -> usize {
        self.dispatchers.iter().map(DispatcherHandle::running).sum()
    }

    /// Stop every dispatcher.
    pub async fn shutdown(self) {
        join_all(self.dispatchers.into_iter().map(DispatcherHandle::shutdown)).await;
        tracing::info!("Sync service stopped");
    }
}
