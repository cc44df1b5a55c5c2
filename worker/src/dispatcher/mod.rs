//! Operation queue dispatcher.
//!
//! Observes the merged operation log of one namespace and keeps exactly the
//! right set of sync loops running: one per owner with a pending entry.

mod tracker;

pub use tracker::{OperationTracker, TrackerUpdate};

use std::sync::Arc;

use futures::StreamExt;
use packsync_engine::Namespace;
use tokio::task::JoinHandle;

use crate::store::LocalStore;
use crate::sync::SyncTask;

/// Spawns dispatchers.
pub struct Dispatcher;

impl Dispatcher {
    /// Start observing the log for `task`'s namespace.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: LocalStore>(task: SyncTask<S>) -> DispatcherHandle {
        let namespace = task.namespace();
        let tracker = Arc::new(OperationTracker::new());
        let observer = tokio::spawn(observe(task, tracker.clone()));

        tracing::info!(namespace = %namespace, "Dispatcher started");

        DispatcherHandle {
            namespace,
            tracker,
            observer: Some(observer),
        }
    }
}

async fn observe<S: LocalStore>(task: SyncTask<S>, tracker: Arc<OperationTracker>) {
    let mut view = task
        .log()
        .observe_merged(task.tag(), task.config().log_view_limit);

    while let Some(entries) = view.next().await {
        let update = tracker.update(&entries, |entry| {
            let task = task.clone();
            tokio::spawn(async move { task.run(entry).await }).abort_handle()
        });

        if !update.is_empty() {
            tracing::debug!(
                namespace = %task.namespace(),
                started = update.started.len(),
                cancelled = update.cancelled.len(),
                running = tracker.running(),
                "Operation log view changed"
            );
        }
    }

    tracing::info!(namespace = %task.namespace(), "Operation log subscription ended");
}

/// A running dispatcher.
///
/// Dropping the handle stops the dispatcher and aborts its loops.
#[derive(Debug)]
pub struct DispatcherHandle {
    namespace: Namespace,
    tracker: Arc<OperationTracker>,
    observer: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Number of tracked sync loops.
    pub fn running(&self) -> usize {
        self.tracker.running()
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    /// Stop observing and abort every tracked loop.
    pub async fn shutdown(mut self) {
        if let Some(observer) = self.observer.take() {
            observer.abort();
            let _ = observer.await;
        }
        let aborted = self.tracker.reset();
        tracing::info!(namespace = %self.namespace, aborted, "Dispatcher stopped");
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.abort();
            self.tracker.reset();
        }
    }
}
