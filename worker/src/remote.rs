//! Remote collection endpoints and the adapter the sync loop talks to.
//!
//! [`CollectionRemote`] is the raw request surface. [`RemoteAdapter`] turns
//! it into the calls a sync attempt needs: failures of individual fetches and
//! mutations are logged and degraded to neutral results, so one bad collection
//! never aborts a pass. Only the initial collection list propagates errors.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use packsync_engine::{
    CollectionId, CollectionInfo, CollectionItem, FetchedItems, Namespace, RemoteCollections,
    RemoteOutcome, SyncPlan,
};

use crate::error::RemoteResult;

/// Server answer to an install request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallResult {
    Success,
    /// Installed, and the server archived these collections to make room
    ArchivedElsewhere(Vec<CollectionId>),
}

/// The five server endpoints used by the sync loop.
#[async_trait]
pub trait CollectionRemote: Send + Sync + 'static {
    /// Installed collections, or "not modified" if they hash to `hash`.
    async fn get_all_collections(
        &self,
        namespace: Namespace,
        hash: i32,
    ) -> RemoteResult<RemoteCollections>;

    async fn fetch_collection_content(
        &self,
        info: &CollectionInfo,
    ) -> RemoteResult<Vec<CollectionItem>>;

    async fn install_collection(&self, info: &CollectionInfo) -> RemoteResult<InstallResult>;

    async fn archive_collection(&self, info: &CollectionInfo) -> RemoteResult<()>;

    async fn reorder_collections(
        &self,
        namespace: Namespace,
        ids: &[CollectionId],
    ) -> RemoteResult<()>;
}

/// Wraps a [`CollectionRemote`] with the error policy of the sync loop.
#[derive(Clone)]
pub struct RemoteAdapter {
    remote: Arc<dyn CollectionRemote>,
}

impl RemoteAdapter {
    pub fn new(remote: Arc<dyn CollectionRemote>) -> Self {
        Self { remote }
    }

    /// Fetch the installed list. Errors propagate; the caller restarts.
    pub async fn collections(
        &self,
        namespace: Namespace,
        hash: i32,
    ) -> RemoteResult<RemoteCollections> {
        self.remote.get_all_collections(namespace, hash).await
    }

    /// Fetch one collection's items. A failure yields [`FetchedItems::failed`].
    pub async fn fetch_content(&self, info: &CollectionInfo) -> FetchedItems {
        match self.remote.fetch_collection_content(info).await {
            Ok(items) => FetchedItems::loaded(info.id, items),
            Err(e) => {
                tracing::warn!(collection = %info.id, error = %e, "Failed to fetch collection content");
                FetchedItems::failed(info.id)
            }
        }
    }

    /// Install one collection. Returns the ids the server archived in turn;
    /// a failure archives nothing.
    pub async fn install(&self, info: &CollectionInfo) -> Vec<CollectionId> {
        match self.remote.install_collection(info).await {
            Ok(InstallResult::Success) => Vec::new(),
            Ok(InstallResult::ArchivedElsewhere(archived)) => {
                tracing::debug!(
                    collection = %info.id,
                    archived = archived.len(),
                    "Install archived other collections"
                );
                archived
            }
            Err(e) => {
                tracing::warn!(collection = %info.id, error = %e, "Failed to install collection");
                Vec::new()
            }
        }
    }

    pub async fn archive(&self, info: &CollectionInfo) {
        if let Err(e) = self.remote.archive_collection(info).await {
            tracing::warn!(collection = %info.id, error = %e, "Failed to archive collection");
        }
    }

    pub async fn reorder(&self, namespace: Namespace, ids: &[CollectionId]) {
        if let Err(e) = self.remote.reorder_collections(namespace, ids).await {
            tracing::warn!(namespace = %namespace, error = %e, "Failed to reorder collections");
        }
    }

    /// Fetch items for every collection concurrently, in input order.
    pub async fn fetch_all(&self, infos: &[CollectionInfo]) -> Vec<FetchedItems> {
        join_all(infos.iter().map(|info| self.fetch_content(info))).await
    }

    /// Push the plan's mutations: all archives, then all installs, then the
    /// reorder. Returns the ids archived as a side effect of installing.
    pub async fn apply_mutations(&self, plan: &SyncPlan) -> HashSet<CollectionId> {
        if !plan.mutates_remote() {
            return HashSet::new();
        }

        join_all(plan.archive_remote.iter().map(|info| self.archive(info))).await;

        let archived: HashSet<CollectionId> =
            join_all(plan.install_remote.iter().map(|info| self.install(info)))
                .await
                .into_iter()
                .flatten()
                .collect();

        if let Some(ids) = plan.reorder_ids(&archived) {
            self.reorder(plan.namespace, &ids).await;
        }

        archived
    }

    /// Run the plan's remote side: mutations and content fetches concurrently.
    pub async fn execute(&self, plan: &SyncPlan) -> RemoteOutcome {
        let (archived, fetched) =
            futures::join!(self.apply_mutations(plan), self.fetch_all(&plan.refresh));
        RemoteOutcome { archived, fetched }
    }
}

impl std::fmt::Debug for RemoteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteAdapter").finish_non_exhaustive()
    }
}
