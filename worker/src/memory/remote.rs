//! In-memory stand-in for the collection server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use packsync_engine::{
    combined_hash, CollectionId, CollectionInfo, CollectionItem, Namespace, RemoteCollections,
};

use crate::error::{RemoteError, RemoteResult};
use crate::remote::{CollectionRemote, InstallResult};

/// A request received by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    GetAll { namespace: Namespace, hash: i32 },
    Fetch(CollectionId),
    Install(CollectionId),
    Archive(CollectionId),
    Reorder {
        namespace: Namespace,
        ids: Vec<CollectionId>,
    },
}

impl RemoteCall {
    pub fn kind(&self) -> CallKind {
        match self {
            RemoteCall::GetAll { .. } => CallKind::GetAll,
            RemoteCall::Fetch(_) => CallKind::Fetch,
            RemoteCall::Install(_) => CallKind::Install,
            RemoteCall::Archive(_) => CallKind::Archive,
            RemoteCall::Reorder { .. } => CallKind::Reorder,
        }
    }

    /// Whether the call changes server state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self.kind(),
            CallKind::Install | CallKind::Archive | CallKind::Reorder
        )
    }
}

/// Endpoint selector for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    GetAll,
    Fetch,
    Install,
    Archive,
    Reorder,
}

/// Callback run after each request is journaled, before it is served.
pub type CallHook = Box<dyn FnMut(&RemoteCall) + Send>;

#[derive(Debug, Clone)]
struct Published {
    info: CollectionInfo,
    items: Vec<CollectionItem>,
}

#[derive(Default)]
struct ServerState {
    catalog: HashMap<CollectionId, Published>,
    installed: HashMap<Namespace, Vec<CollectionId>>,
    install_limit: Option<usize>,
    failures: HashMap<CallKind, u32>,
    calls: Vec<RemoteCall>,
    hook: Option<CallHook>,
}

impl ServerState {
    fn installed_infos(&self, namespace: Namespace) -> Vec<CollectionInfo> {
        self.installed
            .get(&namespace)
            .into_iter()
            .flatten()
            .filter_map(|id| self.catalog.get(id).map(|published| published.info.clone()))
            .collect()
    }

    fn published(&self, id: CollectionId) -> RemoteResult<&Published> {
        self.catalog
            .get(&id)
            .ok_or_else(|| RemoteError::rpc(400, "STICKERSET_INVALID"))
    }

    fn should_fail(&mut self, kind: CallKind) -> bool {
        match self.failures.get_mut(&kind) {
            Some(0) | None => false,
            Some(remaining) => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
        }
    }
}

/// A collection server kept in memory.
///
/// Behaves like the real endpoints: the collection list answers "not
/// modified" when the client's combined hash matches, installing beyond the
/// install limit archives the oldest collections, and every mutation is
/// idempotent. Each request is journaled so tests can assert on traffic.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a collection known to the server without installing it.
    pub fn publish(&self, info: CollectionInfo, items: Vec<CollectionItem>) {
        self.lock()
            .catalog
            .insert(info.id, Published { info, items });
    }

    /// Replace a collection's content, as an edit by its author would.
    pub fn update_content(&self, id: CollectionId, hash: i32, items: Vec<CollectionItem>) {
        let mut state = self.lock();
        if let Some(published) = state.catalog.get_mut(&id) {
            published.info.hash = hash;
            published.items = items;
        }
    }

    /// Install directly on the server, as another device would.
    pub fn install_elsewhere(&self, id: CollectionId) -> Vec<CollectionId> {
        install(&mut self.lock(), id)
    }

    /// Archive directly on the server, as another device would.
    pub fn archive_elsewhere(&self, id: CollectionId) {
        archive(&mut self.lock(), id);
    }

    /// Limit the number of installed collections per namespace.
    pub fn set_install_limit(&self, limit: Option<usize>) {
        self.lock().install_limit = limit;
    }

    /// Fail the next `times` requests of one kind. `u32::MAX` fails forever.
    pub fn fail(&self, kind: CallKind, times: u32) {
        self.lock().failures.insert(kind, times);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Run `hook` on every request from now on.
    pub fn set_hook<F>(&self, hook: F)
    where
        F: FnMut(&RemoteCall) + Send + 'static,
    {
        self.lock().hook = Some(Box::new(hook));
    }

    /// Server-side installed list.
    pub fn installed(&self, namespace: Namespace) -> Vec<CollectionInfo> {
        self.lock().installed_infos(namespace)
    }

    /// Server-side installed order.
    pub fn installed_order(&self, namespace: Namespace) -> Vec<CollectionId> {
        self.lock()
            .installed
            .get(&namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Published info of a collection.
    pub fn info(&self, id: CollectionId) -> Option<CollectionInfo> {
        self.lock()
            .catalog
            .get(&id)
            .map(|published| published.info.clone())
    }

    /// Published items of a collection.
    pub fn items(&self, id: CollectionId) -> Vec<CollectionItem> {
        self.lock()
            .catalog
            .get(&id)
            .map(|published| published.items.clone())
            .unwrap_or_default()
    }

    /// All requests received so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    /// Drain the request journal.
    pub fn take_calls(&self) -> Vec<RemoteCall> {
        std::mem::take(&mut self.lock().calls)
    }

    /// Record the call, run the hook outside the lock, then check for an
    /// injected failure.
    fn receive(&self, call: RemoteCall) -> RemoteResult<()> {
        let kind = call.kind();
        let hook = {
            let mut state = self.lock();
            state.calls.push(call.clone());
            state.hook.take()
        };
        if let Some(mut hook) = hook {
            hook(&call);
            let mut state = self.lock();
            if state.hook.is_none() {
                state.hook = Some(hook);
            }
        }

        if self.lock().should_fail(kind) {
            return Err(RemoteError::Network("injected failure".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryRemote")
            .field("published", &state.catalog.len())
            .field("installed", &state.installed)
            .field("calls", &state.calls.len())
            .finish()
    }
}

/// Install at the top of the list. Returns the ids archived to stay within
/// the install limit.
fn install(state: &mut ServerState, id: CollectionId) -> Vec<CollectionId> {
    let limit = state.install_limit;
    let installed = state.installed.entry(id.namespace).or_default();
    if installed.contains(&id) {
        return Vec::new();
    }
    installed.insert(0, id);

    let mut archived = Vec::new();
    if let Some(limit) = limit {
        while installed.len() > limit.max(1) {
            if let Some(oldest) = installed.pop() {
                archived.push(oldest);
            }
        }
    }
    archived
}

fn archive(state: &mut ServerState, id: CollectionId) {
    if let Some(installed) = state.installed.get_mut(&id.namespace) {
        installed.retain(|installed_id| *installed_id != id);
    }
}

#[async_trait]
impl CollectionRemote for MemoryRemote {
    async fn get_all_collections(
        &self,
        namespace: Namespace,
        hash: i32,
    ) -> RemoteResult<RemoteCollections> {
        self.receive(RemoteCall::GetAll { namespace, hash })?;

        let infos = self.lock().installed_infos(namespace);
        if combined_hash(&infos) == hash {
            Ok(RemoteCollections::NotModified)
        } else {
            Ok(RemoteCollections::Fresh(infos))
        }
    }

    async fn fetch_collection_content(
        &self,
        info: &CollectionInfo,
    ) -> RemoteResult<Vec<CollectionItem>> {
        self.receive(RemoteCall::Fetch(info.id))?;
        let state = self.lock();
        Ok(state.published(info.id)?.items.clone())
    }

    async fn install_collection(&self, info: &CollectionInfo) -> RemoteResult<InstallResult> {
        self.receive(RemoteCall::Install(info.id))?;
        let mut state = self.lock();
        state.published(info.id)?;

        let archived = install(&mut state, info.id);
        if archived.is_empty() {
            Ok(InstallResult::Success)
        } else {
            Ok(InstallResult::ArchivedElsewhere(archived))
        }
    }

    async fn archive_collection(&self, info: &CollectionInfo) -> RemoteResult<()> {
        self.receive(RemoteCall::Archive(info.id))?;
        let mut state = self.lock();
        state.published(info.id)?;
        archive(&mut state, info.id);
        Ok(())
    }

    async fn reorder_collections(
        &self,
        namespace: Namespace,
        ids: &[CollectionId],
    ) -> RemoteResult<()> {
        self.receive(RemoteCall::Reorder {
            namespace,
            ids: ids.to_vec(),
        })?;

        let mut state = self.lock();
        let installed = state.installed.entry(namespace).or_default();
        let mut reordered: Vec<CollectionId> = ids
            .iter()
            .copied()
            .filter(|id| installed.contains(id))
            .collect();
        reordered.dedup();
        reordered.extend(installed.iter().copied().filter(|id| !ids.contains(id)));
        *installed = reordered;
        Ok(())
    }
}
