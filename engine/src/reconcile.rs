//! Reconciliation of the local installed-collection list with the server.
//!
//! This module is pure: it never talks to the network or the store. Given
//! the order snapshot taken when an operation was enqueued, the current local
//! infos and the server's answer, it produces a [`SyncPlan`] describing the
//! remote calls to issue and, once their results are in, the [`WriteSet`] to
//! commit locally.
//!
//! # Algorithm
//!
//! 1. "Not modified" from the server means remote == local.
//! 2. If the local order did not move since the snapshot, the server is
//!    authoritative: take its list, refetch items whose hash changed.
//! 3. Otherwise merge three ways. Local additions and removals since the
//!    snapshot are kept and remote additions are prepended. Every local
//!    collection survives, so one the server lost is installed again.
//!    The server is then told to install, archive and reorder to match.

use crate::{error::Result, CollectionId, CollectionInfo, CollectionItem, Error, Namespace};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Server answer to "give me all collections unless they hash to X".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteCollections {
    NotModified,
    Fresh(Vec<CollectionInfo>),
}

/// Which branch of the merge produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MergePath {
    /// No local edit since the snapshot; adopt the remote list.
    FastForward,
    /// Local and remote both moved; merge and push the result back.
    ThreeWay,
}

/// The set differences computed by a three-way merge, in list order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub locally_added: Vec<CollectionId>,
    pub locally_removed: Vec<CollectionId>,
    pub remotely_added: Vec<CollectionId>,
    /// Remote ids unknown to the snapshot and not added locally. Local
    /// survivors are filtered against this set.
    pub remotely_removed: Vec<CollectionId>,
}

/// Items fetched for one collection.
///
/// A failed fetch carries no items; the existing local list for that id is
/// left alone rather than cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedItems {
    pub id: CollectionId,
    pub items: Vec<CollectionItem>,
    pub failed: bool,
}

impl FetchedItems {
    pub fn loaded(id: CollectionId, items: Vec<CollectionItem>) -> Self {
        Self {
            id,
            items,
            failed: false,
        }
    }

    pub fn failed(id: CollectionId) -> Self {
        Self {
            id,
            items: Vec::new(),
            failed: true,
        }
    }
}

/// Results of executing a plan's remote calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteOutcome {
    /// Collections the server archived while installing others
    pub archived: HashSet<CollectionId>,
    pub fetched: Vec<FetchedItems>,
}

/// Local writes that make the store match the merged state.
///
/// Applied in one transaction: `infos` replaces the namespace's info list,
/// each entry of `items` replaces that collection's item list, and every id in
/// `cleared` gets an empty item list.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSet {
    pub namespace: Namespace,
    pub infos: Vec<CollectionInfo>,
    pub items: Vec<(CollectionId, Vec<CollectionItem>)>,
    pub cleared: Vec<CollectionId>,
}

impl WriteSet {
    /// Resulting collection order.
    pub fn order(&self) -> Vec<CollectionId> {
        self.infos.iter().map(|info| info.id).collect()
    }
}

/// Everything needed to converge one namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub namespace: Namespace,
    pub path: MergePath,
    pub summary: MergeSummary,
    /// Merged info list, before the "archived elsewhere" exclusion
    pub resulting_infos: Vec<CollectionInfo>,
    pub archive_remote: Vec<CollectionInfo>,
    pub install_remote: Vec<CollectionInfo>,
    /// Collections whose items must be (re)fetched
    pub refresh: Vec<CollectionInfo>,
    /// Local collections absent from the result
    pub dropped: Vec<CollectionId>,
    local_infos: HashMap<CollectionId, CollectionInfo>,
}

impl SyncPlan {
    /// Ids for the remote reorder call, or `None` if this plan does not
    /// reorder. Collections the server archived on install are left out.
    pub fn reorder_ids(&self, archived: &HashSet<CollectionId>) -> Option<Vec<CollectionId>> {
        match self.path {
            MergePath::FastForward => None,
            MergePath::ThreeWay => Some(
                self.resulting_infos
                    .iter()
                    .map(|info| info.id)
                    .filter(|id| !archived.contains(id))
                    .collect(),
            ),
        }
    }

    /// Whether this plan issues any remote mutation.
    pub fn mutates_remote(&self) -> bool {
        self.path == MergePath::ThreeWay
    }

    /// Build the local write set from the results of the remote calls.
    pub fn into_write_set(self, outcome: RemoteOutcome) -> WriteSet {
        let RemoteOutcome { archived, fetched } = outcome;

        let failed: HashSet<CollectionId> = fetched
            .iter()
            .filter(|f| f.failed)
            .map(|f| f.id)
            .collect();

        // A failed refresh must not record the new hash, or the next pass
        // would consider the stale items current. A collection new to the
        // device stays out of the list until its items arrive.
        let infos = self
            .resulting_infos
            .into_iter()
            .filter(|info| !archived.contains(&info.id))
            .filter_map(|info| {
                if !failed.contains(&info.id) {
                    return Some(info);
                }
                self.local_infos.get(&info.id).cloned()
            })
            .collect();

        let items = fetched
            .into_iter()
            .filter(|f| !f.failed && !archived.contains(&f.id))
            .map(|f| (f.id, f.items))
            .collect();

        let mut cleared = self.dropped;
        let mut archived_sorted: Vec<_> = archived
            .into_iter()
            .filter(|id| !cleared.contains(id))
            .collect();
        archived_sorted.sort();
        cleared.extend(archived_sorted);

        WriteSet {
            namespace: self.namespace,
            infos,
            items,
            cleared,
        }
    }
}

/// Outcome of planning.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Local and remote already agree; nothing to call, nothing to write.
    UpToDate,
    Apply(SyncPlan),
}

/// Plans the merge for one namespace.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    namespace: Namespace,
}

impl Reconciler {
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Compute the plan for converging `local_infos` with `remote`.
    ///
    /// `initial_order` is the order snapshot stored with the pending
    /// operation.
    pub fn plan(
        &self,
        initial_order: &[CollectionId],
        local_infos: &[CollectionInfo],
        remote: RemoteCollections,
    ) -> Result<Reconciliation> {
        self.validate("local", local_infos)?;

        let remote_infos = match remote {
            RemoteCollections::NotModified => local_infos.to_vec(),
            RemoteCollections::Fresh(infos) => {
                self.validate("remote", &infos)?;
                infos
            }
        };

        let local_order: Vec<CollectionId> = local_infos.iter().map(|info| info.id).collect();

        if initial_order == local_order.as_slice() {
            if local_infos == remote_infos.as_slice() {
                return Ok(Reconciliation::UpToDate);
            }
            Ok(Reconciliation::Apply(
                self.fast_forward(local_infos, remote_infos),
            ))
        } else {
            Ok(Reconciliation::Apply(self.three_way(
                initial_order,
                local_infos,
                remote_infos,
            )))
        }
    }

    fn validate(&self, list: &'static str, infos: &[CollectionInfo]) -> Result<()> {
        let mut seen = HashSet::with_capacity(infos.len());
        for info in infos {
            if info.id.namespace != self.namespace {
                return Err(Error::NamespaceMismatch {
                    expected: self.namespace,
                    id: info.id,
                });
            }
            if !seen.insert(info.id) {
                return Err(Error::DuplicateCollection { list, id: info.id });
            }
        }
        Ok(())
    }

    fn fast_forward(
        &self,
        local_infos: &[CollectionInfo],
        remote_infos: Vec<CollectionInfo>,
    ) -> SyncPlan {
        let local_by_id = index_infos(local_infos);
        let remote_ids: HashSet<CollectionId> = remote_infos.iter().map(|info| info.id).collect();

        let refresh = stale_infos(&remote_infos, &local_by_id);
        let dropped = local_infos
            .iter()
            .map(|info| info.id)
            .filter(|id| !remote_ids.contains(id))
            .collect();

        SyncPlan {
            namespace: self.namespace,
            path: MergePath::FastForward,
            summary: MergeSummary::default(),
            resulting_infos: remote_infos,
            archive_remote: Vec::new(),
            install_remote: Vec::new(),
            refresh,
            dropped,
            local_infos: local_by_id,
        }
    }

    fn three_way(
        &self,
        initial_order: &[CollectionId],
        local_infos: &[CollectionInfo],
        remote_infos: Vec<CollectionInfo>,
    ) -> SyncPlan {
        let initial_ids: HashSet<CollectionId> = initial_order.iter().copied().collect();
        let local_ids: HashSet<CollectionId> = local_infos.iter().map(|info| info.id).collect();
        let remote_by_id = index_infos(&remote_infos);
        let local_by_id = index_infos(local_infos);

        let locally_removed: Vec<CollectionId> = initial_order
            .iter()
            .copied()
            .filter(|id| !local_ids.contains(id))
            .collect();
        let locally_added: Vec<CollectionId> = local_infos
            .iter()
            .map(|info| info.id)
            .filter(|id| !initial_ids.contains(id))
            .collect();

        let remotely_added: Vec<&CollectionInfo> = remote_infos
            .iter()
            .filter(|info| !locally_removed.contains(&info.id) && !local_ids.contains(&info.id))
            .collect();
        let remotely_removed: Vec<CollectionId> = remote_infos
            .iter()
            .map(|info| info.id)
            .filter(|id| !initial_ids.contains(id) && !locally_added.contains(id))
            .collect();

        // Remote additions first, then the local survivors in local order.
        // Where both sides know a collection the remote info wins.
        let mut resulting_infos: Vec<CollectionInfo> =
            remotely_added.iter().map(|info| (*info).clone()).collect();
        resulting_infos.extend(
            local_infos
                .iter()
                .filter(|info| !remotely_removed.contains(&info.id))
                .map(|info| remote_by_id.get(&info.id).unwrap_or(info).clone()),
        );

        let resulting_ids: HashSet<CollectionId> =
            resulting_infos.iter().map(|info| info.id).collect();

        let archive_remote = remote_infos
            .iter()
            .filter(|info| !resulting_ids.contains(&info.id))
            .cloned()
            .collect();
        let install_remote = resulting_infos
            .iter()
            .filter(|info| !remote_by_id.contains_key(&info.id))
            .cloned()
            .collect();

        let refresh = stale_infos(&resulting_infos, &local_by_id);
        let dropped = local_infos
            .iter()
            .map(|info| info.id)
            .filter(|id| !resulting_ids.contains(id))
            .collect();

        SyncPlan {
            namespace: self.namespace,
            path: MergePath::ThreeWay,
            summary: MergeSummary {
                locally_added,
                locally_removed,
                remotely_added: remotely_added.iter().map(|info| info.id).collect(),
                remotely_removed,
            },
            resulting_infos,
            archive_remote,
            install_remote,
            refresh,
            dropped,
            local_infos: local_by_id,
        }
    }
}

fn index_infos(infos: &[CollectionInfo]) -> HashMap<CollectionId, CollectionInfo> {
    infos.iter().map(|info| (info.id, info.clone())).collect()
}

/// Infos that are new locally or whose content hash moved.
fn stale_infos(
    target: &[CollectionInfo],
    local_by_id: &HashMap<CollectionId, CollectionInfo>,
) -> Vec<CollectionInfo> {
    target
        .iter()
        .filter(|info| match local_by_id.get(&info.id) {
            Some(local) => local.hash != info.hash,
            None => true,
        })
        .cloned()
        .collect()
}
