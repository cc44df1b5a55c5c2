//! Bookkeeping of running sync loops.
//!
//! Tracks one loop per merge group and decides, for every new view of the
//! operation log, which loops to start and which to cancel.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use packsync_engine::{MergedLogEntry, OwnerKey};
use tokio::task::AbortHandle;

/// A running loop.
#[derive(Debug)]
struct TrackedLoop {
    owner: OwnerKey,
    handle: AbortHandle,
}

/// Changes made by one [`OperationTracker::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerUpdate {
    pub started: Vec<MergedLogEntry>,
    /// Merged indices whose loops were aborted
    pub cancelled: Vec<i32>,
}

impl TrackerUpdate {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty() && self.cancelled.is_empty()
    }
}

/// Tracks sync loops by merge group.
///
/// Only the first entry of each owner in a view is eligible, so an owner
/// never has two loops at once: a later entry waits until the earlier one
/// leaves the view.
#[derive(Debug, Default)]
pub struct OperationTracker {
    loops: DashMap<i32, TrackedLoop>,
    closed: AtomicBool,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff a new view against the tracked loops.
    ///
    /// Loops whose merge group is no longer eligible are aborted first.
    /// `start` is then called for every newly eligible entry and must return
    /// the abort handle of the loop it spawned.
    pub fn update<F>(&self, entries: &[MergedLogEntry], mut start: F) -> TrackerUpdate
    where
        F: FnMut(MergedLogEntry) -> AbortHandle,
    {
        let mut update = TrackerUpdate::default();
        if self.is_closed() {
            return update;
        }

        let mut busy_owners = HashSet::new();
        let eligible: Vec<&MergedLogEntry> = entries
            .iter()
            .filter(|entry| busy_owners.insert(entry.owner))
            .collect();
        let eligible_indices: HashSet<i32> =
            eligible.iter().map(|entry| entry.merged_index).collect();

        let stale: Vec<i32> = self
            .loops
            .iter()
            .map(|tracked| *tracked.key())
            .filter(|merged_index| !eligible_indices.contains(merged_index))
            .collect();
        for merged_index in stale {
            if let Some((_, tracked)) = self.loops.remove(&merged_index) {
                tracked.handle.abort();
                tracing::debug!(
                    owner = %tracked.owner,
                    merged_index,
                    "Cancelled sync loop"
                );
                update.cancelled.push(merged_index);
            }
        }
        update.cancelled.sort_unstable();

        for entry in eligible {
            if self.loops.contains_key(&entry.merged_index) {
                continue;
            }
            let handle = start(*entry);
            self.loops.insert(
                entry.merged_index,
                TrackedLoop {
                    owner: entry.owner,
                    handle,
                },
            );
            update.started.push(*entry);
        }

        // A reset that raced with this update may have missed what it started.
        if self.is_closed() {
            self.abort_all();
        }

        update
    }

    /// Abort every tracked loop and refuse new ones.
    ///
    /// Returns the number of loops aborted.
    pub fn reset(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        self.abort_all()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of tracked loops, finished or not.
    pub fn running(&self) -> usize {
        self.loops.len()
    }

    pub fn is_tracking(&self, merged_index: i32) -> bool {
        self.loops.contains_key(&merged_index)
    }

    /// Owners with a tracked loop.
    pub fn owners(&self) -> Vec<OwnerKey> {
        let mut owners: Vec<OwnerKey> = self.loops.iter().map(|tracked| tracked.owner).collect();
        owners.sort();
        owners
    }

    fn abort_all(&self) -> usize {
        let merged_indices: Vec<i32> = self.loops.iter().map(|tracked| *tracked.key()).collect();
        let mut aborted = 0;
        for merged_index in merged_indices {
            if let Some((_, tracked)) = self.loops.remove(&merged_index) {
                tracked.handle.abort();
                aborted += 1;
            }
        }
        aborted
    }
}
