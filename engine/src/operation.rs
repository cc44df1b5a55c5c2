//! Operation log payloads.
//!
//! Local edits to the installed-collection list are not pushed directly.
//! Instead a [`PendingOperation`] is appended to the operation log and a
//! background worker reconciles it against the server later.

use crate::{CollectionId, Namespace};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account or peer scope under which operations are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerKey(pub i64);

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Log tag that selects which operation queue an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationTag {
    SynchronizeInstalledStickers,
    SynchronizeInstalledMasks,
}

impl OperationTag {
    /// The queue carrying sync operations for a namespace.
    pub fn for_namespace(namespace: Namespace) -> Self {
        match namespace {
            Namespace::Stickers => OperationTag::SynchronizeInstalledStickers,
            Namespace::Masks => OperationTag::SynchronizeInstalledMasks,
        }
    }

    pub fn namespace(&self) -> Namespace {
        match self {
            OperationTag::SynchronizeInstalledStickers => Namespace::Stickers,
            OperationTag::SynchronizeInstalledMasks => Namespace::Masks,
        }
    }
}

impl fmt::Display for OperationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationTag::SynchronizeInstalledStickers => f.write_str("synchronizeInstalledStickers"),
            OperationTag::SynchronizeInstalledMasks => f.write_str("synchronizeInstalledMasks"),
        }
    }
}

/// A queued request to converge the installed-collection list with the server.
///
/// `previous_order` is the collection order observed before the local edit
/// that produced this entry. It is the base of the three-way merge and never
/// changes after the entry is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    previous_order: Vec<CollectionId>,
}

impl PendingOperation {
    pub fn new(previous_order: Vec<CollectionId>) -> Self {
        Self { previous_order }
    }

    pub fn previous_order(&self) -> &[CollectionId] {
        &self.previous_order
    }
}

/// Contents of an operation log entry.
///
/// Log stores are shared with other queues, so a claimed entry can in
/// principle carry something this worker does not understand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LogPayload {
    SynchronizeInstalled(PendingOperation),
    Unknown { kind: String },
}

impl LogPayload {
    /// The sync operation, if this payload is one.
    pub fn as_pending(&self) -> Option<&PendingOperation> {
        match self {
            LogPayload::SynchronizeInstalled(op) => Some(op),
            LogPayload::Unknown { .. } => None,
        }
    }
}

impl From<PendingOperation> for LogPayload {
    fn from(op: PendingOperation) -> Self {
        LogPayload::SynchronizeInstalled(op)
    }
}

/// One row of the merged operation log view.
///
/// `merged_index` identifies the merge group (the live entry for an owner)
/// and is stable for as long as the entry exists; `tag_local_index` addresses
/// the entry within its owner's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedLogEntry {
    pub owner: OwnerKey,
    pub tag: OperationTag,
    pub tag_local_index: i32,
    pub merged_index: i32,
}
