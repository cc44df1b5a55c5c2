//! # Packsync Engine
//!
//! Merge planning for keeping a device's ordered list of installed
//! collections (sticker packs, mask packs) in sync with the server.
//!
//! The engine has no IO. The background worker reads local state, asks the
//! server for its list and hands both to the [`Reconciler`], which decides
//! what to install, archive, reorder and refetch, and finally what to write
//! back locally.
//!
//! ## Core Concepts
//!
//! ### Collections
//!
//! A [`CollectionInfo`] identifies a collection ([`CollectionId`]) and carries
//! the server's content hash. [`combined_hash`] folds an ordered info list
//! into the value the server uses to answer "not modified".
//!
//! ### Pending operations
//!
//! Every local edit enqueues a [`PendingOperation`] holding the collection
//! order observed *before* the edit. That snapshot is the base of the
//! three-way merge.
//!
//! ### Reconciliation
//!
//! [`Reconciler::plan`] produces either [`Reconciliation::UpToDate`] or a
//! [`SyncPlan`]. After the plan's remote calls ran, [`SyncPlan::into_write_set`]
//! turns their results into a [`WriteSet`] for one local transaction.
//!
//! ## Quick Start
//!
//! ```rust
//! use packsync_engine::{
//!     CollectionId, CollectionInfo, Namespace, Reconciler, Reconciliation,
//!     RemoteCollections,
//! };
//!
//! let a = CollectionInfo::new(CollectionId::new(Namespace::Stickers, 1), 11, 100);
//! let b = CollectionInfo::new(CollectionId::new(Namespace::Stickers, 2), 22, 200);
//! let c = CollectionInfo::new(CollectionId::new(Namespace::Stickers, 3), 33, 300);
//!
//! // Enqueued with [A]; user installed B since; server meanwhile has [A, C].
//! let reconciler = Reconciler::new(Namespace::Stickers);
//! let result = reconciler
//!     .plan(&[a.id], &[a.clone(), b.clone()], RemoteCollections::Fresh(vec![a.clone(), c.clone()]))
//!     .unwrap();
//!
//! let Reconciliation::Apply(plan) = result else { unreachable!() };
//! let order: Vec<_> = plan.resulting_infos.iter().map(|info| info.id).collect();
//! assert_eq!(order, vec![c.id, a.id, b.id]);
//! assert_eq!(plan.install_remote, vec![b]);
//! ```

pub mod collection;
pub mod error;
pub mod operation;
pub mod reconcile;

// Re-export main types at crate root
pub use collection::{
    collection_order, combined_hash, CollectionId, CollectionInfo, CollectionItem, ItemIndex,
    Namespace,
};
pub use error::Error;
pub use operation::{LogPayload, MergedLogEntry, OperationTag, OwnerKey, PendingOperation};
pub use reconcile::{
    FetchedItems, MergePath, MergeSummary, Reconciler, Reconciliation, RemoteCollections,
    RemoteOutcome, SyncPlan, WriteSet,
};
