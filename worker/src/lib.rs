//! # Packsync Worker
//!
//! Background runtime that drains the operation log and keeps the local list
//! of installed collections in sync with the server.
//!
//! ## Components
//!
//! - [`Dispatcher`] observes the merged operation log of one namespace and
//!   runs at most one sync loop per owner.
//! - [`SyncTask`] is that loop: claim an entry, run attempts until one
//!   commits, then remove the entry after a short delay.
//! - [`RemoteAdapter`] issues the server calls of a [`packsync_engine::SyncPlan`]
//!   and degrades their failures to neutral results.
//! - [`LocalStore`] and [`OperationLog`] are the storage contracts;
//!   [`memory`] has in-memory implementations.
//!
//! [`SyncService`] wires one dispatcher per namespace.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use packsync_engine::{CollectionId, CollectionInfo, Namespace, OwnerKey};
//! use packsync_worker::memory::{MemoryLocalStore, MemoryOperationLog, MemoryRemote};
//! use packsync_worker::{apply_local_change, SyncConfig, SyncService};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = MemoryLocalStore::new_shared();
//! let log = MemoryOperationLog::new();
//! let remote = MemoryRemote::new();
//!
//! let pack = CollectionInfo::new(CollectionId::new(Namespace::Stickers, 1), 7, 42);
//! remote.publish(pack.clone(), Vec::new());
//!
//! let service = SyncService::start(
//!     SyncConfig::default(),
//!     Arc::new(log.clone()),
//!     store.clone(),
//!     Arc::new(remote.clone()),
//! );
//!
//! // Install locally; the worker pushes it to the server in the background.
//! apply_local_change(store.as_ref(), &log, OwnerKey(1), Namespace::Stickers, move |tx| {
//!     tx.replace_collection_infos(Namespace::Stickers, vec![pack]);
//! })
//! .await
//! .unwrap();
//!
//! service.shutdown().await;
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod remote;
pub mod service;
pub mod store;
pub mod sync;

pub use config::{ConfigError, SyncConfig};
pub use dispatcher::{Dispatcher, DispatcherHandle, OperationTracker};
pub use error::{RemoteError, RemoteResult, StoreError, StoreResult};
pub use remote::{CollectionRemote, InstallResult, RemoteAdapter};
pub use service::SyncService;
pub use store::{apply_local_change, LocalStore, LocalTransaction, LogSubscription, OperationLog};
pub use sync::{PassOutcome, SyncTask};
