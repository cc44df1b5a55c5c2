//! Error types for the packsync engine.

use crate::{CollectionId, Namespace};
use thiserror::Error;

/// All possible errors from the merge planner.
///
/// Planning itself cannot fail; these only reject input lists that break the
/// model's invariants (ids unique within a list, one namespace per list).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("duplicate collection {id} in {list} list")]
    DuplicateCollection { list: &'static str, id: CollectionId },

    #[error("collection {id} does not belong to namespace {expected}")]
    NamespaceMismatch {
        expected: Namespace,
        id: CollectionId,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
