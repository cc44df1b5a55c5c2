//! Collection types: installed packs, their items and the ordering hash.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two families of installable collections.
///
/// Both share identical sync semantics; they only select different
/// remote endpoints and operation log tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Namespace {
    Stickers,
    Masks,
}

impl Namespace {
    /// All namespaces, in a stable order.
    pub const ALL: [Namespace; 2] = [Namespace::Stickers, Namespace::Masks];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Stickers => "stickers",
            Namespace::Masks => "masks",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a collection: namespace plus the server-assigned numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionId {
    pub namespace: Namespace,
    pub id: i64,
}

impl CollectionId {
    pub fn new(namespace: Namespace, id: i64) -> Self {
        Self { namespace, id }
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

/// Descriptive info about one installed collection.
///
/// `hash` is assigned by the server and changes whenever the item contents
/// change, so comparing hashes is enough to decide whether items must be
/// refetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub id: CollectionId,
    /// Credential required by the server to address this collection
    pub access_hash: i64,
    pub title: String,
    pub short_name: String,
    /// Content version hash
    pub hash: i32,
    /// Number of items, as reported by the server
    pub count: i32,
}

impl CollectionInfo {
    /// Create an info with the given content hash and no descriptive data.
    pub fn new(id: CollectionId, access_hash: i64, hash: i32) -> Self {
        Self {
            id,
            access_hash,
            title: String::new(),
            short_name: String::new(),
            hash,
            count: 0,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the short name used in share links.
    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    /// Set the reported item count.
    pub fn with_count(mut self, count: i32) -> Self {
        self.count = count;
        self
    }

    /// Same info with a different content hash.
    pub fn with_hash(mut self, hash: i32) -> Self {
        self.hash = hash;
        self
    }
}

/// Position of an item within its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemIndex {
    pub index: i32,
    pub id: i64,
}

/// One item of a collection.
///
/// Item lists are only ever replaced wholesale per collection, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionItem {
    pub index: ItemIndex,
    /// Content descriptor (file reference, dimensions, ...)
    pub payload: serde_json::Value,
    /// Inverted-search keys this item is found under
    #[serde(default)]
    pub index_keys: Vec<String>,
}

impl CollectionItem {
    pub fn new(index: i32, id: i64, payload: serde_json::Value) -> Self {
        Self {
            index: ItemIndex { index, id },
            payload,
            index_keys: Vec::new(),
        }
    }

    /// Attach search keys.
    pub fn with_index_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.index_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Fold the per-collection hashes of an ordered info list into one value.
///
/// This is the hash the server compares against to answer "not modified",
/// so it has to match the server's arithmetic exactly: 32-bit wrapping
/// `acc * 20261 + hash`, with the sign bit cleared at the end.
pub fn combined_hash(infos: &[CollectionInfo]) -> i32 {
    let mut acc: u32 = 0;
    for info in infos {
        acc = acc.wrapping_mul(20261).wrapping_add(info.hash as u32);
    }
    (acc & 0x7FFF_FFFF) as i32
}

/// Extract the id order of an info list.
pub fn collection_order(infos: &[CollectionInfo]) -> Vec<CollectionId> {
    infos.iter().map(|info| info.id).collect()
}
