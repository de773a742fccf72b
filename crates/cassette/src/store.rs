//! The store contract shared by every backing realization.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use uuid::Uuid;

use crate::encoding::{BoxedReader, ContentEncoding, EncodingRegistry};
use crate::error::{Result, StoreError};
use crate::hash::Hash;
use crate::listener::StoreListener;

/// Stream over stored (possibly encoded) content.
pub type ContentReader = BoxedReader<'static>;

/// Lazy sequence of stored hashes. Errors hit while enumerating are yielded
/// in place rather than ending the iteration silently.
pub type HashIter<'a> = Box<dyn Iterator<Item = Result<Hash>> + 'a>;

/// Identity of a store instance, carried by every [`StoreEvent`](crate::StoreEvent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(Uuid);

impl StoreId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A content addressable store.
///
/// Content is keyed by the SHA-1 of its bytes. Writing the same bytes twice
/// stores them once and returns the same hash. Absent content is reported
/// with `None`/`false`, never as an error.
///
/// Operations that take an `Option<&str>` encoding treat `None` as the raw,
/// untransformed content.
pub trait ContentStore: Send + Sync {
    /// Identity of this instance.
    fn id(&self) -> StoreId;

    /// Transforms this store can materialize on write.
    fn encodings(&self) -> &EncodingRegistry;

    /// Store everything `reader` yields, returning its hash.
    fn write(&self, reader: &mut dyn Read) -> Result<Hash> {
        self.write_encoded(reader, &[])
    }

    /// Store content and make sure an artifact exists for each named
    /// encoding. Unknown encoding names fail before anything is read.
    ///
    /// Listeners hear "added" only if this call created the raw entry. A
    /// failed call leaves the store as it found it.
    ///
    /// On the file store, a concurrent `delete` that empties a shard
    /// directory can make a write into the same shard fail with an I/O
    /// error. Such a write published nothing and is safe to retry.
    fn write_encoded(&self, reader: &mut dyn Read, encodings: &[&str]) -> Result<Hash>;

    fn contains(&self, hash: &Hash) -> bool {
        self.contains_encoded(hash, None)
    }

    fn contains_encoded(&self, hash: &Hash, encoding: Option<&str>) -> bool;

    /// Open the raw content, or `None` if it isn't stored.
    fn read(&self, hash: &Hash) -> Result<Option<ContentReader>> {
        self.read_encoded(hash, None)
    }

    /// Open the stored bytes for `encoding` as-is (still encoded).
    fn read_encoded(&self, hash: &Hash, encoding: Option<&str>) -> Result<Option<ContentReader>>;

    /// Open the `encoding` artifact and decode it back to raw bytes.
    fn read_decoded(&self, hash: &Hash, encoding: &str) -> Result<Option<ContentReader>> {
        let transform = self
            .encodings()
            .get(encoding)
            .ok_or_else(|| StoreError::UnknownEncoding(encoding.to_string()))?;
        Ok(self
            .read_encoded(hash, Some(encoding))?
            .map(|reader| transform.decode(reader)))
    }

    /// Size in bytes of the raw content, or `None` if it isn't stored.
    fn length(&self, hash: &Hash) -> Result<Option<u64>> {
        self.length_encoded(hash, None)
    }

    fn length_encoded(&self, hash: &Hash, encoding: Option<&str>) -> Result<Option<u64>>;

    /// Every hash with raw content currently stored.
    ///
    /// Generated lazily: content written or deleted while the iterator is
    /// being consumed may or may not show up.
    fn hashes(&self) -> Result<HashIter<'_>>;

    /// Remove raw content and all its artifacts. Returns `false` if nothing
    /// was stored under `hash`.
    fn delete(&self, hash: &Hash) -> Result<bool>;

    fn subscribe(&self, listener: Arc<dyn StoreListener>);

    /// Returns whether `listener` was subscribed.
    fn unsubscribe(&self, listener: &Arc<dyn StoreListener>) -> bool;

    /// Release backing resources. Safe to call more than once.
    fn close(&self) -> Result<()>;
}

/// Resolve requested encoding names against a registry, failing on the
/// first unknown one. Duplicates are collapsed.
pub(crate) fn resolve_encodings(
    registry: &EncodingRegistry,
    names: &[&str],
) -> Result<Vec<Arc<dyn ContentEncoding>>> {
    let mut resolved: Vec<Arc<dyn ContentEncoding>> = Vec::new();
    for name in names {
        let encoding = registry
            .get(name)
            .ok_or_else(|| StoreError::UnknownEncoding(name.to_string()))?;
        if !resolved.iter().any(|e| e.name() == encoding.name()) {
            resolved.push(encoding);
        }
    }
    Ok(resolved)
}
