//! Two-level sharded layout for the file-backed store.
//!
//! ```text
//! {root}/
//! ├── 0A4D/
//! │   ├── 55A8D778E5022FAB701977C5D840BBC486D0        # raw content
//! │   └── 55A8D778E5022FAB701977C5D840BBC486D0.gzip   # encoded artifact
//! └── staging/                                        # in-progress writes
//! ```
//!
//! Shard names are the first four hex characters of the hash; leaves are the
//! remaining 36. Artifacts are the leaf name plus `.` plus the encoding name.

use std::path::{Path, PathBuf};

use crate::hash::{Hash, HEX_LEN};

/// Number of hex characters used for the shard directory name.
pub const PREFIX_LEN: usize = 4;

/// Separator between a leaf name and an encoding name.
pub const ARTIFACT_SEPARATOR: char = '.';

const LEAF_LEN: usize = HEX_LEN - PREFIX_LEN;

/// Maps hashes to paths under a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardLayout {
    root: PathBuf,
}

impl ShardLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Split a hex hash into its shard prefix and leaf name.
    pub fn split(hex: &str) -> (&str, &str) {
        hex.split_at(PREFIX_LEN)
    }

    /// Directory holding every entry whose hash shares this prefix.
    pub fn shard_dir(&self, hash: &Hash) -> PathBuf {
        let hex = hash.to_hex();
        self.root.join(Self::split(&hex).0)
    }

    /// Path of the raw content for `hash`.
    pub fn content_path(&self, hash: &Hash) -> PathBuf {
        let hex = hash.to_hex();
        let (shard, leaf) = Self::split(&hex);
        self.root.join(shard).join(leaf)
    }

    /// Path of the `encoding` artifact for `hash`.
    pub fn artifact_path(&self, hash: &Hash, encoding: &str) -> PathBuf {
        let hex = hash.to_hex();
        let (shard, leaf) = Self::split(&hex);
        self.root
            .join(shard)
            .join(format!("{}{}{}", leaf, ARTIFACT_SEPARATOR, encoding))
    }

    /// Raw path when `encoding` is `None`, artifact path otherwise.
    pub fn path_for(&self, hash: &Hash, encoding: Option<&str>) -> PathBuf {
        match encoding {
            Some(name) => self.artifact_path(hash, name),
            None => self.content_path(hash),
        }
    }

    /// Whether a first-level directory name looks like a shard.
    pub fn is_shard_name(name: &str) -> bool {
        name.len() == PREFIX_LEN && is_upper_hex(name)
    }

    /// Whether a second-level file name is a raw entry (not an artifact).
    pub fn is_leaf_name(name: &str) -> bool {
        name.len() == LEAF_LEN && is_upper_hex(name)
    }

    /// Rebuild a hash from a shard name and a leaf name. Returns `None` for
    /// anything that isn't a raw entry, including artifacts.
    pub fn hash_from_parts(shard: &str, leaf: &str) -> Option<Hash> {
        if !Self::is_shard_name(shard) || !Self::is_leaf_name(leaf) {
            return None;
        }
        Hash::from_hex(&format!("{}{}", shard, leaf)).ok()
    }

    /// Whether `name` is an artifact file belonging to `leaf`.
    pub fn is_artifact_of(leaf: &str, name: &str) -> bool {
        name.strip_prefix(leaf)
            .and_then(|rest| rest.strip_prefix(ARTIFACT_SEPARATOR))
            .is_some_and(|encoding| !encoding.is_empty())
    }
}

fn is_upper_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'A'..=b'F'))
}
