//! FileStore: filesystem-backed content addressable store.
//!
//! See [`crate::layout`] for the on-disk layout. Publishing is the only step
//! that makes content visible, and it is a single no-clobber rename from the
//! staging directory into the shard. Two writers racing on the same bytes
//! both compute the same hash; whichever rename lands first wins and the
//! other sees "already exists", which is not an error.
//!
//! Every encoder runs against the staged raw bytes before anything is
//! published. Artifacts are published first and raw content last, so once
//! raw content is visible no failure path ever removes it.
//!
//! No locks are taken around file I/O. Writes to different hashes are
//! fully independent.

use std::fs::{self, File, OpenOptions, ReadDir};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use crate::config::CassetteConfig;
use crate::encoding::{is_valid_encoding_name, ContentEncoding, EncodingRegistry};
use crate::error::{Result, StoreError};
use crate::hash::Hash;
use crate::layout::ShardLayout;
use crate::listener::{ListenerRegistry, StoreListener};
use crate::staging::{self, STAGING_DIR};
use crate::store::{resolve_encodings, ContentReader, ContentStore, HashIter, StoreId};

/// Filesystem-based content store.
#[derive(Debug)]
pub struct FileStore {
    id: StoreId,
    layout: ShardLayout,
    staging_dir: PathBuf,
    atomic_move: bool,
    encodings: EncodingRegistry,
    listeners: ListenerRegistry,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `config.root`.
    pub fn new(config: &CassetteConfig) -> Result<Self> {
        if config.root.as_os_str().is_empty() {
            return Err(StoreError::InvalidArgument(
                "store root path must not be empty".to_string(),
            ));
        }

        fs::create_dir_all(&config.root)
            .map_err(|e| StoreError::io("failed to create store root directory", e))?;

        let store = Self {
            id: StoreId::new(),
            layout: ShardLayout::new(&config.root),
            staging_dir: config.root.join(STAGING_DIR),
            atomic_move: config.atomic_move,
            encodings: EncodingRegistry::default(),
            listeners: ListenerRegistry::new(),
        };

        info!(
            "opened file store {} at {} (atomic_move={})",
            store.id,
            config.root.display(),
            store.atomic_move
        );
        Ok(store)
    }

    /// Open a store at a specific path with default settings.
    pub fn at_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(&CassetteConfig::with_root(path))
    }

    /// Replace the set of encodings this store can materialize.
    pub fn with_encodings(mut self, encodings: EncodingRegistry) -> Self {
        self.encodings = encodings;
        self
    }

    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Path for `hash`/`encoding`, or `None` if the encoding name could
    /// never have been stored.
    fn existing_path(&self, hash: &Hash, encoding: Option<&str>) -> Option<PathBuf> {
        match encoding {
            Some(name) if !is_valid_encoding_name(name) => None,
            _ => Some(self.layout.path_for(hash, encoding)),
        }
    }

    /// Move a staged file to `target`. Returns `true` if this call created
    /// `target`, `false` if it was already there (the staged file is then
    /// discarded).
    fn publish(&self, staged: NamedTempFile, target: &Path) -> Result<bool> {
        if target.exists() {
            return Ok(false);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::io("failed to create shard directory", e))?;
        }

        if !self.atomic_move {
            return copy_into_place(staged.path(), target);
        }

        match staged.persist_noclobber(target) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!("lost publish race for {}, keeping existing", target.display());
                Ok(false)
            }
            Err(e) if e.error.raw_os_error() == Some(libc::EXDEV) => {
                warn!(
                    "staging and store are on different filesystems, copying into {}",
                    target.display()
                );
                copy_into_place(e.file.path(), target)
            }
            Err(e) => Err(StoreError::io("failed to publish staged content", e.error)),
        }
    }

    /// Run the staged raw content through `encoding` into its own staging
    /// file. Nothing becomes visible here.
    fn encode_staged(
        &self,
        raw_path: &Path,
        encoding: &dyn ContentEncoding,
    ) -> Result<NamedTempFile> {
        let mut input =
            File::open(raw_path).map_err(|e| StoreError::io("failed to open staged content", e))?;
        let mut staged = staging::create(&self.staging_dir)?;
        {
            let mut encoder = encoding.encode(staged.as_file_mut());
            io::copy(&mut input, &mut encoder)
                .map_err(|e| StoreError::io("failed to encode content", e))?;
            encoder
                .finish()
                .map_err(|e| StoreError::io("failed to finish encoded content", e))?;
        }
        Ok(staged)
    }

    /// Remove artifacts this call published before its raw content could
    /// be. Never called once raw content is visible.
    fn roll_back(&self, published: &[PathBuf]) {
        for path in published.iter().rev() {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("failed to roll back {}: {}", path.display(), e);
                }
            }
        }
    }

    fn remove_artifacts(&self, hash: &Hash) -> Result<()> {
        let shard_dir = self.layout.shard_dir(hash);
        let hex = hash.to_hex();
        let (_, leaf) = ShardLayout::split(&hex);

        let entries = match fs::read_dir(&shard_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::io("failed to list shard directory", e)),
        };

        let mut failure = None;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("failed to list shard directory", e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !ShardLayout::is_artifact_of(leaf, name) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => trace!("removed artifact {}", name),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("failed to remove artifact {}: {}", name, e);
                    failure.get_or_insert(e);
                }
            }
        }
        match failure {
            Some(e) => Err(StoreError::io("failed to remove artifact", e)),
            None => Ok(()),
        }
    }
}

/// Non-atomic publish: copy into a freshly created target. `create_new`
/// still guarantees only one writer creates the file, but readers can see
/// it before the copy completes.
fn copy_into_place(source: &Path, target: &Path) -> Result<bool> {
    let mut out = match OpenOptions::new().write(true).create_new(true).open(target) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(StoreError::io("failed to create content file", e)),
    };

    let copied = File::open(source).and_then(|mut input| io::copy(&mut input, &mut out));
    if let Err(e) = copied {
        drop(out);
        let _ = fs::remove_file(target);
        return Err(StoreError::io("failed to copy staged content", e));
    }
    Ok(true)
}

impl ContentStore for FileStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn encodings(&self) -> &EncodingRegistry {
        &self.encodings
    }

    fn write_encoded(&self, reader: &mut dyn Read, encodings: &[&str]) -> Result<Hash> {
        let requested = resolve_encodings(&self.encodings, encodings)?;

        let staged = staging::stage(&self.staging_dir, reader)?;
        let hash = *staged.hash();
        let size = staged.size();

        let mut encoded = Vec::new();
        for encoding in &requested {
            let target = self.layout.artifact_path(&hash, encoding.name());
            if target.exists() {
                continue;
            }
            encoded.push((target, self.encode_staged(staged.path(), encoding.as_ref())?));
        }

        let mut published = Vec::new();
        for (target, file) in encoded {
            match self.publish(file, &target) {
                Ok(true) => {
                    debug!("materialized {}", target.display());
                    published.push(target);
                }
                Ok(false) => {}
                Err(e) => {
                    self.roll_back(&published);
                    return Err(e);
                }
            }
        }

        let content_path = self.layout.content_path(&hash);
        let created = match self.publish(staged.into_file(), &content_path) {
            Ok(created) => created,
            Err(e) => {
                self.roll_back(&published);
                return Err(e);
            }
        };
        if created {
            debug!("stored {} ({} bytes)", hash, size);
            self.listeners.notify_added(self, &hash);
        } else {
            trace!("{} already stored", hash);
        }

        Ok(hash)
    }

    fn contains_encoded(&self, hash: &Hash, encoding: Option<&str>) -> bool {
        self.existing_path(hash, encoding)
            .is_some_and(|path| path.is_file())
    }

    fn read_encoded(&self, hash: &Hash, encoding: Option<&str>) -> Result<Option<ContentReader>> {
        let Some(path) = self.existing_path(hash, encoding) else {
            return Ok(None);
        };
        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io("failed to open stored content", e)),
        }
    }

    fn length_encoded(&self, hash: &Hash, encoding: Option<&str>) -> Result<Option<u64>> {
        let Some(path) = self.existing_path(hash, encoding) else {
            return Ok(None);
        };
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io("failed to stat stored content", e)),
        }
    }

    fn hashes(&self) -> Result<HashIter<'_>> {
        let shards = fs::read_dir(self.layout.root())
            .map_err(|e| StoreError::io("failed to list store root", e))?;
        Ok(Box::new(FileHashes {
            shards,
            current: None,
        }))
    }

    fn delete(&self, hash: &Hash) -> Result<bool> {
        let content_path = self.layout.content_path(hash);

        // Removing the raw file is also the existence check, so concurrent
        // deletes agree on exactly one winner.
        match fs::remove_file(&content_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(StoreError::io("failed to remove content", e)),
        }

        // The content is gone from here on, so listeners hear about it even
        // if an artifact refuses to go.
        let artifacts = self.remove_artifacts(hash);

        // Only succeeds if nothing else lives in the shard.
        let shard_dir = self.layout.shard_dir(hash);
        if fs::remove_dir(&shard_dir).is_ok() {
            trace!("removed empty shard {}", shard_dir.display());
        }

        debug!("deleted {}", hash);
        self.listeners.notify_removed(self, hash);
        artifacts.map(|()| true)
    }

    fn subscribe(&self, listener: Arc<dyn StoreListener>) {
        self.listeners.subscribe(listener);
    }

    fn unsubscribe(&self, listener: &Arc<dyn StoreListener>) -> bool {
        self.listeners.unsubscribe(listener)
    }

    fn close(&self) -> Result<()> {
        self.listeners.clear();
        debug!("closed file store {}", self.id);
        Ok(())
    }
}

/// Lazy walk of `{root}/{shard}/{leaf}` producing raw-entry hashes.
struct FileHashes {
    shards: ReadDir,
    current: Option<(String, ReadDir)>,
}

impl Iterator for FileHashes {
    type Item = Result<Hash>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((shard, leaves)) = self.current.as_mut() {
                match leaves.next() {
                    Some(Ok(entry)) => {
                        let name = entry.file_name();
                        if let Some(hash) = name
                            .to_str()
                            .and_then(|leaf| ShardLayout::hash_from_parts(shard.as_str(), leaf))
                        {
                            return Some(Ok(hash));
                        }
                        continue;
                    }
                    Some(Err(e)) => {
                        return Some(Err(StoreError::io("failed to list shard directory", e)))
                    }
                    None => {}
                }
            }
            self.current = None;

            let entry = match self.shards.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(StoreError::io("failed to list store root", e))),
            };
            let Ok(shard) = entry.file_name().into_string() else {
                continue;
            };
            if !ShardLayout::is_shard_name(&shard) {
                continue;
            }
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            match fs::read_dir(entry.path()) {
                Ok(leaves) => self.current = Some((shard, leaves)),
                // Shard emptied and removed by a concurrent delete.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Some(Err(StoreError::io("failed to list shard directory", e))),
            }
        }
    }
}
