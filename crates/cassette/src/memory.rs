//! MemoryStore: content held as whole byte buffers in a shared keyed map.
//!
//! This is the keyed-map realization of [`ContentStore`]: raw payloads and
//! their encoded variants live in a `DashMap` keyed by hash instead of on a
//! filesystem. Payloads are buffered in memory, so it suits caches, tests,
//! and content small enough to hold whole.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tracing::{debug, info, trace};

use crate::config::CassetteConfig;
use crate::encoding::{encode_to_vec, ContentEncoding, EncodingRegistry};
use crate::error::{Result, StoreError};
use crate::hash::Hash;
use crate::listener::{ListenerRegistry, StoreListener};
use crate::store::{resolve_encodings, ContentReader, ContentStore, HashIter, StoreId};

type Payload = Arc<[u8]>;

#[derive(Debug, Clone)]
struct Entry {
    raw: Payload,
    encoded: HashMap<String, Payload>,
}

impl Entry {
    fn payload(&self, encoding: Option<&str>) -> Option<&Payload> {
        match encoding {
            Some(name) => self.encoded.get(name),
            None => Some(&self.raw),
        }
    }

    /// Encode whatever of `encodings` this entry doesn't have yet. Nothing
    /// is added unless every encoding succeeds.
    fn fill_encodings(&mut self, encodings: &[Arc<dyn ContentEncoding>]) -> Result<()> {
        let mut added = Vec::new();
        for encoding in encodings {
            if self.encoded.contains_key(encoding.name()) {
                continue;
            }
            let bytes = encode_to_vec(encoding.as_ref(), &self.raw)
                .map_err(|e| StoreError::io("failed to encode content", e))?;
            added.push((encoding.name().to_string(), Payload::from(bytes)));
        }
        self.encoded.extend(added);
        Ok(())
    }
}

/// In-memory content store.
#[derive(Debug)]
pub struct MemoryStore {
    id: StoreId,
    name: String,
    entries: DashMap<Hash, Entry>,
    encodings: EncodingRegistry,
    listeners: ListenerRegistry,
}

impl MemoryStore {
    /// Create an empty store identified by `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let store = Self {
            id: StoreId::new(),
            name: name.into(),
            entries: DashMap::new(),
            encodings: EncodingRegistry::default(),
            listeners: ListenerRegistry::new(),
        };
        info!("opened memory store {} ({})", store.name, store.id);
        store
    }

    /// Create from configuration; the cache name must be non-empty.
    pub fn from_config(config: &CassetteConfig) -> Result<Self> {
        if config.cache_name.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "cache name must not be empty".to_string(),
            ));
        }
        Ok(Self::new(config.cache_name.clone()))
    }

    /// Replace the set of encodings this store can materialize.
    pub fn with_encodings(mut self, encodings: EncodingRegistry) -> Self {
        self.encodings = encodings;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ContentStore for MemoryStore {
    fn id(&self) -> StoreId {
        self.id
    }

    fn encodings(&self) -> &EncodingRegistry {
        &self.encodings
    }

    fn write_encoded(&self, reader: &mut dyn Read, encodings: &[&str]) -> Result<Hash> {
        let requested = resolve_encodings(&self.encodings, encodings)?;

        let mut raw = Vec::new();
        reader
            .read_to_end(&mut raw)
            .map_err(|e| StoreError::io("failed to read source stream", e))?;
        let hash = Hash::compute(&raw);

        // The map guard must be gone before listeners run: they may read
        // this store.
        let created = match self.entries.entry(hash) {
            MapEntry::Occupied(mut occupied) => {
                occupied.get_mut().fill_encodings(&requested)?;
                false
            }
            MapEntry::Vacant(vacant) => {
                let mut entry = Entry {
                    raw: raw.into(),
                    encoded: HashMap::new(),
                };
                entry.fill_encodings(&requested)?;
                vacant.insert(entry);
                true
            }
        };

        if created {
            debug!("stored {} in {}", hash, self.name);
            self.listeners.notify_added(self, &hash);
        } else {
            trace!("{} already stored in {}", hash, self.name);
        }
        Ok(hash)
    }

    fn contains_encoded(&self, hash: &Hash, encoding: Option<&str>) -> bool {
        self.entries
            .get(hash)
            .is_some_and(|entry| entry.payload(encoding).is_some())
    }

    fn read_encoded(&self, hash: &Hash, encoding: Option<&str>) -> Result<Option<ContentReader>> {
        let payload = self
            .entries
            .get(hash)
            .and_then(|entry| entry.payload(encoding).cloned());
        Ok(payload.map(|bytes| Box::new(Cursor::new(bytes)) as ContentReader))
    }

    fn length_encoded(&self, hash: &Hash, encoding: Option<&str>) -> Result<Option<u64>> {
        Ok(self
            .entries
            .get(hash)
            .and_then(|entry| entry.payload(encoding).map(|bytes| bytes.len() as u64)))
    }

    fn hashes(&self) -> Result<HashIter<'_>> {
        let keys: Vec<Hash> = self.entries.iter().map(|entry| *entry.key()).collect();
        Ok(Box::new(keys.into_iter().map(Ok)))
    }

    fn delete(&self, hash: &Hash) -> Result<bool> {
        if self.entries.remove(hash).is_none() {
            return Ok(false);
        }
        debug!("deleted {} from {}", hash, self.name);
        self.listeners.notify_removed(self, hash);
        Ok(true)
    }

    fn subscribe(&self, listener: Arc<dyn StoreListener>) {
        self.listeners.subscribe(listener);
    }

    fn unsubscribe(&self, listener: &Arc<dyn StoreListener>) -> bool {
        self.listeners.unsubscribe(listener)
    }

    fn close(&self) -> Result<()> {
        self.entries.clear();
        self.listeners.clear();
        debug!("closed memory store {} ({})", self.name, self.id);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("cassette")
    }
}
