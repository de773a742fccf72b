//! Shared fixtures for exercising both store realizations through the same
//! contract.

#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};

use cassette::{CassetteConfig, ContentReader, ContentStore, Hash, StoreEvent, StoreId, StoreListener};
use tempfile::TempDir;

/// A store opened through `cassette::open`, plus whatever keeps it alive.
pub struct TestFixture {
    pub store: Arc<dyn ContentStore>,
    pub label: &'static str,
    _dir: Option<TempDir>,
}

impl TestFixture {
    pub fn file() -> Self {
        let dir = TempDir::new().unwrap();
        let store = cassette::open(&CassetteConfig::with_root(dir.path().join("store"))).unwrap();
        Self {
            store,
            label: "file",
            _dir: Some(dir),
        }
    }

    pub fn memory() -> Self {
        let store = cassette::open(&CassetteConfig::memory("fixture")).unwrap();
        Self {
            store,
            label: "memory",
            _dir: None,
        }
    }

    /// One fixture per realization.
    pub fn all() -> Vec<Self> {
        vec![Self::file(), Self::memory()]
    }

    pub fn write_str(&self, content: &str) -> Hash {
        self.store.write(&mut content.as_bytes()).unwrap()
    }

    pub fn hash_set(&self) -> Vec<Hash> {
        let mut hashes: Vec<Hash> = self
            .store
            .hashes()
            .unwrap()
            .collect::<cassette::Result<_>>()
            .unwrap();
        hashes.sort();
        hashes
    }
}

pub fn read_all(reader: Option<ContentReader>) -> Vec<u8> {
    let mut out = Vec::new();
    reader
        .expect("content should exist")
        .read_to_end(&mut out)
        .unwrap();
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Added(StoreId, Hash),
    Removed(StoreId, Hash),
}

/// Listener that keeps every event it hears.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Recorded>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn added(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Recorded::Added(..)))
            .count()
    }

    pub fn removed(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Recorded::Removed(..)))
            .count()
    }
}

impl StoreListener for Recorder {
    fn content_added(&self, event: &StoreEvent<'_>) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Added(event.source().id(), *event.hash()));
    }

    fn content_removed(&self, event: &StoreEvent<'_>) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Removed(event.source().id(), *event.hash()));
    }
}
