//! Content addressable storage keyed by SHA-1.
//!
//! Content goes in as a byte stream and comes back out by its hash. The
//! same bytes always land under the same hash and are stored once. Each
//! stored item may also carry encoded variants (gzip ships by default),
//! materialized at write time and read back either as-is or decoded.
//!
//! Two realizations share the [`ContentStore`] contract:
//! - [`FileStore`]: sharded directories on a local filesystem
//! - [`MemoryStore`]: an in-process keyed map
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cassette::{CassetteConfig, ContentStore, FileStore};
//! use std::io::Read;
//!
//! // Create from environment (reads CASSETTE_ROOT and friends)
//! let config = CassetteConfig::from_env().unwrap();
//! let store = cassette::open(&config).unwrap();
//!
//! // Or at a specific path
//! let store = FileStore::at_path("/tank/cassette").unwrap();
//!
//! // Store content, with a gzip variant alongside
//! let hash = store
//!     .write_encoded(&mut &b"Hello World"[..], &["gzip"])
//!     .unwrap();
//! println!("Stored as: {}", hash);
//!
//! // Read it back
//! if let Some(mut reader) = store.read(&hash).unwrap() {
//!     let mut data = Vec::new();
//!     reader.read_to_end(&mut data).unwrap();
//!     println!("Got {} bytes", data.len());
//! }
//! ```
//!
//! # Configuration
//!
//! See [`config`] for the environment variables and TOML section.
//!
//! # Shared storage
//!
//! Content is write-once, so many processes may share one file store root
//! without coordination. A write is visible only after its no-clobber
//! publish, and racing writers of the same bytes converge on one copy.

use std::sync::Arc;

use tracing::debug;

pub mod config;
pub mod encoding;
pub mod error;
pub mod file;
pub mod hash;
pub mod layout;
pub mod listener;
pub mod memory;
pub mod staging;
pub mod store;

// Re-exports for convenience
pub use config::{Backend, CassetteConfig};
pub use encoding::{ContentEncoding, EncodingRegistry, GzipEncoding};
pub use error::{Result, StoreError};
pub use file::FileStore;
pub use hash::{Hash, HashError};
pub use listener::{StoreEvent, StoreListener};
pub use memory::MemoryStore;
pub use store::{ContentReader, ContentStore, HashIter, StoreId};

/// Open the store `config` selects.
pub fn open(config: &CassetteConfig) -> Result<Arc<dyn ContentStore>> {
    config.validate()?;
    debug!("opening {} store", config.backend);

    let store: Arc<dyn ContentStore> = match config.backend {
        Backend::File => Arc::new(FileStore::new(config)?),
        Backend::Memory => Arc::new(MemoryStore::from_config(config)?),
    };
    Ok(store)
}
