//! Staging: private temp files that content passes through before it is
//! published under its hash.
//!
//! A write never touches the final path directly. The source stream is
//! copied into a temp file under `{root}/staging/` and digested on the way
//! through. The staged file is removed automatically if it is dropped
//! without being published, so every early return or error cleans up after
//! itself.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, StoreError};
use crate::hash::{Digester, Hash, BUFFER_SIZE};

/// Name of the staging directory inside a store root. Never matches the
/// shard naming pattern, so enumeration skips it.
pub const STAGING_DIR: &str = "staging";

const STAGING_PREFIX: &str = ".cassette-";

/// Content copied into a staging file, with its digest.
#[derive(Debug)]
pub struct StagedContent {
    file: NamedTempFile,
    hash: Hash,
    size: u64,
}

impl StagedContent {
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Hand over the temp file for publishing.
    pub fn into_file(self) -> NamedTempFile {
        self.file
    }
}

/// Create an empty staging file in `staging_dir`.
pub fn create(staging_dir: &Path) -> Result<NamedTempFile> {
    fs::create_dir_all(staging_dir)
        .map_err(|e| StoreError::io("failed to create staging directory", e))?;
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(".tmp")
        .tempfile_in(staging_dir)
        .map_err(|e| StoreError::io("failed to create staging file", e))
}

/// Copy `reader` to completion into a new staging file, hashing each chunk
/// as it is written.
pub fn stage(staging_dir: &Path, reader: &mut dyn Read) -> Result<StagedContent> {
    let mut file = create(staging_dir)?;
    let mut digest = Digester::new();
    let mut buf = [0u8; BUFFER_SIZE];
    let mut size = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::io("failed to read source stream", e)),
        };
        file.write_all(&buf[..n])
            .map_err(|e| StoreError::io("failed to write staging file", e))?;
        digest.update(&buf[..n]);
        size += n as u64;
    }

    file.flush()
        .map_err(|e| StoreError::io("failed to flush staging file", e))?;

    Ok(StagedContent {
        file,
        hash: digest.finish(),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FailingReader {
        remaining: usize,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "source went away"));
            }
            let n = buf.len().min(self.remaining);
            buf[..n].fill(b'x');
            self.remaining -= n;
            Ok(n)
        }
    }

    fn staging_entries(dir: &Path) -> usize {
        fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_stage_hashes_and_sizes() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let staging_dir = temp_dir.path().join(STAGING_DIR);

        let staged = stage(&staging_dir, &mut &b"Hello World"[..])?;
        assert_eq!(staged.hash(), &Hash::compute(b"Hello World"));
        assert_eq!(staged.size(), 11);
        assert_eq!(fs::read(staged.path())?, b"Hello World");
        assert!(staged.path().starts_with(&staging_dir));

        Ok(())
    }

    #[test]
    fn test_stage_multi_chunk_stream() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let data: Vec<u8> = (0..BUFFER_SIZE * 5 + 3).map(|i| (i % 256) as u8).collect();

        let staged = stage(temp_dir.path(), &mut io::Cursor::new(data.clone()))?;
        assert_eq!(staged.hash(), &Hash::compute(&data));
        assert_eq!(staged.size(), data.len() as u64);

        Ok(())
    }

    #[test]
    fn test_dropped_staging_file_is_removed() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let staged = stage(temp_dir.path(), &mut &b"transient"[..])?;
        let path = staged.path().to_path_buf();
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());

        Ok(())
    }

    #[test]
    fn test_source_failure_cleans_up() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut reader = FailingReader {
            remaining: BUFFER_SIZE * 2,
        };

        let err = stage(temp_dir.path(), &mut reader).unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("source went away"));
        assert_eq!(staging_entries(temp_dir.path()), 0);

        Ok(())
    }
}
