//! Hash: the SHA-1 digest of a piece of content (20 bytes, 40 hex chars).
//!
//! The canonical textual form is uppercase hex. Parsing accepts either case
//! but always renders back to uppercase, so the text form is one-to-one
//! with the bytes.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use thiserror::Error;

/// Number of raw bytes in a digest.
pub const HASH_LEN: usize = 20;

/// Number of hex characters in the textual form.
pub const HEX_LEN: usize = HASH_LEN * 2;

/// Chunk size used when digesting streams.
pub(crate) const BUFFER_SIZE: usize = 4096;

/// A content hash - the 160-bit SHA-1 digest of the content it identifies.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Hash([u8; HASH_LEN]);

/// Errors that can occur when parsing a hash.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("invalid hash length: expected 40 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in hash")]
    InvalidHex,
}

impl Hash {
    /// Wrap raw digest bytes.
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash an in-memory buffer.
    pub fn compute(data: &[u8]) -> Self {
        let mut digest = Digester::new();
        digest.update(data);
        digest.finish()
    }

    /// Hash everything a reader yields, in fixed-size chunks.
    pub fn from_reader<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut digest = Digester::new();
        let mut buf = [0u8; BUFFER_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => digest.update(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(digest.finish())
    }

    /// Parse the 40-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        if s.len() != HEX_LEN {
            return Err(HashError::InvalidLength(s.len()));
        }
        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| HashError::InvalidHex)?;
        Ok(Self(bytes))
    }

    /// Canonical uppercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

/// Incremental digest used while staging a write. Not exposed: a hash is
/// only ever produced for a complete payload.
pub(crate) struct Digester(Sha1);

impl Digester {
    pub(crate) fn new() -> Self {
        Self(Sha1::new())
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub(crate) fn finish(self) -> Hash {
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&self.0.finalize());
        Hash(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Hash {
    type Error = HashError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Hash> for String {
    fn from(hash: Hash) -> Self {
        hash.to_hex()
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_WORLD: &str = "0A4D55A8D778E5022FAB701977C5D840BBC486D0";

    #[test]
    fn test_compute_known_digest() {
        assert_eq!(Hash::compute(b"Hello World").to_hex(), HELLO_WORLD);
        assert_eq!(
            Hash::compute(b"").to_hex(),
            "DA39A3EE5E6B4B0D3255BFEF95601890AFD80709"
        );
    }

    #[test]
    fn test_to_hex_is_40_uppercase_chars() {
        let hex = Hash::compute(b"abc").to_hex();
        assert_eq!(hex, "A9993E364706816ABA3E25717850C26C9CD0D89D");
        assert_eq!(hex.len(), HEX_LEN);
        assert!(!hex.chars().any(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn test_from_reader_matches_compute_across_chunks() {
        // Larger than one buffer so the chunk boundary is exercised.
        let data: Vec<u8> = (0..BUFFER_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let streamed = Hash::from_reader(&mut &data[..]).unwrap();
        assert_eq!(streamed, Hash::compute(&data));
    }

    #[test]
    fn test_from_hex_accepts_lowercase_renders_uppercase() {
        let hash = Hash::from_hex(&HELLO_WORLD.to_lowercase()).unwrap();
        assert_eq!(hash.to_hex(), HELLO_WORLD);
        assert_eq!(hash, Hash::compute(b"Hello World"));
    }

    #[test]
    fn test_from_hex_invalid_length() {
        assert_eq!(Hash::from_hex("ABCD"), Err(HashError::InvalidLength(4)));
        let too_long = format!("{}00", HELLO_WORLD);
        assert_eq!(Hash::from_hex(&too_long), Err(HashError::InvalidLength(42)));
    }

    #[test]
    fn test_from_hex_invalid_character() {
        let bad = "ZZ4D55A8D778E5022FAB701977C5D840BBC486D0";
        assert_eq!(bad.parse::<Hash>(), Err(HashError::InvalidHex));
    }

    #[test]
    fn test_equality_and_ordering_by_bytes() {
        let low = Hash::from_bytes([0u8; HASH_LEN]);
        let mut high_bytes = [0u8; HASH_LEN];
        high_bytes[0] = 1;
        let high = Hash::from_bytes(high_bytes);
        assert!(low < high);
        assert_eq!(low, Hash::from_hex(&"0".repeat(HEX_LEN)).unwrap());
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let hash = Hash::compute(b"Hello World");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", HELLO_WORLD));
        let restored: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, restored);
        assert!(serde_json::from_str::<Hash>("\"nope\"").is_err());
    }
}
