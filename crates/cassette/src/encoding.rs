//! Content encodings: named stream transforms used to keep derived
//! representations (e.g. gzip) next to the raw content.
//!
//! An encoding is identified by its name alone. The registry maps names to
//! transforms; asking for a name it doesn't know yields `None`, and the
//! caller decides whether that is fatal.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Readable stream handed out by encodings and stores.
pub type BoxedReader<'a> = Box<dyn Read + Send + 'a>;

/// Writer returned by [`ContentEncoding::encode`].
///
/// `finish` must be called before the encoded output is complete; dropping
/// the writer without finishing may leave a truncated stream.
pub trait EncodedWriter: Write {
    fn finish(self: Box<Self>) -> io::Result<()>;
}

impl<W: Write> EncodedWriter for GzEncoder<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        GzEncoder::finish(*self).map(drop)
    }
}

/// A named pair of encode/decode transforms.
pub trait ContentEncoding: Send + Sync {
    /// Name used on disk and in requests, e.g. `"gzip"`.
    fn name(&self) -> &str;

    /// Wrap a sink of encoded bytes in a writer that accepts raw bytes.
    fn encode<'a>(&self, sink: &'a mut dyn Write) -> Box<dyn EncodedWriter + 'a>;

    /// Wrap a source of encoded bytes in a reader that yields raw bytes.
    fn decode<'a>(&self, source: BoxedReader<'a>) -> BoxedReader<'a>;
}

/// gzip via flate2.
#[derive(Debug, Clone, Copy)]
pub struct GzipEncoding {
    level: Compression,
}

impl GzipEncoding {
    pub const NAME: &'static str = "gzip";

    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level),
        }
    }
}

impl Default for GzipEncoding {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentEncoding for GzipEncoding {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn encode<'a>(&self, sink: &'a mut dyn Write) -> Box<dyn EncodedWriter + 'a> {
        Box::new(GzEncoder::new(sink, self.level))
    }

    fn decode<'a>(&self, source: BoxedReader<'a>) -> BoxedReader<'a> {
        Box::new(GzDecoder::new(source))
    }
}

/// Encoding names end up in file names, so they are restricted to a safe
/// alphabet with no path separators or dots.
pub fn is_valid_encoding_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Name-keyed set of available encodings. The default registry knows gzip.
#[derive(Clone)]
pub struct EncodingRegistry {
    encodings: BTreeMap<String, Arc<dyn ContentEncoding>>,
}

impl EncodingRegistry {
    /// A registry with no encodings at all.
    pub fn empty() -> Self {
        Self {
            encodings: BTreeMap::new(),
        }
    }

    /// Add or replace an encoding. Returns `false` (and registers nothing)
    /// if the name is not usable as a file suffix.
    pub fn register(&mut self, encoding: Arc<dyn ContentEncoding>) -> bool {
        let name = encoding.name().to_string();
        if !is_valid_encoding_name(&name) {
            return false;
        }
        self.encodings.insert(name, encoding);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ContentEncoding>> {
        self.encodings.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.encodings.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.encodings.keys().map(String::as_str)
    }

    /// Encode into `sink` with the named encoding, if registered.
    pub fn encode<'a>(
        &self,
        name: &str,
        sink: &'a mut dyn Write,
    ) -> Option<Box<dyn EncodedWriter + 'a>> {
        self.encodings.get(name).map(|e| e.encode(sink))
    }

    /// Decode `source` with the named encoding, if registered.
    pub fn decode<'a>(&self, name: &str, source: BoxedReader<'a>) -> Option<BoxedReader<'a>> {
        self.encodings.get(name).map(|e| e.decode(source))
    }
}

impl Default for EncodingRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(GzipEncoding::new()));
        registry
    }
}

impl fmt::Debug for EncodingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

/// Run `raw` through an encoding into a fresh buffer.
pub(crate) fn encode_to_vec(encoding: &dyn ContentEncoding, raw: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut writer = encoding.encode(&mut out);
    writer.write_all(raw)?;
    writer.finish()?;
    Ok(out)
}
