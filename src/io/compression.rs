//! Pluggable compression codecs for input ranges and output partitions.
//!
//! Codecs live in a process-wide registry seeded with the built-in codecs
//! enabled by feature flags:
//!
//! | codec     | extension   | feature               |
//! |-----------|-------------|-----------------------|
//! | `gzip`    | `.gz`       | `compression-gzip`    |
//! | `deflate` | `.deflate`  | `compression-deflate` |
//! | `zstd`    | `.zst`      | `compression-zstd`    |
//! | `bzip2`   | `.bz2`      | `compression-bzip2`   |
//! | `xz`      | `.xz`       | `compression-xz`      |
//!
//! The write path resolves a codec by name ([`codec_for_name`]); the read path
//! detects compressed inputs by file extension ([`codec_for_path`]).
//! Compressed streams cannot be entered at an arbitrary offset, so a
//! compressed input is always read by a single task from its first byte.
//!
//! ```no_run
//! use sparser::io::compression::{codec_for_name, FinishWrite};
//! use std::fs::File;
//! use std::io::Write;
//! # fn main() -> anyhow::Result<()> {
//! let codec = codec_for_name("gzip")?.expect("gzip is enabled");
//! let mut out = codec.wrap_writer(Box::new(File::create("part-00000.txt.gz")?))?;
//! out.write_all(b"{\"id\":1}\n")?;
//! out.finish()?;
//! # Ok(())
//! # }
//! ```

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{SparserError, SparserResult};

static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-deflate")]
        Arc::new(DeflateCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn registry() -> Vec<Arc<dyn CompressionCodec>> {
    {
        let lock = CODEC_REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(codecs) = lock.as_ref() {
            return codecs.clone();
        }
    }
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom codec. It takes part in both name and extension lookups.
///
/// Codecs registered later do not shadow built-in codecs of the same name.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// A compression transform over byte streams.
pub trait CompressionCodec: Send + Sync {
    /// Canonical lowercase name, as stored in the job configuration.
    fn name(&self) -> &str;

    /// Extensions recognised on input files, leading dot included and lowercase.
    /// The first entry is appended to output file names.
    fn extensions(&self) -> &[&str];

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>>;

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>>;

    /// Extension appended to output files written with this codec.
    fn default_extension(&self) -> &str {
        self.extensions().first().copied().unwrap_or("")
    }
}

/// A writer whose stream has to be terminated explicitly.
///
/// Compression encoders emit their trailer on `finish`; relying on `Drop`
/// would discard any error raised while doing so.
pub trait FinishWrite: Write + Send {
    /// Write any trailer, flush, and release the underlying stream.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Pass-through stream used when output is not compressed.
pub struct Uncompressed<W: Write + Send>(pub W);

impl<W: Write + Send> Write for Uncompressed<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write + Send> FinishWrite for Uncompressed<W> {
    fn finish(self: Box<Self>) -> io::Result<()> {
        let mut inner = self.0;
        inner.flush()
    }
}

/// Resolve a codec by name for the write path.
///
/// `none` and `uncompressed` resolve to `Ok(None)`. Matching is case-insensitive.
///
/// # Errors
/// Returns [`SparserError::UnknownCodec`] if no registered codec has this name.
pub fn codec_for_name(name: &str) -> SparserResult<Option<Arc<dyn CompressionCodec>>> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() || wanted == "none" || wanted == "uncompressed" {
        return Ok(None);
    }
    let codecs = registry();
    if let Some(codec) = codecs.iter().find(|c| c.name().eq_ignore_ascii_case(&wanted)) {
        return Ok(Some(Arc::clone(codec)));
    }
    let available = codecs
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(SparserError::UnknownCodec {
        name: name.to_string(),
        available,
    })
}

/// Detect the codec of an input file from its extension.
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<Arc<dyn CompressionCodec>> {
    let path = path.as_ref().to_string_lossy().to_lowercase();
    registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| path.ends_with(ext)))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

macro_rules! finish_encoder {
    ($encoder:ty) => {
        impl FinishWrite for $encoder {
            fn finish(self: Box<Self>) -> io::Result<()> {
                let mut inner = (*self).finish()?;
                inner.flush()
            }
        }
    };
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
finish_encoder!(flate2::write::GzEncoder<Box<dyn Write + Send>>);

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-deflate")]
struct DeflateCodec;

#[cfg(feature = "compression-deflate")]
finish_encoder!(flate2::write::ZlibEncoder<Box<dyn Write + Send>>);

#[cfg(feature = "compression-deflate")]
impl CompressionCodec for DeflateCodec {
    fn name(&self) -> &str {
        "deflate"
    }

    fn extensions(&self) -> &[&str] {
        &[".deflate"]
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(flate2::read::ZlibDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        Ok(Box::new(ZlibEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
finish_encoder!(zstd::stream::write::Encoder<'static, Box<dyn Write + Send>>);

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read + Send>)
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as Box<dyn FinishWrite>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
finish_encoder!(bzip2::write::BzEncoder<Box<dyn Write + Send>>);

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
finish_encoder!(xz2::write::XzEncoder<Box<dyn Write + Send>>);

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn FinishWrite>> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}
